//! Terminal rendering for awsprof.
//!
//! Operations return data; everything a user sees goes through [`Ui`]. Color
//! is decided once at startup. `--no-color`, `NO_COLOR` and `TERM=dumb` turn
//! it off regardless of `--color`; `--color auto` follows whether stdout is a
//! terminal. Spinners only animate when color is on and stdout is a terminal.

use std::borrow::Cow;
use std::io::IsTerminal;
use std::time::Duration;

use anstream::{eprintln, println};
use anstyle::{AnsiColor, Style};
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets};
use indicatif::{ProgressBar, ProgressStyle};

use crate::store::BackupArtifact;

/// `--color` setting
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorMode {
    Always,
    #[default]
    Auto,
    Never,
}

/// Severity of a status line, doctor finding or table cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Ok,
    Warn,
    Error,
    Info,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Ok => "OK",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Info => "INFO",
        }
    }

    fn glyph(self, color: bool) -> &'static str {
        match (self, color) {
            (Level::Ok, true) => "✓",
            (Level::Ok, false) => "[OK]",
            (Level::Warn, true) => "⚠",
            (Level::Warn, false) => "[!]",
            (Level::Error, true) => "✗",
            (Level::Error, false) => "[X]",
            (Level::Info, true) => "•",
            (Level::Info, false) => "-",
        }
    }

    fn ansi(self) -> AnsiColor {
        match self {
            Level::Ok => AnsiColor::Green,
            Level::Warn => AnsiColor::Yellow,
            Level::Error => AnsiColor::Red,
            Level::Info => AnsiColor::Cyan,
        }
    }

    fn cell_color(self) -> Color {
        match self {
            Level::Ok => Color::Green,
            Level::Warn => Color::Yellow,
            Level::Error => Color::Red,
            Level::Info => Color::Cyan,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ui {
    color: bool,
    animate: bool,
}

impl Ui {
    pub fn new(mode: ColorMode, no_color: bool) -> Self {
        let tty = std::io::stdout().is_terminal();
        let color = !no_color && !color_disabled_by_env() && wants_color(mode, tty);
        if !color {
            anstream::ColorChoice::write_global(anstream::ColorChoice::Never);
        }
        Self {
            color,
            animate: color && tty,
        }
    }

    fn paint(&self, s: &str, style: Style) -> String {
        if self.color {
            format!("{style}{s}{style:#}")
        } else {
            s.to_string()
        }
    }

    pub fn bold(&self, s: impl AsRef<str>) -> String {
        self.paint(s.as_ref(), Style::new().bold())
    }

    pub fn dim(&self, s: impl AsRef<str>) -> String {
        self.paint(s.as_ref(), Style::new().fg_color(Some(AnsiColor::BrightBlack.into())))
    }

    /// Text in the level's color
    pub fn tint(&self, s: impl AsRef<str>, level: Level) -> String {
        self.paint(s.as_ref(), Style::new().fg_color(Some(level.ansi().into())))
    }

    /// Status glyph: a symbol with color, a bracketed tag without
    pub fn mark(&self, level: Level) -> String {
        self.tint(level.glyph(self.color), level)
    }

    /// `LABEL message`; errors go to stderr, everything else to stdout
    pub fn status(&self, level: Level, msg: impl AsRef<str>) {
        let style = if self.color {
            Style::new().fg_color(Some(level.ansi().into())).bold()
        } else {
            Style::new()
        };
        let label = level.label();
        match level {
            Level::Error => eprintln!("{style}{label}{style:#} {}", msg.as_ref()),
            _ => println!("{style}{label}{style:#} {}", msg.as_ref()),
        }
    }

    /// Indented doctor finding under a step heading
    pub fn finding(&self, level: Level, msg: impl AsRef<str>) {
        println!("  {} {}", self.mark(level), msg.as_ref());
    }

    /// A finding one level deeper, for per-profile entries
    pub fn finding_item(&self, level: Level, msg: impl AsRef<str>) {
        println!("    {} {}", self.mark(level), msg.as_ref());
    }

    /// Print a failed command: the root cause under an ERROR label, then the
    /// messages wrapped around it, outermost last.
    pub fn report(&self, err: &anyhow::Error) {
        self.status(Level::Error, err.root_cause().to_string());
        let mut context: Vec<String> = err.chain().map(|e| e.to_string()).collect();
        context.pop();
        for line in context.iter().rev() {
            eprintln!("  {}", self.dim(line));
        }
    }

    /// Dimmed note of where a file was backed up
    pub fn backup_note(&self, backup: &BackupArtifact) {
        let size = if backup.is_empty() {
            "empty".to_string()
        } else {
            format!("{} bytes", backup.len())
        };
        println!("{}", self.dim(format!("Backup: {} ({size})", backup.path.display())));
    }

    pub fn println(&self, msg: impl AsRef<str>) {
        println!("{}", msg.as_ref());
    }

    pub fn newline(&self) {
        println!();
    }

    pub fn section(&self, title: impl AsRef<str>) {
        println!("{}", self.bold(title));
    }

    // Tables are borderless; comfy-table does its own styling so column
    // widths are not thrown off by escape codes.

    pub fn table(&self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if !headers.is_empty() {
            let row: Vec<Cell> = headers
                .iter()
                .map(|h| {
                    let cell = Cell::new(h);
                    if self.color {
                        cell.add_attribute(Attribute::Bold)
                    } else {
                        cell
                    }
                })
                .collect();
            table.set_header(row);
        }
        table
    }

    /// Text cell in the level's color
    pub fn level_cell(&self, content: impl ToString, level: Level) -> Cell {
        let cell = Cell::new(content);
        if self.color {
            cell.fg(level.cell_color())
        } else {
            cell
        }
    }

    /// Profile name, highlighted when it is the active default
    pub fn profile_cell(&self, name: &str, active: bool) -> Cell {
        if active {
            self.level_cell(name, Level::Ok)
        } else {
            Cell::new(name)
        }
    }

    /// Which of the two files hold a profile; one-sided profiles stand out
    pub fn presence_cell(&self, in_credentials: bool, in_config: bool) -> Cell {
        match (in_credentials, in_config) {
            (true, true) => Cell::new("credentials+config"),
            (true, false) => self.level_cell("credentials only", Level::Warn),
            (false, true) => self.level_cell("config only", Level::Warn),
            (false, false) => Cell::new("-"),
        }
    }

    /// Spinner for a blocking step. Hidden unless animating; the outcome is
    /// then printed as a status line instead.
    pub fn progress(&self, msg: impl Into<Cow<'static, str>>) -> Progress {
        let bar = if self.animate {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(msg);
        Progress { bar, ui: *self }
    }
}

/// A running spinner started by [`Ui::progress`]
pub struct Progress {
    bar: ProgressBar,
    ui: Ui,
}

impl Progress {
    pub fn succeed(self, msg: impl Into<Cow<'static, str>>) {
        self.finish(Level::Ok, msg.into());
    }

    pub fn fail(self, msg: impl Into<Cow<'static, str>>) {
        self.finish(Level::Error, msg.into());
    }

    /// Remove the spinner without printing anything
    pub fn clear(self) {
        self.bar.finish_and_clear();
    }

    fn finish(self, level: Level, msg: Cow<'static, str>) {
        if self.ui.animate {
            if let Ok(style) = ProgressStyle::with_template("{msg}") {
                self.bar.set_style(style);
            }
            self.bar
                .finish_with_message(format!("{} {}", self.ui.mark(level), msg));
        } else {
            self.bar.finish_and_clear();
            self.ui.status(level, msg);
        }
    }
}

fn color_disabled_by_env() -> bool {
    // Any NO_COLOR value counts, see no-color.org
    std::env::var_os("NO_COLOR").is_some()
        || std::env::var("TERM").is_ok_and(|t| t == "dumb")
}

fn wants_color(mode: ColorMode, tty: bool) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => tty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    fn plain() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    #[test]
    fn test_color_mode_values() {
        assert_eq!(ColorMode::from_str("always", true), Ok(ColorMode::Always));
        assert_eq!(ColorMode::from_str("NEVER", true), Ok(ColorMode::Never));
        assert!(ColorMode::from_str("sometimes", true).is_err());
    }

    #[test]
    fn test_wants_color() {
        assert!(wants_color(ColorMode::Always, false));
        assert!(!wants_color(ColorMode::Never, true));
        assert!(wants_color(ColorMode::Auto, true));
        assert!(!wants_color(ColorMode::Auto, false));
    }

    #[test]
    fn test_no_color_flag_wins() {
        let ui = Ui::new(ColorMode::Always, true);
        assert!(!ui.color);
        assert!(!ui.animate);
    }

    #[test]
    fn test_plain_marks_and_text() {
        let ui = plain();
        assert_eq!(ui.mark(Level::Ok), "[OK]");
        assert_eq!(ui.mark(Level::Error), "[X]");
        assert_eq!(ui.mark(Level::Warn), "[!]");
        assert_eq!(ui.tint("x", Level::Error), "x");
        assert_eq!(ui.dim("backup"), "backup");
        assert_eq!(ui.bold("awsprof"), "awsprof");
    }

    #[test]
    fn test_profile_table_without_color() {
        let ui = plain();
        let mut table = ui.table(&["Profile", "Files"]);
        table.add_row(vec![ui.profile_cell("work", true), ui.presence_cell(true, false)]);
        table.add_row(vec![ui.profile_cell("personal", false), ui.presence_cell(false, true)]);
        let rendered = table.to_string();
        assert!(rendered.contains("Profile"));
        assert!(rendered.contains("credentials only"));
        assert!(rendered.contains("config only"));
        assert!(!rendered.contains('\x1b'));
    }

    #[test]
    fn test_report_and_progress_without_terminal() {
        let ui = plain();
        ui.report(&anyhow::anyhow!("root cause").context("Hint: try again"));
        ui.progress("checking").succeed("done");
        ui.progress("checking").fail("failed");
        ui.progress("checking").clear();
    }

    #[test]
    fn test_backup_note_for_present_and_absent_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("credentials");
        std::fs::write(&present, "[default]\n").unwrap();
        let backup = crate::store::backup(&present).unwrap();
        assert_eq!(backup.len(), 10);
        plain().backup_note(&backup);

        let absent = crate::store::backup(&dir.path().join("config")).unwrap();
        assert!(absent.is_empty());
        plain().backup_note(&absent);
    }
}
