//! Reading, parsing and writing of the credentials and config files.
//!
//! Both files share one INI-like format:
//! - `[name]` opens a section
//! - `key = value` or `key: value` adds an attribute to the current section
//! - blank lines and lines starting with `#` or `;` are ignored
//! - an indented line following a key with an empty value continues that
//!   value (the nested form used by e.g. `s3 =` blocks in the config file)
//!
//! Malformed lines are skipped with a warning. Every write replaces the whole
//! file through a sibling temp file, and every mutating operation takes a
//! `.backup` copy of the live file first.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::attributes::AttributeSet;
use crate::error::{ProfileError, Result};
use crate::paths::backup_path;

/// Reserved section read by downstream tools as the active profile
pub const DEFAULT_SECTION: &str = "default";

/// Prefix carried by named profiles in the config file
pub const CONFIG_PROFILE_PREFIX: &str = "profile ";

const CONTINUATION_INDENT: &str = "    ";

/// Which of the two profile files a [`ProfileFile`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Credentials,
    Config,
}

impl FileKind {
    /// Section header used for `profile` in this kind of file
    pub fn section_name(self, profile: &str) -> String {
        match self {
            FileKind::Credentials => profile.to_string(),
            FileKind::Config if profile == DEFAULT_SECTION => DEFAULT_SECTION.to_string(),
            FileKind::Config => format!("{CONFIG_PROFILE_PREFIX}{profile}"),
        }
    }

    /// Profile name a section header refers to, or `None` for headers that do
    /// not name a profile in this kind of file.
    ///
    /// In the config file only `[default]` and `[profile <name>]` count;
    /// `[profile default]` is kept distinct from `[default]` and so resolves
    /// to nothing.
    pub fn profile_name(self, section: &str) -> Option<&str> {
        match self {
            FileKind::Credentials => Some(section),
            FileKind::Config => {
                if section == DEFAULT_SECTION {
                    return Some(DEFAULT_SECTION);
                }
                let name = section.strip_prefix(CONFIG_PROFILE_PREFIX)?.trim();
                (!name.is_empty() && name != DEFAULT_SECTION).then_some(name)
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Credentials => "credentials",
            FileKind::Config => "config",
        }
    }
}

/// A named block of attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub attributes: AttributeSet,
}

/// A line that could not be parsed and was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub line: usize,
    pub content: String,
}

/// Parsed contents of one profile file, sections in file order
#[derive(Debug, Clone, Default)]
pub struct ProfileFile {
    sections: Vec<Section>,
    malformed: Vec<MalformedLine>,
}

impl ProfileFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse file content. Never fails: malformed lines are recorded and skipped.
    pub fn parse(content: &str) -> Self {
        let mut file = ProfileFile::new();
        let mut current: Option<usize> = None;
        // Key whose value is being continued by indented lines
        let mut continuing: Option<String> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = raw.starts_with([' ', '\t']);
            if indented && let (Some(section), Some(key)) = (current, continuing.as_ref()) {
                let attrs = &mut file.sections[section].attributes;
                let mut value = attrs.get(key).unwrap_or_default().to_string();
                value.push('\n');
                value.push_str(trimmed);
                attrs.insert(key.clone(), value);
                continue;
            }
            continuing = None;

            if trimmed.starts_with('[') {
                current = match header_name(trimmed) {
                    Some(name) => Some(file.section_index_or_insert(name)),
                    None => {
                        // Keys below a broken header belong to no section
                        file.record_malformed(line_no, raw);
                        None
                    }
                };
                continue;
            }

            let Some((key, value)) = split_attribute(trimmed) else {
                file.record_malformed(line_no, raw);
                continue;
            };
            let Some(section) = current else {
                file.record_malformed(line_no, raw);
                continue;
            };

            file.sections[section].attributes.insert(key, value);
            if value.is_empty() {
                continuing = Some(key.to_string());
            }
        }

        file
    }

    /// Serialize sections in stored order, one blank line between sections.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for (key, value) in section.attributes.iter() {
                render_attribute(&mut out, key, value);
            }
        }
        out
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&AttributeSet> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.attributes)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Lines skipped while parsing
    pub fn malformed_lines(&self) -> &[MalformedLine] {
        &self.malformed
    }

    /// Replace the named section's attributes wholesale, or append a new
    /// section at the end. Other sections are left untouched.
    pub fn upsert_section(&mut self, name: &str, attributes: AttributeSet) {
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(section) => section.attributes = attributes,
            None => self.sections.push(Section {
                name: name.to_string(),
                attributes,
            }),
        }
    }

    /// Remove the named section. Returns whether it existed.
    pub fn remove_section(&mut self, name: &str) -> bool {
        let before = self.sections.len();
        self.sections.retain(|s| s.name != name);
        self.sections.len() != before
    }

    fn section_index_or_insert(&mut self, name: &str) -> usize {
        // A repeated header continues the earlier section so names stay unique
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            return idx;
        }
        self.sections.push(Section {
            name: name.to_string(),
            attributes: AttributeSet::new(),
        });
        self.sections.len() - 1
    }

    fn record_malformed(&mut self, line: usize, raw: &str) {
        warn!(line, content = raw.trim(), "skipping malformed line");
        self.malformed.push(MalformedLine {
            line,
            content: raw.trim().to_string(),
        });
    }
}

/// Section name of a `[name]` header line. Text after the closing bracket
/// must be a `#` or `;` comment.
fn header_name(line: &str) -> Option<&str> {
    let (inner, rest) = line.strip_prefix('[')?.split_once(']')?;
    let rest = rest.trim_start();
    if !(rest.is_empty() || rest.starts_with('#') || rest.starts_with(';')) {
        return None;
    }
    let name = inner.trim();
    (!name.is_empty()).then_some(name)
}

/// Split `key = value` / `key: value` at whichever separator comes first.
fn split_attribute(line: &str) -> Option<(&str, &str)> {
    let sep = line.find(['=', ':'])?;
    let key = line[..sep].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[sep + 1..].trim()))
}

fn render_attribute(out: &mut String, key: &str, value: &str) {
    let mut lines = value.split('\n');
    let first = lines.next().unwrap_or_default();
    out.push_str(key);
    if first.is_empty() {
        out.push_str(" =\n");
    } else {
        out.push_str(" = ");
        out.push_str(first);
        out.push('\n');
    }
    for rest in lines {
        out.push_str(CONTINUATION_INDENT);
        out.push_str(rest);
        out.push('\n');
    }
}

/// Load and parse a profile file.
///
/// A missing credentials file is an error; a missing config file reads as empty.
pub fn load(path: &Path, kind: FileKind) -> Result<ProfileFile> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return match kind {
                FileKind::Credentials => Err(ProfileError::FileNotFound {
                    path: path.to_path_buf(),
                }),
                FileKind::Config => {
                    debug!(path = %path.display(), "config file absent, treating as empty");
                    Ok(ProfileFile::new())
                }
            };
        }
        Err(source) => {
            return Err(ProfileError::ReadFailed {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let file = ProfileFile::parse(&content);
    debug!(
        path = %path.display(),
        sections = file.sections().len(),
        malformed = file.malformed_lines().len(),
        "loaded {} file",
        kind.label()
    );
    Ok(file)
}

/// Replace the file at `path` with the serialized `file`.
///
/// Content goes to a sibling temp file which is then renamed over the live
/// path, so readers never observe a half-written file.
pub fn write(path: &Path, file: &ProfileFile) -> Result<()> {
    write_bytes(path, file.render().as_bytes()).map_err(|source| ProfileError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), sections = file.sections().len(), "wrote profile file");
    Ok(())
}

/// Snapshot of a live file taken before it is mutated
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    /// Live file that was copied
    pub source: PathBuf,
    /// Where the copy was written
    pub path: PathBuf,
    /// Whether the live file existed when the backup was taken
    pub source_existed: bool,
    bytes: Vec<u8>,
}

impl BackupArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Put the live file back the way it was when the backup was taken
    pub fn restore(&self) -> Result<()> {
        let result = if self.source_existed {
            write_bytes(&self.source, &self.bytes)
        } else {
            match fs::remove_file(&self.source) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            }
        };
        result.map_err(|source| ProfileError::WriteFailed {
            path: self.source.clone(),
            source,
        })?;
        debug!(path = %self.source.display(), "restored from backup");
        Ok(())
    }
}

/// Copy the current bytes of `path` to `path.backup`, overwriting any older
/// backup. A file that does not exist yet is backed up as empty.
///
/// Returns only once the copy is flushed to disk and its length checked.
pub fn backup(path: &Path) -> Result<BackupArtifact> {
    let backup = backup_path(path);
    let failed = |source: std::io::Error| ProfileError::BackupFailed {
        path: path.to_path_buf(),
        backup: backup.clone(),
        source,
    };

    let (bytes, source_existed) = match fs::read(path) {
        Ok(bytes) => (bytes, true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), false),
        Err(e) => return Err(failed(e)),
    };

    let mut out = open_private(&backup).map_err(failed)?;
    out.write_all(&bytes).map_err(failed)?;
    out.sync_all().map_err(failed)?;

    let written = fs::metadata(&backup).map_err(failed)?.len();
    if written != bytes.len() as u64 {
        return Err(failed(std::io::Error::other(format!(
            "backup is {written} bytes, expected {}",
            bytes.len()
        ))));
    }

    debug!(
        path = %path.display(),
        backup = %backup.display(),
        bytes = bytes.len(),
        "backed up profile file"
    );
    Ok(BackupArtifact {
        source: path.to_path_buf(),
        path: backup,
        source_existed,
        bytes,
    })
}

fn write_bytes(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut out = open_private(&tmp)?;
    out.write_all(bytes)?;
    out.sync_all()?;
    drop(out);

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(&tmp, meta.permissions())?;
    }
    fs::rename(&tmp, path)
}

/// Open for writing, truncating. New files are readable by the owner only.
fn open_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
