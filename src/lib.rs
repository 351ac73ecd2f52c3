pub mod attributes;
pub mod commands;
pub mod doctor;
pub mod error;
pub mod ops;
pub mod paths;
pub mod registry;
pub mod store;
pub mod ui;
pub mod validate;

#[cfg(test)]
pub mod test_utils;
