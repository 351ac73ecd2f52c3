//! Ordered attribute sets for a single profile section.
//!
//! A section's attributes keep the order they were read in so that a
//! read-modify-write cycle produces a minimal diff. Keys that this tool
//! does not know about are carried along untouched.

use indexmap::IndexMap;

pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const SESSION_TOKEN: &str = "aws_session_token";
pub const REGION: &str = "region";
pub const OUTPUT: &str = "output";

/// Keys that belong in the credentials file. Everything else goes to config.
pub const CREDENTIAL_KEYS: [&str; 3] = [ACCESS_KEY_ID, SECRET_ACCESS_KEY, SESSION_TOKEN];

/// Insertion-ordered mapping of attribute name to value.
///
/// Equality compares content only, so two sets with the same pairs in a
/// different order are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    entries: IndexMap<String, String>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove `key`, keeping the order of the remaining entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn access_key_id(&self) -> Option<&str> {
        self.non_empty(ACCESS_KEY_ID)
    }

    pub fn secret_access_key(&self) -> Option<&str> {
        self.non_empty(SECRET_ACCESS_KEY)
    }

    pub fn session_token(&self) -> Option<&str> {
        self.non_empty(SESSION_TOKEN)
    }

    pub fn region(&self) -> Option<&str> {
        self.non_empty(REGION)
    }

    pub fn output(&self) -> Option<&str> {
        self.non_empty(OUTPUT)
    }

    /// Credential keys required for an identity check that are absent or empty
    pub fn missing_credentials(&self) -> Vec<String> {
        [ACCESS_KEY_ID, SECRET_ACCESS_KEY]
            .into_iter()
            .filter(|key| self.non_empty(key).is_none())
            .map(String::from)
            .collect()
    }

    /// Partition a merged set into its credentials-file and config-file parts.
    pub fn split_by_file(&self) -> (AttributeSet, AttributeSet) {
        let mut credentials = AttributeSet::new();
        let mut config = AttributeSet::new();
        for (key, value) in self.iter() {
            if is_credential_key(key) {
                credentials.insert(key, value);
            } else {
                config.insert(key, value);
            }
        }
        (credentials, config)
    }

    /// Union of `self` and `other`; keys already in `self` win.
    pub fn merged_with(&self, other: &AttributeSet) -> AttributeSet {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            if !merged.contains_key(key) {
                merged.insert(key, value);
            }
        }
        merged
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

pub fn is_credential_key(key: &str) -> bool {
    CREDENTIAL_KEYS.contains(&key)
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = AttributeSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}
