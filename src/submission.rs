use std::fmt;

use chrono::{DateTime, Local, TimeZone};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Timestamp layout of record keys, microsecond precision.
pub const RECORD_KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One decoded set of form fields from a single client request.
///
/// Fields keep the order in which the form sent them. Serialized as a flat
/// JSON object of string fields, which is both the datagram payload and the
/// value stored under each record key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Submission {
    fields: IndexMap<String, String>,
}

impl Submission {
    pub fn new() -> Self {
        Submission::default()
    }

    /// Sets a field. A repeated field name keeps its first position and its
    /// last value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Submission {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut submission = Submission::new();
        for (name, value) in iter {
            submission.insert(name, value);
        }
        submission
    }
}

/// Key of a persisted record: the local receipt time.
///
/// Lexical order follows chronological order, but two records received in
/// the same microsecond share a key and the later one overwrites.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn now() -> Self {
        RecordKey::from_datetime(&Local::now())
    }

    pub fn from_datetime<Tz: TimeZone>(datetime: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        RecordKey(datetime.format(RECORD_KEY_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordKey {
    fn from(key: &str) -> Self {
        RecordKey(key.to_string())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
