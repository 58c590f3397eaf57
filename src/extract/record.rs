//! Harvested record type
//!
//! A record is an ordered mapping from field name to optional string,
//! keyed by its `url`. Absent values are always `None` and serialize as
//! JSON `null`; an empty string is never stored.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One extracted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    url: String,
    fields: Vec<(String, Option<String>)>,
}

impl Record {
    /// Creates a record with only its key set
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: Vec::new(),
        }
    }

    /// Builder form of [`Record::set`]
    pub fn with_field(mut self, name: &str, value: Option<&str>) -> Self {
        self.set(name, value.map(str::to_string));
        self
    }

    /// Sets a field, replacing an earlier value of the same name in place
    pub fn set(&mut self, name: &str, value: Option<String>) {
        if name == "url" {
            if let Some(url) = value {
                self.url = url;
            }
            return;
        }

        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// The natural key
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Looks up a field value; `None` both for absent values and unknown names
    pub fn get(&self, name: &str) -> Option<&str> {
        if name == "url" {
            return Some(&self.url);
        }
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Returns true if the record carries a field of this name, even if absent
    pub fn has_field(&self, name: &str) -> bool {
        name == "url" || self.fields.iter().any(|(n, _)| n == name)
    }

    /// Non-key fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }
}

/// Trims an extracted value; whitespace-only input becomes `None`
pub fn clean_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("url", &self.url)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a record object with a non-empty url")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Record, A::Error> {
        let mut url: Option<String> = None;
        let mut fields = Vec::new();

        while let Some(key) = map.next_key::<String>()? {
            let value: Option<String> = map.next_value()?;
            if key == "url" {
                url = value;
            } else {
                fields.push((key, value));
            }
        }

        let url = url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| de::Error::missing_field("url"))?;

        Ok(Record { url, fields })
    }
}
