use crate::Result;
use crate::catalog::slugify;
use chrono::NaiveDate;
use ohno::bail;
use serde_yaml::{Mapping, Value};

/// Date format used for every date field written to a record
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One catalog entry
///
/// Wraps the raw YAML mapping so that fields the tool does not know about, and the order of all
/// fields, survive a rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    name: String,
    fields: Mapping,
}

impl Record {
    /// Wrap a mapping, which must carry a string `name` field
    pub fn from_mapping(fields: Mapping) -> Result<Self> {
        let name = match fields.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
            Some(_) => bail!("record field 'name' must be a non-empty string"),
            None => bail!("record has no 'name' field"),
        };

        Ok(Self { name, fields })
    }

    /// Wrap an arbitrary YAML value, which must be a mapping
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Mapping(fields) => Self::from_mapping(fields),
            _ => bail!("record is not a YAML mapping"),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File stem this record is persisted under
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    #[must_use]
    pub fn source_code_url(&self) -> Option<&str> {
        self.fields.get("source_code_url").and_then(Value::as_str)
    }

    /// Whether the field is present with a non-null value
    #[must_use]
    pub fn has_field(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(|v| !v.is_null())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, keeping its position if it already exists
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let _ = self.fields.insert(Value::String(key.to_string()), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Date of the last commit, if the record carries a parsable one
    #[must_use]
    pub fn updated_at(&self) -> Option<NaiveDate> {
        self.fields
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
    }

    #[must_use]
    pub const fn fields(&self) -> &Mapping {
        &self.fields
    }
}
