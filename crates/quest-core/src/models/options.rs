//! Declared option schemas
//!
//! Providers declare their download and publish options, tools declare their
//! input parameters, and I/O handlers declare their visualization options with
//! the same `OptionSchema` type. `validate` fills in defaults and rejects
//! unknown, missing or mistyped values.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Metadata;
use crate::error::{QuestError, Result};

/// Type of a declared option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Number,
    Integer,
    String,
    Boolean,
    /// ISO date (`YYYY-MM-DD`) or RFC 3339 timestamp
    Date,
    Choice {
        choices: Vec<String>,
    },
    /// One dataset name, or a list of them
    DatasetSelector,
    /// One catalog entry URI, or a list of them
    CatalogEntrySelector,
}

impl ParamKind {
    pub fn is_selector(&self) -> bool {
        matches!(self, ParamKind::DatasetSelector | ParamKind::CatalogEntrySelector)
    }
}

/// One declared option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            description: String::new(),
            required: false,
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Number)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Integer)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::String)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Date)
    }

    pub fn choice<S: Into<String>>(
        name: impl Into<String>,
        choices: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            ParamKind::Choice {
                choices: choices.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn dataset(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::DatasetSelector)
    }

    pub fn catalog_entry(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::CatalogEntrySelector)
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn check(&self, target: &str, value: &Value) -> Result<Value> {
        let mismatch = |expected: &str| {
            QuestError::invalid_options(
                target,
                format!("option '{}' must be {}, got {}", self.name, expected, value),
            )
        };

        match &self.kind {
            ParamKind::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| mismatch("a number")),
                _ => Err(mismatch("a number")),
            },
            ParamKind::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| mismatch("an integer")),
                _ => Err(mismatch("an integer")),
            },
            ParamKind::String => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(mismatch("a string")),
            },
            ParamKind::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) if s == "true" || s == "false" => Ok(Value::Bool(s == "true")),
                _ => Err(mismatch("a boolean")),
            },
            ParamKind::Date => match value.as_str() {
                Some(s)
                    if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                        || DateTime::parse_from_rfc3339(s).is_ok() =>
                {
                    Ok(value.clone())
                }
                _ => Err(mismatch("a date")),
            },
            ParamKind::Choice { choices } => match value.as_str() {
                Some(s) if choices.iter().any(|c| c == s) => Ok(value.clone()),
                _ => Err(mismatch(&format!("one of [{}]", choices.join(", ")))),
            },
            ParamKind::DatasetSelector | ParamKind::CatalogEntrySelector => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Array(items) if items.iter().all(Value::is_string) => Ok(value.clone()),
                _ => Err(mismatch("a name or a list of names")),
            },
        }
    }
}

/// The options a plugin operation accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionSchema {
    pub title: String,
    #[serde(default)]
    pub properties: Vec<ParamSpec>,
}

impl OptionSchema {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, param: ParamSpec) -> Self {
        self.properties.push(param);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Check `options` against the schema and return them with defaults filled in
    pub fn validate(&self, target: &str, options: &Metadata) -> Result<Metadata> {
        if let Some(unknown) = options.keys().find(|key| self.get(key).is_none()) {
            return Err(QuestError::invalid_options(
                target,
                format!("unknown option '{}'", unknown),
            ));
        }

        let mut validated = Metadata::new();
        for param in &self.properties {
            match options.get(&param.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    validated.insert(param.name.clone(), param.check(target, value)?);
                }
                None => match &param.default {
                    Some(default) => {
                        validated.insert(param.name.clone(), default.clone());
                    }
                    None if param.required => {
                        return Err(QuestError::invalid_options(
                            target,
                            format!("missing required option '{}'", param.name),
                        ));
                    }
                    None => {}
                },
            }
        }
        Ok(validated)
    }
}
