use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::FieldMapping;
use crate::error::ParseError;
use crate::types::{Message, Severity};

const MESSAGE_KEY: &str = "message";
const TIMESTAMP_KEY: &str = "timestamp";
const SEVERITY_KEY: &str = "severity";

/// Platform metadata that is never worth printing.
const SKIP_FIELDS: [&str; 3] = [
    "stacktrace",
    "logging.googleapis.com/labels",
    "logging.googleapis.com/sourceLocation",
];

/// Decodes JSON log lines using a configurable field mapping.
#[derive(Debug, Clone)]
pub struct Parser {
    message_key: String,
    timestamp_key: String,
    severity_key: String,
    skip: HashSet<String>,
}

impl Parser {
    pub fn new(mapping: &FieldMapping) -> Self {
        let pick = |mapped: &Option<String>, default: &str| {
            mapped.clone().unwrap_or_else(|| default.to_string())
        };
        let message_key = pick(&mapping.message, MESSAGE_KEY);
        let timestamp_key = pick(&mapping.timestamp, TIMESTAMP_KEY);
        let severity_key = pick(&mapping.severity, SEVERITY_KEY);

        let skip = SKIP_FIELDS
            .iter()
            .map(|f| f.to_string())
            .chain([
                message_key.clone(),
                timestamp_key.clone(),
                severity_key.clone(),
            ])
            .collect();

        Self {
            message_key,
            timestamp_key,
            severity_key,
            skip,
        }
    }

    pub fn parse_line(&self, line: &str) -> Result<Message, ParseError> {
        let fields: Map<String, Value> = match serde_json::from_str(line) {
            Ok(Value::Object(fields)) => fields,
            _ => return Err(ParseError::NotJson),
        };

        let text = match fields.get(&self.message_key) {
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(self.structure(&self.message_key, "is not a string")),
            None => return Err(self.structure(&self.message_key, "is missing")),
        };

        let severity = match fields.get(&self.severity_key) {
            Some(Value::String(s)) => Severity::from_label(s),
            Some(_) => return Err(self.structure(&self.severity_key, "is not a string")),
            None => Severity::Info,
        };

        let timestamp = match fields.get(&self.timestamp_key) {
            Some(value) => Some(self.timestamp(value)?),
            None => None,
        };

        let data = fields
            .into_iter()
            .filter(|(k, _)| !self.skip.contains(k))
            .map(|(k, v)| (k, stringify(v)))
            .collect::<BTreeMap<_, _>>();

        Ok(Message {
            severity,
            text,
            timestamp,
            data,
        })
    }

    fn timestamp(&self, value: &Value) -> Result<DateTime<Utc>, ParseError> {
        let raw = value.as_str().ok_or_else(|| ParseError::Timestamp {
            field: self.timestamp_key.clone(),
            reason: format!("expected a string, got {value}"),
        })?;
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| ParseError::Timestamp {
                field: self.timestamp_key.clone(),
                reason: format!("{raw:?}: {e}"),
            })
    }

    fn structure(&self, field: &str, reason: &'static str) -> ParseError {
        ParseError::Structure {
            field: field.to_string(),
            reason,
        }
    }
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
