use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::ContainerRule;

/// A (pod, container) pair selected for tailing.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub pod_name: String,
    pub container_name: String,
    /// Resolved rule for Added targets; Removed targets only carry identity.
    pub rule: Option<ContainerRule>,
}

impl Target {
    pub fn new(pod_name: &str, container_name: &str, rule: Option<ContainerRule>) -> Self {
        Self {
            pod_name: pod_name.to_string(),
            container_name: container_name.to_string(),
            rule,
        }
    }

    /// Registry key. Kubernetes names never contain ':' so this is unambiguous.
    pub fn id(&self) -> String {
        format!("{}:{}", self.pod_name, self.container_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Normalize an emitter's severity label. Unknown labels fall back to `Info`.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "notice" | "warning" => Severity::Warning,
            "error" | "critical" | "alert" | "emergency" | "fatal" => Severity::Error,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub data: BTreeMap<String, String>,
}
