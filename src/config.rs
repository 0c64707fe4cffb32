use std::borrow::Cow;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_SECONDS_BEFORE: i64 = 300;

/// How rule patterns are compared against pod and container names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    /// The name starts with the pattern.
    #[default]
    Prefix,
    /// Unanchored regular expression search.
    Regex,
}

/// A rule pattern. Regexes are compiled once in [`Config::prepared`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "String")]
pub struct Pattern {
    source: String,
    regex: Option<Regex>,
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Self {
            source,
            regex: None,
        }
    }
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Self::from(source.to_string())
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Pattern {
    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(name),
            None => name.starts_with(&self.source),
        }
    }

    fn compile(&mut self) -> Result<(), Error> {
        let re = Regex::new(&self.source).map_err(|source| Error::Pattern {
            pattern: self.source.clone(),
            source,
        })?;
        self.regex = Some(re);
        Ok(())
    }
}

/// Names of the JSON fields holding the message, timestamp and severity.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub message: Option<String>,
    pub timestamp: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContainerRule {
    pub pattern: Pattern,
    /// Groups of data fields rendered together on one line, in order.
    pub fields_order: Vec<Vec<String>>,
    /// Render data fields not named in `fields_order` on a trailing line.
    pub show_all: bool,
}

impl Default for ContainerRule {
    fn default() -> Self {
        Self {
            pattern: Pattern::default(),
            fields_order: Vec::new(),
            show_all: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PodRule {
    pub pattern: Pattern,
    pub containers: Vec<ContainerRule>,
}

impl PodRule {
    /// First matching container rule; an empty rule list accepts every container.
    pub fn container_rule(&self, container_name: &str) -> Option<Cow<'_, ContainerRule>> {
        if self.containers.is_empty() {
            return Some(Cow::Owned(ContainerRule::default()));
        }
        self.containers
            .iter()
            .find(|c| c.pattern.matches(container_name))
            .map(Cow::Borrowed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub namespace: String,
    pub seconds_before: i64,
    pub matcher: Matcher,
    pub mapping: FieldMapping,
    pub pods: Vec<PodRule>,
}

impl Config {
    /// Read and parse a config file. The result still needs [`Config::prepared`]
    /// once any command-line overrides are applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill defaults and compile patterns when the regex matcher is selected.
    pub fn prepared(mut self) -> Result<Self, Error> {
        if self.namespace.is_empty() {
            self.namespace = DEFAULT_NAMESPACE.to_string();
        }
        if self.matcher == Matcher::Regex {
            for pod in &mut self.pods {
                pod.pattern.compile()?;
                for container in &mut pod.containers {
                    container.pattern.compile()?;
                }
            }
        }
        Ok(self)
    }

    pub fn namespace(&self) -> &str {
        if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        }
    }

    /// Log look-back window handed to every stream.
    pub fn since_seconds(&self) -> i64 {
        if self.seconds_before <= 0 {
            DEFAULT_SECONDS_BEFORE
        } else {
            self.seconds_before
        }
    }

    /// First matching pod rule; an empty rule list accepts every pod.
    pub fn pod_rule(&self, pod_name: &str) -> Option<Cow<'_, PodRule>> {
        if self.pods.is_empty() {
            return Some(Cow::Owned(PodRule::default()));
        }
        self.pods
            .iter()
            .find(|p| p.pattern.matches(pod_name))
            .map(Cow::Borrowed)
    }
}
