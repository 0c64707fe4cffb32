use std::path::PathBuf;

/// Boxed error used at the cluster API seam so fakes and `kube` share one signature.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("couldn't open config file {}, {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {}, {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid pattern {pattern:?}, {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("failed to create cluster client, {0}")]
    Client(#[source] BoxError),

    #[error("pod watch failed, {0}")]
    Subscription(#[source] BoxError),

    #[error("failed to read log stream, pod: {pod}, container: {container}, {source}")]
    StreamOpen {
        pod: String,
        container: String,
        source: BoxError,
    },
}

/// Outcome of decoding a single log line.
///
/// `NotJson` is the expected result for plain-text emitters and is rendered verbatim;
/// the other variants surface as a short diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("not-json")]
    NotJson,

    #[error("failed to parse date in field {field:?}: {reason}")]
    Timestamp { field: String, reason: String },

    #[error("failed to parse message, field {field:?} {reason}")]
    Structure { field: String, reason: &'static str },
}
