use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error(
        "Jira rejected the credentials for {url} (HTTP 401). Check that the API token is valid \
         and not expired, that the account can browse the project, and that the site or cloud \
         id in the configuration is correct"
    )]
    Authentication { url: String },
    #[error("every known search request shape was rejected; last attempt returned HTTP {status}: {body}")]
    ShapesExhausted { status: u16, body: String },
    #[error("no service desk found for project {project}; desks seen: [{}]", .seen.join(", "))]
    DeskNotFound { project: String, seen: Vec<String> },
    #[error("the standard search API is unavailable and no project key was given for the service desk fallback")]
    NoProjectForFallback,
    #[error("{url} returned HTTP {status}: {body}")]
    UnexpectedStatus { url: String, status: u16, body: String },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("field map is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid field map: {0}")]
    Structure(String),
    #[error("field map default entry {0:?} does not exist")]
    MissingDefault(String),
    #[error("field map has no entry named {0:?}")]
    UnknownProject(String),
    #[error("status bucket {bucket:?} of project {project:?} has no labels")]
    EmptyStatusBucket { project: String, bucket: String },
}
