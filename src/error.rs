use thiserror::Error;

/// Structural problems when building or reshaping a [`crate::table::Table`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column '{name}' has {found} values, table has {expected} rows")]
    ColumnLength {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("column not found: {0}")]
    MissingColumn(String),
}

/// Malformed source document. Never suppressed; aborts the run.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{source_name}: invalid JSON: {error}")]
    Json {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("{source_name}: {message}")]
    Shape {
        source_name: String,
        message: String,
    },

    #[error("{source_name}: malformed CSV: {error}")]
    Csv {
        source_name: String,
        #[source]
        error: csv::Error,
    },

    #[error("{source_name}: {error}")]
    Table {
        source_name: String,
        #[source]
        error: TableError,
    },
}

/// Failure fetching or unpacking a source archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to read archive entry '{name}': {error}")]
    Entry {
        name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to read archive '{path}': {error}")]
    Read {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("archive entry '{0}' is nested too deeply")]
    TooDeep(String),

    #[error("failed to fetch archive from {url}: {error}")]
    Http {
        url: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("archive download from {url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Failure reading the relational snapshot. The orchestrator suppresses every
/// variant except `Join`.
#[derive(Error, Debug)]
pub enum RelationalReadError {
    #[error("no relational snapshot was supplied")]
    MissingSnapshot,

    #[error("failed to open snapshot: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("failed to read relation '{relation}': {error}")]
    Query {
        relation: String,
        #[source]
        error: rusqlite::Error,
    },

    #[error("failed to stage snapshot bytes: {0}")]
    Stage(#[from] std::io::Error),

    #[error("relation '{relation}': {error}")]
    Table {
        relation: String,
        #[source]
        error: TableError,
    },

    /// Not a read failure: callers must not suppress it.
    #[error("join of snapshot relations failed: {0}")]
    Join(#[from] JoinError),
}

#[derive(Error, Debug)]
pub enum JoinError {
    #[error("join key '{key}' missing from {side} side")]
    MissingKeyColumn { key: String, side: &'static str },

    #[error("join key '{key}' is not unique on the right side (value {value} appears more than once)")]
    KeyViolation { key: String, value: String },

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("merged table is missing column '{0}'")]
    MissingColumn(String),
}

/// Failure writing an output artifact. Never retried by the core.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize '{name}': {error}")]
    Serialize {
        name: String,
        #[source]
        error: csv::Error,
    },

    #[error("I/O error publishing '{name}': {error}")]
    Io {
        name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("HTTP request for '{name}' failed: {error}")]
    Http {
        name: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("object store rejected '{name}': {status} - {body}")]
    Rejected {
        name: String,
        status: u16,
        body: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {error}")]
    Read {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Invalid(String),
}

/// Umbrella error for a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
