use thiserror::Error;

/// Failures raised while loading the source tables. Any of these aborts the
/// run before reconciliation starts.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed CSV in {table}: {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{table}: missing column '{column}'")]
    MissingColumn { table: &'static str, column: String },

    #[error("{table}, line {line}: column '{column}' has invalid value '{value}'")]
    InvalidValue {
        table: &'static str,
        line: u64,
        column: String,
        value: String,
    },
}
