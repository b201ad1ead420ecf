use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file {path} is not valid: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding state failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("replacing state file failed: {0}")]
    Persist(#[from] tempfile::PersistError),
}
