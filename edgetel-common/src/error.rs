use thiserror::Error;

/// Failures shared by the data model, config loading and the bus session.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Zenoh session failure: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed CBOR payload: {0}")]
    Cbor(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic: {0}")]
    Topic(String),
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Self::Cbor(format!("{e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
