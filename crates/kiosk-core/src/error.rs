use thiserror::Error;

#[derive(Debug, Error)]
pub enum KioskError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Stored PIN credential is malformed: {0}")]
    MalformedCredential(String),

    #[error("Cryptographic primitive unavailable: {0}")]
    Crypto(String),

    #[error("Invalid PIN: {0}")]
    InvalidPin(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialisation error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KioskError>;
