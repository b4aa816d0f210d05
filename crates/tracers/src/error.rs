//! Error types for the transaction tracers.
//!
//! Transaction failures (reverts, faults, insufficient balance) are never errors
//! here: they are recorded in the trace output. Only failures of the host
//! collaborators and bad configuration surface as `Err`.

use ethereum_types::Address;

#[derive(Debug, thiserror::Error)]
pub enum TracerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid tracer config: {0}")]
    Config(String),

    #[error("Failed to parse tracer config: {0}")]
    ConfigParse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    #[error("Account {0:#x} could not be read")]
    AccountUnavailable(Address),
}

impl From<serde_json::Error> for TracerError {
    fn from(err: serde_json::Error) -> Self {
        TracerError::ConfigParse(err.to_string())
    }
}

impl From<toml::de::Error> for TracerError {
    fn from(err: toml::de::Error) -> Self {
        TracerError::ConfigParse(err.to_string())
    }
}
