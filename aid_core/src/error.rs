use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LoopError {
    #[error("collaborator {name} failed: {message}")]
    Collaborator { name: &'static str, message: String },
    #[error("timeout waiting for {0}")]
    Timeout(&'static str),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing loop configuration")]
    MissingConfig,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
