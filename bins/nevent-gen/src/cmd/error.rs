use stream_api::{ErrorKind, StreamError};

#[derive(Debug, thiserror::Error)]
pub enum NeventGenError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Stream(#[from] StreamError),
}

impl NeventGenError {
    /// Process exit code: 1 for configuration faults, 2 for a lost or
    /// unreachable destination.
    pub fn exit_code(&self) -> i32 {
        match self {
            NeventGenError::Config(_) => 1,
            NeventGenError::Stream(e) => match e.kind() {
                ErrorKind::Connect => 2,
                _ => 1,
            },
        }
    }
}
