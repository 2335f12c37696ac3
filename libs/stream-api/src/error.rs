use std::fmt;

/// Error category. The kind decides how the generator reacts:
/// `Config` and `Connect` are fatal at the process boundary, the
/// cycle-local kinds are logged, counted and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or conflicting configuration — permanent, fail at startup.
    Config,
    /// Destination unreachable or connection lost — fatal for the run.
    Connect,
    /// Header/batch mismatch on encode — skip the cycle.
    Encode,
    /// Malformed or truncated wire buffer — skip the cycle.
    Decode,
    /// Backend-reported delivery failure for a frame — skip the cycle.
    Send,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Connect => f.write_str("connect"),
            ErrorKind::Encode => f.write_str("encode"),
            ErrorKind::Decode => f.write_str("decode"),
            ErrorKind::Send => f.write_str("send"),
        }
    }
}

/// Unified error type for the codec, transport and generator contracts.
#[derive(Clone)]
pub struct StreamError {
    kind: ErrorKind,
    message: String,
}

impl StreamError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn connect(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connect, message: msg.into() }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Encode, message: msg.into() }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Decode, message: msg.into() }
    }

    pub fn send(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Send, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Add context to the error, preserving the original kind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Debug for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StreamError {}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_survives_context() {
        let e = StreamError::send("broker rejected frame").with_context("cycle 7");
        assert_eq!(e.kind(), ErrorKind::Send);
        assert_eq!(e.message(), "cycle 7: broker rejected frame");
    }

    #[test]
    fn debug_includes_kind() {
        let e = StreamError::connect("refused");
        assert_eq!(format!("{e:?}"), "[connect] refused");
    }
}
