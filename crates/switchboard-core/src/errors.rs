//! Relay error taxonomy.
//!
//! None of these terminate the process: parse errors are logged and the
//! offending connection stays open, upstream errors are fanned out to
//! clients, and tool failures become structured `{"error": ...}` results.

use thiserror::Error;

/// Errors surfaced by the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A client sent a frame that could not be parsed.
    #[error("failed to parse client message: {0}")]
    Parse(String),

    /// The upstream connection attempt failed.
    #[error("upstream connect failed: {0}")]
    UpstreamConnect(String),

    /// An operation required a connected upstream session.
    #[error("upstream session is not connected")]
    UpstreamNotConnected,

    /// The upstream transport closed.
    #[error("upstream session closed")]
    UpstreamClosed,

    /// A tool handler failed.
    #[error("tool `{name}` failed: {message}")]
    Tool {
        /// Name of the failing tool.
        name: String,
        /// Handler-reported failure description.
        message: String,
    },

    /// Audio samples could not be encoded into a container.
    #[error("audio encoding failed: {0}")]
    AudioEncode(String),
}

/// Convenience alias used throughout the relay crates.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = RelayError::Parse("unexpected end of input".into());
        assert_eq!(
            err.to_string(),
            "failed to parse client message: unexpected end of input"
        );
    }

    #[test]
    fn tool_error_display_includes_name() {
        let err = RelayError::Tool {
            name: "get_weather".into(),
            message: "city not found".into(),
        };
        assert_eq!(err.to_string(), "tool `get_weather` failed: city not found");
    }

    #[test]
    fn upstream_closed_display() {
        assert_eq!(
            RelayError::UpstreamClosed.to_string(),
            "upstream session closed"
        );
    }
}
