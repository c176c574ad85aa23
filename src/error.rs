//! Error types for the RFB client engine.
//!
//! Every failure is categorized into one of the taxonomy variants below and
//! carries the name of the operation that produced it, a human-readable
//! message, and (where available) the underlying cause for chain traversal
//! via [`std::error::Error::source`].

use std::io;
use thiserror::Error;

/// Result type for RFB operations.
pub type Result<T> = std::result::Result<T, RfbError>;

/// Boxed error cause stored inside an [`RfbError`].
type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error category, used for matching without destructuring the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed wire input, unexpected values, unknown message types.
    Protocol,
    /// Mutual-method failure, server-reported auth failure, crypto failure.
    Authentication,
    /// Decode failure within a specific encoding.
    Encoding,
    /// I/O failure on the underlying stream.
    Network,
    /// Caller-supplied input violates documented constraints.
    Validation,
    /// Deadline exceeded or operation cancelled.
    Timeout,
    /// Unknown encoding, unnegotiable security type, unsupported version.
    Unsupported,
    /// Internal setup failure.
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// Errors produced by the RFB client engine.
#[derive(Debug, Error)]
pub enum RfbError {
    /// Malformed wire input or an unexpected protocol value.
    #[error("rfb protocol: {op}: {message}")]
    Protocol {
        /// Operation that produced the error.
        op: &'static str,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Cause>,
    },

    /// Authentication failure reported by the server or a crypto failure.
    #[error("rfb authentication: {op}: {message}")]
    Authentication {
        /// Operation that produced the error.
        op: &'static str,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Cause>,
    },

    /// Decode failure within a specific rectangle encoding.
    #[error("rfb encoding: {op}: {message}")]
    Encoding {
        /// Operation that produced the error.
        op: &'static str,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Cause>,
    },

    /// I/O failure on the underlying byte stream.
    #[error("rfb network: {op}: {message}")]
    Network {
        /// Operation that produced the error.
        op: &'static str,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Cause>,
    },

    /// Caller-supplied input violated a documented constraint.
    #[error("rfb validation: {op}: {message}")]
    Validation {
        /// Operation that produced the error.
        op: &'static str,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Cause>,
    },

    /// Deadline exceeded or operation cancelled.
    #[error("rfb timeout: {op}: {message}")]
    Timeout {
        /// Operation that produced the error.
        op: &'static str,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Cause>,
    },

    /// Unknown encoding, unnegotiable security type, or unsupported version.
    #[error("rfb unsupported: {op}: {message}")]
    Unsupported {
        /// Operation that produced the error.
        op: &'static str,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Cause>,
    },

    /// Internal setup failure.
    #[error("rfb configuration: {op}: {message}")]
    Configuration {
        /// Operation that produced the error.
        op: &'static str,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Cause>,
    },
}

macro_rules! constructor {
    ($(#[$doc:meta])* $name:ident => $variant:ident) => {
        $(#[$doc])*
        pub fn $name(op: &'static str, message: impl Into<String>) -> Self {
            RfbError::$variant {
                op,
                message: message.into(),
                source: None,
            }
        }
    };
}

impl RfbError {
    constructor!(
        /// Creates a [`RfbError::Protocol`] error.
        protocol => Protocol
    );
    constructor!(
        /// Creates a [`RfbError::Authentication`] error.
        authentication => Authentication
    );
    constructor!(
        /// Creates a [`RfbError::Encoding`] error.
        encoding => Encoding
    );
    constructor!(
        /// Creates a [`RfbError::Network`] error.
        network => Network
    );
    constructor!(
        /// Creates a [`RfbError::Validation`] error.
        validation => Validation
    );
    constructor!(
        /// Creates a [`RfbError::Timeout`] error.
        timeout => Timeout
    );
    constructor!(
        /// Creates a [`RfbError::Unsupported`] error.
        unsupported => Unsupported
    );
    constructor!(
        /// Creates a [`RfbError::Configuration`] error.
        configuration => Configuration
    );

    /// Wraps an I/O error as a [`RfbError::Network`] error.
    pub fn io(op: &'static str, err: io::Error) -> Self {
        RfbError::Network {
            op,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Attaches an underlying cause to this error, preserving its category.
    pub fn caused_by(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        let slot = match &mut self {
            RfbError::Protocol { source, .. }
            | RfbError::Authentication { source, .. }
            | RfbError::Encoding { source, .. }
            | RfbError::Network { source, .. }
            | RfbError::Validation { source, .. }
            | RfbError::Timeout { source, .. }
            | RfbError::Unsupported { source, .. }
            | RfbError::Configuration { source, .. } => source,
        };
        *slot = Some(Box::new(cause));
        self
    }

    /// Returns the taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RfbError::Protocol { .. } => ErrorKind::Protocol,
            RfbError::Authentication { .. } => ErrorKind::Authentication,
            RfbError::Encoding { .. } => ErrorKind::Encoding,
            RfbError::Network { .. } => ErrorKind::Network,
            RfbError::Validation { .. } => ErrorKind::Validation,
            RfbError::Timeout { .. } => ErrorKind::Timeout,
            RfbError::Unsupported { .. } => ErrorKind::Unsupported,
            RfbError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Returns the operation tag recorded when the error was created.
    pub fn op(&self) -> &'static str {
        match self {
            RfbError::Protocol { op, .. }
            | RfbError::Authentication { op, .. }
            | RfbError::Encoding { op, .. }
            | RfbError::Network { op, .. }
            | RfbError::Validation { op, .. }
            | RfbError::Timeout { op, .. }
            | RfbError::Unsupported { op, .. }
            | RfbError::Configuration { op, .. } => op,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display_contains_category_op_and_message() {
        let err = RfbError::protocol("handshake", "bad version banner");
        let text = err.to_string();
        assert!(text.contains("protocol"));
        assert!(text.contains("handshake"));
        assert!(text.contains("bad version banner"));
    }

    #[test]
    fn test_error_kind_matches_variant() {
        assert_eq!(RfbError::protocol("op", "m").kind(), ErrorKind::Protocol);
        assert_eq!(
            RfbError::authentication("op", "m").kind(),
            ErrorKind::Authentication
        );
        assert_eq!(RfbError::encoding("op", "m").kind(), ErrorKind::Encoding);
        assert_eq!(RfbError::network("op", "m").kind(), ErrorKind::Network);
        assert_eq!(RfbError::validation("op", "m").kind(), ErrorKind::Validation);
        assert_eq!(RfbError::timeout("op", "m").kind(), ErrorKind::Timeout);
        assert_eq!(
            RfbError::unsupported("op", "m").kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            RfbError::configuration("op", "m").kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_error_op_accessor() {
        let err = RfbError::encoding("hextile", "truncated tile");
        assert_eq!(err.op(), "hextile");
    }

    #[test]
    fn test_io_error_wraps_source() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err = RfbError::io("read_message", io_err);
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("reset by peer"));
    }

    #[test]
    fn test_caused_by_attaches_source_chain() {
        let inner = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err = RfbError::protocol("server_init", "short read").caused_by(inner);
        let source = err.source().expect("source should be set");
        assert!(source.to_string().contains("eof"));
    }

    #[test]
    fn test_caused_by_preserves_category() {
        let inner = io::Error::new(io::ErrorKind::Other, "boom");
        let err = RfbError::unsupported("negotiate", "no common type").caused_by(inner);
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Protocol.to_string(), "protocol");
        assert_eq!(ErrorKind::Unsupported.to_string(), "unsupported");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
