//! Error types for openprotocol-client.

use thiserror::Error;

use crate::message::MessageCategory;

/// Main error type for all Open Protocol operations.
#[derive(Debug, Error)]
pub enum OpenProtocolError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed length prefix or header on an inbound frame.
    #[error("Framing error: {0}")]
    Framing(String),

    /// A frame could not be rendered (field too wide, frame too long, non-ASCII payload).
    #[error("Encode error: {0}")]
    Encode(String),

    /// A payload field did not pass its validator.
    #[error("Validation failed for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// A payload field could not be parsed.
    #[error("Failed to parse field '{field}': {reason}")]
    FieldParse { field: String, reason: String },

    /// No decoder is registered for this MID and revision.
    #[error("Unsupported message: MID {mid} revision {revision}")]
    UnsupportedMessage { mid: u16, revision: u16 },

    /// The decoder for this MID does not understand the revision.
    #[error("Unsupported revision {revision} for MID {mid}")]
    UnsupportedRevision { mid: u16, revision: u16 },

    /// A decoder already covers this MID and revision.
    #[error("Decoder already registered for MID {mid} revision {revision}")]
    DuplicateRegistration { mid: u16, revision: u16 },

    /// The controller answered with a negative acknowledge.
    #[error("MID {mid} rejected by controller (error code {error_code})")]
    NegativeAck { mid: u16, error_code: u16 },

    /// Communication start was answered with something other than MID 2.
    #[error("Communication start not acknowledged, controller replied with MID {mid}")]
    HandshakeRejected { mid: u16 },

    /// A subscription request was not positively acknowledged.
    #[error("Subscription for MID {mid} was rejected or failed")]
    SubscriptionRejected { mid: u16 },

    /// An unsubscription request was not positively acknowledged.
    #[error("Unsubscription for MID {mid} was rejected or failed")]
    UnsubscriptionRejected { mid: u16 },

    /// A message arrived that neither answers the pending request nor matches a subscription.
    #[error("Unexpected message MID {mid}")]
    UnexpectedMessage { mid: u16 },

    /// A reply arrived but was not the kind the operation needs.
    #[error("Expected reply MID {expected}, got MID {actual}")]
    UnexpectedReply { expected: u16, actual: u16 },

    /// No reply arrived in time.
    #[error("Timed out waiting for reply to MID {mid}")]
    Timeout { mid: u16 },

    /// The transport could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session is not connected or the handshake has not run.
    #[error("Client is not connected")]
    NotConnected,

    /// `send_receive` was called with a message that has no legitimate reply.
    #[error("MID {mid} does not expect a response")]
    NoExpectedResponse { mid: u16 },

    /// A message type was used where a different category is required.
    #[error("MID {mid} is a {actual:?} message, expected {expected:?}")]
    WrongCategory {
        mid: u16,
        expected: MessageCategory,
        actual: MessageCategory,
    },

    /// A subscribe/unsubscribe message does not name the event it controls.
    #[error("MID {mid} does not declare an event MID")]
    MissingEventMid { mid: u16 },
}

impl OpenProtocolError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn field_parse(field: &str, reason: impl Into<String>) -> Self {
        Self::FieldParse {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors confined to a single inbound frame; the session survives them.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::Framing(_)
                | Self::Validation { .. }
                | Self::FieldParse { .. }
                | Self::UnsupportedMessage { .. }
                | Self::UnsupportedRevision { .. }
        )
    }

    /// Errors that end the session.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Connection(_) | Self::ConnectionClosed | Self::NotConnected
        )
    }
}

/// Result type alias using OpenProtocolError.
pub type Result<T> = std::result::Result<T, OpenProtocolError>;
