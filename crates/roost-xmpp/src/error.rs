//! Error types for the routing engine and its extension handlers.

use thiserror::Error;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

use crate::storage::StorageError;

/// Crate-level XMPP errors.
///
/// Extension handlers return `Result<Iq, XmppError>`; the `Stanza` variant is
/// converted into an IQ error reply addressed back to the requester.
#[derive(Debug, Error)]
pub enum XmppError {
    /// IO error (network, file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS credential error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Stanza error (for IQ error responses)
    #[error("Stanza error: {condition:?}")]
    Stanza {
        /// Error condition
        condition: DefinedCondition,
        /// Error type
        error_type: ErrorType,
        /// Optional text description
        text: Option<String>,
    },
}

impl XmppError {
    /// Create a new TLS error.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn stanza(error_type: ErrorType, condition: DefinedCondition, text: Option<String>) -> Self {
        Self::Stanza {
            condition,
            error_type,
            text,
        }
    }

    /// Create a stanza error for 'bad-request'.
    pub fn bad_request(text: Option<String>) -> Self {
        Self::stanza(ErrorType::Modify, DefinedCondition::BadRequest, text)
    }

    /// Create a stanza error for 'conflict'.
    pub fn conflict(text: Option<String>) -> Self {
        Self::stanza(ErrorType::Cancel, DefinedCondition::Conflict, text)
    }

    /// Create a stanza error for 'forbidden'.
    pub fn forbidden(text: Option<String>) -> Self {
        Self::stanza(ErrorType::Auth, DefinedCondition::Forbidden, text)
    }

    /// Create a stanza error for 'item-not-found'.
    pub fn item_not_found(text: Option<String>) -> Self {
        Self::stanza(ErrorType::Cancel, DefinedCondition::ItemNotFound, text)
    }

    /// Create a stanza error for 'not-acceptable'.
    pub fn not_acceptable(text: Option<String>) -> Self {
        Self::stanza(ErrorType::Modify, DefinedCondition::NotAcceptable, text)
    }

    /// Create a stanza error for 'not-allowed'.
    pub fn not_allowed(text: Option<String>) -> Self {
        Self::stanza(ErrorType::Cancel, DefinedCondition::NotAllowed, text)
    }

    /// Create a stanza error for 'service-unavailable'.
    pub fn service_unavailable(text: Option<String>) -> Self {
        Self::stanza(ErrorType::Cancel, DefinedCondition::ServiceUnavailable, text)
    }

    /// Create a stanza error for 'internal-server-error'.
    pub fn internal_server_error(text: Option<String>) -> Self {
        Self::stanza(ErrorType::Wait, DefinedCondition::InternalServerError, text)
    }

    /// Map this error onto the stanza error carried by an error reply.
    ///
    /// Non-stanza errors never leak their details to the client.
    pub fn to_stanza_error(&self) -> StanzaError {
        match self {
            Self::Stanza {
                condition,
                error_type,
                text,
            } => StanzaError::new(
                error_type.clone(),
                condition.clone(),
                "en",
                text.clone().unwrap_or_default(),
            ),
            _ => StanzaError::new(
                ErrorType::Wait,
                DefinedCondition::InternalServerError,
                "en",
                "",
            ),
        }
    }
}

/// Build an empty `result` reply for an IQ request.
pub fn iq_result(original: &Iq, payload: Option<minidom::Element>) -> Iq {
    Iq {
        from: original.to.clone(),
        to: original.from.clone(),
        id: original.id.clone(),
        payload: IqType::Result(payload),
    }
}

/// Build an `error` reply for an IQ request.
pub fn iq_error_reply(original: &Iq, error: &XmppError) -> Iq {
    Iq {
        from: original.to.clone(),
        to: original.from.clone(),
        id: original.id.clone(),
        payload: IqType::Error(error.to_stanza_error()),
    }
}
