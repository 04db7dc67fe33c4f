use thiserror::Error;

use anubis_types::models::ChannelId;

/// Transport-level failure reported by a [`ChatService`](crate::service::ChatService)
/// implementation. Never handed to the rendering boundary as-is; components
/// convert it into one of the kinds below.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not signed in")]
    Unauthenticated,
}

/// Local, synchronous rejections. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("registration form is incomplete")]
    FormIncomplete,
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// A directory lookup failed; the field degrades to Invalid and the next
/// keystroke retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("availability check failed: {0}")]
pub struct AvailabilityCheckError(#[from] pub ServiceError);

/// Credential rejections, surfaced verbatim and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,
    #[error("Wrong password")]
    WrongPassword,
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Account is disabled")]
    AccountDisabled,
    #[error("This email is already in use")]
    EmailInUse,
    #[error("This username is already taken")]
    UsernameTaken,
    #[error("Password is too weak")]
    WeakPassword,
    #[error("Registration is temporarily disabled")]
    RegistrationClosed,
    #[error("Authentication failed: {0}")]
    Rejected(String),
    #[error("Network failure: {0}")]
    Network(String),
}

impl From<ServiceError> for AuthError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Network(msg) => Self::Network(msg),
            other => Self::Rejected(other.to_string()),
        }
    }
}

/// Snapshot load or subscription install failed. The session stays Idle and
/// the caller may retry the switch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("failed to load messages for #{channel}: {source}")]
    Fetch {
        channel: ChannelId,
        #[source]
        source: ServiceError,
    },
    #[error("failed to subscribe to #{channel}: {source}")]
    Subscribe {
        channel: ChannelId,
        #[source]
        source: ServiceError,
    },
    #[error("failed to load {what}: {source}")]
    Directory {
        what: &'static str,
        #[source]
        source: ServiceError,
    },
    #[error("no active channel")]
    NoActiveChannel,
}

/// Message append or edit failed. Nothing is kept as if it had been sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to send message: {0}")]
pub struct SendError(#[from] pub ServiceError);

/// Every error the core hands to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Send(#[from] SendError),
}
