//! Error types returned by connection, protocol and service calls.

use serde::Serialize;

const ERROR_PREFIX: &str = "org.freedesktop.Telepathy.Error";

/// A failed request, reported synchronously to the caller.
///
/// Every variant maps onto a Telepathy D-Bus error name (see [`TpError::name`])
/// so a transport adapter can forward it unchanged. None of these are fatal:
/// the call simply produced no result.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TpError {
    /// Unsupported handle type, unknown channel property, bad status string.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Zero handle, or a handle not present in the registry.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// The operation exists in the interface but this manager doesn't do it.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The request is valid but can't be satisfied right now.
    #[error("not available: {0}")]
    NotAvailable(String),
}

impl TpError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn invalid_handle(message: impl Into<String>) -> Self {
        Self::InvalidHandle(message.into())
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented(message.into())
    }

    pub fn not_available(message: impl Into<String>) -> Self {
        Self::NotAvailable(message.into())
    }

    /// Fully-qualified D-Bus error name.
    pub fn name(&self) -> String {
        let suffix = match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::InvalidHandle(_) => "InvalidHandle",
            Self::NotImplemented(_) => "NotImplemented",
            Self::NotAvailable(_) => "NotAvailable",
        };
        format!("{ERROR_PREFIX}.{suffix}")
    }

    /// Human-readable message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m)
            | Self::InvalidHandle(m)
            | Self::NotImplemented(m)
            | Self::NotAvailable(m) => m,
        }
    }

    /// Serializable `{name, message}` pair for wire replies.
    pub fn to_wire(&self) -> WireError {
        WireError {
            name: self.name(),
            message: self.message().to_string(),
        }
    }
}

/// The `{name, message}` shape of an error on the wire.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WireError {
    pub name: String,
    pub message: String,
}

/// Lifecycle errors from [`crate::service::Service`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("service is already running")]
    AlreadyRunning,

    #[error("service is not running")]
    NotRunning,

    #[error("service can only be prepared from the initial state")]
    AlreadyPrepared,

    #[error("{0} name is not set")]
    MissingName(&'static str),

    #[error(transparent)]
    Tp(#[from] TpError),
}

impl ServiceError {
    /// Lifecycle errors go out as `NotAvailable`; wrapped errors keep their name.
    pub fn to_wire(&self) -> WireError {
        match self {
            Self::Tp(err) => err.to_wire(),
            other => WireError {
                name: format!("{ERROR_PREFIX}.NotAvailable"),
                message: other.to_string(),
            },
        }
    }
}
