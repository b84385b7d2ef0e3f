//! Error types for the Postal core.
//!
//! Two families exist and they never mix:
//!
//! - [`ConfigurationError`] is raised while a bus is being composed. A bus that
//!   fails to build never exists, so nothing can be dispatched against it.
//! - [`DispatchError`] is raised by [`MessageBus::dispatch`](crate::MessageBus::dispatch)
//!   and travels synchronously back to the caller.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed error returned by handlers and middleware.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

// =============================================================================
// Build-time errors
// =============================================================================

/// Errors that abort bus construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The bus enforces one handler per message but several were registered.
    #[error(
        "there are multiple handlers for message \"{message}\" on bus '{bus}': {}",
        .handlers.join(", ")
    )]
    MultipleHandlersFound {
        /// Bus being built.
        bus: String,
        /// Full type name of the message.
        message: String,
        /// Conflicting handler ids, in registration order.
        handlers: Vec<String>,
    },

    /// The same handler id was registered twice for one message type.
    #[error("handler '{handler}' is registered twice for message \"{message}\" on bus '{bus}'")]
    DuplicateHandler {
        /// Bus being built.
        bus: String,
        /// Full type name of the message.
        message: String,
        /// The repeated handler id.
        handler: String,
    },

    /// The host locator has no invocable for a declared handler.
    #[error("handler '{handler}' cannot be resolved for message \"{message}\"")]
    UnresolvableHandler {
        /// Handler id from the definition.
        handler: String,
        /// Full type name of the declared message.
        message: String,
    },

    /// A handler definition declares no message types at all.
    #[error("handler '{handler}' does not declare any message type")]
    MissingMessageTypes {
        /// Handler id from the definition.
        handler: String,
    },

    /// A handler declares a primitive type as its message.
    #[error("handler '{handler}' declares primitive type '{message}' as its message")]
    PrimitiveMessageType {
        /// Handler id from the definition.
        handler: String,
        /// The offending type name.
        message: String,
    },

    /// Buses must be named.
    #[error("bus name must not be empty")]
    EmptyBusName,

    /// A handled-message log labelled for another bus.
    #[error("handled log for bus '{log}' cannot be attached to bus '{bus}'")]
    HandledLogBusMismatch {
        /// Bus being built.
        bus: String,
        /// Bus name the log records under.
        log: String,
    },
}

// =============================================================================
// Dispatch-time errors
// =============================================================================

/// Errors surfaced by a dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Nothing handles the message and the bus does not allow that.
    #[error("no handler for message \"{message}\" on bus '{bus}'")]
    NoHandlerForMessage {
        /// Bus that received the message.
        bus: String,
        /// Full type name of the message.
        message: String,
    },

    /// A handler failed. Remaining handlers for the message were not run.
    #[error("handler '{handler}' failed for message \"{message}\" on bus '{bus}': {source}")]
    Handler {
        /// Bus that received the message.
        bus: String,
        /// Full type name of the message.
        message: String,
        /// Display name of the failing handler.
        handler: String,
        /// The handler's own error.
        #[source]
        source: BoxError,
    },

    /// A middleware refused the message without delegating.
    #[error("message rejected by middleware '{middleware}': {reason}")]
    Rejected {
        /// Name of the rejecting middleware.
        middleware: String,
        /// Human readable reason.
        reason: String,
    },
}

impl DispatchError {
    /// Creates a [`DispatchError::Rejected`].
    pub fn rejected(middleware: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            middleware: middleware.into(),
            reason: reason.into(),
        }
    }

    /// Returns the handler's error if this is a handler failure.
    pub fn handler_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Handler { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type for bus construction.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
