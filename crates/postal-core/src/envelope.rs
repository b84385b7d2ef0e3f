//! Envelopes and stamps.
//!
//! An [`Envelope`] carries one message through the middleware pipeline along
//! with the [`Stamp`]s collected so far. Envelopes move by value: a middleware
//! that wants to add metadata calls [`Envelope::with`] and passes the returned
//! envelope on.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::message::{Message, MessageType};

// ============================================================================
// Stamp
// ============================================================================

/// Metadata attached to an envelope during dispatch.
pub trait Stamp: Any + fmt::Debug + Send + Sync {
    /// Returns `self` as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Records that a handler ran and what it returned.
#[derive(Clone)]
pub struct HandledStamp {
    handler_id: Arc<str>,
    handler_name: Arc<str>,
    result: Arc<dyn Any + Send + Sync>,
    snapshot: String,
}

impl HandledStamp {
    /// Creates a stamp from a handler's return value.
    pub fn new<R>(
        handler_id: impl Into<Arc<str>>,
        handler_name: impl Into<Arc<str>>,
        result: R,
    ) -> Self
    where
        R: fmt::Debug + Send + Sync + 'static,
    {
        let snapshot = format!("{result:#?}");
        Self::from_parts(handler_id, handler_name, Arc::new(result), snapshot)
    }

    pub(crate) fn from_parts(
        handler_id: impl Into<Arc<str>>,
        handler_name: impl Into<Arc<str>>,
        result: Arc<dyn Any + Send + Sync>,
        snapshot: String,
    ) -> Self {
        Self {
            handler_id: handler_id.into(),
            handler_name: handler_name.into(),
            result,
            snapshot,
        }
    }

    /// Id of the handler that produced this stamp.
    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    /// Alias of the handler, or its id when no alias was given.
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// The handler's return value, if it is an `R`.
    pub fn result<R: Any>(&self) -> Option<&R> {
        self.result.downcast_ref()
    }

    /// Pretty `Debug` rendering of the result, captured when the stamp was made.
    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }
}

impl fmt::Debug for HandledStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandledStamp")
            .field("handler", &self.handler_name)
            .field("result", &self.snapshot)
            .finish()
    }
}

impl Stamp for HandledStamp {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records which bus received the message and when.
#[derive(Debug, Clone)]
pub struct ReceivedStamp {
    bus: Arc<str>,
    at: SystemTime,
}

impl ReceivedStamp {
    /// Stamps receipt on `bus` at the current time.
    pub fn now(bus: impl Into<Arc<str>>) -> Self {
        Self {
            bus: bus.into(),
            at: SystemTime::now(),
        }
    }

    /// Name of the receiving bus.
    pub fn bus(&self) -> &str {
        &self.bus
    }

    /// Wall-clock time of receipt.
    pub fn at(&self) -> SystemTime {
        self.at
    }
}

impl Stamp for ReceivedStamp {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A message plus the stamps accumulated while it is dispatched.
///
/// Cloning is cheap: the message and each stamp are shared.
#[derive(Clone)]
pub struct Envelope {
    message: Arc<dyn Message>,
    stamps: Vec<Arc<dyn Stamp>>,
}

impl Envelope {
    /// Wraps a message in an envelope without stamps.
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            message: Arc::new(message),
            stamps: Vec::new(),
        }
    }

    /// Wraps an already shared message.
    pub fn from_arc(message: Arc<dyn Message>) -> Self {
        Self {
            message,
            stamps: Vec::new(),
        }
    }

    /// Returns a new envelope with `stamp` appended.
    pub fn with<S: Stamp>(mut self, stamp: S) -> Self {
        self.stamps.push(Arc::new(stamp));
        self
    }

    /// The wrapped message.
    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    /// The wrapped message as an `M`, if it is one.
    pub fn message_as<M: Message>(&self) -> Option<&M> {
        self.message().as_any().downcast_ref()
    }

    /// Runtime identity of the wrapped message.
    pub fn message_type(&self) -> MessageType {
        self.message().message_type()
    }

    /// All stamps, oldest first.
    pub fn stamps(&self) -> &[Arc<dyn Stamp>] {
        &self.stamps
    }

    /// All stamps of type `S`, oldest first.
    pub fn all<S: Stamp>(&self) -> impl Iterator<Item = &S> + '_ {
        self.stamps
            .iter()
            .filter_map(|stamp| stamp.as_ref().as_any().downcast_ref::<S>())
    }

    /// The most recent stamp of type `S`.
    pub fn last<S: Stamp>(&self) -> Option<&S> {
        self.stamps
            .iter()
            .rev()
            .find_map(|stamp| stamp.as_ref().as_any().downcast_ref::<S>())
    }

    /// Handler stamps, in invocation order.
    pub fn handled(&self) -> impl Iterator<Item = &HandledStamp> + '_ {
        self.all::<HandledStamp>()
    }

    /// Handler results that are `R`, in invocation order.
    pub fn results<R: Any>(&self) -> Vec<&R> {
        self.handled().filter_map(HandledStamp::result::<R>).collect()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("message", &self.message)
            .field("stamps", &self.stamps)
            .finish()
    }
}
