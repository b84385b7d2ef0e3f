//! Handler system.
//!
//! A handler declares the message it accepts through its type parameter: a type
//! implementing [`Handler<CreateOrder>`] handles `CreateOrder`. One type may
//! implement `Handler<M>` for several messages and be registered once per
//! message; share state between those registrations through an inner `Arc`.
//! Plain closures taking `&M` work too.
//!
//! ```rust,ignore
//! struct CreateOrderHandler;
//!
//! impl Handler<CreateOrder> for CreateOrderHandler {
//!     type Output = OrderCreated;
//!
//!     fn handle(&self, message: &CreateOrder) -> Result<OrderCreated, BoxError> {
//!         Ok(OrderCreated { id: message.id })
//!     }
//! }
//!
//! // Closure handler
//! let audit = |message: &CreateOrder| -> Result<(), BoxError> { Ok(()) };
//! ```
//!
//! Handlers are type-erased into an [`ErasedHandler`] before they are stored
//! in a registry.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::envelope::HandledStamp;
use crate::error::BoxError;
use crate::message::{Message, MessageType};

// ============================================================================
// Handler Trait
// ============================================================================

/// Handles messages of type `M`.
pub trait Handler<M: Message>: Send + Sync + 'static {
    /// Value returned on success; recorded in a [`HandledStamp`].
    type Output: fmt::Debug + Send + Sync + 'static;

    /// Handles one message.
    fn handle(&self, message: &M) -> Result<Self::Output, BoxError>;
}

impl<M, F, R, E> Handler<M> for F
where
    M: Message,
    F: Fn(&M) -> Result<R, E> + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
    E: Into<BoxError>,
{
    type Output = R;

    fn handle(&self, message: &M) -> Result<R, BoxError> {
        (self)(message).map_err(Into::into)
    }
}

// ============================================================================
// ErasedHandler
// ============================================================================

/// Outcome of a successful erased invocation, ready to become a stamp.
pub struct HandlerOutput {
    pub(crate) value: Arc<dyn Any + Send + Sync>,
    pub(crate) snapshot: String,
}

impl HandlerOutput {
    fn new<R: fmt::Debug + Send + Sync + 'static>(value: R) -> Self {
        Self {
            snapshot: format!("{value:#?}"),
            value: Arc::new(value),
        }
    }

    /// Turns the output into a stamp for the given handler.
    pub fn into_stamp(self, handler_id: &str, handler_name: &str) -> HandledStamp {
        HandledStamp::from_parts(handler_id, handler_name, self.value, self.snapshot)
    }
}

type InvokeFn = dyn Fn(&dyn Message) -> Option<Result<HandlerOutput, BoxError>> + Send + Sync;

/// A type-erased handler for exactly one message type.
///
/// Invoking it with a message of another type returns `None`.
#[derive(Clone)]
pub struct ErasedHandler {
    message_type: MessageType,
    invoke: Arc<InvokeFn>,
}

impl ErasedHandler {
    /// Erases a handler for `M`.
    pub fn new<M, H>(handler: H) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        Self {
            message_type: MessageType::of::<M>(),
            invoke: Arc::new(move |message: &dyn Message| {
                let message = message.as_any().downcast_ref::<M>()?;
                Some(handler.handle(message).map(HandlerOutput::new))
            }),
        }
    }

    /// The message type this handler accepts.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Invokes the handler. Returns `None` if `message` is not of the accepted type.
    pub fn invoke(&self, message: &dyn Message) -> Option<Result<HandlerOutput, BoxError>> {
        (self.invoke)(message)
    }
}

impl fmt::Debug for ErasedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedHandler")
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

/// Erases a handler for `M`.
pub fn into_handler<M, H>(handler: H) -> ErasedHandler
where
    M: Message,
    H: Handler<M>,
{
    ErasedHandler::new::<M, H>(handler)
}
