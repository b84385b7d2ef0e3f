//! # Postal Core
//!
//! The in-process message bus at the heart of Postal.
//!
//! This crate provides the building blocks for synchronous, type-routed
//! message dispatch: a per-bus handler registry, a middleware pipeline, and the
//! terminal resolution step that invokes handlers and records their results.
//!
//! ## Building Blocks
//!
//! - **Messages**: any `Debug + Send + Sync + 'static` value ([`Message`], [`MessageType`])
//! - **Envelopes**: a message plus accumulated metadata ([`Envelope`], [`Stamp`], [`HandledStamp`])
//! - **Handlers**: typed handlers and closures ([`Handler`], [`ErasedHandler`])
//! - **Registry**: validated message type to handler mapping ([`RegistryBuilder`], [`HandlerRegistry`])
//! - **Discovery input**: host-supplied metadata ([`HandlerDefinition`], [`HandlerLocator`], [`HandlerCatalog`])
//! - **Middleware**: composable wrappers around the next step ([`Middleware`], [`MiddlewarePipeline`])
//! - **Buses**: named pipelines ([`MessageBus`], [`BusBuilder`])
//! - **Observability**: the handled-message log ([`HandledLog`], [`HandledRecord`])
//!
//! ## Dispatch Flow
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌────────────┐     ┌────────────────┐
//! │ MessageBus   │────▶│ handled_log │────▶│ middleware │────▶│ handle_message │──▶ handlers
//! │ ::dispatch   │◀────│ (optional)  │◀────│    ...     │◀────│   (terminal)   │
//! └──────────────┘     └─────────────┘     └────────────┘     └────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use postal_core::prelude::*;
//!
//! #[derive(Debug)]
//! struct CreateOrder {
//!     id: u32,
//! }
//!
//! #[derive(Debug)]
//! struct OrderCreated {
//!     id: u32,
//! }
//!
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
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = BusBuilder::new("command.bus")
//!         .single_handler_per_message(true)
//!         .handler::<CreateOrder, _>("orders.create", CreateOrderHandler)
//!         .build()?;
//!
//!     let envelope = bus.dispatch(CreateOrder { id: 1 })?;
//!     assert_eq!(envelope.handled().count(), 1);
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod message;
pub mod middleware;
pub mod observe;
pub mod registry;
pub mod resolution;
mod service;

pub use bus::{BusBuilder, MessageBus};
pub use envelope::{Envelope, HandledStamp, ReceivedStamp, Stamp};
pub use error::{
    BoxError, ConfigurationError, ConfigurationResult, DispatchError, DispatchResult,
};
pub use handler::{ErasedHandler, Handler, HandlerOutput, into_handler};
pub use message::{Message, MessageType};
pub use middleware::{
    BoxedMiddleware, FnMiddleware, Middleware, MiddlewarePipeline, Next, middleware_fn,
};
pub use observe::{HandledLog, HandledLogMiddleware, HandledRecord};
pub use registry::{
    HandlerCatalog, HandlerDefinition, HandlerEntry, HandlerLocator, HandlerRegistry,
    RegistryBuilder,
};
pub use resolution::HandleMessageMiddleware;

/// Prelude for common imports.
pub mod prelude {
    pub use super::bus::{BusBuilder, MessageBus};
    pub use super::envelope::{Envelope, HandledStamp, Stamp};
    pub use super::error::{BoxError, DispatchError, DispatchResult};
    pub use super::handler::Handler;
    pub use super::message::Message;
    pub use super::middleware::{Middleware, Next, middleware_fn};
    pub use super::observe::HandledLog;
    pub use super::registry::{HandlerCatalog, HandlerDefinition};
}
