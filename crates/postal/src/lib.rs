//! # Postal
//!
//! A synchronous, middleware-driven message bus.
//!
//! ## Architecture
//!
//! Every dispatch wraps the message in an envelope and runs it through the
//! bus's middleware chain. The innermost middleware looks up the handlers
//! registered for the message type and stamps each result onto the envelope.
//!
//! ```text
//!            ┌──────────── MessageBus "command.bus" ────────────┐
//! message ──▶│ handled_log ──▶ middleware... ──▶ handle_message │──▶ envelope
//!            └──────────────────────────────────┬───────────────┘
//!                                               ▼
//!                                      HandlerRegistry (by type)
//! ```
//!
//! - **Messages**: any `Debug + Send + Sync + 'static` type
//! - **Handlers**: types implementing `Handler<M>`, or closures taking `&M`
//! - **Middleware**: wraps the rest of the chain; may alter or reject envelopes
//! - **Messenger**: the set of buses built from configuration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use postal::prelude::*;
//!
//! #[derive(Debug)]
//! struct CreateOrder { id: u32 }
//!
//! fn main() -> anyhow::Result<()> {
//!     let bus = MessageBus::builder("command.bus")
//!         .handler::<CreateOrder, _>("orders.create", |m: &CreateOrder| {
//!             Ok::<_, BoxError>(m.id)
//!         })
//!         .build()?;
//!
//!     let envelope = bus.dispatch(CreateOrder { id: 1 })?;
//!     assert_eq!(envelope.last::<HandledStamp>().and_then(|s| s.result::<u32>()), Some(&1));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use postal_core as core;
pub use postal_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use postal::prelude::*;
/// ```
pub mod prelude {
    // Buses and dispatch
    pub use postal_core::prelude::*;

    // Runtime - configuration and composition
    pub use postal_runtime::{
        BusConfig, ConfigLoader, LoggingBuilder, Messenger, PostalConfig, load_config,
    };
}
