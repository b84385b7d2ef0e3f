//! Postal Runtime - configuration, logging and bus composition.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `PostalConfig`)
//! - Logging setup driven by configuration (`LoggingBuilder`)
//! - Multi-bus composition from configuration (`Messenger`)
//!
//! ```ignore
//! use postal_runtime::{Messenger, load_config, logging};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let messenger = Messenger::builder(config)
//!         .handler::<CreateOrder, _>(HandlerDefinition::new("orders.create"), create_order)
//!         .build()?;
//!
//!     messenger.default_bus()?.dispatch(CreateOrder { id: 7 })?;
//!     Ok(())
//! }
//! ```
//!
//! See [`config::loader`] for configuration sources and their priority.

pub mod config;
pub mod error;
pub mod logging;
pub mod messenger;

// Re-exports
pub use config::{
    BusConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, PostalConfig, Profile,
    load_config, load_config_from_file,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use messenger::{Messenger, MessengerBuilder, MiddlewareFactory};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, span, trace, warn};
}
