//! Message buses.
//!
//! A [`MessageBus`] is a named, immutable middleware chain ending in
//! [`HandleMessageMiddleware`]. Compose one with [`BusBuilder`]:
//!
//! ```rust,ignore
//! let bus = BusBuilder::new("command.bus")
//!     .single_handler_per_message(true)
//!     .middleware(audit)
//!     .handler::<CreateOrder, _>("orders.create", CreateOrderHandler)
//!     .build()?;
//!
//! let envelope = bus.dispatch(CreateOrder { id: 1 })?;
//! ```
//!
//! The resulting chain is `[handled_log] -> configured middleware... ->
//! handle_message`. Buses are cheap to clone and safe to share across threads.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{Level, debug, span};

use crate::envelope::{Envelope, ReceivedStamp};
use crate::error::{ConfigurationError, ConfigurationResult, DispatchResult};
use crate::handler::Handler;
use crate::message::Message;
use crate::middleware::{BoxedMiddleware, Middleware, MiddlewarePipeline};
use crate::observe::{HandledLog, HandledLogMiddleware};
use crate::registry::{HandlerDefinition, HandlerLocator, HandlerRegistry, RegistryBuilder};
use crate::resolution::HandleMessageMiddleware;

// =============================================================================
// MessageBus
// =============================================================================

/// A named dispatch pipeline.
#[derive(Clone)]
pub struct MessageBus {
    name: Arc<str>,
    pipeline: MiddlewarePipeline,
    registry: Arc<HandlerRegistry>,
    handled_log: Option<HandledLog>,
    received_stamp: bool,
}

impl MessageBus {
    /// Starts building a bus named `name`.
    pub fn builder(name: impl Into<Arc<str>>) -> BusBuilder {
        BusBuilder::new(name)
    }

    /// Dispatches `message` in a fresh envelope and returns the final envelope.
    pub fn dispatch<M: Message>(&self, message: M) -> DispatchResult<Envelope> {
        self.dispatch_envelope(Envelope::new(message))
    }

    /// Dispatches an envelope that may already carry stamps.
    pub fn dispatch_envelope(&self, envelope: Envelope) -> DispatchResult<Envelope> {
        let message_type = envelope.message_type();
        let span = span!(
            Level::DEBUG,
            "dispatch",
            bus = %self.name,
            message = message_type.short_name()
        );
        let _enter = span.enter();

        let envelope = if self.received_stamp {
            envelope.with(ReceivedStamp::now(Arc::clone(&self.name)))
        } else {
            envelope
        };

        let result = self.pipeline.handle(envelope);
        match &result {
            Ok(envelope) => debug!(handled = envelope.handled().count(), "Dispatch completed"),
            Err(e) => debug!(error = %e, "Dispatch failed"),
        }
        result
    }

    /// Dispatches `message` and returns the handler results that are `R`.
    pub fn dispatch_results<M, R>(&self, message: M) -> DispatchResult<Vec<R>>
    where
        M: Message,
        R: Any + Clone,
    {
        let envelope = self.dispatch(message)?;
        Ok(envelope.results::<R>().into_iter().cloned().collect())
    }

    /// The bus name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The frozen handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The handled-message log, if the bus records one.
    pub fn handled_log(&self) -> Option<&HandledLog> {
        self.handled_log.as_ref()
    }

    /// Middleware names, outermost first.
    pub fn middleware_names(&self) -> Vec<&str> {
        self.pipeline.names()
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("name", &self.name)
            .field("pipeline", &self.pipeline)
            .field("message_types", &self.registry.len())
            .finish()
    }
}

// =============================================================================
// BusBuilder
// =============================================================================

/// Composes a [`MessageBus`].
pub struct BusBuilder {
    name: Arc<str>,
    allow_no_handlers: bool,
    received_stamp: bool,
    middleware: Vec<BoxedMiddleware>,
    registry: RegistryBuilder,
    handled_log: Option<HandledLog>,
}

impl BusBuilder {
    /// Starts a bus named `name` with no middleware and no handlers.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        Self {
            registry: RegistryBuilder::new(Arc::clone(&name)),
            name,
            allow_no_handlers: false,
            received_stamp: false,
            middleware: Vec::new(),
            handled_log: None,
        }
    }

    /// Lets messages without handlers pass instead of failing.
    pub fn allow_no_handlers(mut self, allow: bool) -> Self {
        self.allow_no_handlers = allow;
        self
    }

    /// Rejects, at build time, any message type with more than one handler.
    pub fn single_handler_per_message(mut self, enabled: bool) -> Self {
        self.registry = self.registry.single_handler_per_message(enabled);
        self
    }

    /// Stamps every fresh envelope with a [`ReceivedStamp`].
    pub fn received_stamp(mut self, enabled: bool) -> Self {
        self.received_stamp = enabled;
        self
    }

    /// Appends a middleware. Middleware run in the order they are added.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    pub fn boxed_middleware(mut self, middleware: BoxedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers a typed handler for `M` under `id`.
    pub fn handler<M, H>(mut self, id: impl Into<Arc<str>>, handler: H) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        self.registry = self.registry.handler::<M, H>(id, handler);
        self
    }

    /// Registers host-supplied definitions that apply to this bus.
    pub fn definitions<'a, I, L>(mut self, definitions: I, locator: &L) -> ConfigurationResult<Self>
    where
        I: IntoIterator<Item = &'a HandlerDefinition>,
        L: HandlerLocator + ?Sized,
    {
        self.registry = self.registry.register_definitions(definitions, locator)?;
        Ok(self)
    }

    /// Records handled messages into `log`. The logging middleware is
    /// placed outermost. The log must be labelled with this bus's name.
    pub fn handled_log(mut self, log: HandledLog) -> Self {
        self.handled_log = Some(log);
        self
    }

    /// Validates the registry and freezes the chain.
    pub fn build(self) -> ConfigurationResult<MessageBus> {
        if let Some(log) = &self.handled_log
            && log.bus() != self.name.as_ref()
        {
            return Err(ConfigurationError::HandledLogBusMismatch {
                bus: self.name.to_string(),
                log: log.bus().to_string(),
            });
        }

        let registry = Arc::new(self.registry.build()?);

        let mut chain: Vec<BoxedMiddleware> = Vec::with_capacity(self.middleware.len() + 2);
        if let Some(log) = &self.handled_log {
            chain.push(Arc::new(HandledLogMiddleware::new(log.clone())));
        }
        chain.extend(self.middleware);
        chain.push(Arc::new(HandleMessageMiddleware::new(
            Arc::clone(&registry),
            self.allow_no_handlers,
        )));

        let pipeline = MiddlewarePipeline::new(chain);
        debug!(
            bus = %self.name,
            middleware = ?pipeline.names(),
            allow_no_handlers = self.allow_no_handlers,
            "Message bus built"
        );

        Ok(MessageBus {
            name: self.name,
            pipeline,
            registry,
            handled_log: self.handled_log,
            received_stamp: self.received_stamp,
        })
    }
}

impl fmt::Debug for BusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusBuilder")
            .field("name", &self.name)
            .field("allow_no_handlers", &self.allow_no_handlers)
            .field("middleware", &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
