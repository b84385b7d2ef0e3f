//! Multi-bus composition.
//!
//! A [`Messenger`] owns every bus declared in the configuration. Handlers come
//! from a [`HandlerCatalog`]; middleware named in the configuration is created
//! by factories registered on the builder, once per bus.
//!
//! ```rust,ignore
//! let config = load_config()?;
//! let messenger = Messenger::builder(config)
//!     .middleware("audit", |bus| Arc::new(AuditMiddleware::new(bus)) as BoxedMiddleware)
//!     .handler::<CreateOrder, _>(HandlerDefinition::new("orders.create"), CreateOrderHandler)
//!     .build()?;
//!
//! messenger.bus("command.bus")?.dispatch(CreateOrder { id: 1 })?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use postal_core::{
    BoxedMiddleware, BusBuilder, HandledLog, HandledRecord, Handler, HandlerCatalog,
    HandlerDefinition, Message, MessageBus,
};
use tracing::{debug, info, warn};

use crate::config::{BusConfig, PostalConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};

/// Creates a middleware instance for the bus whose name it receives.
pub type MiddlewareFactory = Arc<dyn Fn(&str) -> BoxedMiddleware + Send + Sync>;

// =============================================================================
// Messenger
// =============================================================================

/// The set of buses built from one configuration.
#[derive(Clone)]
pub struct Messenger {
    buses: BTreeMap<String, MessageBus>,
    default_bus: Option<String>,
}

impl Messenger {
    /// Starts composing buses from `config`.
    pub fn builder(config: PostalConfig) -> MessengerBuilder {
        MessengerBuilder::new(config)
    }

    /// Returns the bus named `name`.
    pub fn bus(&self, name: &str) -> RuntimeResult<&MessageBus> {
        self.buses
            .get(name)
            .ok_or_else(|| RuntimeError::BusNotFound(name.to_string()))
    }

    /// Returns the configured default bus, or the first bus in name order.
    pub fn default_bus(&self) -> RuntimeResult<&MessageBus> {
        match &self.default_bus {
            Some(name) => self.bus(name),
            None => self
                .buses
                .values()
                .next()
                .ok_or_else(|| RuntimeError::BusNotFound("<default>".to_string())),
        }
    }

    /// All buses, in name order.
    pub fn buses(&self) -> impl Iterator<Item = &MessageBus> {
        self.buses.values()
    }

    /// All bus names, in order.
    pub fn bus_names(&self) -> Vec<&str> {
        self.buses.keys().map(String::as_str).collect()
    }

    /// Handled-message logs of every bus that records one.
    pub fn handled_logs(&self) -> Vec<HandledLog> {
        self.buses
            .values()
            .filter_map(|bus| bus.handled_log().cloned())
            .collect()
    }

    /// Clears every handled-message log.
    pub fn clear_handled_logs(&self) {
        for log in self.handled_logs() {
            log.clear();
        }
    }

    /// Every handled-message log as one JSON object keyed by bus name.
    pub fn handled_logs_json(&self) -> serde_json::Result<String> {
        let logs: BTreeMap<String, Vec<HandledRecord>> = self
            .handled_logs()
            .into_iter()
            .map(|log| (log.bus().to_string(), log.records()))
            .collect();
        serde_json::to_string_pretty(&logs)
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("buses", &self.bus_names())
            .field("default_bus", &self.default_bus)
            .finish()
    }
}

// =============================================================================
// MessengerBuilder
// =============================================================================

/// Builds a [`Messenger`] from configuration, handlers and middleware factories.
pub struct MessengerBuilder {
    config: PostalConfig,
    catalog: HandlerCatalog,
    factories: HashMap<String, MiddlewareFactory>,
}

impl MessengerBuilder {
    pub fn new(config: PostalConfig) -> Self {
        Self {
            config,
            catalog: HandlerCatalog::new(),
            factories: HashMap::new(),
        }
    }

    /// Declares a bus in addition to those in the configuration.
    pub fn bus(mut self, name: impl Into<String>, bus: BusConfig) -> RuntimeResult<Self> {
        let name = name.into();
        if self.config.buses.contains_key(&name) {
            return Err(RuntimeError::DuplicateBus(name));
        }
        self.config.buses.insert(name, bus);
        Ok(self)
    }

    /// Replaces the handler catalog.
    pub fn catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Adds a handler for `M`. See [`HandlerCatalog::add`].
    pub fn handler<M, H>(mut self, definition: HandlerDefinition, handler: H) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        self.catalog.add::<M, H>(definition, handler);
        self
    }

    /// Registers the factory for middleware named `name`.
    pub fn middleware<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> BoxedMiddleware + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Validates the configuration and builds every bus.
    pub fn build(self) -> RuntimeResult<Messenger> {
        validate_config(&self.config)?;

        for definition in self.catalog.definitions() {
            if let Some(bus) = definition.bus_name()
                && !self.config.buses.contains_key(bus)
            {
                warn!(
                    handler = definition.id(),
                    bus,
                    "Handler targets a bus that is not configured"
                );
            }
        }

        let mut buses = BTreeMap::new();
        for (name, bus_config) in &self.config.buses {
            let bus = self.build_bus(name, bus_config)?;
            info!(
                bus = %name,
                message_types = bus.registry().len(),
                panel = bus_config.panel,
                "Message bus ready"
            );
            buses.insert(name.clone(), bus);
        }

        Ok(Messenger {
            buses,
            default_bus: self.config.default_bus,
        })
    }

    fn build_bus(&self, name: &str, config: &BusConfig) -> RuntimeResult<MessageBus> {
        let mut builder = BusBuilder::new(name)
            .allow_no_handlers(config.allow_no_handlers)
            .single_handler_per_message(config.single_handler_per_message)
            .received_stamp(config.received_stamp);

        if config.panel {
            builder = builder.handled_log(HandledLog::new(name));
        }

        for middleware in &config.middleware {
            let factory =
                self.factories
                    .get(middleware)
                    .ok_or_else(|| RuntimeError::UnknownMiddleware {
                        bus: name.to_string(),
                        name: middleware.clone(),
                    })?;
            debug!(bus = %name, middleware = %middleware, "Creating middleware");
            builder = builder.boxed_middleware(factory(name));
        }

        let bus = builder
            .definitions(self.catalog.definitions(), &self.catalog)?
            .build()?;
        Ok(bus)
    }
}

impl fmt::Debug for MessengerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessengerBuilder")
            .field("config", &self.config)
            .field("catalog", &self.catalog)
            .field("middleware", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postal_core::{BoxError, ConfigurationError, HandledStamp, middleware_fn};

    #[derive(Debug)]
    struct CreateOrder {
        id: u32,
    }

    #[derive(Debug)]
    struct OrderCreated {
        id: u32,
    }

    struct CreateOrderHandler;

    impl Handler<CreateOrder> for CreateOrderHandler {
        type Output = OrderCreated;

        fn handle(&self, message: &CreateOrder) -> Result<OrderCreated, BoxError> {
            Ok(OrderCreated { id: message.id })
        }
    }

    fn config() -> PostalConfig {
        let mut config = PostalConfig::default();
        config.buses.insert(
            "command.bus".into(),
            BusConfig {
                single_handler_per_message: true,
                middleware: vec!["audit".into()],
                ..Default::default()
            },
        );
        config.buses.insert(
            "event.bus".into(),
            BusConfig {
                allow_no_handlers: true,
                panel: false,
                ..Default::default()
            },
        );
        config
    }

    fn audit(_bus: &str) -> BoxedMiddleware {
        Arc::new(middleware_fn("audit", |envelope, next| next.run(envelope)))
    }

    #[test]
    fn test_builds_configured_buses() {
        let messenger = Messenger::builder(config())
            .middleware("audit", audit)
            .handler::<CreateOrder, _>(
                HandlerDefinition::new("orders.create").bus("command.bus"),
                CreateOrderHandler,
            )
            .build()
            .unwrap();

        assert_eq!(messenger.bus_names(), ["command.bus", "event.bus"]);

        let command = messenger.bus("command.bus").unwrap();
        assert_eq!(
            command.middleware_names(),
            ["handled_log", "audit", "handle_message"]
        );
        let envelope = command.dispatch(CreateOrder { id: 1 }).unwrap();
        let stamp = envelope.last::<HandledStamp>().unwrap();
        assert_eq!(stamp.result::<OrderCreated>().map(|o| o.id), Some(1));

        let event = messenger.bus("event.bus").unwrap();
        assert_eq!(event.middleware_names(), ["handle_message"]);
        assert_eq!(event.dispatch(CreateOrder { id: 2 }).unwrap().handled().count(), 0);
    }

    #[test]
    fn test_one_log_per_panel_bus() {
        let messenger = Messenger::builder(config())
            .middleware("audit", audit)
            .handler::<CreateOrder, _>(HandlerDefinition::new("orders.create"), CreateOrderHandler)
            .build()
            .unwrap();

        messenger
            .bus("command.bus")
            .unwrap()
            .dispatch(CreateOrder { id: 1 })
            .unwrap();

        let logs = messenger.handled_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].bus(), "command.bus");
        assert_eq!(logs[0].len(), 1);

        let json: serde_json::Value =
            serde_json::from_str(&messenger.handled_logs_json().unwrap()).unwrap();
        assert_eq!(json["command.bus"][0]["message"], "CreateOrder");

        messenger.clear_handled_logs();
        assert!(logs[0].is_empty());
    }

    #[test]
    fn test_unknown_middleware_is_rejected() {
        let err = Messenger::builder(config()).build().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::UnknownMiddleware { ref bus, ref name } if bus == "command.bus" && name == "audit"
        ));
    }

    #[test]
    fn test_duplicate_bus_is_rejected() {
        let err = Messenger::builder(config())
            .bus("event.bus", BusConfig::default())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateBus(ref name) if name == "event.bus"));
    }

    #[test]
    fn test_bus_policy_errors_surface() {
        let err = Messenger::builder(config())
            .middleware("audit", audit)
            .handler::<CreateOrder, _>(HandlerDefinition::new("h1"), CreateOrderHandler)
            .handler::<CreateOrder, _>(HandlerDefinition::new("h2"), CreateOrderHandler)
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::Configuration(ConfigurationError::MultipleHandlersFound { .. })
        ));
    }

    #[test]
    fn test_default_bus_selection() {
        let messenger = Messenger::builder(config())
            .middleware("audit", audit)
            .build()
            .unwrap();
        assert_eq!(messenger.default_bus().unwrap().name(), "command.bus");

        let mut with_default = config();
        with_default.default_bus = Some("event.bus".into());
        let messenger = Messenger::builder(with_default)
            .middleware("audit", audit)
            .build()
            .unwrap();
        assert_eq!(messenger.default_bus().unwrap().name(), "event.bus");

        let empty = Messenger::builder(PostalConfig::default()).build().unwrap();
        assert!(matches!(empty.default_bus(), Err(RuntimeError::BusNotFound(_))));
        assert!(matches!(empty.bus("nope"), Err(RuntimeError::BusNotFound(_))));
    }

    #[test]
    fn test_middleware_factory_receives_bus_name() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);

        let mut config = config();
        config.buses.get_mut("event.bus").unwrap().middleware = vec!["audit".into()];

        Messenger::builder(config)
            .middleware("audit", move |bus| {
                recorder.lock().unwrap().push(bus.to_string());
                audit(bus)
            })
            .build()
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), ["command.bus", "event.bus"]);
    }
}
