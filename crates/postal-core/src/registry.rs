//! Handler registry.
//!
//! A [`HandlerRegistry`] maps message types to the handlers registered for
//! them on one bus. It is assembled with a [`RegistryBuilder`] and validated
//! once in [`RegistryBuilder::build`]; afterwards it is read-only and can be
//! shared between threads without locking.
//!
//! Hosts that discover handlers elsewhere (configuration, a service container,
//! a plugin system) describe them as plain [`HandlerDefinition`]s and resolve
//! ids to invocables through a [`HandlerLocator`]. [`HandlerCatalog`] is a
//! ready-made implementation of both sides.
//!
//! ```rust,ignore
//! let catalog = HandlerCatalog::new()
//!     .with::<CreateOrder, _>(HandlerDefinition::new("orders.create"), CreateOrderHandler)
//!     .with::<OrderCreated, _>(
//!         HandlerDefinition::new("mailer").alias("Mailer").bus("event.bus"),
//!         SendConfirmation,
//!     );
//!
//! let registry = RegistryBuilder::new("command.bus")
//!     .single_handler_per_message(true)
//!     .register_definitions(catalog.definitions(), &catalog)?
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{BoxError, ConfigurationError, ConfigurationResult};
use crate::handler::{ErasedHandler, Handler, HandlerOutput};
use crate::message::{Message, MessageType};

// =============================================================================
// HandlerEntry
// =============================================================================

/// A handler registered for one message type on one bus.
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    id: Arc<str>,
    alias: Option<Arc<str>>,
    bus: Arc<str>,
    handler: ErasedHandler,
}

impl HandlerEntry {
    /// Creates an entry. The owning bus is assigned on registration.
    pub fn new(id: impl Into<Arc<str>>, handler: ErasedHandler) -> Self {
        Self {
            id: id.into(),
            alias: None,
            bus: Arc::from(""),
            handler,
        }
    }

    /// Sets the display alias.
    pub fn with_alias(mut self, alias: impl Into<Arc<str>>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Handler id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display alias, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The alias, or the id when there is none.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }

    /// Name of the bus owning this entry.
    pub fn bus(&self) -> &str {
        &self.bus
    }

    /// The message type this entry handles.
    pub fn message_type(&self) -> MessageType {
        self.handler.message_type()
    }

    /// Invokes the handler. `None` means the message is not of the entry's type.
    pub fn invoke(&self, message: &dyn Message) -> Option<Result<HandlerOutput, BoxError>> {
        self.handler.invoke(message)
    }
}

// =============================================================================
// Discovery input
// =============================================================================

/// Plain-data description of a handler, as supplied by host discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDefinition {
    id: Arc<str>,
    bus: Option<Arc<str>>,
    alias: Option<Arc<str>>,
    message_types: Vec<MessageType>,
}

impl HandlerDefinition {
    /// Creates a definition with no declared message types.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            bus: None,
            alias: None,
            message_types: Vec::new(),
        }
    }

    /// Restricts the handler to one bus.
    ///
    /// Without a bus the handler joins every bus it is offered to.
    pub fn bus(mut self, bus: impl Into<Arc<str>>) -> Self {
        self.bus = Some(bus.into());
        self
    }

    /// Sets the display alias.
    pub fn alias(mut self, alias: impl Into<Arc<str>>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Declares that the handler accepts `M`.
    pub fn handles<M: Message>(self) -> Self {
        self.handles_type(MessageType::of::<M>())
    }

    /// Declares that the handler accepts `message_type`.
    pub fn handles_type(mut self, message_type: MessageType) -> Self {
        if !self.message_types.contains(&message_type) {
            self.message_types.push(message_type);
        }
        self
    }

    /// Handler id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bus restriction, if any.
    pub fn bus_name(&self) -> Option<&str> {
        self.bus.as_deref()
    }

    /// Display alias, if any.
    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Declared message types, in declaration order.
    pub fn message_types(&self) -> &[MessageType] {
        &self.message_types
    }

    /// Returns `true` if this definition belongs on `bus`.
    pub fn applies_to(&self, bus: &str) -> bool {
        self.bus.as_deref().is_none_or(|own| own == bus)
    }
}

/// Resolves handler ids to invocables.
pub trait HandlerLocator {
    /// Returns the invocable registered as `id` for `message_type`.
    fn locate(&self, id: &str, message_type: MessageType) -> Option<ErasedHandler>;

    /// Every invocable registered as `id` for `message_type`. Locators that
    /// can hold more than one report them all, so the registry can reject
    /// the duplicates.
    fn locate_all(&self, id: &str, message_type: MessageType) -> Vec<ErasedHandler> {
        self.locate(id, message_type).into_iter().collect()
    }
}

// =============================================================================
// HandlerCatalog
// =============================================================================

/// In-memory set of handler definitions together with their invocables.
///
/// Adding a second handler under an existing id extends that definition with
/// another message type; alias and bus given later replace earlier ones.
/// Adding the same id twice for one message type keeps both, and building a
/// bus from the catalog then fails with `DuplicateHandler`.
#[derive(Debug, Default, Clone)]
pub struct HandlerCatalog {
    definitions: Vec<HandlerDefinition>,
    handlers: HashMap<(Arc<str>, MessageType), Vec<ErasedHandler>>,
}

impl HandlerCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler for `M` described by `definition`.
    pub fn add<M, H>(&mut self, definition: HandlerDefinition, handler: H) -> &mut Self
    where
        M: Message,
        H: Handler<M>,
    {
        let message_type = MessageType::of::<M>();
        let id = Arc::clone(&definition.id);

        match self.definitions.iter_mut().find(|d| d.id == id) {
            Some(existing) => {
                if definition.bus.is_some() {
                    existing.bus = definition.bus;
                }
                if definition.alias.is_some() {
                    existing.alias = definition.alias;
                }
                for declared in definition.message_types {
                    if !existing.message_types.contains(&declared) {
                        existing.message_types.push(declared);
                    }
                }
                if !existing.message_types.contains(&message_type) {
                    existing.message_types.push(message_type);
                }
            }
            None => self.definitions.push(definition.handles_type(message_type)),
        }

        self.handlers
            .entry((id, message_type))
            .or_default()
            .push(ErasedHandler::new::<M, H>(handler));
        self
    }

    /// Adds a handler for `M` (builder pattern).
    pub fn with<M, H>(mut self, definition: HandlerDefinition, handler: H) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        self.add::<M, H>(definition, handler);
        self
    }

    /// All definitions, in the order their ids were first added.
    pub fn definitions(&self) -> &[HandlerDefinition] {
        &self.definitions
    }

    /// Number of distinct handler ids.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl HandlerLocator for HandlerCatalog {
    fn locate(&self, id: &str, message_type: MessageType) -> Option<ErasedHandler> {
        self.handlers
            .get(&(Arc::from(id), message_type))
            .and_then(|handlers| handlers.first())
            .cloned()
    }

    fn locate_all(&self, id: &str, message_type: MessageType) -> Vec<ErasedHandler> {
        self.handlers
            .get(&(Arc::from(id), message_type))
            .cloned()
            .unwrap_or_default()
    }
}

// =============================================================================
// RegistryBuilder
// =============================================================================

/// Assembles and validates a [`HandlerRegistry`] for one bus.
#[derive(Debug)]
pub struct RegistryBuilder {
    bus: Arc<str>,
    single_handler_per_message: bool,
    order: Vec<MessageType>,
    entries: HashMap<MessageType, Vec<HandlerEntry>>,
}

impl RegistryBuilder {
    /// Starts a registry for `bus`.
    pub fn new(bus: impl Into<Arc<str>>) -> Self {
        Self {
            bus: bus.into(),
            single_handler_per_message: false,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Requires every message type to have at most one handler.
    pub fn single_handler_per_message(mut self, enabled: bool) -> Self {
        self.single_handler_per_message = enabled;
        self
    }

    /// Registers an entry under its message type.
    pub fn register(&mut self, mut entry: HandlerEntry) -> &mut Self {
        entry.bus = Arc::clone(&self.bus);
        let message_type = entry.message_type();

        trace!(
            bus = %self.bus,
            message = %message_type,
            handler = entry.id(),
            "Registering handler"
        );

        if !self.entries.contains_key(&message_type) {
            self.order.push(message_type);
        }
        self.entries.entry(message_type).or_default().push(entry);
        self
    }

    /// Registers a typed handler under `id`.
    pub fn handler<M, H>(mut self, id: impl Into<Arc<str>>, handler: H) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        self.register(HandlerEntry::new(id, ErasedHandler::new::<M, H>(handler)));
        self
    }

    /// Registers every definition that applies to this bus, resolving
    /// invocables through `locator`.
    pub fn register_definitions<'a, I, L>(
        mut self,
        definitions: I,
        locator: &L,
    ) -> ConfigurationResult<Self>
    where
        I: IntoIterator<Item = &'a HandlerDefinition>,
        L: HandlerLocator + ?Sized,
    {
        for definition in definitions {
            if !definition.applies_to(&self.bus) {
                continue;
            }

            if definition.message_types.is_empty() {
                return Err(ConfigurationError::MissingMessageTypes {
                    handler: definition.id.to_string(),
                });
            }

            for &message_type in &definition.message_types {
                if message_type.is_primitive() {
                    return Err(ConfigurationError::PrimitiveMessageType {
                        handler: definition.id.to_string(),
                        message: message_type.name().to_string(),
                    });
                }

                let handlers = locator.locate_all(&definition.id, message_type);
                if handlers.is_empty()
                    || handlers.iter().any(|h| h.message_type() != message_type)
                {
                    return Err(ConfigurationError::UnresolvableHandler {
                        handler: definition.id.to_string(),
                        message: message_type.name().to_string(),
                    });
                }

                for handler in handlers {
                    let mut entry = HandlerEntry::new(Arc::clone(&definition.id), handler);
                    entry.alias = definition.alias.clone();
                    self.register(entry);
                }
            }
        }

        Ok(self)
    }

    /// Validates the collected entries and freezes them.
    pub fn build(self) -> ConfigurationResult<HandlerRegistry> {
        if self.bus.is_empty() {
            return Err(ConfigurationError::EmptyBusName);
        }

        for message_type in &self.order {
            let entries = &self.entries[message_type];

            if message_type.is_primitive() {
                return Err(ConfigurationError::PrimitiveMessageType {
                    handler: entries[0].id().to_string(),
                    message: message_type.name().to_string(),
                });
            }

            let mut seen = HashSet::new();
            if let Some(dup) = entries.iter().find(|e| !seen.insert(e.id())) {
                return Err(ConfigurationError::DuplicateHandler {
                    bus: self.bus.to_string(),
                    message: message_type.name().to_string(),
                    handler: dup.id().to_string(),
                });
            }

            if self.single_handler_per_message && entries.len() > 1 {
                return Err(ConfigurationError::MultipleHandlersFound {
                    bus: self.bus.to_string(),
                    message: message_type.name().to_string(),
                    handlers: entries.iter().map(|e| e.id().to_string()).collect(),
                });
            }
        }

        debug!(
            bus = %self.bus,
            message_types = self.order.len(),
            single_handler = self.single_handler_per_message,
            "Handler registry built"
        );

        Ok(HandlerRegistry {
            bus: self.bus,
            order: self.order,
            entries: self.entries,
        })
    }
}

// =============================================================================
// HandlerRegistry
// =============================================================================

/// Immutable message type → handlers mapping for one bus.
#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    bus: Arc<str>,
    order: Vec<MessageType>,
    entries: HashMap<MessageType, Vec<HandlerEntry>>,
}

impl HandlerRegistry {
    /// Handlers for `message_type` in registration order; empty if none.
    pub fn resolve(&self, message_type: MessageType) -> &[HandlerEntry] {
        self.entries
            .get(&message_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Name of the owning bus.
    pub fn bus(&self) -> &str {
        &self.bus
    }

    /// Message types with at least one handler, in first-registration order.
    pub fn message_types(&self) -> &[MessageType] {
        &self.order
    }

    /// Number of message types with handlers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CreateOrder {
        id: u32,
    }

    #[derive(Debug)]
    struct CancelOrder;

    #[derive(Debug, PartialEq)]
    struct OrderCreated {
        id: u32,
    }

    struct Orders;

    impl Handler<CreateOrder> for Orders {
        type Output = OrderCreated;

        fn handle(&self, message: &CreateOrder) -> Result<OrderCreated, BoxError> {
            Ok(OrderCreated { id: message.id })
        }
    }

    impl Handler<CancelOrder> for Orders {
        type Output = ();

        fn handle(&self, _: &CancelOrder) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn noop(_: &CreateOrder) -> Result<(), BoxError> {
        Ok(())
    }

    #[test]
    fn test_resolve_keeps_registration_order() {
        let registry = RegistryBuilder::new("command.bus")
            .handler::<CreateOrder, _>("h1", Orders)
            .handler::<CreateOrder, _>("h2", noop)
            .build()
            .unwrap();

        let ids: Vec<_> = registry
            .resolve(MessageType::of::<CreateOrder>())
            .iter()
            .map(HandlerEntry::id)
            .collect();
        assert_eq!(ids, ["h1", "h2"]);
        assert!(registry.resolve(MessageType::of::<CancelOrder>()).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_single_handler_policy_rejects_conflicts() {
        let err = RegistryBuilder::new("command.bus")
            .single_handler_per_message(true)
            .handler::<CreateOrder, _>("h1", Orders)
            .handler::<CreateOrder, _>("h2", noop)
            .build()
            .unwrap_err();

        match err {
            ConfigurationError::MultipleHandlersFound {
                bus,
                message,
                handlers,
            } => {
                assert_eq!(bus, "command.bus");
                assert!(message.ends_with("CreateOrder"));
                assert_eq!(handlers, ["h1", "h2"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_handler_id_is_rejected() {
        let err = RegistryBuilder::new("bus")
            .handler::<CreateOrder, _>("h1", Orders)
            .handler::<CreateOrder, _>("h1", noop)
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigurationError::DuplicateHandler { ref handler, .. } if handler == "h1"
        ));
    }

    #[test]
    fn test_empty_bus_name_is_rejected() {
        let err = RegistryBuilder::new("").build().unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyBusName);
    }

    #[test]
    fn test_entries_are_owned_by_the_bus() {
        let registry = RegistryBuilder::new("command.bus")
            .handler::<CreateOrder, _>("h1", Orders)
            .build()
            .unwrap();

        let entry = &registry.resolve(MessageType::of::<CreateOrder>())[0];
        assert_eq!(entry.bus(), "command.bus");
        assert_eq!(entry.display_name(), "h1");
    }

    #[test]
    fn test_catalog_merges_message_types_per_id() {
        let catalog = HandlerCatalog::new()
            .with::<CreateOrder, _>(HandlerDefinition::new("orders"), Orders)
            .with::<CancelOrder, _>(HandlerDefinition::new("orders").alias("Orders"), Orders);

        assert_eq!(catalog.len(), 1);
        let definition = &catalog.definitions()[0];
        assert_eq!(
            definition.message_types(),
            [MessageType::of::<CreateOrder>(), MessageType::of::<CancelOrder>()]
        );
        assert_eq!(definition.alias_name(), Some("Orders"));
        assert!(catalog.locate("orders", MessageType::of::<CancelOrder>()).is_some());
        assert!(catalog.locate("missing", MessageType::of::<CancelOrder>()).is_none());
    }

    #[test]
    fn test_definitions_respect_bus_scope() {
        let catalog = HandlerCatalog::new()
            .with::<CreateOrder, _>(HandlerDefinition::new("anywhere"), Orders)
            .with::<CreateOrder, _>(HandlerDefinition::new("scoped").bus("event.bus"), noop);

        let command = RegistryBuilder::new("command.bus")
            .register_definitions(catalog.definitions(), &catalog)
            .unwrap()
            .build()
            .unwrap();
        let event = RegistryBuilder::new("event.bus")
            .register_definitions(catalog.definitions(), &catalog)
            .unwrap()
            .build()
            .unwrap();

        let ids = |registry: &HandlerRegistry| -> Vec<String> {
            registry
                .resolve(MessageType::of::<CreateOrder>())
                .iter()
                .map(|e| e.id().to_string())
                .collect()
        };
        assert_eq!(ids(&command), ["anywhere"]);
        assert_eq!(ids(&event), ["anywhere", "scoped"]);
    }

    #[test]
    fn test_definition_alias_becomes_display_name() {
        let catalog = HandlerCatalog::new().with::<CreateOrder, _>(
            HandlerDefinition::new("orders.create").alias("Create order"),
            Orders,
        );

        let registry = RegistryBuilder::new("bus")
            .register_definitions(catalog.definitions(), &catalog)
            .unwrap()
            .build()
            .unwrap();

        let entry = &registry.resolve(MessageType::of::<CreateOrder>())[0];
        assert_eq!(entry.display_name(), "Create order");
        assert_eq!(entry.alias(), Some("Create order"));
    }

    #[test]
    fn test_definition_errors() {
        let catalog = HandlerCatalog::new();

        let missing = [HandlerDefinition::new("empty")];
        let err = RegistryBuilder::new("bus")
            .register_definitions(&missing, &catalog)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingMessageTypes { .. }));

        let primitive = [HandlerDefinition::new("numbers").handles::<u64>()];
        let err = RegistryBuilder::new("bus")
            .register_definitions(&primitive, &catalog)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::PrimitiveMessageType { .. }));

        let unresolvable = [HandlerDefinition::new("ghost").handles::<CreateOrder>()];
        let err = RegistryBuilder::new("bus")
            .register_definitions(&unresolvable, &catalog)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnresolvableHandler { ref handler, .. } if handler == "ghost"
        ));
    }

    #[test]
    fn test_catalog_rejects_same_id_twice_for_one_type() {
        let catalog = HandlerCatalog::new()
            .with::<CreateOrder, _>(HandlerDefinition::new("h1"), |_: &CreateOrder| {
                Ok::<_, BoxError>("first")
            })
            .with::<CreateOrder, _>(HandlerDefinition::new("h1"), |_: &CreateOrder| {
                Ok::<_, BoxError>("second")
            });

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.locate_all("h1", MessageType::of::<CreateOrder>()).len(), 2);

        let err = RegistryBuilder::new("bus")
            .register_definitions(catalog.definitions(), &catalog)
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::DuplicateHandler { ref handler, .. } if handler == "h1"
        ));
    }

    #[test]
    fn test_primitive_message_type_rejected_for_direct_registration() {
        let err = RegistryBuilder::new("bus")
            .handler::<u64, _>("numbers", |n: &u64| Ok::<_, BoxError>(*n))
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigurationError::PrimitiveMessageType { ref handler, .. } if handler == "numbers"
        ));
    }

    struct MismatchedLocator;

    impl HandlerLocator for MismatchedLocator {
        fn locate(&self, _: &str, _: MessageType) -> Option<ErasedHandler> {
            Some(ErasedHandler::new::<CancelOrder, _>(Orders))
        }
    }

    #[test]
    fn test_located_handler_must_match_declared_type() {
        let definitions = [HandlerDefinition::new("orders").handles::<CreateOrder>()];
        let err = RegistryBuilder::new("bus")
            .register_definitions(&definitions, &MismatchedLocator)
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigurationError::UnresolvableHandler { ref handler, .. } if handler == "orders"
        ));
    }
}
