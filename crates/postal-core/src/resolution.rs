//! Terminal middleware: handler resolution and invocation.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::envelope::Envelope;
use crate::error::{DispatchError, DispatchResult};
use crate::middleware::{Middleware, Next};
use crate::registry::HandlerRegistry;

/// Looks up the handlers for the envelope's message and runs them in
/// registration order, appending one
/// [`HandledStamp`](crate::envelope::HandledStamp) per handler.
///
/// A handler whose id is already stamped on the incoming envelope is not run
/// again. The first failing handler aborts the loop.
#[derive(Debug, Clone)]
pub struct HandleMessageMiddleware {
    registry: Arc<HandlerRegistry>,
    allow_no_handlers: bool,
}

impl HandleMessageMiddleware {
    pub fn new(registry: Arc<HandlerRegistry>, allow_no_handlers: bool) -> Self {
        Self {
            registry,
            allow_no_handlers,
        }
    }

    /// The registry backing this middleware.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn allows_no_handlers(&self) -> bool {
        self.allow_no_handlers
    }
}

impl Middleware for HandleMessageMiddleware {
    fn handle(&self, mut envelope: Envelope, next: Next<'_>) -> DispatchResult<Envelope> {
        let message_type = envelope.message_type();
        let entries = self.registry.resolve(message_type);

        if entries.is_empty() {
            if !self.allow_no_handlers {
                return Err(DispatchError::NoHandlerForMessage {
                    bus: self.registry.bus().to_string(),
                    message: message_type.name().to_string(),
                });
            }
            debug!(
                bus = self.registry.bus(),
                message = %message_type,
                "No handler for message, skipping"
            );
            return next.run(envelope);
        }

        let already_handled: HashSet<String> = envelope
            .handled()
            .map(|stamp| stamp.handler_id().to_string())
            .collect();

        for entry in entries {
            if already_handled.contains(entry.id()) {
                trace!(handler = entry.id(), "Handler already ran for this envelope");
                continue;
            }

            debug!(
                bus = entry.bus(),
                message = %message_type,
                handler = entry.display_name(),
                "Invoking handler"
            );

            let output = match entry.invoke(envelope.message()) {
                Some(Ok(output)) => output,
                Some(Err(source)) => {
                    return Err(DispatchError::Handler {
                        bus: entry.bus().to_string(),
                        message: message_type.name().to_string(),
                        handler: entry.display_name().to_string(),
                        source,
                    });
                }
                // Entries are keyed by message type.
                None => continue,
            };

            envelope = envelope.with(output.into_stamp(entry.id(), entry.display_name()));
        }

        next.run(envelope)
    }

    fn name(&self) -> &str {
        "handle_message"
    }
}
