//! Order Processing Example
//!
//! Two buses built from `postal.toml`:
//!
//! - `command.bus`: one handler per command, audit and validation middleware
//! - `event.bus`: any number of listeners, events without listeners are fine
//!
//! ```text
//! PlaceOrder ──▶ command.bus ──▶ place_order ──▶ OrderPlaced
//!                                                    │
//!                      event.bus ◀───────────────────┘
//!                      ├── send_confirmation
//!                      └── update_stock
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package orders-demo -- --config demos/orders/postal.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use clap::Parser;
use postal::core::{BoxedMiddleware, DispatchError};
use postal::prelude::*;
use postal::runtime::logging;
use tracing::{info, warn};

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
struct PlaceOrder {
    customer: String,
    sku: String,
    quantity: u32,
}

#[derive(Debug)]
struct OrderPlaced {
    order_id: u32,
    customer: String,
    sku: String,
    quantity: u32,
}

#[derive(Debug)]
struct OrderCancelled {
    order_id: u32,
}

// ============================================================================
// Handlers
// ============================================================================

/// Assigns order ids.
#[derive(Default)]
struct PlaceOrderHandler {
    next_id: AtomicU32,
}

impl Handler<PlaceOrder> for PlaceOrderHandler {
    type Output = OrderPlaced;

    fn handle(&self, message: &PlaceOrder) -> Result<OrderPlaced, BoxError> {
        let order_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(order_id, customer = %message.customer, "Order placed");
        Ok(OrderPlaced {
            order_id,
            customer: message.customer.clone(),
            sku: message.sku.clone(),
            quantity: message.quantity,
        })
    }
}

fn send_confirmation(event: &OrderPlaced) -> Result<String, BoxError> {
    Ok(format!(
        "confirmation sent to {} for order #{}",
        event.customer, event.order_id
    ))
}

fn update_stock(event: &OrderPlaced) -> Result<i64, BoxError> {
    let remaining = 100 - i64::from(event.quantity);
    if remaining < 0 {
        return Err(format!("not enough stock for {}", event.sku).into());
    }
    Ok(remaining)
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs every envelope passing through its bus.
struct AuditMiddleware {
    bus: String,
}

impl Middleware for AuditMiddleware {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> DispatchResult<Envelope> {
        let message = envelope.message_type().short_name().to_string();
        let result = next.run(envelope);
        match &result {
            Ok(envelope) => info!(
                bus = %self.bus,
                %message,
                handled = envelope.handled().count(),
                "Audit"
            ),
            Err(err) => warn!(bus = %self.bus, %message, error = %err, "Audit"),
        }
        result
    }

    fn name(&self) -> &str {
        "audit"
    }
}

fn validation(_bus: &str) -> BoxedMiddleware {
    Arc::new(middleware_fn("validation", |envelope: Envelope, next| {
        if let Some(order) = envelope.message_as::<PlaceOrder>()
            && order.quantity == 0
        {
            return Err(DispatchError::rejected("validation", "quantity must be positive"));
        }
        next.run(envelope)
    }))
}

// ============================================================================
// Main
// ============================================================================

#[derive(Debug, Parser)]
#[command(about = "Places a few orders through the Postal buses")]
struct Args {
    /// Configuration file; searched in the current directory when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// Print the handled-message logs as JSON.
    #[arg(long)]
    panel: bool,
}

fn load(args: &Args) -> Result<PostalConfig> {
    let mut loader = ConfigLoader::new();
    loader = match &args.config {
        Some(path) => loader.file(path),
        None => loader.search_current_dir(),
    };
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }
    Ok(loader.load_validated()?)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load(&args)?;
    logging::init_from_config(&config.logging);

    let messenger = Messenger::builder(config)
        .middleware("audit", |bus| {
            Arc::new(AuditMiddleware {
                bus: bus.to_string(),
            }) as BoxedMiddleware
        })
        .middleware("validation", validation)
        .handler::<PlaceOrder, _>(
            HandlerDefinition::new("orders.place").bus("command.bus"),
            PlaceOrderHandler::default(),
        )
        .handler::<OrderPlaced, _>(
            HandlerDefinition::new("orders.confirmation").bus("event.bus"),
            send_confirmation,
        )
        .handler::<OrderPlaced, _>(
            HandlerDefinition::new("orders.stock")
                .bus("event.bus")
                .alias("stock"),
            update_stock,
        )
        .build()?;

    let commands = messenger.default_bus()?;
    let events = messenger.bus("event.bus")?;

    let orders = [
        PlaceOrder {
            customer: "ada".into(),
            sku: "book-42".into(),
            quantity: 2,
        },
        PlaceOrder {
            customer: "grace".into(),
            sku: "lamp-7".into(),
            quantity: 0,
        },
        PlaceOrder {
            customer: "linus".into(),
            sku: "desk-1".into(),
            quantity: 250,
        },
    ];

    for order in orders {
        let envelope = match commands.dispatch(order) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "Order refused");
                continue;
            }
        };

        let Some(placed) = envelope
            .last::<HandledStamp>()
            .and_then(|stamp| stamp.result::<OrderPlaced>())
        else {
            continue;
        };

        let event = OrderPlaced {
            order_id: placed.order_id,
            customer: placed.customer.clone(),
            sku: placed.sku.clone(),
            quantity: placed.quantity,
        };
        match events.dispatch(event) {
            Ok(envelope) => {
                for stamp in envelope.handled() {
                    info!(
                        handler = stamp.handler_name(),
                        result = stamp.snapshot(),
                        "Listener done"
                    );
                }
            }
            Err(err) => warn!(error = %err, "Event listener failed"),
        }
    }

    // No listener; allowed on the event bus.
    let cancelled = events.dispatch(OrderCancelled { order_id: 1 })?;
    if let Some(event) = cancelled.message_as::<OrderCancelled>() {
        info!(
            order_id = event.order_id,
            handled = cancelled.handled().count(),
            "Cancellation published"
        );
    }

    if args.panel {
        println!("{}", messenger.handled_logs_json()?);
    }

    Ok(())
}
