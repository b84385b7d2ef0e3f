//! Handled-message log.
//!
//! [`HandledLogMiddleware`] times every dispatch that passes through it and
//! appends a [`HandledRecord`] to a [`HandledLog`] once the inner pipeline
//! returns successfully. The log is a cheap, cloneable handle: the bus keeps one
//! copy inside the middleware and inspection tools keep another.
//!
//! ```rust,ignore
//! let log = HandledLog::new("command.bus");
//! let bus = BusBuilder::new("command.bus")
//!     .handled_log(log.clone())
//!     .handler::<CreateOrder, _>("orders.create", CreateOrderHandler)
//!     .build()?;
//!
//! bus.dispatch(CreateOrder { id: 1 })?;
//! println!("{}", log.to_json()?);
//! ```

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::envelope::Envelope;
use crate::error::DispatchResult;
use crate::middleware::{Middleware, Next};

/// One successfully handled message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandledRecord {
    /// Bus that handled the message.
    pub bus: String,
    /// Simple type name of the message.
    pub message: String,
    /// Wall time spent in the pipeline, in milliseconds, rounded to 3 decimals.
    pub elapsed_ms: f64,
    /// Pretty `Debug` rendering of the message.
    pub message_snapshot: String,
    /// Pretty `Debug` rendering of each handler result, in invocation order.
    pub results: Vec<String>,
}

/// Shared, append-only log of [`HandledRecord`]s for one bus.
#[derive(Debug, Clone)]
pub struct HandledLog {
    bus: Arc<str>,
    records: Arc<Mutex<Vec<HandledRecord>>>,
}

impl HandledLog {
    /// Creates an empty log for `bus`.
    pub fn new(bus: impl Into<Arc<str>>) -> Self {
        Self {
            bus: bus.into(),
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Name of the bus this log belongs to.
    pub fn bus(&self) -> &str {
        &self.bus
    }

    /// Appends a record.
    pub fn push(&self, record: HandledRecord) {
        self.records.lock().push(record);
    }

    /// Copy of all records, oldest first.
    pub fn records(&self) -> Vec<HandledRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Serializes the records as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.records.lock())
    }
}

/// Records each successful dispatch into a [`HandledLog`].
///
/// Failed dispatches are not recorded; their error passes through untouched.
#[derive(Debug, Clone)]
pub struct HandledLogMiddleware {
    log: HandledLog,
}

impl HandledLogMiddleware {
    pub fn new(log: HandledLog) -> Self {
        Self { log }
    }

    /// The log this middleware appends to.
    pub fn log(&self) -> &HandledLog {
        &self.log
    }
}

impl Middleware for HandledLogMiddleware {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> DispatchResult<Envelope> {
        let started = Instant::now();
        let envelope = next.run(envelope)?;
        let elapsed_ms = round_millis(started.elapsed().as_secs_f64() * 1000.0);

        let record = HandledRecord {
            bus: self.log.bus().to_string(),
            message: envelope.message_type().short_name().to_string(),
            elapsed_ms,
            message_snapshot: format!("{:#?}", envelope.message()),
            results: envelope
                .handled()
                .map(|stamp| stamp.snapshot().to_string())
                .collect(),
        };

        trace!(
            bus = %record.bus,
            message = %record.message,
            elapsed_ms,
            "Recorded handled message"
        );
        self.log.push(record);

        Ok(envelope)
    }

    fn name(&self) -> &str {
        "handled_log"
    }
}

fn round_millis(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::HandledStamp;
    use crate::error::DispatchError;
    use crate::middleware::{MiddlewarePipeline, middleware_fn};

    #[derive(Debug)]
    #[allow(dead_code)]
    struct CreateOrder {
        id: u32,
    }

    fn pipeline(log: &HandledLog, fail: bool) -> MiddlewarePipeline {
        let terminal = middleware_fn("terminal", move |envelope: Envelope, _| {
            if fail {
                return Err(DispatchError::rejected("terminal", "nope"));
            }
            Ok(envelope.with(HandledStamp::new("h1", "h1", "ok")))
        });
        MiddlewarePipeline::new(vec![
            Arc::new(HandledLogMiddleware::new(log.clone())),
            Arc::new(terminal),
        ])
    }

    #[test]
    fn test_records_successful_dispatch() {
        let log = HandledLog::new("command.bus");
        pipeline(&log, false)
            .handle(Envelope::new(CreateOrder { id: 1 }))
            .unwrap();

        let records = log.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.bus, "command.bus");
        assert_eq!(record.message, "CreateOrder");
        assert!(record.elapsed_ms >= 0.0);
        assert!(record.message_snapshot.contains("id: 1"));
        assert_eq!(record.results, ["\"ok\""]);
    }

    #[test]
    fn test_failed_dispatch_is_not_recorded() {
        let log = HandledLog::new("bus");
        let err = pipeline(&log, true)
            .handle(Envelope::new(CreateOrder { id: 1 }))
            .unwrap_err();

        assert!(matches!(err, DispatchError::Rejected { .. }));
        assert!(log.is_empty());
    }

    #[test]
    fn test_clear_and_json() {
        let log = HandledLog::new("bus");
        let pipeline = pipeline(&log, false);
        pipeline.handle(Envelope::new(CreateOrder { id: 1 })).unwrap();
        pipeline.handle(Envelope::new(CreateOrder { id: 2 })).unwrap();
        assert_eq!(log.len(), 2);

        let json: serde_json::Value = serde_json::from_str(&log.to_json().unwrap()).unwrap();
        assert_eq!(json[1]["message"], "CreateOrder");
        assert_eq!(json[0]["bus"], "bus");

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_round_millis() {
        assert_eq!(round_millis(1.23456), 1.235);
        assert_eq!(round_millis(0.0004), 0.0);
    }
}
