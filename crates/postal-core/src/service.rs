//! `tower::Service` adapter for [`MessageBus`].
//!
//! A bus is always ready and completes synchronously, so the returned future
//! is already resolved. Wrap the bus in tower layers to add caller-side
//! concerns:
//!
//! ```rust,ignore
//! let svc = ServiceBuilder::new()
//!     .layer(TimeoutLayer::new(Duration::from_secs(1)))
//!     .service(bus.clone());
//! let envelope = svc.oneshot(Envelope::new(CreateOrder { id: 1 })).await?;
//! ```

use std::task::{Context, Poll};

use futures::future::{Ready, ready};
use tower::Service;

use crate::bus::MessageBus;
use crate::envelope::Envelope;
use crate::error::DispatchError;

impl Service<Envelope> for MessageBus {
    type Response = Envelope;
    type Error = DispatchError;
    type Future = Ready<Result<Envelope, DispatchError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, envelope: Envelope) -> Self::Future {
        ready(self.dispatch_envelope(envelope))
    }
}
