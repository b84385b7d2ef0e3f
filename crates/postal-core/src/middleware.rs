//! Middleware pipeline.
//!
//! Each [`Middleware`] receives the envelope and a [`Next`] handle to the rest
//! of the chain. It can act before delegating, after the delegate returns, or
//! both, and it can stop the chain by returning without calling
//! [`Next::run`]:
//!
//! ```text
//! dispatch ──▶ A ──▶ B ──▶ HandleMessageMiddleware
//!          ◀──   ◀──   ◀──
//! ```
//!
//! ```rust,ignore
//! let audit = middleware_fn("audit", |envelope, next| {
//!     tracing::info!(message = %envelope.message_type(), "before");
//!     let envelope = next.run(envelope)?;
//!     tracing::info!(handled = envelope.handled().count(), "after");
//!     Ok(envelope)
//! });
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::envelope::Envelope;
use crate::error::DispatchResult;

/// A shared, type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A unit of the dispatch pipeline.
pub trait Middleware: Send + Sync + 'static {
    /// Handles the envelope, usually by delegating to `next`.
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> DispatchResult<Envelope>;

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        let full = type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// The remainder of a pipeline, handed to each middleware.
pub struct Next<'a> {
    remaining: &'a [BoxedMiddleware],
}

impl<'a> Next<'a> {
    /// Runs the rest of the chain. Past the last middleware the envelope is
    /// returned as-is.
    pub fn run(self, envelope: Envelope) -> DispatchResult<Envelope> {
        match self.remaining.split_first() {
            Some((current, rest)) => current.handle(envelope, Next { remaining: rest }),
            None => Ok(envelope),
        }
    }

    /// Number of middleware still to run.
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    /// Returns `true` at the end of the chain.
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// An immutable, ordered chain of middleware.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    chain: Arc<[BoxedMiddleware]>,
}

impl MiddlewarePipeline {
    /// Freezes `chain` in the given order.
    pub fn new(chain: Vec<BoxedMiddleware>) -> Self {
        Self {
            chain: chain.into(),
        }
    }

    /// Runs the envelope through the whole chain.
    pub fn handle(&self, envelope: Envelope) -> DispatchResult<Envelope> {
        Next {
            remaining: &self.chain,
        }
        .run(envelope)
    }

    /// Names of the middleware, outermost first.
    pub fn names(&self) -> Vec<&str> {
        self.chain.iter().map(|m| m.name()).collect()
    }

    /// Number of middleware in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns `true` if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("chain", &self.names())
            .finish()
    }
}

// ============================================================================
// Closure middleware
// ============================================================================

/// Middleware backed by a closure. Built with [`middleware_fn`].
pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(Envelope, Next<'_>) -> DispatchResult<Envelope> + Send + Sync + 'static,
{
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> DispatchResult<Envelope> {
        (self.f)(envelope, next)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wraps a closure as a named middleware.
pub fn middleware_fn<F>(name: impl Into<String>, f: F) -> FnMiddleware<F>
where
    F: Fn(Envelope, Next<'_>) -> DispatchResult<Envelope> + Send + Sync + 'static,
{
    FnMiddleware {
        name: name.into(),
        f,
    }
}
