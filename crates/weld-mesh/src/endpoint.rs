//! Endpoint and factory traits.
//!
//! These two traits are the narrow seam between topology bootstrap and
//! any concrete mesh implementation. Bootstrap code creates one
//! endpoint per rank through an [`EndpointFactory`], drives each
//! endpoint's [`Endpoint::join`] from its own task, and hands the
//! joined endpoints to the caller. Everything else an endpoint can do
//! (send, receive, tear down) is implementation-specific surface.

use async_trait::async_trait;

use crate::{error::LinkError, world::WorldDescriptor};

/// Throttle window applied to new endpoints.
///
/// A window of 0 means outbound flow control is disabled and sends
/// never block on the window.
pub const DEFAULT_THROTTLE_WINDOW: usize = 64;

/// One party's handle into a mesh.
///
/// # Invariants
///
/// - `join` is called at most once per endpoint; it blocks until every
///   rank of the world has joined (or fails).
/// - Until `join` returns, the endpoint is exclusively owned by the
///   task driving it; afterwards ownership passes back to the caller.
#[async_trait]
pub trait Endpoint: Send + 'static {
    /// The party id this endpoint was created for.
    fn id(&self) -> &str;

    /// This endpoint's rank within its world.
    fn rank(&self) -> usize;

    /// Number of parties in the world.
    fn world_size(&self) -> usize;

    /// Join the mesh, blocking until the whole world is connected.
    ///
    /// May block on network I/O or on peers that have not joined yet.
    /// Failure leaves the endpoint unusable.
    async fn join(&mut self) -> Result<(), LinkError>;

    /// Set the outbound throttle window. 0 disables throttling so
    /// subsequent sends never block on flow control.
    fn set_throttle_window(&mut self, window: usize);
}

/// Creates one endpoint per rank from a shared world descriptor.
///
/// `create` must be safe to call independently per rank: the only
/// state shared between calls is read-only descriptor access (plus
/// whatever internal wiring the implementation needs, which must not
/// require calls in rank order).
pub trait EndpointFactory {
    /// Concrete endpoint type produced by this factory.
    type Endpoint: Endpoint;

    /// Create the endpoint for `rank` of the described world.
    fn create(&self, desc: &WorldDescriptor, rank: usize) -> Result<Self::Endpoint, LinkError>;
}
