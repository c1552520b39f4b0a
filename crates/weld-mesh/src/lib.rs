//! Weld mesh layer.
//!
//! A *world* is an ordered set of N parties that must all connect to
//! each other before any of them does useful work. This crate owns the
//! pieces a bootstrapper composes to stand one up:
//!
//! ```text
//! weld-mesh
//!   ├─ WorldDescriptor   (who is in the world, at which address)
//!   ├─ Endpoint          (one party's handle: join + configuration)
//!   ├─ EndpointFactory   (descriptor + rank → endpoint)
//!   ├─ MemFactory        (in-memory rendezvous + channel delivery)
//!   └─ TcpFactory        (loopback TCP full mesh)
//! ```
//!
//! The two factories serve different test tiers: in-memory worlds cost
//! nothing and cannot collide, TCP worlds exercise real sockets on
//! probed loopback ports. Topology bootstrap (port allocation, join
//! orchestration) lives in `weld-harness`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod endpoint;
mod error;
pub mod mem;
pub mod tcp;
mod world;

pub use endpoint::{DEFAULT_THROTTLE_WINDOW, Endpoint, EndpointFactory};
pub use error::LinkError;
pub use mem::{MemEndpoint, MemFactory};
pub use tcp::{MeshConfig, TcpEndpoint, TcpFactory};
pub use world::{Party, WorldDescriptor};
