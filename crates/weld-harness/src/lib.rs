//! Ephemeral test-topology bootstrap for weld meshes.
//!
//! Test suites exercising the mesh layer need N connected endpoints
//! and must not manage ports or join ordering by hand. This crate
//! stands a world up in one call:
//!
//! ```text
//! WorldBuilder ──(allocate_ports when networked)──▶ WorldDescriptor
//!       │                                               │
//!       └──▶ EndpointFactory × N ──▶ connect_mesh ──▶ Vec<Endpoint>
//!                                    (one task per rank, full barrier)
//! ```
//!
//! Port allocation is OS-observed and strictly sequential, finished
//! before any endpoint exists; joins run concurrently, one task per
//! rank, and every rank's outcome is reported: a failure in one rank
//! never hides failures in others. [`round_payload`] supplies
//! reproducible rank/round-tagged payloads for delivery assertions.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut world = weld_harness::bootstrap_mem(3).await?;
//! let payload = weld_harness::round_payload(0, 1);
//! world[0].send(1, payload.into())?;
//! ```
//!
//! The port probe is bind-and-release: nothing reserves the port
//! between allocation and the endpoint's own bind, so a parallel
//! process can steal it. Networked bootstrap under heavy parallelism
//! inherits that flakiness by design; in-memory worlds are immune.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bootstrap;
mod connect;
mod error;
mod payload;
pub mod port;
mod topology;

pub use bootstrap::{bootstrap_mem, bootstrap_mem_with, bootstrap_tcp, bootstrap_tcp_with};
pub use connect::{JoinProfile, connect_mesh};
pub use error::{HarnessError, JoinFailure, JoinFailureReason};
pub use payload::round_payload;
pub use port::{DEFAULT_BASE_PORT, allocate_ports, is_port_available};
pub use topology::{MEM_PLACEHOLDER_ADDR, WorldBuilder};
