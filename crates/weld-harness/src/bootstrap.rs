//! One-call world bootstrap.
//!
//! Glue over the three stages every test goes through: build a
//! descriptor, create one endpoint per rank, join them all behind the
//! barrier. Networked bootstrap disables throttling on every endpoint
//! so test sends are non-blocking by default; in-memory bootstrap
//! applies no post-join configuration.

use weld_mesh::{
    EndpointFactory, MemEndpoint, MemFactory, MeshConfig, TcpEndpoint, TcpFactory, WorldDescriptor,
};

use crate::{
    connect::{JoinProfile, connect_mesh},
    error::HarnessError,
    topology::WorldBuilder,
};

/// Create every rank's endpoint from the descriptor, aborting on the
/// first creation failure (before any join task is dispatched).
fn create_all<F: EndpointFactory>(
    factory: &F,
    desc: &WorldDescriptor,
) -> Result<Vec<F::Endpoint>, HarnessError> {
    (0..desc.world_size())
        .map(|rank| factory.create(desc, rank))
        .collect::<Result<Vec<_>, _>>()
        .map_err(HarnessError::from)
}

/// Stand up a networked world of `world_size` ranks with defaults:
/// world id `world_<N>`, ports probed from the default base.
pub async fn bootstrap_tcp(world_size: usize) -> Result<Vec<TcpEndpoint>, HarnessError> {
    bootstrap_tcp_with(WorldBuilder::new(world_size), MeshConfig::default()).await
}

/// Stand up a networked world from an explicit builder and mesh
/// timing. Returns the joined endpoints in rank order, throttling
/// disabled on each.
pub async fn bootstrap_tcp_with(
    builder: WorldBuilder,
    config: MeshConfig,
) -> Result<Vec<TcpEndpoint>, HarnessError> {
    let desc = builder.build_tcp()?;
    tracing::info!(world = %desc.world_id(), size = desc.world_size(), "bootstrapping TCP world");

    let endpoints = create_all(&TcpFactory::with_config(config), &desc)?;
    connect_mesh(endpoints, JoinProfile::Unthrottled).await
}

/// Stand up an in-memory world of `world_size` ranks with defaults.
/// No port is probed or allocated.
pub async fn bootstrap_mem(world_size: usize) -> Result<Vec<MemEndpoint>, HarnessError> {
    bootstrap_mem_with(WorldBuilder::new(world_size)).await
}

/// Stand up an in-memory world from an explicit builder.
pub async fn bootstrap_mem_with(
    builder: WorldBuilder,
) -> Result<Vec<MemEndpoint>, HarnessError> {
    let desc = builder.build_mem()?;
    tracing::info!(world = %desc.world_id(), size = desc.world_size(), "bootstrapping in-memory world");

    let endpoints = create_all(&MemFactory::new(), &desc)?;
    connect_mesh(endpoints, JoinProfile::Plain).await
}
