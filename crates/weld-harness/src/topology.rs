//! World descriptor assembly.
//!
//! [`WorldBuilder`] produces the descriptor a factory needs, in one of
//! two flavors: networked worlds get real loopback addresses from the
//! port allocator, in-memory worlds get fixed placeholder addresses
//! and never touch a socket.

use weld_mesh::{Party, WorldDescriptor};

use crate::{
    error::HarnessError,
    port::{DEFAULT_BASE_PORT, allocate_ports},
};

/// Placeholder address used by every party of an in-memory world.
pub const MEM_PLACEHOLDER_ADDR: &str = "dummy_host";

/// Party id prefix used by in-memory worlds.
const MEM_PARTY_PREFIX: &str = "dummy_id";

/// Assembles a [`WorldDescriptor`] for an N-party world.
///
/// Unset fields fall back to the conventions tests rely on: world id
/// `world_<N>`, party prefix = world id, base port
/// [`DEFAULT_BASE_PORT`].
#[derive(Debug, Clone)]
pub struct WorldBuilder {
    size: usize,
    world_id: Option<String>,
    party_prefix: Option<String>,
    base_port: u16,
}

impl WorldBuilder {
    /// Builder for a world of `size` parties.
    pub fn new(size: usize) -> Self {
        Self { size, world_id: None, party_prefix: None, base_port: DEFAULT_BASE_PORT }
    }

    /// Override the world id (default `world_<N>`).
    pub fn world_id(mut self, id: impl Into<String>) -> Self {
        self.world_id = Some(id.into());
        self
    }

    /// Override the networked party-id prefix (default: the world id).
    pub fn party_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.party_prefix = Some(prefix.into());
        self
    }

    /// Override the first port probed for networked worlds.
    pub fn base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    fn resolved_world_id(&self) -> String {
        self.world_id.clone().unwrap_or_else(|| format!("world_{}", self.size))
    }

    /// Build a networked descriptor: party `<prefix>-<rank>` at
    /// `127.0.0.1:<port>`, ports from the sequential allocator.
    ///
    /// Port allocation happens here, entirely before any endpoint
    /// exists; exhaustion aborts the bootstrap with zero endpoints
    /// created.
    pub fn build_tcp(self) -> Result<WorldDescriptor, HarnessError> {
        let ports = allocate_ports(self.base_port, self.size)?;
        let world_id = self.resolved_world_id();
        let prefix = self.party_prefix.clone().unwrap_or_else(|| world_id.clone());

        let parties = ports
            .iter()
            .enumerate()
            .map(|(rank, port)| Party::new(format!("{prefix}-{rank}"), format!("127.0.0.1:{port}")))
            .collect();

        Ok(WorldDescriptor::new(world_id, parties)?)
    }

    /// Build an in-memory descriptor: party `dummy_id:<rank>` at the
    /// fixed placeholder address. No port is probed or allocated.
    pub fn build_mem(self) -> Result<WorldDescriptor, HarnessError> {
        let parties = (0..self.size)
            .map(|rank| Party::new(format!("{MEM_PARTY_PREFIX}:{rank}"), MEM_PLACEHOLDER_ADDR))
            .collect();

        Ok(WorldDescriptor::new(self.resolved_world_id(), parties)?)
    }
}
