//! World topology descriptors.
//!
//! A [`WorldDescriptor`] names every party of an N-party mesh together
//! with the address each party can be reached at. It is assembled once
//! by whoever bootstraps the world and is read-only afterwards; every
//! endpoint of the world is created from the same descriptor.

use crate::error::LinkError;

/// One participant of a world.
///
/// The id is unique within its world; the address is either a real
/// `host:port` string or a synthetic placeholder for in-memory worlds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    /// Unique party identifier.
    pub id: String,
    /// Reachable address, or a placeholder for in-memory worlds.
    pub addr: String,
}

impl Party {
    /// Create a party from an id and an address.
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        Self { id: id.into(), addr: addr.into() }
    }
}

/// Immutable description of an N-party world.
///
/// Rank is the position in the party sequence: contiguous integers
/// starting at 0. The descriptor never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldDescriptor {
    world_id: String,
    parties: Vec<Party>,
}

impl WorldDescriptor {
    /// Build a descriptor from an ordered party list.
    ///
    /// Party ids must be pairwise distinct; rank is assigned by
    /// position. An empty party list is a valid zero-party world.
    pub fn new(world_id: impl Into<String>, parties: Vec<Party>) -> Result<Self, LinkError> {
        for (rank, party) in parties.iter().enumerate() {
            if parties[..rank].iter().any(|other| other.id == party.id) {
                return Err(LinkError::InvalidDescriptor {
                    reason: format!("duplicate party id {:?}", party.id),
                });
            }
        }

        Ok(Self { world_id: world_id.into(), parties })
    }

    /// The world identifier.
    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    /// Number of parties in this world.
    pub fn world_size(&self) -> usize {
        self.parties.len()
    }

    /// The party at `rank`, if the rank is in range.
    pub fn party(&self, rank: usize) -> Option<&Party> {
        self.parties.get(rank)
    }

    /// The rank of the party with the given id.
    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.parties.iter().position(|party| party.id == id)
    }

    /// Iterate over all parties in rank order.
    pub fn parties(&self) -> impl Iterator<Item = &Party> {
        self.parties.iter()
    }
}
