//! Mesh layer error types.

use thiserror::Error;

/// Errors from world construction and mesh membership operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The world descriptor is malformed.
    #[error("invalid world descriptor: {reason}")]
    InvalidDescriptor {
        /// Description of what is wrong with the descriptor.
        reason: String,
    },

    /// A rank outside `0..world_size` was requested.
    #[error("rank {rank} out of range for world of {world_size}")]
    RankOutOfRange {
        /// The offending rank.
        rank: usize,
        /// Number of parties in the world.
        world_size: usize,
    },

    /// `join` was called a second time on the same endpoint.
    #[error("rank {rank} already joined the mesh")]
    AlreadyJoined {
        /// Rank of the endpoint.
        rank: usize,
    },

    /// Binding the endpoint's advertised address failed.
    ///
    /// With probed port allocation this is the point where a lost
    /// check-then-use race on the port surfaces.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The mesh was not fully established before the join deadline.
    #[error("{id}: mesh join timed out after {waited_ms} ms")]
    JoinTimeout {
        /// Party id of the endpoint that gave up.
        id: String,
        /// How long the endpoint waited.
        waited_ms: u64,
    },

    /// A peer sent an unexpected or invalid join hello.
    #[error("mesh handshake failed: {reason}")]
    Handshake {
        /// Description of the handshake failure.
        reason: String,
    },

    /// The in-memory rendezvous barrier was torn down mid-join.
    #[error("mesh barrier failed: {reason}")]
    Barrier {
        /// Description of the barrier failure.
        reason: String,
    },

    /// A send or receive targeted a rank that is not a peer.
    #[error("unknown peer rank {rank}")]
    UnknownPeer {
        /// The rank that is not part of the mesh.
        rank: usize,
    },

    /// The peer endpoint was dropped and its channel closed.
    #[error("peer channel closed")]
    ChannelClosed,

    /// Transport-level I/O error during the join exchange.
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),
}
