//! Bootstrap error types.

use thiserror::Error;
use weld_mesh::LinkError;

/// Why one rank's join task did not produce a joined endpoint.
#[derive(Debug, Error)]
pub enum JoinFailureReason {
    /// The endpoint's join returned an error.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The task driving the join panicked.
    #[error("join task panicked: {0}")]
    Panicked(String),
}

/// One failing rank inside an aggregate join report.
#[derive(Debug, Error)]
#[error("rank {rank}: {reason}")]
pub struct JoinFailure {
    /// The rank whose join failed.
    pub rank: usize,
    /// What went wrong for that rank.
    #[source]
    pub reason: JoinFailureReason,
}

/// Errors from world bootstrap.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Sequential port allocation ran past the end of the port range.
    /// Fatal: no endpoint is created when this is raised.
    #[error("no available loopback port: scanned {base}..=65535, found {found} of {needed}")]
    PortExhausted {
        /// First port probed.
        base: u16,
        /// How many ports the world needed.
        needed: usize,
        /// How many ports were found before the range ran out.
        found: usize,
    },

    /// Descriptor construction or endpoint creation failed before any
    /// join task was dispatched.
    #[error("endpoint setup failed: {0}")]
    Setup(#[from] LinkError),

    /// One or more ranks failed to join. Every failing rank is listed;
    /// the barrier completed before this was raised, so no outcome is
    /// masked by an earlier failure.
    #[error("mesh join failed for {} of {} ranks", .failures.len(), .world_size)]
    Join {
        /// Size of the world being joined.
        world_size: usize,
        /// Per-rank failures, ascending by rank.
        failures: Vec<JoinFailure>,
    },
}
