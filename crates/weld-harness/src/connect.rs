//! Barrier-synchronized mesh join.
//!
//! One task per rank drives that rank's endpoint through its join and
//! post-join configuration. The connector is a full barrier: it
//! returns only after every task has finished, successfully or not,
//! and its error reports *every* failing rank. Checking only the first
//! failure would mask independent failures in other ranks, which is
//! exactly the hazard this module exists to avoid.

use weld_mesh::Endpoint;

use crate::error::{HarnessError, JoinFailure, JoinFailureReason};

/// Post-join configuration applied by each rank's task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinProfile {
    /// Join only; no extra configuration. Used by in-memory worlds.
    #[default]
    Plain,

    /// Disable outbound throttling after joining, so test sends never
    /// block on flow control. Used by networked worlds.
    Unthrottled,
}

/// Join all endpoints of a world concurrently.
///
/// Endpoints are consumed in rank order and returned in rank order
/// once the whole world has joined. Each spawned task exclusively owns
/// its endpoint until the barrier completes; results land in disjoint
/// rank-indexed slots, so no task ever contends with another.
///
/// No ordering holds *between* ranks' joins, and no timeout is imposed
/// here; callers wanting a bounded wait wrap the returned future.
/// A panicking join task is folded into the aggregate report as that
/// rank's failure rather than propagated.
pub async fn connect_mesh<E: Endpoint>(
    endpoints: Vec<E>,
    profile: JoinProfile,
) -> Result<Vec<E>, HarnessError> {
    let world_size = endpoints.len();

    let mut tasks = Vec::with_capacity(world_size);
    for (rank, mut endpoint) in endpoints.into_iter().enumerate() {
        tasks.push(tokio::spawn(async move {
            endpoint.join().await?;
            if profile == JoinProfile::Unthrottled {
                endpoint.set_throttle_window(0);
            }
            tracing::trace!(rank, "rank joined and configured");
            Ok::<E, weld_mesh::LinkError>(endpoint)
        }));
    }

    let mut slots: Vec<Option<E>> = Vec::with_capacity(world_size);
    slots.resize_with(world_size, || None);
    let mut failures = Vec::new();

    // Drain every task before reporting anything.
    for (rank, task) in tasks.into_iter().enumerate() {
        match task.await {
            Ok(Ok(endpoint)) => slots[rank] = Some(endpoint),
            Ok(Err(error)) => {
                failures.push(JoinFailure { rank, reason: JoinFailureReason::Link(error) });
            }
            Err(join_error) => {
                failures.push(JoinFailure {
                    rank,
                    reason: JoinFailureReason::Panicked(join_error.to_string()),
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(slots.into_iter().flatten().collect())
    } else {
        tracing::warn!(world_size, failed = failures.len(), "mesh join incomplete");
        Err(HarnessError::Join { world_size, failures })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use weld_mesh::LinkError;

    use super::*;

    /// What a recording endpoint should do when its join runs.
    #[derive(Debug, Clone, Copy)]
    enum JoinBehavior {
        Succeed,
        Fail,
        Panic,
    }

    /// Endpoint that records how the connector drove it.
    #[derive(Debug)]
    struct RecordingEndpoint {
        rank: usize,
        world_size: usize,
        behavior: JoinBehavior,
        join_calls: usize,
        throttle_sets: Vec<usize>,
    }

    impl RecordingEndpoint {
        fn world(behaviors: &[JoinBehavior]) -> Vec<Self> {
            behaviors
                .iter()
                .enumerate()
                .map(|(rank, behavior)| Self {
                    rank,
                    world_size: behaviors.len(),
                    behavior: *behavior,
                    join_calls: 0,
                    throttle_sets: Vec::new(),
                })
                .collect()
        }
    }

    #[async_trait]
    impl Endpoint for RecordingEndpoint {
        fn id(&self) -> &str {
            "recording"
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn world_size(&self) -> usize {
            self.world_size
        }

        async fn join(&mut self) -> Result<(), LinkError> {
            self.join_calls += 1;
            match self.behavior {
                JoinBehavior::Succeed => Ok(()),
                JoinBehavior::Fail => Err(LinkError::Handshake { reason: "refused".to_string() }),
                JoinBehavior::Panic => panic!("join blew up"),
            }
        }

        fn set_throttle_window(&mut self, window: usize) {
            self.throttle_sets.push(window);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unthrottled_profile_joins_once_and_disables_throttle_once() {
        let world = RecordingEndpoint::world(&[JoinBehavior::Succeed; 4]);

        let joined = connect_mesh(world, JoinProfile::Unthrottled).await.unwrap();

        assert_eq!(joined.len(), 4);
        for (slot, endpoint) in joined.iter().enumerate() {
            assert_eq!(endpoint.rank, slot, "rank order not preserved");
            assert_eq!(endpoint.join_calls, 1);
            assert_eq!(endpoint.throttle_sets, vec![0]);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn plain_profile_applies_no_configuration() {
        let world = RecordingEndpoint::world(&[JoinBehavior::Succeed; 3]);

        let joined = connect_mesh(world, JoinProfile::Plain).await.unwrap();

        for endpoint in &joined {
            assert_eq!(endpoint.join_calls, 1);
            assert!(endpoint.throttle_sets.is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_failing_rank_is_reported() {
        let world = RecordingEndpoint::world(&[
            JoinBehavior::Succeed,
            JoinBehavior::Fail,
            JoinBehavior::Succeed,
            JoinBehavior::Fail,
        ]);

        let error = connect_mesh(world, JoinProfile::Plain).await.unwrap_err();

        match error {
            HarnessError::Join { world_size, failures } => {
                assert_eq!(world_size, 4);
                let ranks: Vec<usize> = failures.iter().map(|failure| failure.rank).collect();
                assert_eq!(ranks, vec![1, 3], "both failing ranks must be listed");
            }
            other => panic!("expected Join error, got {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_task_becomes_that_ranks_failure() {
        let world = RecordingEndpoint::world(&[
            JoinBehavior::Succeed,
            JoinBehavior::Panic,
            JoinBehavior::Succeed,
        ]);

        let error = connect_mesh(world, JoinProfile::Plain).await.unwrap_err();

        match error {
            HarnessError::Join { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].rank, 1);
                assert!(matches!(failures[0].reason, JoinFailureReason::Panicked(_)));
            }
            other => panic!("expected Join error, got {other}"),
        }
    }

    #[tokio::test]
    async fn empty_world_connects_trivially() {
        let joined =
            connect_mesh(Vec::<RecordingEndpoint>::new(), JoinProfile::Unthrottled).await.unwrap();
        assert!(joined.is_empty());
    }
}
