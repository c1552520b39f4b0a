//! In-memory mesh.
//!
//! Endpoints created by one [`MemFactory`] rendezvous through a shared
//! registry instead of the network: `join` registers the rank in its
//! world's barrier and waits until all ranks have arrived, and message
//! delivery runs over per-pair in-process channels. No sockets are
//! opened and no ports are consumed, so in-memory worlds are immune to
//! port collisions and safe under heavy test parallelism.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::{
    endpoint::{DEFAULT_THROTTLE_WINDOW, Endpoint, EndpointFactory},
    error::LinkError,
    world::WorldDescriptor,
};

/// Lock a mutex, recovering the guard if a holder panicked mid-test.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Channel for one ordered (from, to) rank pair. Each half is claimed
/// exactly once, by the sending and receiving endpoint respectively,
/// so dropping an endpoint closes its channels.
struct PairChannel {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: Option<mpsc::UnboundedReceiver<Bytes>>,
}

impl PairChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx: Some(tx), rx: Some(rx) }
    }
}

/// Shared state of one in-memory world.
struct WorldState {
    world_id: String,
    size: usize,
    /// Per-rank creation guard: a rank's channels may be wired once.
    created: Mutex<Vec<bool>>,
    /// Per-rank join flags behind the rendezvous barrier.
    joined: Mutex<Vec<bool>>,
    /// Publishes the current join count to waiting ranks.
    barrier: watch::Sender<usize>,
    /// Lazily wired (from, to) channel matrix.
    pairs: Mutex<HashMap<(usize, usize), PairChannel>>,
}

impl WorldState {
    fn new(world_id: String, size: usize) -> Self {
        let (barrier, _) = watch::channel(0);
        Self {
            world_id,
            size,
            created: Mutex::new(vec![false; size]),
            joined: Mutex::new(vec![false; size]),
            barrier,
            pairs: Mutex::new(HashMap::new()),
        }
    }
}

/// Factory for in-memory endpoints.
///
/// Worlds are keyed by world id: every `create` call with the same id
/// wires into the same rendezvous barrier and channel matrix, so a
/// factory handles any number of concurrently bootstrapping worlds as
/// long as their ids differ. The factory is cheap to clone; clones
/// share the registry.
#[derive(Clone, Default)]
pub struct MemFactory {
    worlds: Arc<Mutex<HashMap<String, Arc<WorldState>>>>,
}

impl MemFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    fn world_state(&self, desc: &WorldDescriptor) -> Result<Arc<WorldState>, LinkError> {
        let mut worlds = lock(&self.worlds);
        let state = worlds
            .entry(desc.world_id().to_string())
            .or_insert_with(|| {
                Arc::new(WorldState::new(desc.world_id().to_string(), desc.world_size()))
            })
            .clone();

        if state.size != desc.world_size() {
            return Err(LinkError::InvalidDescriptor {
                reason: format!(
                    "world {:?} already registered with size {}, descriptor has {}",
                    desc.world_id(),
                    state.size,
                    desc.world_size()
                ),
            });
        }

        Ok(state)
    }
}

impl EndpointFactory for MemFactory {
    type Endpoint = MemEndpoint;

    fn create(&self, desc: &WorldDescriptor, rank: usize) -> Result<MemEndpoint, LinkError> {
        let party = desc
            .party(rank)
            .ok_or(LinkError::RankOutOfRange { rank, world_size: desc.world_size() })?;
        let state = self.world_state(desc)?;

        {
            let mut created = lock(&state.created);
            if created[rank] {
                return Err(LinkError::InvalidDescriptor {
                    reason: format!("rank {rank} created twice in world {:?}", state.world_id),
                });
            }
            created[rank] = true;
        }

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        {
            let mut pairs = lock(&state.pairs);
            for peer in (0..state.size).filter(|peer| *peer != rank) {
                let outbound = pairs.entry((rank, peer)).or_insert_with(PairChannel::new);
                let tx = outbound.tx.take().ok_or_else(|| LinkError::Barrier {
                    reason: format!("outbound channel {rank}->{peer} already claimed"),
                })?;
                senders.insert(peer, tx);

                let inbound = pairs.entry((peer, rank)).or_insert_with(PairChannel::new);
                let rx = inbound.rx.take().ok_or_else(|| LinkError::Barrier {
                    reason: format!("inbound channel {peer}->{rank} already claimed"),
                })?;
                receivers.insert(peer, rx);
            }
        }

        Ok(MemEndpoint {
            id: party.id.clone(),
            rank,
            state,
            senders,
            receivers,
            throttle_window: DEFAULT_THROTTLE_WINDOW,
        })
    }
}

/// In-memory endpoint for one rank.
pub struct MemEndpoint {
    id: String,
    rank: usize,
    state: Arc<WorldState>,
    senders: HashMap<usize, mpsc::UnboundedSender<Bytes>>,
    receivers: HashMap<usize, mpsc::UnboundedReceiver<Bytes>>,
    throttle_window: usize,
}

impl MemEndpoint {
    /// Deliver a payload to a peer rank. Never blocks.
    pub fn send(&self, to: usize, payload: Bytes) -> Result<(), LinkError> {
        let tx = self.senders.get(&to).ok_or(LinkError::UnknownPeer { rank: to })?;
        tx.send(payload).map_err(|_| LinkError::ChannelClosed)
    }

    /// Receive the next payload sent by `from`.
    ///
    /// Waits until a payload arrives; fails once the peer endpoint has
    /// been dropped and its channel drained.
    pub async fn recv(&mut self, from: usize) -> Result<Bytes, LinkError> {
        let rx = self.receivers.get_mut(&from).ok_or(LinkError::UnknownPeer { rank: from })?;
        rx.recv().await.ok_or(LinkError::ChannelClosed)
    }

    /// Current outbound throttle window (0 = disabled).
    pub fn throttle_window(&self) -> usize {
        self.throttle_window
    }

    /// Whether this rank has passed the join barrier.
    pub fn is_joined(&self) -> bool {
        lock(&self.state.joined)[self.rank]
    }
}

#[async_trait]
impl Endpoint for MemEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.state.size
    }

    async fn join(&mut self) -> Result<(), LinkError> {
        {
            let mut joined = lock(&self.state.joined);
            if joined[self.rank] {
                return Err(LinkError::AlreadyJoined { rank: self.rank });
            }
            joined[self.rank] = true;

            let count = joined.iter().filter(|rank_joined| **rank_joined).count();
            // Publish under the lock so counts reach the barrier in order.
            self.state.barrier.send_replace(count);
        }

        let mut barrier = self.state.barrier.subscribe();
        while *barrier.borrow_and_update() < self.state.size {
            barrier.changed().await.map_err(|_| LinkError::Barrier {
                reason: format!("world {:?} torn down during join", self.state.world_id),
            })?;
        }

        tracing::debug!(rank = self.rank, world = %self.state.world_id, "joined in-memory mesh");
        Ok(())
    }

    fn set_throttle_window(&mut self, window: usize) {
        self.throttle_window = window;
    }
}
