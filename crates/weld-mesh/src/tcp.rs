//! Loopback TCP mesh.
//!
//! Every rank binds a listener on its own advertised address, then the
//! mesh is established pairwise: each rank dials every lower rank and
//! accepts a connection from every higher rank, so exactly one TCP
//! connection exists per party pair. The dialer opens with a 4-byte
//! little-endian rank hello so the acceptor knows which peer arrived.
//!
//! All ranks join concurrently and bind in arbitrary order, so dialing
//! polls a refused peer until [`MeshConfig::join_deadline`] expires.
//! That deadline bounds the whole join; there is no retry or reconnect
//! once the mesh is up.

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::{
    endpoint::{DEFAULT_THROTTLE_WINDOW, Endpoint, EndpointFactory},
    error::LinkError,
    world::WorldDescriptor,
};

/// Timing knobs for TCP mesh establishment.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Upper bound on mesh establishment once the listener is bound.
    pub join_deadline: Duration,
    /// Pause between dial attempts while a peer is not accepting yet.
    pub dial_retry: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self { join_deadline: Duration::from_secs(10), dial_retry: Duration::from_millis(50) }
    }
}

impl MeshConfig {
    /// Shortened deadlines for local tests.
    pub fn dev_default() -> Self {
        Self { join_deadline: Duration::from_secs(2), dial_retry: Duration::from_millis(10) }
    }
}

/// Factory for loopback TCP endpoints.
#[derive(Debug, Clone, Default)]
pub struct TcpFactory {
    config: MeshConfig,
}

impl TcpFactory {
    /// Factory with default timing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with explicit timing.
    pub fn with_config(config: MeshConfig) -> Self {
        Self { config }
    }
}

impl EndpointFactory for TcpFactory {
    type Endpoint = TcpEndpoint;

    fn create(&self, desc: &WorldDescriptor, rank: usize) -> Result<TcpEndpoint, LinkError> {
        let party = desc
            .party(rank)
            .ok_or(LinkError::RankOutOfRange { rank, world_size: desc.world_size() })?;

        let hello = u32::try_from(rank)
            .map_err(|_| LinkError::InvalidDescriptor {
                reason: format!("rank {rank} does not fit the 4-byte rank hello"),
            })?
            .to_le_bytes();

        let addrs = desc
            .parties()
            .map(|peer| {
                peer.addr.parse::<SocketAddr>().map_err(|error| LinkError::InvalidDescriptor {
                    reason: format!(
                        "party {:?} has unparseable address {:?}: {error}",
                        peer.id, peer.addr
                    ),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TcpEndpoint {
            id: party.id.clone(),
            rank,
            hello,
            addrs,
            config: self.config.clone(),
            listener: None,
            peers: HashMap::new(),
            joined: false,
            throttle_window: DEFAULT_THROTTLE_WINDOW,
        })
    }
}

/// TCP endpoint for one rank of a loopback world.
pub struct TcpEndpoint {
    id: String,
    rank: usize,
    hello: [u8; 4],
    /// Rank-indexed party addresses, own address included.
    addrs: Vec<SocketAddr>,
    config: MeshConfig,
    listener: Option<TcpListener>,
    peers: HashMap<usize, TcpStream>,
    joined: bool,
    throttle_window: usize,
}

impl TcpEndpoint {
    /// Address the endpoint's listener is bound to, once joined.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|listener| listener.local_addr().ok())
    }

    /// Ranks this endpoint holds a connection to, ascending.
    pub fn peer_ranks(&self) -> Vec<usize> {
        let mut ranks: Vec<usize> = self.peers.keys().copied().collect();
        ranks.sort_unstable();
        ranks
    }

    /// Whether the mesh join completed.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Current outbound throttle window (0 = disabled).
    pub fn throttle_window(&self) -> usize {
        self.throttle_window
    }

    /// Accept one connection per higher rank and read its hello.
    async fn accept_higher_ranks(
        listener: &TcpListener,
        rank: usize,
        world_size: usize,
    ) -> Result<HashMap<usize, TcpStream>, LinkError> {
        let expected = world_size - rank - 1;
        let mut peers = HashMap::with_capacity(expected);

        while peers.len() < expected {
            let (mut stream, remote) = listener.accept().await?;
            let mut hello = [0u8; 4];
            stream.read_exact(&mut hello).await?;

            let peer = usize::try_from(u32::from_le_bytes(hello)).map_err(|_| {
                LinkError::Handshake { reason: format!("malformed hello from {remote}") }
            })?;
            if peer <= rank || peer >= world_size {
                return Err(LinkError::Handshake {
                    reason: format!("unexpected hello from rank {peer} via {remote}"),
                });
            }
            if peers.insert(peer, stream).is_some() {
                return Err(LinkError::Handshake {
                    reason: format!("duplicate hello from rank {peer}"),
                });
            }
            tracing::trace!(rank, peer, "accepted mesh peer");
        }

        Ok(peers)
    }

    /// Dial every lower rank, polling peers that have not bound yet.
    async fn dial_lower_ranks(
        lower: &[SocketAddr],
        hello: [u8; 4],
        retry: Duration,
    ) -> Result<HashMap<usize, TcpStream>, LinkError> {
        let mut peers = HashMap::with_capacity(lower.len());

        for (peer, addr) in lower.iter().enumerate() {
            let mut stream = loop {
                match TcpStream::connect(addr).await {
                    Ok(stream) => break stream,
                    Err(error) => {
                        tracing::trace!(%addr, %error, "peer not accepting yet");
                        tokio::time::sleep(retry).await;
                    }
                }
            };
            stream.write_all(&hello).await?;
            peers.insert(peer, stream);
            tracing::trace!(peer, %addr, "dialed mesh peer");
        }

        Ok(peers)
    }
}

#[async_trait]
impl Endpoint for TcpEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.addrs.len()
    }

    async fn join(&mut self) -> Result<(), LinkError> {
        if self.joined {
            return Err(LinkError::AlreadyJoined { rank: self.rank });
        }

        let own_addr = self.addrs[self.rank];
        let listener = TcpListener::bind(own_addr)
            .await
            .map_err(|source| LinkError::Bind { addr: own_addr.to_string(), source })?;

        let world_size = self.addrs.len();
        let establish = async {
            tokio::try_join!(
                Self::accept_higher_ranks(&listener, self.rank, world_size),
                Self::dial_lower_ranks(&self.addrs[..self.rank], self.hello, self.config.dial_retry),
            )
        };

        let (mut peers, outbound) = tokio::time::timeout(self.config.join_deadline, establish)
            .await
            .map_err(|_| LinkError::JoinTimeout {
                id: self.id.clone(),
                waited_ms: u64::try_from(self.config.join_deadline.as_millis())
                    .unwrap_or(u64::MAX),
            })??;

        peers.extend(outbound);
        self.peers = peers;
        self.listener = Some(listener);
        self.joined = true;

        tracing::debug!(rank = self.rank, id = %self.id, world_size, "joined TCP mesh");
        Ok(())
    }

    fn set_throttle_window(&mut self, window: usize) {
        self.throttle_window = window;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Party;

    /// Grab N distinct loopback ports by binding on port 0 and dropping
    /// the listeners. Racy by nature, fine for tests.
    fn reserve_ports(count: usize) -> Vec<u16> {
        let listeners: Vec<std::net::TcpListener> = (0..count)
            .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
            .collect();
        listeners.iter().map(|listener| listener.local_addr().unwrap().port()).collect()
    }

    fn tcp_world(id: &str, ports: &[u16]) -> WorldDescriptor {
        let parties = ports
            .iter()
            .enumerate()
            .map(|(rank, port)| Party::new(format!("{id}-{rank}"), format!("127.0.0.1:{port}")))
            .collect();
        WorldDescriptor::new(id, parties).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn three_ranks_form_full_mesh() {
        let desc = tcp_world("mesh", &reserve_ports(3));
        let factory = TcpFactory::with_config(MeshConfig::dev_default());

        let mut tasks = Vec::new();
        for rank in 0..3 {
            let mut endpoint = factory.create(&desc, rank).unwrap();
            tasks.push(tokio::spawn(async move {
                endpoint.join().await.unwrap();
                endpoint
            }));
        }

        for (rank, task) in tasks.into_iter().enumerate() {
            let endpoint = task.await.unwrap();
            assert!(endpoint.is_joined());
            let expected: Vec<usize> = (0..3).filter(|peer| *peer != rank).collect();
            assert_eq!(endpoint.peer_ranks(), expected);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lone_rank_times_out_waiting_for_peers() {
        let desc = tcp_world("lonely", &reserve_ports(2));
        let config = MeshConfig {
            join_deadline: Duration::from_millis(200),
            dial_retry: Duration::from_millis(10),
        };
        let factory = TcpFactory::with_config(config);

        let mut endpoint = factory.create(&desc, 0).unwrap();
        let result = endpoint.join().await;
        assert!(matches!(result, Err(LinkError::JoinTimeout { .. })));
    }

    #[tokio::test]
    async fn occupied_address_surfaces_as_bind_error() {
        let ports = reserve_ports(1);
        let desc = tcp_world("occupied", &ports);
        let _squatter = std::net::TcpListener::bind(("127.0.0.1", ports[0])).unwrap();

        let factory = TcpFactory::with_config(MeshConfig::dev_default());
        let mut endpoint = factory.create(&desc, 0).unwrap();

        let result = endpoint.join().await;
        assert!(matches!(result, Err(LinkError::Bind { .. })));
    }

    #[tokio::test]
    async fn single_rank_world_joins_immediately() {
        let desc = tcp_world("solo", &reserve_ports(1));
        let factory = TcpFactory::with_config(MeshConfig::dev_default());

        let mut endpoint = factory.create(&desc, 0).unwrap();
        endpoint.join().await.unwrap();

        assert!(endpoint.is_joined());
        assert!(endpoint.peer_ranks().is_empty());
        assert!(endpoint.local_addr().is_some());
    }

    #[test]
    fn placeholder_address_is_rejected_at_create() {
        let parties = vec![Party::new("dummy_id:0", "dummy_host")];
        let desc = WorldDescriptor::new("placeholder", parties).unwrap();

        let result = TcpFactory::new().create(&desc, 0);
        assert!(matches!(result, Err(LinkError::InvalidDescriptor { .. })));
    }
}
