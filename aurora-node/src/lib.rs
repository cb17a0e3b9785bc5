use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aurora_codec::Message;
use aurora_config::{NodeConfig, RoleConfig};
use aurora_consensus::{Engine, Outbound, Role, SharedState};
use aurora_network::PeerAddr;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub async fn run_node(config_path: PathBuf) -> Result<()> {
    init_logging();
    let config = NodeConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let private_key =
        aurora_wallet::load_wallet(&config.wallet_path).context("loading wallet")?;
    let address =
        aurora_wallet::address_of(&private_key).context("deriving address from wallet key")?;
    info!(address = %address, "wallet loaded");

    let role = match config.role {
        RoleConfig::Leader => Role::Leader,
        RoleConfig::User => Role::User,
    };
    let host = aurora_network::local_ip().await;
    let self_peer = PeerAddr::new(host.clone(), config.port);
    info!(peer = %self_peer, ?role, "node identity established");

    let shared = Arc::new(SharedState::new());
    for seed in &config.peer_seeds {
        if let Some(peer) = parse_peer(seed) {
            shared.peers.lock().insert(peer);
        } else {
            warn!(seed, "ignoring malformed peer seed");
        }
    }

    let mut engine = Engine::new(
        address,
        role,
        private_key,
        self_peer.clone(),
        shared.clone(),
    );

    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listen_tx = tx.clone();
    let tcp_task = tokio::spawn(async move { aurora_network::listen(&bind_addr, listen_tx).await });

    let discovery_host = host.clone();
    let discovery_port = config.discovery_port;
    let discovery_self_port = config.port;
    let discovery_task = tokio::spawn(async move {
        aurora_network::discovery::listen(discovery_port, discovery_host, discovery_self_port, {
            move || role == Role::Leader
        })
        .await
    });

    let presence_shared = shared.clone();
    let presence_self = self_peer.clone();
    let presence_port = config.discovery_port;
    let presence_task = tokio::spawn(async move {
        broadcast_presence(presence_self, presence_port, presence_shared).await
    });

    let mining_interval = Duration::from_secs(config.mining_interval_secs.max(1));
    consume_messages(&mut engine, &tx, rx, mining_interval).await;

    tcp_task.abort();
    discovery_task.abort();
    presence_task.abort();
    Ok(())
}

async fn consume_messages(
    engine: &mut Engine,
    tx: &mpsc::UnboundedSender<Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    mining_interval: Duration,
) {
    let mut timer = mining_timer(mining_interval);
    loop {
        tokio::select! {
            maybe_message = rx.recv() => {
                let Some(message) = maybe_message else { break };
                debug!(tag = message.tag(), "dispatching message");
                let actions = engine.handle(message);
                apply_actions(actions, tx, engine.shared(), &mut timer).await;
            }
            _ = timer.tick() => {
                let actions = engine.mining_tick();
                apply_actions(actions, tx, engine.shared(), &mut timer).await;
            }
        }
    }
}

fn mining_timer(period: Duration) -> Interval {
    let mut timer = interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn apply_actions(
    actions: Vec<Outbound>,
    tx: &mpsc::UnboundedSender<Message>,
    shared: &SharedState,
    timer: &mut Interval,
) {
    for action in actions {
        match action {
            Outbound::SendTo(peer, message) => {
                aurora_network::send_to(&peer, &message).await;
            }
            Outbound::Broadcast(message) => {
                let peers: Vec<PeerAddr> = shared.peers.lock().iter().cloned().collect();
                aurora_network::broadcast(&peers, &message).await;
            }
            Outbound::EnqueueSelf(message) => {
                let _ = tx.send(message);
            }
            Outbound::RearmMiningTimer => {
                timer.reset();
            }
        }
    }
}

async fn broadcast_presence(self_peer: PeerAddr, discovery_port: u16, shared: Arc<SharedState>) {
    let socket = match aurora_network::new_broadcast_socket().await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(error = %e, "failed to open discovery broadcast socket");
            return;
        }
    };
    loop {
        let replies = aurora_network::broadcast_once(
            &socket,
            discovery_port,
            &self_peer.host,
            self_peer.port,
        )
        .await;

        let mut saw_new_peer = false;
        for reply in replies {
            let is_new = shared.peers.lock().insert(reply.peer.clone());
            saw_new_peer |= is_new;

            let mut validators = shared.validators.lock();
            if reply.is_leader {
                validators.insert(reply.peer.id());
            } else {
                validators.remove(&reply.peer.id());
            }
        }

        if saw_new_peer && shared.chain_len() == 1 {
            let peers: Vec<PeerAddr> = shared.peers.lock().iter().cloned().collect();
            aurora_network::broadcast(&peers, &Message::RequestChain).await;
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

fn parse_peer(seed: &str) -> Option<PeerAddr> {
    let (host, port) = seed.rsplit_once(':')?;
    Some(PeerAddr::new(host.to_string(), port.parse().ok()?))
}

fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
