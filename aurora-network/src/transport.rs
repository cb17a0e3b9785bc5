use aurora_codec::Message;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::peer::PeerAddr;

pub async fn listen(bind_addr: &str, tx: UnboundedSender<Message>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    debug!(bind_addr, "tcp listener bound");
    loop {
        let (socket, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "tcp accept failed");
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, &tx).await {
                warn!(peer = %peer_addr, error = %e, "tcp connection error");
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    tx: &UnboundedSender<Message>,
) -> anyhow::Result<()> {
    let mut buffer = Vec::new();
    socket.read_to_end(&mut buffer).await?;
    if buffer.is_empty() {
        return Ok(());
    }
    match Message::decode(&buffer) {
        Ok(message) => {
            debug!(tag = message.tag(), "decoded inbound message");
            let _ = tx.send(message);
        }
        Err(e) => warn!(error = %e, "dropping malformed message"),
    }
    Ok(())
}

pub async fn send_to(peer: &PeerAddr, message: &Message) {
    let encoded = match message.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, tag = message.tag(), "failed to encode outbound message");
            return;
        }
    };
    let addr = format!("{}:{}", peer.host, peer.port);
    match TcpStream::connect(&addr).await {
        Ok(mut stream) => {
            use tokio::io::AsyncWriteExt;
            if let Err(e) = stream.write_all(&encoded).await {
                warn!(peer = %peer, tag = message.tag(), error = %e, "failed to send message");
            }
        }
        Err(e) => {
            warn!(peer = %peer, tag = message.tag(), error = %e, "failed to connect to peer");
        }
    }
}

pub async fn broadcast(peers: &[PeerAddr], message: &Message) {
    for peer in peers {
        send_to(peer, message).await;
    }
}
