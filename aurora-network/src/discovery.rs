use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::peer::PeerAddr;

pub const DISCOVER_PACKET: &[u8] = b"DISCOVER";
const REPLY_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReply {
    pub peer: PeerAddr,
    pub is_leader: bool,
}

pub async fn local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").await.is_ok() {
                if let Ok(addr) = socket.local_addr() {
                    return addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}

pub async fn new_broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

pub async fn listen(
    discovery_port: u16,
    self_host: String,
    self_port: u16,
    is_leader: impl Fn() -> bool,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", discovery_port)).await?;
    debug!(discovery_port, "discovery listener bound");
    let mut buf = [0u8; 1024];
    loop {
        let (n, addr) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "discovery recv failed");
                continue;
            }
        };
        if &buf[..n] == DISCOVER_PACKET {
            let response = format!(
                "{}:{}:{}",
                self_host,
                self_port,
                if is_leader() { "True" } else { "False" }
            );
            if let Err(e) = socket.send_to(response.as_bytes(), addr).await {
                warn!(error = %e, "discovery reply failed");
            }
        }
    }
}

pub async fn broadcast_once(
    socket: &UdpSocket,
    discovery_port: u16,
    self_host: &str,
    self_port: u16,
) -> Vec<DiscoveryReply> {
    if let Err(e) = socket
        .send_to(DISCOVER_PACKET, ("255.255.255.255", discovery_port))
        .await
    {
        warn!(error = %e, "discovery broadcast send failed");
        return Vec::new();
    }

    let mut replies = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match tokio::time::timeout(REPLY_DRAIN_TIMEOUT, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, _addr))) => {
                if let Some(reply) = parse_reply(&buf[..n], self_host, self_port) {
                    replies.push(reply);
                }
            }
            _ => break,
        }
    }
    replies
}

fn parse_reply(data: &[u8], self_host: &str, self_port: u16) -> Option<DiscoveryReply> {
    let text = std::str::from_utf8(data).ok()?;
    let mut parts = text.splitn(3, ':');
    let host = parts.next()?.to_string();
    let port: u16 = parts.next()?.parse().ok()?;
    let is_leader = match parts.next()? {
        "True" => true,
        "False" => false,
        _ => return None,
    };
    if host == self_host && port == self_port {
        return None;
    }
    Some(DiscoveryReply {
        peer: PeerAddr::new(host, port),
        is_leader,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_skips_self() {
        assert!(parse_reply(b"10.0.0.1:7000:True", "10.0.0.1", 7000).is_none());
    }

    #[test]
    fn parse_reply_reads_leader_flag() {
        let reply = parse_reply(b"10.0.0.2:7001:True", "10.0.0.1", 7000).unwrap();
        assert_eq!(reply.peer, PeerAddr::new("10.0.0.2", 7001));
        assert!(reply.is_leader);
    }

    #[test]
    fn parse_reply_rejects_garbage() {
        assert!(parse_reply(b"not-a-reply", "10.0.0.1", 7000).is_none());
    }

    #[tokio::test]
    async fn discovery_round_trip_over_loopback() {
        let listener_socket = new_broadcast_socket().await.unwrap();
        let listener_port = listener_socket.local_addr().unwrap().port();
        let listener_host = "127.0.0.1".to_string();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (n, addr) = listener_socket.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], DISCOVER_PACKET);
            let response = format!("{listener_host}:{listener_port}:True");
            listener_socket
                .send_to(response.as_bytes(), addr)
                .await
                .unwrap();
        });

        let caller_socket = new_broadcast_socket().await.unwrap();
        caller_socket
            .send_to(DISCOVER_PACKET, ("127.0.0.1", listener_port))
            .await
            .unwrap();
        let mut buf = [0u8; 1024];
        let (n, _addr) = caller_socket.recv_from(&mut buf).await.unwrap();
        let reply = parse_reply(&buf[..n], "caller-host", 0).unwrap();
        assert!(reply.is_leader);
        assert_eq!(reply.peer.port, listener_port);
    }
}
