pub mod discovery;
pub mod peer;
pub mod transport;

pub use discovery::{broadcast_once, local_ip, new_broadcast_socket, DiscoveryReply};
pub use peer::PeerAddr;
pub use transport::{broadcast, listen, send_to};
