use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aurora_codec::Message;
use aurora_core::{Address, Block, Blockchain, Transaction};
use aurora_network::PeerAddr;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::stage::{Role, Stage};

pub struct SharedState {
    pub stage: Mutex<Stage>,
    pub peers: Mutex<HashSet<PeerAddr>>,
    pub validators: Mutex<HashSet<String>>,
    chain_len: AtomicUsize,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            stage: Mutex::new(Stage::Tx),
            peers: Mutex::new(HashSet::new()),
            validators: Mutex::new(HashSet::new()),
            chain_len: AtomicUsize::new(1),
        }
    }

    pub fn stage(&self) -> Stage {
        *self.stage.lock()
    }

    pub fn set_stage(&self, stage: Stage) {
        *self.stage.lock() = stage;
    }

    pub fn chain_len(&self) -> usize {
        self.chain_len.load(Ordering::Relaxed)
    }

    pub fn set_chain_len(&self, len: usize) {
        self.chain_len.store(len, Ordering::Relaxed);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    SendTo(PeerAddr, Message),
    Broadcast(Message),
    EnqueueSelf(Message),
    RearmMiningTimer,
}

pub struct Engine {
    pub address: Address,
    pub role: Role,
    private_key: String,
    self_peer: PeerAddr,
    pub temp_block: Option<Block>,
    pub blockchain: Blockchain,
    shared: Arc<SharedState>,
}

impl Engine {
    pub fn new(
        address: Address,
        role: Role,
        private_key: String,
        self_peer: PeerAddr,
        shared: Arc<SharedState>,
    ) -> Self {
        Self {
            address,
            role,
            private_key,
            self_peer,
            temp_block: None,
            blockchain: Blockchain::new(),
            shared,
        }
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn is_coordinator(&self) -> bool {
        let my_id = self.self_peer.id();
        let peers = self.shared.peers.lock();
        peers.iter().map(PeerAddr::id).all(|id| my_id <= id)
    }

    fn choose_creator(&self) -> Option<PeerAddr> {
        let validators = self.shared.validators.lock();
        let mut candidates: Vec<String> = validators.iter().cloned().collect();
        if self.role == Role::Leader {
            candidates.push(self.self_peer.id());
        }
        let chosen = candidates.choose(&mut rand::thread_rng())?;
        let (host, port) = chosen.rsplit_once(':')?;
        Some(PeerAddr::new(host.to_string(), port.parse().ok()?))
    }

    pub fn submit_local_tx(&mut self, tx: Transaction) -> Option<Outbound> {
        if self.shared.stage() != Stage::Tx {
            return None;
        }
        self.blockchain.add_transaction(tx.clone());
        Some(Outbound::Broadcast(Message::Tx(tx)))
    }

    pub fn mining_tick(&self) -> Vec<Outbound> {
        if !self.is_coordinator() {
            return Vec::new();
        }
        let mut actions = vec![Outbound::Broadcast(Message::ChooseCreator)];
        if self.role == Role::Leader {
            actions.push(Outbound::EnqueueSelf(Message::ChooseCreator));
        }
        actions
    }

    pub fn handle(&mut self, message: Message) -> Vec<Outbound> {
        match message {
            Message::Tx(tx) => {
                self.blockchain.add_transaction(tx);
                Vec::new()
            }
            Message::ChooseCreator => self.handle_choose_creator(),
            Message::Creator => self.handle_creator(),
            Message::ShareBlock { block, host, port } => {
                self.handle_share_block(block, host, port)
            }
            Message::Signature { signature, address } => {
                self.handle_signature(signature, address)
            }
            Message::FinalizeBlock(block) => self.handle_finalize_block(block),
            Message::RequestChain => vec![Outbound::Broadcast(Message::Chain {
                blocks: self.blockchain.blocks.clone(),
            })],
            Message::Chain { blocks } => {
                self.blockchain.try_to_update_chain(blocks);
                self.shared.set_chain_len(self.blockchain.blocks.len());
                Vec::new()
            }
            Message::Disconnect { host, port } => {
                self.shared
                    .peers
                    .lock()
                    .remove(&PeerAddr::new(host, port));
                Vec::new()
            }
            Message::Rebroadcast { .. } | Message::Unknown(_) => {
                warn!(tag = message.tag(), "ignoring message with no consensus handling");
                Vec::new()
            }
        }
    }

    fn handle_choose_creator(&mut self) -> Vec<Outbound> {
        self.shared.set_stage(Stage::Mining);
        if !self.is_coordinator() {
            return Vec::new();
        }
        let Some(creator) = self.choose_creator() else {
            warn!("no validators available to choose a block creator");
            return Vec::new();
        };
        if creator == self.self_peer {
            vec![Outbound::EnqueueSelf(Message::Creator)]
        } else {
            vec![Outbound::SendTo(creator, Message::Creator)]
        }
    }

    fn handle_creator(&mut self) -> Vec<Outbound> {
        self.shared.set_stage(Stage::Mining);
        if self.role != Role::Leader {
            return Vec::new();
        }
        let block = self.blockchain.produce_block(&self.address);
        self.temp_block = Some(block.clone());
        let share = Message::ShareBlock {
            block,
            host: self.self_peer.host.clone(),
            port: self.self_peer.port,
        };
        vec![
            Outbound::Broadcast(share.clone()),
            Outbound::EnqueueSelf(share),
        ]
    }

    fn handle_share_block(&mut self, block: Block, host: String, port: u16) -> Vec<Outbound> {
        self.shared.set_stage(Stage::Mining);
        if self.role != Role::Leader || !self.blockchain.validate_block(&block) {
            return Vec::new();
        }
        let signature = match aurora_crypto::sign(&self.private_key, block.content_hash().as_bytes())
        {
            Ok(sig) => sig,
            Err(e) => {
                warn!(error = %e, "failed to sign candidate block");
                return Vec::new();
            }
        };
        let proposer = PeerAddr::new(host, port);
        let message = Message::Signature {
            signature,
            address: self.address.clone(),
        };
        if proposer == self.self_peer {
            vec![Outbound::EnqueueSelf(message)]
        } else {
            vec![Outbound::SendTo(proposer, message)]
        }
    }

    fn handle_signature(&mut self, signature: String, address: Address) -> Vec<Outbound> {
        let Some(block) = self.temp_block.as_mut() else {
            warn!("received signature with no pending candidate block");
            return Vec::new();
        };
        block.add_signature(address, signature);

        let validator_count = self.shared.validators.lock().len();
        if 3 * block.validator_signatures.len() < 2 * (validator_count + 1) {
            return Vec::new();
        }
        let finalized = block.clone();
        vec![
            Outbound::Broadcast(Message::FinalizeBlock(finalized.clone())),
            Outbound::EnqueueSelf(Message::FinalizeBlock(finalized)),
        ]
    }

    fn handle_finalize_block(&mut self, block: Block) -> Vec<Outbound> {
        self.temp_block = None;
        if self.blockchain.add_external_block(block) {
            self.shared.set_stage(Stage::Tx);
        }
        self.shared.set_chain_len(self.blockchain.blocks.len());
        vec![Outbound::RearmMiningTimer]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(role: Role, port: u16) -> Engine {
        Engine::new(
            "a".repeat(64),
            role,
            "dummy-key".to_string(),
            PeerAddr::new("127.0.0.1", port),
            Arc::new(SharedState::new()),
        )
    }

    #[test]
    fn is_coordinator_true_with_no_peers() {
        let e = engine(Role::Leader, 7000);
        assert!(e.is_coordinator());
    }

    #[test]
    fn is_coordinator_false_when_a_peer_sorts_lower() {
        let e = engine(Role::User, 7000);
        e.shared
            .peers
            .lock()
            .insert(PeerAddr::new("127.0.0.1", 6000));
        assert!(!e.is_coordinator());
    }

    #[test]
    fn choose_creator_excludes_self_for_user_role() {
        let e = engine(Role::User, 7000);
        assert!(e.choose_creator().is_none());
    }

    #[test]
    fn choose_creator_includes_self_for_leader_role() {
        let e = engine(Role::Leader, 7000);
        let creator = e.choose_creator().unwrap();
        assert_eq!(creator, PeerAddr::new("127.0.0.1", 7000));
    }

    #[test]
    fn submit_local_tx_rejected_outside_tx_stage() {
        let mut e = engine(Role::Leader, 7000);
        e.shared.set_stage(Stage::Mining);
        let tx = Transaction::new(vec![], "f".repeat(64));
        assert!(e.submit_local_tx(tx).is_none());
    }

    #[test]
    fn submit_local_tx_accepted_and_broadcast_in_tx_stage() {
        let mut e = engine(Role::Leader, 7000);
        let tx = Transaction::new(vec![], "f".repeat(64));
        let action = e.submit_local_tx(tx).unwrap();
        assert!(matches!(action, Outbound::Broadcast(Message::Tx(_))));
        assert_eq!(e.blockchain.pending_transactions.len(), 1);
    }

    #[test]
    fn choose_creator_message_sets_mining_stage() {
        let mut e = engine(Role::Leader, 7000);
        let actions = e.handle(Message::ChooseCreator);
        assert_eq!(e.shared.stage(), Stage::Mining);
        assert_eq!(actions, vec![Outbound::EnqueueSelf(Message::Creator)]);
    }

    #[test]
    fn creator_message_produces_and_broadcasts_candidate_block() {
        let mut e = engine(Role::Leader, 7000);
        let actions = e.handle(Message::Creator);
        assert!(e.temp_block.is_some());
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Outbound::Broadcast(Message::ShareBlock { .. })));
        assert!(matches!(actions[1], Outbound::EnqueueSelf(Message::ShareBlock { .. })));
    }

    #[test]
    fn finalize_block_clears_temp_block_and_rearms_timer() {
        let mut e = engine(Role::Leader, 7000);
        e.handle(Message::Creator);
        let block = e.temp_block.clone().unwrap();
        let actions = e.handle(Message::FinalizeBlock(block));
        assert!(e.temp_block.is_none());
        assert_eq!(e.shared.stage(), Stage::Tx);
        assert_eq!(actions, vec![Outbound::RearmMiningTimer]);
    }

    #[test]
    fn signature_below_threshold_does_not_finalize() {
        let mut e = engine(Role::Leader, 7000);
        e.handle(Message::Creator);
        e.shared.validators.lock().insert("127.0.0.1:7000".into());
        e.shared.validators.lock().insert("127.0.0.1:7001".into());
        e.shared.validators.lock().insert("127.0.0.1:7002".into());
        let actions = e.handle(Message::Signature {
            signature: "sig".into(),
            address: e.address.clone(),
        });
        assert!(actions.is_empty());
    }

    #[test]
    fn signature_at_threshold_finalizes() {
        let mut e = engine(Role::Leader, 7000);
        e.handle(Message::Creator);
        // 3 * 1 >= 2 * (0 + 1) with no validators registered.
        let actions = e.handle(Message::Signature {
            signature: "sig".into(),
            address: e.address.clone(),
        });
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Outbound::Broadcast(Message::FinalizeBlock(_))));
    }

    #[test]
    fn request_chain_broadcasts_local_chain() {
        let mut e = engine(Role::Leader, 7000);
        let actions = e.handle(Message::RequestChain);
        assert_eq!(
            actions,
            vec![Outbound::Broadcast(Message::Chain {
                blocks: e.blockchain.blocks.clone()
            })]
        );
    }

    #[test]
    fn disconnect_removes_peer() {
        let mut e = engine(Role::Leader, 7000);
        e.shared
            .peers
            .lock()
            .insert(PeerAddr::new("10.0.0.2", 8000));
        e.handle(Message::Disconnect {
            host: "10.0.0.2".into(),
            port: 8000,
        });
        assert!(e.shared.peers.lock().is_empty());
    }
}
