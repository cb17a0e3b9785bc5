use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::block::{sha256_hex, zero_hash, Block, ValidatorSignatures, GENESIS_LEADER};
use crate::transaction::{Transaction, SYSTEM_PROGRAM};
use crate::Address;

pub const BLOCK_REWARD: u64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: u64,
}

#[derive(Debug, Clone)]
pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub accounts: HashMap<Address, Account>,
    pub pending_transactions: Vec<Transaction>,
    pub last_poh: String,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    pub fn new() -> Self {
        let genesis_poh = sha256_hex(b"genesis");
        let genesis = Block {
            index: 0,
            previous_hash: zero_hash(),
            transactions: vec![],
            leader_id: GENESIS_LEADER.to_string(),
            poh: genesis_poh.clone(),
            validator_signatures: ValidatorSignatures::new(),
        };
        Self {
            blocks: vec![genesis],
            accounts: HashMap::new(),
            pending_transactions: Vec::new(),
            last_poh: genesis_poh,
        }
    }

    pub fn last_block(&self) -> &Block {
        self.blocks.last().expect("genesis block always present")
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or(0)
    }

    fn peek_next_poh(&self) -> String {
        sha256_hex(self.last_poh.as_bytes())
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        self.pending_transactions.push(tx);
        true
    }

    pub fn produce_block(&self, leader_id: &str) -> Block {
        Block {
            index: self.blocks.len() as u64,
            previous_hash: self.last_block().full_hash(),
            transactions: self.pending_transactions.clone(),
            leader_id: leader_id.to_string(),
            poh: self.peek_next_poh(),
            validator_signatures: ValidatorSignatures::new(),
        }
    }

    pub fn validate_block(&self, block: &Block) -> bool {
        block.previous_hash == self.last_block().full_hash() && block.poh == self.peek_next_poh()
    }

    pub fn add_external_block(&mut self, block: Block) -> bool {
        if !self.validate_block(&block) {
            warn!(index = block.index, "rejecting block: PoH/previous-hash mismatch");
            return false;
        }
        self.last_poh = block.poh.clone();
        for tx in &block.transactions {
            self.apply_transaction(tx);
        }
        let leader = block.leader_id.clone();
        self.blocks.push(block);
        self.pending_transactions.clear();
        credit(&mut self.accounts, &leader, BLOCK_REWARD);
        true
    }

    pub fn apply_transaction(&mut self, tx: &Transaction) {
        apply_transaction_to(&mut self.accounts, tx);
    }

    pub fn try_to_update_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.blocks.len() {
            return false;
        }
        let Some(replay) = replay_chain(&candidate) else {
            warn!("rejecting candidate chain: replay validation failed");
            return false;
        };
        self.blocks = candidate;
        self.accounts = replay.accounts;
        self.last_poh = replay.last_poh;
        self.pending_transactions.clear();
        true
    }
}

struct Replay {
    accounts: HashMap<Address, Account>,
    last_poh: String,
}

fn replay_chain(candidate: &[Block]) -> Option<Replay> {
    let mut accounts = HashMap::new();
    let mut last_poh = sha256_hex(b"genesis");

    let genesis = candidate.first()?;
    if genesis.index != 0
        || genesis.previous_hash != zero_hash()
        || genesis.leader_id != GENESIS_LEADER
        || genesis.poh != last_poh
    {
        return None;
    }

    for (i, block) in candidate.iter().enumerate().skip(1) {
        let previous = &candidate[i - 1];
        if block.index != i as u64 {
            return None;
        }
        if block.previous_hash != previous.full_hash() {
            return None;
        }
        let expected_poh = sha256_hex(last_poh.as_bytes());
        if block.poh != expected_poh {
            return None;
        }
        last_poh = block.poh.clone();

        for tx in &block.transactions {
            apply_transaction_to(&mut accounts, tx);
        }
        credit(&mut accounts, &block.leader_id, BLOCK_REWARD);
    }

    Some(Replay { accounts, last_poh })
}

fn apply_transaction_to(accounts: &mut HashMap<Address, Account>, tx: &Transaction) {
    for instr in &tx.instructions {
        if instr.program_id != SYSTEM_PROGRAM {
            continue;
        }
        if instr.accounts.len() < 2 {
            warn!("skipping SystemProgram instruction: fewer than 2 accounts");
            continue;
        }
        let parsed: serde_json::Value = match serde_json::from_str(&instr.data) {
            Ok(v) => v,
            Err(_) => {
                warn!("skipping SystemProgram instruction: data is not valid JSON");
                continue;
            }
        };
        let Some(map) = parsed.as_object() else {
            warn!("skipping SystemProgram instruction: data is not a JSON object");
            continue;
        };
        if map.get("type").and_then(|v| v.as_str()) != Some("transfer") {
            warn!("skipping SystemProgram instruction: unrecognized type");
            continue;
        }
        let Some(amount) = map.get("amount").and_then(|v| v.as_u64()) else {
            warn!("skipping SystemProgram instruction: amount missing or not an integer");
            continue;
        };

        let sender = instr.accounts[0].pubkey.clone();
        let receiver = instr.accounts[1].pubkey.clone();
        let sender_balance = accounts.get(&sender).map(|a| a.balance).unwrap_or(0);
        if sender_balance >= amount {
            accounts.entry(sender).or_default().balance -= amount;
            accounts.entry(receiver).or_default().balance += amount;
        }
    }
}

fn credit(accounts: &mut HashMap<Address, Account>, address: &str, amount: u64) {
    accounts.entry(address.to_string()).or_default().balance += amount;
}
