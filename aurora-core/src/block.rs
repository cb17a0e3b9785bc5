use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::transaction::Transaction;
use crate::Address;

pub const GENESIS_LEADER: &str = "genesis";

pub fn zero_hash() -> String {
    "0".repeat(64)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorSignatures(Vec<(Address, String)>);

impl ValidatorSignatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, address: Address, signature: String) {
        if let Some(entry) = self.0.iter_mut().find(|(a, _)| *a == address) {
            entry.1 = signature;
        } else {
            self.0.push((address, signature));
        }
    }

    pub fn keys_in_order(&self) -> impl Iterator<Item = &Address> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &String)> {
        self.0.iter().map(|(k, v)| (k, v))
    }
}

impl Serialize for ValidatorSignatures {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ValidatorSignatures {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;
        impl<'de> Visitor<'de> for MapVisitor {
            type Value = ValidatorSignatures;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of address to signature")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    out.push((k, v));
                }
                Ok(ValidatorSignatures(out))
            }
        }
        deserializer.deserialize_map(MapVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
    pub leader_id: Address,
    pub poh: String,
    pub validator_signatures: ValidatorSignatures,
}

impl Block {
    fn txs_hash(&self) -> String {
        let mut concatenated = String::new();
        for tx in &self.transactions {
            concatenated.push_str(&tx.hash());
        }
        sha256_hex(concatenated.as_bytes())
    }

    pub fn content_hash(&self) -> String {
        let raw = format!(
            "{}{}{}{}{}",
            self.index,
            self.previous_hash,
            self.leader_id,
            self.poh,
            self.txs_hash()
        );
        sha256_hex(raw.as_bytes())
    }

    pub fn full_hash(&self) -> String {
        let mut raw = format!(
            "{}{}{}{}{}",
            self.index,
            self.previous_hash,
            self.leader_id,
            self.poh,
            self.txs_hash()
        );
        for key in self.validator_signatures.keys_in_order() {
            raw.push_str(key);
        }
        sha256_hex(raw.as_bytes())
    }

    pub fn add_signature(&mut self, address: Address, signature: String) {
        self.validator_signatures.insert(address, signature);
    }
}
