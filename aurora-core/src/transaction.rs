use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: String,
    pub accounts: Vec<AccountMeta>,
    pub data: String,
}

pub const SYSTEM_PROGRAM: &str = "SystemProgram";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub instructions: Vec<Instruction>,
    pub recent_blockhash: String,
    #[serde(default)]
    pub signatures: std::collections::BTreeMap<String, String>,
}

impl Transaction {
    pub fn new(instructions: Vec<Instruction>, recent_blockhash: String) -> Self {
        Self {
            instructions,
            recent_blockhash,
            signatures: Default::default(),
        }
    }

    pub fn hash(&self) -> String {
        let canonical = serde_json::json!({
            "instructions": self.instructions,
            "recent_blockhash": self.recent_blockhash,
        });
        let encoded = serde_json::to_string(&canonical).expect("transaction is serializable");
        let mut hasher = Sha256::new();
        hasher.update(encoded.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn sign(&mut self, private_b64: &str) -> Result<(), aurora_crypto::CryptoError> {
        let public_b64 = aurora_crypto::public_key_from_private(private_b64)?;
        let digest = self.hash();
        let signature_b64 = aurora_crypto::sign(private_b64, digest.as_bytes())?;
        self.signatures.insert(public_b64, signature_b64);
        Ok(())
    }

    pub fn verify(&self) -> bool {
        let digest = self.hash();
        self.signatures
            .iter()
            .all(|(pubkey, sig)| aurora_crypto::verify(pubkey, digest.as_bytes(), sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_instruction() -> Instruction {
        Instruction {
            program_id: SYSTEM_PROGRAM.to_string(),
            accounts: vec![
                AccountMeta {
                    pubkey: "a".repeat(64),
                    is_signer: true,
                    is_writable: true,
                },
                AccountMeta {
                    pubkey: "b".repeat(64),
                    is_signer: false,
                    is_writable: true,
                },
            ],
            data: r#"{"type":"transfer","amount":1}"#.to_string(),
        }
    }

    #[test]
    fn hash_is_independent_of_signature_insertion_order() {
        let mut tx_a = Transaction::new(vec![sample_instruction()], "f".repeat(64));
        let mut tx_b = tx_a.clone();

        let (sk1, _) = aurora_crypto::generate_keypair();
        let (sk2, _) = aurora_crypto::generate_keypair();

        tx_a.sign(&sk1).unwrap();
        tx_a.sign(&sk2).unwrap();

        tx_b.sign(&sk2).unwrap();
        tx_b.sign(&sk1).unwrap();

        assert_eq!(tx_a.hash(), tx_b.hash());
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let mut tx = Transaction::new(vec![sample_instruction()], "f".repeat(64));
        let (sk, _pk) = aurora_crypto::generate_keypair();
        tx.sign(&sk).unwrap();
        assert!(tx.verify());
    }

    #[test]
    fn empty_signatures_verify_true() {
        let tx = Transaction::new(vec![sample_instruction()], "f".repeat(64));
        assert!(tx.verify());
    }

    #[test]
    fn tampered_signature_fails_verify() {
        let mut tx = Transaction::new(vec![sample_instruction()], "f".repeat(64));
        let (sk, _pk) = aurora_crypto::generate_keypair();
        tx.sign(&sk).unwrap();
        for sig in tx.signatures.values_mut() {
            sig.push('x');
        }
        assert!(!tx.verify());
    }
}
