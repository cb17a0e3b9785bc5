use std::fs;
use std::path::Path;

use aurora_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet file not found: {0}")]
    NotFound(String),
    #[error("wallet I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wallet key error: {0}")]
    Key(#[from] CryptoError),
}

pub fn load_wallet(path: impl AsRef<Path>) -> Result<String, WalletError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(WalletError::NotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?.trim().to_string())
}

pub fn save_wallet(path: impl AsRef<Path>, private_key_b64: &str) -> Result<(), WalletError> {
    fs::write(path, private_key_b64)?;
    Ok(())
}

pub fn generate_and_save(path: impl AsRef<Path>) -> Result<String, WalletError> {
    let (private_key_b64, _public_key_b64) = aurora_crypto::generate_keypair();
    save_wallet(path, &private_key_b64)?;
    Ok(private_key_b64)
}

pub fn address_of(private_key_b64: &str) -> Result<String, WalletError> {
    let public_key_b64 = aurora_crypto::public_key_from_private(private_key_b64)?;
    Ok(aurora_crypto::address(&public_key_b64)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_wallet_file_is_not_found() {
        let path = std::env::temp_dir().join("aurora-wallet-test-missing.txt");
        let _ = fs::remove_file(&path);
        assert!(matches!(load_wallet(&path), Err(WalletError::NotFound(_))));
    }

    #[test]
    fn generate_save_and_load_round_trips() {
        let path = std::env::temp_dir().join("aurora-wallet-test-roundtrip.txt");
        let generated = generate_and_save(&path).unwrap();
        let loaded = load_wallet(&path).unwrap();
        assert_eq!(generated, loaded);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn address_of_is_deterministic() {
        let path = std::env::temp_dir().join("aurora-wallet-test-address.txt");
        let key = generate_and_save(&path).unwrap();
        assert_eq!(address_of(&key).unwrap(), address_of(&key).unwrap());
        fs::remove_file(&path).unwrap();
    }
}
