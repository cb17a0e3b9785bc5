use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

const RAW_POINT_LEN: usize = 64;
const RAW_SCALAR_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("malformed private key")]
    PrivateKey,
    #[error("malformed public key")]
    PublicKey,
}

fn b64_encode(bytes: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

fn b64_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        s,
    )?)
}

fn raw_public_point(vk: &VerifyingKey) -> [u8; RAW_POINT_LEN] {
    let uncompressed = vk.to_encoded_point(false);
    let bytes = uncompressed.as_bytes();
    let mut out = [0u8; RAW_POINT_LEN];
    out.copy_from_slice(&bytes[1..]);
    out
}

fn verifying_key_from_raw(raw: &[u8]) -> Result<VerifyingKey, CryptoError> {
    if raw.len() != RAW_POINT_LEN {
        return Err(CryptoError::PublicKey);
    }
    let mut sec1 = [0u8; 1 + RAW_POINT_LEN];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(raw);
    VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| CryptoError::PublicKey)
}

fn signing_key_from_raw(raw: &[u8]) -> Result<SigningKey, CryptoError> {
    if raw.len() != RAW_SCALAR_LEN {
        return Err(CryptoError::PrivateKey);
    }
    SigningKey::from_slice(raw).map_err(|_| CryptoError::PrivateKey)
}

pub fn generate_keypair() -> (String, String) {
    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = VerifyingKey::from(&signing_key);
    let private_b64 = b64_encode(&signing_key.to_bytes());
    let public_b64 = b64_encode(&raw_public_point(&verifying_key));
    (private_b64, public_b64)
}

pub fn sign(private_b64: &str, message: &[u8]) -> Result<String, CryptoError> {
    let raw = b64_decode(private_b64)?;
    let signing_key = signing_key_from_raw(&raw)?;
    let signature: Signature = signing_key.sign(message);
    Ok(b64_encode(&signature.to_bytes()))
}

pub fn verify(public_b64: &str, message: &[u8], signature_b64: &str) -> bool {
    let result: Result<bool, CryptoError> = (|| {
        let pk_raw = b64_decode(public_b64)?;
        let verifying_key = verifying_key_from_raw(&pk_raw)?;
        let sig_raw = b64_decode(signature_b64)?;
        let signature = Signature::from_slice(&sig_raw).map_err(|_| CryptoError::PublicKey)?;
        Ok(verifying_key.verify(message, &signature).is_ok())
    })();
    result.unwrap_or(false)
}

pub fn public_key_from_private(private_b64: &str) -> Result<String, CryptoError> {
    let raw = b64_decode(private_b64)?;
    let signing_key = signing_key_from_raw(&raw)?;
    let verifying_key = VerifyingKey::from(&signing_key);
    Ok(b64_encode(&raw_public_point(&verifying_key)))
}

pub fn address(public_b64: &str) -> Result<String, CryptoError> {
    let raw = b64_decode(public_b64)?;
    if raw.len() != RAW_POINT_LEN {
        return Err(CryptoError::PublicKey);
    }
    let mut hasher = Sha256::new();
    hasher.update(&raw);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let (sk, pk) = generate_keypair();
        let msg = b"hello aurora";
        let sig = sign(&sk, msg).unwrap();
        assert!(verify(&pk, msg, &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let (sk, _pk) = generate_keypair();
        let (_other_sk, other_pk) = generate_keypair();
        let msg = b"hello aurora";
        let sig = sign(&sk, msg).unwrap();
        assert!(!verify(&other_pk, msg, &sig));
    }

    #[test]
    fn verify_rejects_malformed_signature_without_panicking() {
        let (_sk, pk) = generate_keypair();
        assert!(!verify(&pk, b"msg", "not-base64!!"));
        assert!(!verify(&pk, b"msg", "aGVsbG8=")); // valid base64, wrong length
    }

    #[test]
    fn address_is_64_hex_chars() {
        let (_sk, pk) = generate_keypair();
        let addr = address(&pk).unwrap();
        assert_eq!(addr.len(), 64);
        assert!(addr.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn address_is_deterministic() {
        let (_sk, pk) = generate_keypair();
        assert_eq!(address(&pk).unwrap(), address(&pk).unwrap());
    }
}
