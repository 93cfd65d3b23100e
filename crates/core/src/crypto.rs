//! Signature verification, canonical message construction, and address
//! hashing (`spec.md` §4.1, §4.3, GLOSSARY).

use sha2::{Digest, Sha256};

/// Builds the canonical message a copayer signs for request authentication:
/// `method | url | body`, pipe-joined exactly as `spec.md` §4.1 specifies.
pub fn canonical_request_message(method: &str, url: &str, body: &str) -> Vec<u8> {
    format!("{method}|{url}|{body}").into_bytes()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Verifies `signature` over `message` under `pubkey`, using secp256k1
/// ECDSA and a SHA-256 message digest.
pub fn verify_signature(pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let secp = secp256k1::Secp256k1::verification_only();
    let Ok(pk) = secp256k1::PublicKey::from_slice(pubkey) else {
        return false;
    };
    let Ok(sig) = secp256k1::ecdsa::Signature::from_compact(signature) else {
        return false;
    };
    let digest = sha256(message);
    let Ok(msg) = secp256k1::Message::from_digest_slice(&digest) else {
        return false;
    };
    secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
}

/// Copayer id is the hash of its extended public key (`spec.md` §3).
pub fn copayer_id_from_xpub(xpub: &str) -> String {
    hex::encode(sha256(xpub.as_bytes()))
}

/// RFC-4648 base32 encoding without padding, used for the address string.
/// Hand-rolled because the address format is domain logic, not an ambient
/// concern — see the teacher's own hand-written `AssetPath` parser for the
/// same texture.
pub fn base32_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = (buffer >> bits_in_buffer) & 0x1f;
            out.push(ALPHABET[index as usize] as char);
        }
    }
    if bits_in_buffer > 0 {
        let index = (buffer << (5 - bits_in_buffer)) & 0x1f;
        out.push(ALPHABET[index as usize] as char);
    }
    out
}

/// Derives a bech32-like address string from a canonical definition: the
/// first 16 bytes of `sha256(sha256(definition))`, base32-encoded.
/// Deterministic across calls and implementations for a given definition
/// (`spec.md` §8 "Determinism").
pub fn address_from_definition(definition: &str) -> String {
    let once = sha256(definition.as_bytes());
    let twice = sha256(&once);
    base32_encode(&twice[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_derivation_is_deterministic() {
        let a = address_from_definition("[sig,PUBKEY]");
        let b = address_from_definition("[sig,PUBKEY]");
        assert_eq!(a, b);
    }

    #[test]
    fn different_definitions_yield_different_addresses() {
        let a = address_from_definition("[sig,PUBKEY1]");
        let b = address_from_definition("[sig,PUBKEY2]");
        assert_ne!(a, b);
    }

    #[test]
    fn copayer_id_is_stable_hash_of_xpub() {
        let id1 = copayer_id_from_xpub("xpub123");
        let id2 = copayer_id_from_xpub("xpub123");
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 64); // hex-encoded sha256
    }

    #[test]
    fn signature_roundtrip_verifies() {
        let secp = secp256k1::Secp256k1::new();
        let (sk, pk) = secp.generate_keypair(&mut rand::thread_rng());
        let message = canonical_request_message("POST", "/wallets", "{}");
        let digest = sha256(&message);
        let msg = secp256k1::Message::from_digest_slice(&digest).unwrap();
        let sig = secp.sign_ecdsa(&msg, &sk);
        assert!(verify_signature(
            &pk.serialize(),
            &message,
            &sig.serialize_compact()
        ));
    }
}
