//! Cryptographic primitives for the PayPay gateway protocol.
//!
//! The gateway uses an unusual RSA convention inherited from its reference
//! implementation: the business payload is "encrypted" with the merchant's
//! *private* key (PKCS#1 v1.5 signature-style padding, 117-byte chunks) and
//! requests are signed with SHA1-RSA over a canonical `key=value&...` string.
//! Anyone holding the merchant's public key can recover the payload, so the
//! scheme authenticates rather than hides; this module implements it exactly
//! as the gateway expects.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use rand::RngCore;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign};
use sha1::{Digest, Sha1};

use crate::errors::{PayPayError, Result};
use crate::keys::KeyMaterial;

/// Maximum plaintext bytes per RSA block.
///
/// PKCS#1 v1.5 padding consumes 11 bytes of a 128-byte (1024-bit) block.
pub const ENCRYPT_CHUNK_SIZE: usize = 117;

/// Builds the canonical signing string from request or response parameters.
///
/// `sign` and `sign_type` are excluded, the remaining keys are sorted
/// byte-wise (locale independent), and pairs are joined as
/// `key=value&key=value` over the *raw* values. Both sides of the protocol
/// must derive the identical string, so this runs before any URL encoding.
///
/// # Examples
///
/// ```
/// use paypay_ao::crypto::canonicalize;
///
/// let params = vec![
///     ("service".to_string(), "instant_trade".to_string()),
///     ("charset".to_string(), "UTF-8".to_string()),
///     ("sign".to_string(), "ignored".to_string()),
/// ];
/// assert_eq!(canonicalize(&params), "charset=UTF-8&service=instant_trade");
/// ```
pub fn canonicalize(params: &[(String, String)]) -> String {
    let mut filtered: Vec<&(String, String)> = params
        .iter()
        .filter(|(key, _)| key.as_str() != "sign" && key.as_str() != "sign_type")
        .collect();
    filtered.sort_by(|a, b| a.0.cmp(&b.0));
    filtered
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encrypts a serialized biz content payload with the merchant private key.
///
/// The UTF-8 bytes are split into chunks of [`ENCRYPT_CHUNK_SIZE`], each
/// chunk goes through the raw RSA private-key operation with PKCS#1 v1.5
/// type-01 padding, and the concatenated blocks are base64 encoded.
///
/// # Arguments
///
/// * `plaintext` - The JSON biz content to encrypt
/// * `key` - Merchant private key material
pub fn encrypt_biz_content(plaintext: &str, key: &KeyMaterial) -> Result<String> {
    let private = key.private_key()?;
    let mut encrypted = Vec::new();
    for chunk in plaintext.as_bytes().chunks(ENCRYPT_CHUNK_SIZE) {
        let block = private
            .sign(Pkcs1v15Sign::new_unprefixed(), chunk)
            .map_err(|e| PayPayError::Crypto(format!("biz content encryption failed: {e}")))?;
        encrypted.extend_from_slice(&block);
    }
    Ok(BASE64.encode(encrypted))
}

/// Recovers a payload produced by [`encrypt_biz_content`] using the
/// matching public key.
///
/// The gateway performs this on its side; the client exposes it for
/// response payloads and for verifying its own output.
///
/// # Arguments
///
/// * `encrypted_b64` - Base64 ciphertext, a whole number of RSA blocks
/// * `key` - Public key material matching the encrypting private key
pub fn decrypt_with_public_key(encrypted_b64: &str, key: &KeyMaterial) -> Result<String> {
    let public = key.public_key()?;
    let ciphertext = BASE64.decode(encrypted_b64)?;
    let block_size = public.size();
    if ciphertext.is_empty() || ciphertext.len() % block_size != 0 {
        return Err(PayPayError::Crypto(format!(
            "encrypted payload length {} is not a multiple of the {block_size}-byte block size",
            ciphertext.len()
        )));
    }

    let mut plaintext = Vec::new();
    for block in ciphertext.chunks(block_size) {
        let c = BigUint::from_bytes_be(block);
        if c >= *public.n() {
            return Err(PayPayError::Crypto(
                "ciphertext block out of range for the key modulus".to_string(),
            ));
        }
        let m = c.modpow(public.e(), public.n());
        let mut em = m.to_bytes_be();
        if em.len() < block_size {
            let mut padded = vec![0u8; block_size - em.len()];
            padded.extend_from_slice(&em);
            em = padded;
        }
        plaintext.extend_from_slice(strip_type1_padding(&em)?);
    }

    String::from_utf8(plaintext)
        .map_err(|_| PayPayError::Crypto("decrypted payload is not valid UTF-8".to_string()))
}

/// Signs request parameters with SHA1-RSA.
///
/// The canonical string from [`canonicalize`] is SHA-1 digested and signed
/// with PKCS#1 v1.5. The output is deterministic for identical parameters
/// and key.
///
/// # Arguments
///
/// * `params` - The complete parameter set; `sign`/`sign_type` are ignored
/// * `key` - Merchant private key material
pub fn sign_params(params: &[(String, String)], key: &KeyMaterial) -> Result<String> {
    let private = key.private_key()?;
    let canonical = canonicalize(params);
    let digest = Sha1::digest(canonical.as_bytes());
    let signature = private
        .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
        .map_err(|e| PayPayError::Crypto(format!("signing failed: {e}")))?;
    Ok(BASE64.encode(signature))
}

/// Verifies a SHA1-RSA signature over the given parameters.
///
/// Rebuilds the canonical string exactly as [`sign_params`] does and checks
/// the signature against the counterparty public key. Malformed input of
/// any kind (bad base64, wrong key flavor, cleared key) verifies as
/// `false`; this function never fails.
pub fn verify_params(params: &[(String, String)], signature_b64: &str, key: &KeyMaterial) -> bool {
    let Ok(public) = key.public_key() else {
        return false;
    };
    let Ok(signature) = BASE64.decode(signature_b64) else {
        return false;
    };
    let canonical = canonicalize(params);
    let digest = Sha1::digest(canonical.as_bytes());
    public
        .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &signature)
        .is_ok()
}

/// Generates a fresh request id: 16 random bytes as 32 lowercase hex chars.
///
/// # Examples
///
/// ```
/// use paypay_ao::crypto::generate_request_no;
///
/// let request_no = generate_request_no();
/// assert_eq!(request_no.len(), 32);
/// assert!(request_no.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn generate_request_no() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Current time in the gateway's zone (UTC+1), as `YYYY-MM-DD HH:mm:ss`.
///
/// # Examples
///
/// ```
/// use paypay_ao::crypto::gateway_timestamp;
///
/// let ts = gateway_timestamp();
/// assert_eq!(ts.len(), 19);
/// ```
pub fn gateway_timestamp() -> String {
    (Utc::now() + Duration::hours(1))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Strips EMSA-PKCS1-v1_5 type-01 padding: `00 01 FF..FF 00 payload`.
fn strip_type1_padding(em: &[u8]) -> Result<&[u8]> {
    let malformed = || PayPayError::Crypto("invalid padding in encrypted block".to_string());
    if em.len() < 11 || em[0] != 0x00 || em[1] != 0x01 {
        return Err(malformed());
    }
    let mut idx = 2;
    while idx < em.len() && em[idx] == 0xff {
        idx += 1;
    }
    // at least eight padding bytes, then the 0x00 separator
    if idx < 10 || idx >= em.len() || em[idx] != 0x00 {
        return Err(malformed());
    }
    Ok(&em[idx + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyKind;
    use chrono::NaiveDateTime;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use std::sync::OnceLock;

    static TEST_PEMS: OnceLock<(String, String)> = OnceLock::new();

    fn test_keys() -> (KeyMaterial, KeyMaterial) {
        let (private_pem, public_pem) = TEST_PEMS.get_or_init(|| {
            let mut rng = rand::thread_rng();
            let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
            let public = RsaPublicKey::from(&private);
            (
                private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
                public.to_public_key_pem(LineEnding::LF).unwrap(),
            )
        });
        (
            KeyMaterial::from_pem(private_pem, KeyKind::Private).unwrap(),
            KeyMaterial::from_pem(public_pem, KeyKind::Public).unwrap(),
        )
    }

    fn sample_params() -> Vec<(String, String)> {
        vec![
            ("service".to_string(), "instant_trade".to_string()),
            ("charset".to_string(), "UTF-8".to_string()),
            ("partner_id".to_string(), "200001234567".to_string()),
            ("sign_type".to_string(), "RSA".to_string()),
            ("sign".to_string(), "should-not-appear".to_string()),
            ("version".to_string(), "1.0".to_string()),
        ]
    }

    #[test]
    fn test_canonicalize_sorts_and_filters() {
        let canonical = canonicalize(&sample_params());
        assert_eq!(
            canonical,
            "charset=UTF-8&partner_id=200001234567&service=instant_trade&version=1.0"
        );
        assert!(!canonical.contains("sign"));
    }

    #[test]
    fn test_canonicalize_uses_raw_values() {
        let params = vec![
            ("b".to_string(), "with space".to_string()),
            ("a".to_string(), "a/b+c".to_string()),
        ];
        // values go in unencoded; encoding happens only at the transport
        assert_eq!(canonicalize(&params), "a=a/b+c&b=with space");
    }

    #[test]
    fn test_request_no_format() {
        let a = generate_request_no();
        let b = generate_request_no();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_ne!(a, b);
    }

    #[test]
    fn test_gateway_timestamp_is_utc_plus_one() {
        let ts = gateway_timestamp();
        let parsed = NaiveDateTime::parse_from_str(&ts, "%Y-%m-%d %H:%M:%S").unwrap();
        let expected = (Utc::now() + Duration::hours(1)).naive_utc();
        let drift = (expected - parsed).num_seconds().abs();
        assert!(drift <= 5, "timestamp drifted {drift}s from UTC+1");
    }

    #[test]
    fn test_signature_is_deterministic() {
        let (private, _) = test_keys();
        let params = sample_params();
        let first = sign_params(&params, &private).unwrap();
        let second = sign_params(&params, &private).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let (private, public) = test_keys();
        let params = sample_params();
        let signature = sign_params(&params, &private).unwrap();
        assert!(verify_params(&params, &signature, &public));

        // the signature covers the values, so any change must break it
        let mut tampered = params.clone();
        tampered[0].1 = "trade_close".to_string();
        assert!(!verify_params(&tampered, &signature, &public));
    }

    #[test]
    fn test_verify_rejects_corrupt_signature() {
        let (private, public) = test_keys();
        let params = sample_params();
        let signature = sign_params(&params, &private).unwrap();

        let mut bytes = BASE64.decode(&signature).unwrap();
        bytes[0] ^= 0x01;
        let corrupt = BASE64.encode(bytes);
        assert!(!verify_params(&params, &corrupt, &public));
    }

    #[test]
    fn test_verify_returns_false_on_malformed_input() {
        let (private, public) = test_keys();
        let params = sample_params();

        assert!(!verify_params(&params, "!!!not-base64!!!", &public));
        assert!(!verify_params(&params, "", &public));
        // a private key is the wrong flavor for verification
        assert!(!verify_params(&params, "AAAA", &private));
    }

    #[test]
    fn test_encrypt_decrypt_round_trip_at_chunk_boundaries() {
        let (private, public) = test_keys();

        for len in [117usize, 118, 300] {
            let payload: String = "a".repeat(len);
            let encrypted = encrypt_biz_content(&payload, &private).unwrap();
            let decrypted = decrypt_with_public_key(&encrypted, &public).unwrap();
            assert_eq!(decrypted, payload, "round trip failed for {len} bytes");
        }
    }

    #[test]
    fn test_encrypt_decrypt_real_biz_content() {
        let (private, public) = test_keys();
        let biz = r#"{"cashier_type":"SDK","payer_ip":"102.140.65.1","trade_info":{"currency":"AOA","out_trade_no":"ORDER-001","total_amount":"2500.00"}}"#;
        let encrypted = encrypt_biz_content(biz, &private).unwrap();
        assert_eq!(decrypt_with_public_key(&encrypted, &public).unwrap(), biz);
    }

    #[test]
    fn test_decrypt_rejects_truncated_ciphertext() {
        let (private, public) = test_keys();
        let encrypted = encrypt_biz_content("payload", &private).unwrap();
        let mut bytes = BASE64.decode(&encrypted).unwrap();
        bytes.truncate(bytes.len() - 1);
        let err = decrypt_with_public_key(&BASE64.encode(bytes), &public).unwrap_err();
        assert!(matches!(err, PayPayError::Crypto(_)));
    }

    #[test]
    fn test_cleared_key_fails_fast() {
        let (private, public) = test_keys();
        private.clear();

        let err = encrypt_biz_content("payload", &private).unwrap_err();
        assert!(err.to_string().contains("cleared"));
        let err = sign_params(&sample_params(), &private).unwrap_err();
        assert!(err.to_string().contains("cleared"));

        public.clear();
        assert!(!verify_params(&sample_params(), "AAAA", &public));
    }
}
