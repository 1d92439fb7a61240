use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes `HMAC-SHA256(shared_secret, timestamp + "." + body)` as
/// lowercase hex, per the webhook signature contract.
#[must_use]
pub fn sign(shared_secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    let mut mac = new_mac(shared_secret);
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a webhook signature. A malformed shared secret (too long for
/// `hmac`'s key ingestion, which never fails for `Hmac<Sha256>` in
/// practice) or a hex-decode failure on `signature_hex` both reject
/// without comparing any bytes. A length mismatch between the decoded
/// signature and the expected 32-byte digest is rejected before the
/// constant-time comparison runs, since the decoded length itself carries
/// no secret information — only the digest bytes do.
#[must_use]
pub fn verify(shared_secret: &[u8], timestamp: &str, body: &[u8], signature_hex: &str) -> bool {
    let mut mac = new_mac(shared_secret);
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    let Ok(provided) = hex::decode(signature_hex) else {
        return false;
    };
    if provided.len() != expected.len() {
        return false;
    }
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

fn new_mac(shared_secret: &[u8]) -> HmacSha256 {
    match HmacSha256::new_from_slice(shared_secret) {
        Ok(mac) => mac,
        // `Hmac<Sha256>` accepts any key length; this arm is unreachable.
        Err(_) => unreachable!("Hmac<Sha256> key ingestion cannot fail"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_accepts_a_freshly_signed_payload() {
        let secret = b"shared-secret";
        let timestamp = "1700000000";
        let body = br#"{"event_id":"evt_1","type":"transfer.completed","data":{}}"#;
        let signature = sign(secret, timestamp, body);
        assert!(verify(secret, timestamp, body, &signature));
    }

    #[test]
    fn verify_rejects_a_tampered_body() {
        let secret = b"shared-secret";
        let timestamp = "1700000000";
        let body = br#"{"event_id":"evt_1","type":"transfer.completed","data":{}}"#;
        let signature = sign(secret, timestamp, body);
        assert!(!verify(secret, timestamp, b"{}", &signature));
    }

    #[test]
    fn verify_rejects_a_shorter_signature() {
        let secret = b"shared-secret";
        let timestamp = "1700000000";
        let body = b"{}";
        let signature = sign(secret, timestamp, body);
        assert!(!verify(secret, timestamp, body, &signature[..signature.len() - 2]));
    }

    #[test]
    fn verify_rejects_non_hex_signature() {
        assert!(!verify(b"secret", "1700000000", b"{}", "not-hex-zz"));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let timestamp = "1700000000";
        let body = b"{}";
        let signature = sign(b"secret-a", timestamp, body);
        assert!(!verify(b"secret-b", timestamp, body, &signature));
    }
}
