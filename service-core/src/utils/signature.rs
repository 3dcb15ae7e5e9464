use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign_hex(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload.as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify a hex HMAC-SHA256 signature using constant-time comparison
pub fn verify_hex(secret: &str, payload: &str, signature: &str) -> Result<bool, anyhow::Error> {
    let expected_signature = sign_hex(secret, payload)?;

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = signature.trim().to_ascii_lowercase();
    let signature_bytes = signature_bytes.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

/// Constant-time equality for short secrets such as one-time codes.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_generation_and_verification() {
        let secret = "my_secret_key";
        let payload = "order_123|pay_456";

        let signature = sign_hex(secret, payload).unwrap();
        assert_eq!(signature.len(), 64);

        assert!(verify_hex(secret, payload, &signature).unwrap());
        assert!(verify_hex(secret, payload, &signature.to_uppercase()).unwrap());
    }

    #[test]
    fn test_invalid_signature() {
        let secret = "my_secret_key";
        let payload = "order_123|pay_456";

        let signature = sign_hex(secret, payload).unwrap();
        let flipped = if signature.starts_with('a') { "b" } else { "a" };
        let invalid_signature = format!("{}{}", flipped, &signature[1..]);

        assert!(!verify_hex(secret, payload, &invalid_signature).unwrap());
        assert!(!verify_hex(secret, payload, "short").unwrap());
    }

    #[test]
    fn test_tampered_payload() {
        let secret = "my_secret_key";
        let signature = sign_hex(secret, "order_123|pay_456").unwrap();

        assert!(!verify_hex(secret, "order_123|pay_457", &signature).unwrap());
        assert!(!verify_hex("other_secret", "order_123|pay_456", &signature).unwrap());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("0420", "0420"));
        assert!(!constant_time_eq("0420", "0421"));
        assert!(!constant_time_eq("0420", "042"));
    }
}
