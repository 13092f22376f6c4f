//! Password digests.

/// Context string for deriving the password hashing key from the application secret.
const KEY_CONTEXT: &str = "cmdb-auth 2026-10 local password digest";

/// Computes and compares keyed password digests.
pub trait CredentialVerifier: Send + Sync {
    /// Deterministic digest of `password`, hex encoded.
    fn hash(&self, password: &str) -> String;

    /// Compare `password` against a stored digest.
    fn verify(&self, password: &str, stored: &str) -> bool {
        self.hash(password).as_bytes() == stored.as_bytes()
    }
}

/// BLAKE3 keyed-hash verifier.
pub struct KeyedHashVerifier {
    key: [u8; 32],
}

impl KeyedHashVerifier {
    /// Create a verifier from a raw 32-byte key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the key from an application secret of any length.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::new(blake3::derive_key(KEY_CONTEXT, secret))
    }
}

impl CredentialVerifier for KeyedHashVerifier {
    fn hash(&self, password: &str) -> String {
        blake3::keyed_hash(&self.key, password.as_bytes())
            .to_hex()
            .to_string()
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Ok(expected) = blake3::Hash::from_hex(stored) else {
            return false;
        };
        // blake3::Hash equality is constant time
        blake3::keyed_hash(&self.key, password.as_bytes()) == expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let verifier = KeyedHashVerifier::from_secret(b"secret");
        assert_eq!(verifier.hash("pw"), verifier.hash("pw"));
        assert_ne!(verifier.hash("pw"), verifier.hash("pw2"));
        assert_eq!(verifier.hash("pw").len(), 64);
    }

    #[test]
    fn test_key_changes_digest() {
        let a = KeyedHashVerifier::from_secret(b"one");
        let b = KeyedHashVerifier::from_secret(b"two");
        assert_ne!(a.hash("pw"), b.hash("pw"));
    }

    #[test]
    fn test_verify() {
        let verifier = KeyedHashVerifier::from_secret(b"secret");
        let stored = verifier.hash("hunter2");

        assert!(verifier.verify("hunter2", &stored));
        assert!(!verifier.verify("hunter3", &stored));
        assert!(!verifier.verify("hunter2", ""));
        assert!(!verifier.verify("hunter2", "not-hex"));
    }
}
