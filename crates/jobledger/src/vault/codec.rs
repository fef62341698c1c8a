//! Reversible encodings for credential secrets at rest.
//!
//! [`Base64Codec`] is the default and provides NO confidentiality: anyone
//! who can read the ledger database can recover every password. Callers
//! that need secrecy configure an encryption key, which swaps in
//! [`EncryptedCodec`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};

use crate::secrets::{SecretError, VaultCipher};

/// Turns a plaintext secret into the stored `password` column and back.
pub trait SecretCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, secret: &SecretString) -> Result<String, SecretError>;

    fn decode(&self, encoded: &str) -> Result<SecretString, SecretError>;
}

/// Standard base64. Obfuscation only.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64Codec;

impl SecretCodec for Base64Codec {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn encode(&self, secret: &SecretString) -> Result<String, SecretError> {
        Ok(STANDARD.encode(secret.expose_secret().as_bytes()))
    }

    fn decode(&self, encoded: &str) -> Result<SecretString, SecretError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SecretError::DecryptionError(format!("Invalid base64: {}", e)))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid UTF-8: {}", e)))?;
        Ok(SecretString::from(text))
    }
}

/// AES-256-GCM with a key supplied from outside the ledger.
pub struct EncryptedCodec {
    cipher: VaultCipher,
}

impl EncryptedCodec {
    pub fn new(cipher: VaultCipher) -> Self {
        Self { cipher }
    }

    pub fn from_key(key: &SecretString) -> Result<Self, SecretError> {
        VaultCipher::from_secret(key).map(Self::new)
    }
}

impl SecretCodec for EncryptedCodec {
    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn encode(&self, secret: &SecretString) -> Result<String, SecretError> {
        self.cipher.seal(secret.expose_secret())
    }

    fn decode(&self, encoded: &str) -> Result<SecretString, SecretError> {
        self.cipher.open(encoded).map(SecretString::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_matches_legacy_encoding() {
        let codec = Base64Codec;
        let encoded = codec.encode(&SecretString::from("p@ssw0rd")).unwrap();
        assert_eq!(encoded, "cEBzc3cwcmQ=");
        assert_eq!(codec.decode(&encoded).unwrap().expose_secret(), "p@ssw0rd");
        assert!(codec.decode("%%%").is_err());
    }

    #[test]
    fn test_encrypted_codec_hides_plaintext() {
        let key = SecretString::from("42".repeat(32));
        let codec = EncryptedCodec::from_key(&key).unwrap();
        let encoded = codec.encode(&SecretString::from("p@ssw0rd")).unwrap();

        assert_ne!(encoded, Base64Codec.encode(&SecretString::from("p@ssw0rd")).unwrap());
        assert_eq!(codec.decode(&encoded).unwrap().expose_secret(), "p@ssw0rd");
        assert!(codec.decode("cEBzc3cwcmQ=").is_err());
    }
}
