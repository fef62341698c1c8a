//! Secret resolution and the optional vault encryption key.
//!
//! A secret can be configured three ways, tried in this order:
//!
//! 1. **Direct value** - `encryption_key: "…"` (local testing only)
//! 2. **File reference** - `encryption_key_file: /run/secrets/vault_key`
//! 3. **Env var reference** - `encryption_key_env: JOBLEDGER_VAULT_KEY`

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use std::fs;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first non-empty source: direct value, then
/// file contents (trimmed, `~` expanded), then environment variable.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return fs::read_to_string(&expanded)
            .map(|content| SecretString::from(content.trim().to_string()))
            .map_err(|source| SecretError::FileReadError {
                path: expanded,
                source,
            });
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but an unconfigured secret is `Ok(None)`.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands a leading `~` or `~/` to the user's home directory.
/// `~user/...` is not supported.
pub fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

// ============================================
// Vault encryption
// ============================================

/// Marks an encrypted value in the credentials `password` column.
pub const CIPHERTEXT_PREFIX: &str = "enc:v1:";

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for stored credential secrets.
///
/// Keyed by 64 hex characters. A sealed value is [`CIPHERTEXT_PREFIX`]
/// followed by base64 of `<nonce><ciphertext+tag>`, with a fresh random
/// nonce per call.
pub struct VaultCipher {
    cipher: Aes256Gcm,
}

impl VaultCipher {
    pub fn from_secret(key: &SecretString) -> Result<Self> {
        let key = parse_hex_key(key.expose_secret().trim())?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SecretError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce)
            .map_err(|e| SecretError::EncryptionError(format!("no randomness available: {}", e)))?;

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&sealed);
        Ok(format!("{}{}", CIPHERTEXT_PREFIX, STANDARD.encode(payload)))
    }

    pub fn open(&self, stored: &str) -> Result<String> {
        let encoded = stored
            .trim()
            .strip_prefix(CIPHERTEXT_PREFIX)
            .ok_or_else(|| SecretError::DecryptionError("value is not encrypted".to_string()))?;
        let payload = STANDARD
            .decode(encoded)
            .map_err(|e| SecretError::DecryptionError(format!("invalid base64: {}", e)))?;
        if payload.len() <= NONCE_LEN {
            return Err(SecretError::DecryptionError("value is truncated".to_string()));
        }

        let (nonce, sealed) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| SecretError::DecryptionError("wrong key or corrupted value".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|e| SecretError::DecryptionError(format!("invalid UTF-8: {}", e)))
    }
}

fn parse_hex_key(hex: &str) -> Result<[u8; 32]> {
    if hex.len() != 64 || !hex.is_ascii() {
        return Err(SecretError::InvalidKey(format!(
            "expected 64 hex characters, got {}",
            hex.chars().count()
        )));
    }
    let mut key = [0u8; 32];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|_| {
            SecretError::InvalidKey(format!("non-hex character at position {}", 2 * i))
        })?;
    }
    Ok(key)
}
