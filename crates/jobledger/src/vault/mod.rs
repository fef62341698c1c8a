//! Credential Vault: one reusable login per site domain.
//!
//! Secrets are stored through a [`SecretCodec`]. The default codec is
//! reversible base64 and gives no confidentiality at rest; configure a
//! vault encryption key to store them with [`EncryptedCodec`] instead.

mod codec;
mod domain;
mod locks;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

use crate::config::VaultConfig;
use crate::db::credential_repo::{self, CredentialRow};
use crate::db::{Database, DatabaseError};
use crate::secrets::{resolve_secret_optional, SecretError};

pub use codec::{Base64Codec, EncryptedCodec, SecretCodec};
pub use domain::normalize_domain;
pub use locks::DomainLocks;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No credential for domain: {0}")]
    NotFound(String),

    #[error("Secret codec error: {0}")]
    Codec(#[from] SecretError),

    #[error("Corrupt credential row '{domain}': {reason}")]
    CorruptRow { domain: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A stored login. `encoded_secret` is whatever the vault's codec produced;
/// use [`CredentialVault::reveal`] to get the plaintext.
#[derive(Clone, PartialEq)]
pub struct Credential {
    pub domain: String,
    pub username: String,
    pub encoded_secret: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("encoded_secret", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

impl Credential {
    fn from_row(row: CredentialRow) -> Result<Self, VaultError> {
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| VaultError::CorruptRow {
                    domain: row.domain.clone(),
                    reason: format!("bad timestamp '{}': {}", s, e),
                })
        };
        let created_at = parse(&row.created_date)?;
        let last_used_at = parse(&row.last_used)?;
        Ok(Self {
            domain: row.domain,
            username: row.username,
            encoded_secret: row.password,
            created_at,
            last_used_at,
        })
    }
}

/// Durable domain → credential map. Cloning shares the database and codec.
#[derive(Clone)]
pub struct CredentialVault {
    db: Database,
    codec: Arc<dyn SecretCodec>,
}

impl CredentialVault {
    /// A vault using the default, non-confidential [`Base64Codec`].
    pub fn new(db: Database) -> Self {
        Self::with_codec(db, Arc::new(Base64Codec))
    }

    pub fn with_codec(db: Database, codec: Arc<dyn SecretCodec>) -> Self {
        Self { db, codec }
    }

    /// Encrypts secrets when the config supplies a key, base64 otherwise.
    pub fn from_config(db: Database, config: &VaultConfig) -> Result<Self, VaultError> {
        let key = resolve_secret_optional(
            config.encryption_key.as_deref(),
            config.encryption_key_file.as_deref(),
            config.encryption_key_env.as_deref(),
        )?;
        let codec: Arc<dyn SecretCodec> = match key {
            Some(key) => Arc::new(EncryptedCodec::from_key(&key)?),
            None => {
                log::warn!("No vault encryption key configured; credentials are stored base64-encoded");
                Arc::new(Base64Codec)
            }
        };
        Ok(Self::with_codec(db, codec))
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    pub fn find(&self, domain: &str) -> Result<Option<Credential>, VaultError> {
        let domain = normalize_domain(domain)?;
        credential_repo::find(&self.db, &domain)?
            .map(Credential::from_row)
            .transpose()
    }

    /// Looks up the credential for a URL or domain.
    pub fn lookup(&self, domain: &str) -> Result<Credential, VaultError> {
        let normalized = normalize_domain(domain)?;
        self.find(&normalized)?
            .ok_or(VaultError::NotFound(normalized))
    }

    /// Stores a login for `domain`, replacing the username and secret of an
    /// existing one. `last_used_at` becomes now; `created_at` is kept.
    pub fn upsert(
        &self,
        domain: &str,
        username: &str,
        secret: &SecretString,
    ) -> Result<Credential, VaultError> {
        let encoded = self.codec.encode(secret)?;
        self.store(domain, username, encoded, Utc::now(), Utc::now())
    }

    /// Stores an already-encoded secret, e.g. rows from a credentials CSV.
    /// The secret must decode with this vault's codec.
    pub fn upsert_encoded(
        &self,
        domain: &str,
        username: &str,
        encoded_secret: &str,
        created_at: DateTime<Utc>,
        last_used_at: DateTime<Utc>,
    ) -> Result<Credential, VaultError> {
        self.codec.decode(encoded_secret)?;
        self.store(
            domain,
            username,
            encoded_secret.trim().to_string(),
            created_at,
            last_used_at,
        )
    }

    fn store(
        &self,
        domain: &str,
        username: &str,
        encoded_secret: String,
        created_at: DateTime<Utc>,
        last_used_at: DateTime<Utc>,
    ) -> Result<Credential, VaultError> {
        let domain = normalize_domain(domain)?;
        let username = username.trim();
        if username.is_empty() {
            return Err(VaultError::Validation(format!(
                "empty username for domain {}",
                domain
            )));
        }

        let row = CredentialRow {
            domain: domain.clone(),
            username: username.to_string(),
            password: encoded_secret,
            created_date: created_at.to_rfc3339(),
            last_used: last_used_at.to_rfc3339(),
        };
        credential_repo::upsert(&self.db, &row)?;
        log::info!("Stored credential for {}", domain);

        self.lookup(&domain)
    }

    /// Marks a credential as just used.
    pub fn touch(&self, domain: &str) -> Result<(), VaultError> {
        let domain = normalize_domain(domain)?;
        if !credential_repo::touch(&self.db, &domain, &Utc::now().to_rfc3339())? {
            return Err(VaultError::NotFound(domain));
        }
        log::debug!("Credential for {} reused", domain);
        Ok(())
    }

    /// Decodes the secret for presentation to the actuator.
    pub fn reveal(&self, credential: &Credential) -> Result<SecretString, VaultError> {
        Ok(self.codec.decode(&credential.encoded_secret)?)
    }

    /// All credentials, ordered by domain.
    pub fn list(&self) -> Result<Vec<Credential>, VaultError> {
        credential_repo::list(&self.db)?
            .into_iter()
            .map(Credential::from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn test_vault() -> CredentialVault {
        CredentialVault::new(Database::open_in_memory().expect("Failed to create test database"))
    }

    #[test]
    fn test_upsert_then_lookup_normalizes() {
        let vault = test_vault();
        vault
            .upsert(
                "https://www.Example.com/careers",
                "me@mail.com",
                &SecretString::from("pw1"),
            )
            .unwrap();

        let credential = vault.lookup("EXAMPLE.com").unwrap();
        assert_eq!(credential.domain, "example.com");
        assert_eq!(credential.username, "me@mail.com");
        assert_eq!(credential.encoded_secret, "cHcx");
        assert_eq!(vault.reveal(&credential).unwrap().expose_secret(), "pw1");
    }

    #[test]
    fn test_lookup_unknown_domain() {
        let vault = test_vault();
        assert!(matches!(
            vault.lookup("nowhere.org"),
            Err(VaultError::NotFound(d)) if d == "nowhere.org"
        ));
        assert!(vault.find("nowhere.org").unwrap().is_none());
    }

    #[test]
    fn test_second_upsert_replaces_material_and_keeps_created() {
        let vault = test_vault();
        let first = vault
            .upsert("example.com", "old", &SecretString::from("a"))
            .unwrap();
        let second = vault
            .upsert("example.com", "new", &SecretString::from("b"))
            .unwrap();

        assert_eq!(vault.list().unwrap().len(), 1);
        assert_eq!(second.username, "new");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.last_used_at >= first.last_used_at);
    }

    #[test]
    fn test_touch_updates_last_used_only() {
        let vault = test_vault();
        let before = vault
            .upsert("example.com", "me", &SecretString::from("pw"))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        vault.touch("https://example.com/login").unwrap();

        let after = vault.lookup("example.com").unwrap();
        assert!(after.last_used_at > before.last_used_at);
        assert_eq!(after.encoded_secret, before.encoded_secret);
        assert_eq!(after.username, before.username);

        assert!(matches!(vault.touch("unknown.io"), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_upsert_rejects_blank_username() {
        let vault = test_vault();
        let result = vault.upsert("example.com", "  ", &SecretString::from("pw"));
        assert!(matches!(result, Err(VaultError::Validation(_))));
    }

    #[test]
    fn test_encrypted_vault_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let codec = EncryptedCodec::from_key(&SecretString::from("0f".repeat(32))).unwrap();
        let vault = CredentialVault::with_codec(db, Arc::new(codec));

        let credential = vault
            .upsert("example.com", "me", &SecretString::from("pw"))
            .unwrap();
        assert_ne!(credential.encoded_secret, "cHc=");
        assert_eq!(vault.reveal(&credential).unwrap().expose_secret(), "pw");
        assert_eq!(vault.codec_name(), "aes-256-gcm");
    }

    #[test]
    fn test_upsert_encoded_checks_codec() {
        let vault = test_vault();
        let now = Utc::now();
        assert!(matches!(
            vault.upsert_encoded("example.com", "me", "%%%", now, now),
            Err(VaultError::Codec(_))
        ));
        let stored = vault
            .upsert_encoded("example.com", "me", "cHc=", now, now)
            .unwrap();
        assert_eq!(vault.reveal(&stored).unwrap().expose_secret(), "pw");
    }

    #[test]
    fn test_from_config_selects_codec() {
        let db = Database::open_in_memory().unwrap();
        let plain = CredentialVault::from_config(db.clone(), &VaultConfig::default()).unwrap();
        assert_eq!(plain.codec_name(), "base64");

        let keyed = VaultConfig {
            encryption_key: Some("ab".repeat(32)),
            ..Default::default()
        };
        let encrypted = CredentialVault::from_config(db.clone(), &keyed).unwrap();
        assert_eq!(encrypted.codec_name(), "aes-256-gcm");

        let bad = VaultConfig {
            encryption_key: Some("short".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            CredentialVault::from_config(db, &bad),
            Err(VaultError::Codec(SecretError::InvalidKey(_)))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let vault = test_vault();
        let credential = vault
            .upsert("example.com", "me", &SecretString::from("pw"))
            .unwrap();
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("cHc="));
        assert!(debug.contains("REDACTED"));
    }
}
