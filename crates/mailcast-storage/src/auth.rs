use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Generate a 32-byte cryptographically random token.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    general_purpose::STANDARD.encode(token_bytes)
}

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
    Ok(hash)
}

/// Verify a password against its bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, hash)?)
}

/// Constant-time string comparison to prevent timing side-channel attacks.
/// Always compares all bytes regardless of mismatch position.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Signer for single-purpose account tokens (activation links, password
/// resets), HMAC-SHA256 over `user_id:purpose:expiry`.
///
/// Tokens are `<expiry-unix-ts>.<base64url-mac>`. The MAC binds the token
/// to one user and one purpose, so an activation token cannot be replayed
/// as a reset token.
pub struct TokenSigner {
    key_bytes: Vec<u8>,
}

impl TokenSigner {
    /// Load the signing key from the data directory, generating one on
    /// first start.
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        let key_path = data_dir.join("signing.key");
        let key_bytes = if key_path.exists() {
            std::fs::read(&key_path)?
        } else {
            let mut rng = rand::thread_rng();
            let key: [u8; 32] = rng.gen();
            std::fs::write(&key_path, key)?;
            // Restrict file permissions to owner-only (0600) on Unix
            #[cfg(unix)]
            {
                let perms = std::fs::Permissions::from_mode(0o600);
                std::fs::set_permissions(&key_path, perms)?;
            }
            tracing::info!(path = %key_path.display(), "Generated new token signing key");
            key.to_vec()
        };

        if key_bytes.len() != 32 {
            anyhow::bail!(
                "Invalid token signing key length: expected 32 bytes, got {}",
                key_bytes.len()
            );
        }

        Ok(Self { key_bytes })
    }

    fn mac_for(&self, user_id: &str, purpose: &str, expires_ts: i64) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key_bytes)
            .map_err(|_| anyhow::anyhow!("Invalid signing key"))?;
        mac.update(user_id.as_bytes());
        mac.update(b":");
        mac.update(purpose.as_bytes());
        mac.update(b":");
        mac.update(expires_ts.to_string().as_bytes());
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Sign a token for the given user and purpose, valid until
    /// `expires_at`.
    pub fn sign(&self, user_id: &str, purpose: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let ts = expires_at.timestamp();
        let mac = self.mac_for(user_id, purpose, ts)?;
        Ok(format!("{ts}.{mac}"))
    }

    /// Verify a token: well-formed, unexpired, and MAC matches for this
    /// user and purpose.
    pub fn verify(&self, user_id: &str, purpose: &str, token: &str) -> bool {
        let Some((ts_str, mac)) = token.split_once('.') else {
            return false;
        };
        let Ok(ts) = ts_str.parse::<i64>() else {
            return false;
        };
        if Utc::now().timestamp() > ts {
            return false;
        }
        match self.mac_for(user_id, purpose, ts) {
            Ok(expected) => constant_time_eq(&expected, mac),
            Err(_) => false,
        }
    }
}
