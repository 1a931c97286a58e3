use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;
use crate::error::AppError;

/// Argon2id hashing with the configured cost.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(cfg: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash_password(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// The cost parameters are read from the PHC string, so hashes made
    /// with an older configuration still verify.
    pub fn verify_password(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        match self.argon2().verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => {
                error!(error = %e, "argon2 verify error");
                Err(anyhow::anyhow!(e.to_string()))
            }
        }
    }

    /// [`hash_password`](Self::hash_password) on the blocking pool.
    pub async fn hash(&self, plain: String) -> Result<String, AppError> {
        let hasher = self.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash_password(&plain))
            .await
            .map_err(|e| anyhow::anyhow!("password hashing task failed: {e}"))??;
        Ok(hash)
    }

    /// [`verify_password`](Self::verify_password) on the blocking pool.
    pub async fn verify(&self, plain: String, hash: String) -> Result<bool, AppError> {
        let hasher = self.clone();
        let ok = tokio::task::spawn_blocking(move || hasher.verify_password(&plain, &hash))
            .await
            .map_err(|e| anyhow::anyhow!("password verify task failed: {e}"))??;
        Ok(ok)
    }
}
