use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

const RESET_TOKEN_BYTES: usize = 32;

/// A freshly issued password-reset token. Only `hash` is persisted; `raw`
/// goes into the emailed link and nowhere else.
pub struct ResetToken {
    pub raw: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

impl std::fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetToken")
            .field("hash", &self.hash)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

pub fn issue_reset_token(ttl: Duration) -> ResetToken {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let hash = hash_reset_token(&raw);
    ResetToken {
        raw,
        hash,
        expires_at: OffsetDateTime::now_utc() + ttl,
    }
}

/// SHA-256 hex digest, the form stored alongside the user.
pub fn hash_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_is_64_hex_chars_and_hash_matches() {
        let token = issue_reset_token(Duration::minutes(10));
        assert_eq!(token.raw.len(), 64);
        assert!(token.raw.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token.hash, hash_reset_token(&token.raw));
        assert_ne!(token.hash, token.raw);
    }

    #[test]
    fn tokens_are_unique() {
        let a = issue_reset_token(Duration::minutes(10));
        let b = issue_reset_token(Duration::minutes(10));
        assert_ne!(a.raw, b.raw);
    }

    #[test]
    fn expiry_is_in_the_future() {
        let before = OffsetDateTime::now_utc();
        let token = issue_reset_token(Duration::minutes(10));
        assert!(token.expires_at > before + Duration::minutes(9));
    }

    #[test]
    fn hash_is_stable_sha256() {
        assert_eq!(
            hash_reset_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn debug_output_hides_raw_token() {
        let token = issue_reset_token(Duration::minutes(1));
        assert!(!format!("{token:?}").contains(&token.raw));
    }
}
