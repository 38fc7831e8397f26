//! One-time codes for password reset, kept in redis with a TTL.
//!
//! The store is keyed by email and holds only a sha256 digest of the code,
//! so a leaked cache dump exposes nothing usable. Keeping this out of
//! process memory lets codes survive restarts and work across multiple
//! service instances.

use rand::Rng;
use service_core::error::AppError;
use sha2::{Digest, Sha256};

pub const OTP_LENGTH: usize = 4;
pub const OTP_TTL_SECONDS: u64 = 5 * 60;

#[derive(Clone)]
pub struct OtpStore {
    redis: redis::Client,
    ttl_seconds: u64,
}

impl OtpStore {
    pub fn new(redis: redis::Client) -> Self {
        Self {
            redis,
            ttl_seconds: OTP_TTL_SECONDS,
        }
    }

    fn key(email: &str) -> String {
        format!("otp:{}", email)
    }

    /// Store the hash of a freshly generated code, replacing any previous
    /// one for this email and resetting the TTL.
    pub async fn put(&self, email: &str, code: &str) -> Result<(), AppError> {
        let mut con = self.redis.get_multiplexed_async_connection().await?;

        let _: () = redis::cmd("SET")
            .arg(Self::key(email))
            .arg(hash_code(code))
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut con)
            .await?;

        Ok(())
    }

    /// Verify a submitted code. The stored hash is consumed atomically with
    /// GETDEL before the comparison, so two concurrent attempts can never
    /// both succeed. Any attempt burns the code: a wrong guess invalidates
    /// it and the caller must request a fresh one.
    pub async fn verify(&self, email: &str, code: &str) -> Result<bool, AppError> {
        let mut con = self.redis.get_multiplexed_async_connection().await?;

        let stored: Option<String> = redis::cmd("GETDEL")
            .arg(Self::key(email))
            .query_async(&mut con)
            .await?;

        Ok(consumed_matches(stored.as_deref(), code))
    }
}

/// Compare a consumed hash against the submitted code.
fn consumed_matches(stored: Option<&str>, code: &str) -> bool {
    match stored {
        Some(hash) => hash == hash_code(code),
        None => false,
    }
}

/// Random numeric code of `OTP_LENGTH` digits.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_LENGTH)
        .map(|_| rng.gen_range(0..10).to_string())
        .collect()
}

/// Hash a code for storage.
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
