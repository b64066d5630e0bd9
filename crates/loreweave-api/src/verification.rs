//! Email verification codes.
//!
//! Codes are six digits, live in memory and are single-use. Delivery goes
//! through a `Mailer` so tests can capture codes and deployments can plug in
//! real mail.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::info;

pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(5 * 60);

pub trait Mailer: Send + Sync {
    fn send_verification_code(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

/// Writes codes to the log instead of sending mail.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_verification_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        info!("Verification code for {}: {}", email, code);
        Ok(())
    }
}

struct PendingCode {
    code: String,
    expires_at: Instant,
}

pub struct VerificationCodes {
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingCode>>,
}

impl VerificationCodes {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh code for `email`, replacing any earlier one.
    pub fn issue(&self, email: &str) -> String {
        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.retain(|_, p| p.expires_at > Instant::now());
        pending.insert(
            normalize(email),
            PendingCode {
                code: code.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        code
    }

    /// Consume the code for `email`. Expired codes are removed and fail.
    pub fn verify(&self, email: &str, code: &str) -> bool {
        let key = normalize(email);
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        let Some(entry) = pending.get(&key) else {
            return false;
        };
        if entry.expires_at <= Instant::now() {
            pending.remove(&key);
            return false;
        }
        if entry.code != code.trim() {
            return false;
        }
        pending.remove(&key);
        true
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_digits() {
        let codes = VerificationCodes::new(DEFAULT_CODE_TTL);
        let code = codes.issue("a@b.c");
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn code_is_single_use() {
        let codes = VerificationCodes::new(DEFAULT_CODE_TTL);
        let code = codes.issue("Mira@Example.com");
        assert!(codes.verify("mira@example.com", &code));
        assert!(!codes.verify("mira@example.com", &code));
    }

    #[test]
    fn wrong_code_keeps_the_right_one_valid() {
        let codes = VerificationCodes::new(DEFAULT_CODE_TTL);
        let code = codes.issue("a@b.c");
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(!codes.verify("a@b.c", wrong));
        assert!(codes.verify("a@b.c", &code));
    }

    #[test]
    fn expired_code_fails() {
        let codes = VerificationCodes::new(Duration::ZERO);
        let code = codes.issue("a@b.c");
        assert!(!codes.verify("a@b.c", &code));
    }

    #[test]
    fn reissue_replaces_old_code() {
        let codes = VerificationCodes::new(DEFAULT_CODE_TTL);
        let first = codes.issue("a@b.c");
        let second = codes.issue("a@b.c");
        if first != second {
            assert!(!codes.verify("a@b.c", &first));
        }
        assert!(codes.verify("a@b.c", &second));
    }
}
