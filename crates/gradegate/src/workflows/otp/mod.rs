//! Single-use, time-boxed numeric codes bound to an email address or phone number.
//!
//! Expiry is evaluated lazily on verify and status reads; there is no timer.

pub mod router;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::workflows::results::repository::{Notification, NotificationError, NotificationSender};

pub use router::otp_router;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    ttl: Duration,
    max_attempts: u32,
    code_length: usize,
}

impl OtpPolicy {
    pub fn new(ttl: Duration, max_attempts: u32, code_length: usize) -> Self {
        Self {
            ttl,
            max_attempts,
            code_length,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn code_length(&self) -> usize {
        self.code_length
    }
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(10), 5, 6)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub identity: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub verified: bool,
}

impl OtpRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn attempts_left(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Returned to the caller on issue. The code itself only travels out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpIssued {
    pub identity: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpStatus {
    pub identity: String,
    pub remaining_seconds: i64,
    pub attempts_left: u32,
    pub verified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("no verification code issued for this identity")]
    NotFound,
    #[error("verification code already used")]
    AlreadyUsed,
    #[error("verification code expired")]
    Expired,
    #[error("too many failed attempts; request a new code")]
    AttemptsExceeded,
    #[error("incorrect verification code; {remaining} attempts remaining")]
    InvalidCode { remaining: u32 },
    #[error("identity must be an email address or phone number")]
    InvalidIdentity,
    #[error("verification code could not be delivered: {0}")]
    Delivery(#[from] NotificationError),
    #[error("verification code expiry is out of range")]
    ExpiryOutOfRange,
    #[error("verification store unavailable")]
    Unavailable,
}

impl OtpError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "otp_not_found",
            Self::AlreadyUsed => "otp_already_used",
            Self::Expired => "otp_expired",
            Self::AttemptsExceeded => "otp_attempts_exceeded",
            Self::InvalidCode { .. } => "otp_invalid_code",
            Self::InvalidIdentity => "otp_invalid_identity",
            Self::Delivery(_) => "otp_delivery_failed",
            Self::ExpiryOutOfRange => "otp_expiry_out_of_range",
            Self::Unavailable => "otp_unavailable",
        }
    }
}

/// Source of numeric codes of a fixed length.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = rand::rngs::OsRng;
        (0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

pub struct OtpVerifier<N, G = RandomCodeGenerator> {
    codes: Mutex<HashMap<String, OtpRecord>>,
    policy: OtpPolicy,
    notifier: Arc<N>,
    generator: G,
}

impl<N> OtpVerifier<N, RandomCodeGenerator>
where
    N: NotificationSender + 'static,
{
    pub fn new(policy: OtpPolicy, notifier: Arc<N>) -> Self {
        Self::with_generator(policy, notifier, RandomCodeGenerator)
    }
}

impl<N, G> OtpVerifier<N, G>
where
    N: NotificationSender + 'static,
    G: CodeGenerator,
{
    pub fn with_generator(policy: OtpPolicy, notifier: Arc<N>, generator: G) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            policy,
            notifier,
            generator,
        }
    }

    pub fn policy(&self) -> OtpPolicy {
        self.policy
    }

    pub fn generate(&self, identity: &str) -> Result<OtpIssued, OtpError> {
        self.generate_at(identity, Utc::now())
    }

    /// Issue a fresh code, replacing any earlier one for the identity once it
    /// has been handed to the notification sender.
    pub fn generate_at(&self, identity: &str, now: DateTime<Utc>) -> Result<OtpIssued, OtpError> {
        let identity = normalize_identity(identity)?;
        let expires_at = now
            .checked_add_signed(self.policy.ttl)
            .ok_or(OtpError::ExpiryOutOfRange)?;
        let record = OtpRecord {
            identity: identity.clone(),
            code: self.generator.generate(self.policy.code_length),
            created_at: now,
            expires_at,
            attempts: 0,
            max_attempts: self.policy.max_attempts,
            verified: false,
        };

        let notification = Notification::new(identity.as_str(), "otp_code")
            .with("code", record.code.as_str())
            .with(
                "expires_in_minutes",
                self.policy.ttl.num_minutes().to_string(),
            );
        if let Err(err) = self.notifier.send(notification) {
            warn!(identity = %identity, error = %err, "verification code not delivered");
            return Err(OtpError::Delivery(err));
        }

        let issued = OtpIssued {
            identity: identity.clone(),
            expires_at: record.expires_at,
            expires_in_seconds: record.remaining_seconds(now),
        };
        let mut codes = self.lock()?;
        let before = codes.len();
        codes.retain(|_, held| !held.is_expired(now));
        let swept = before - codes.len();
        codes.insert(identity.clone(), record);
        drop(codes);
        if swept > 0 {
            debug!(swept, "expired verification codes dropped");
        }

        info!(identity = %identity, expires_at = %issued.expires_at, "verification code issued");
        Ok(issued)
    }

    pub fn verify(&self, identity: &str, code: &str) -> Result<(), OtpError> {
        self.verify_at(identity, code, Utc::now())
    }

    pub fn verify_at(&self, identity: &str, code: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let identity = normalize_identity(identity)?;
        let mut codes = self.lock()?;
        let record = codes.get_mut(&identity).ok_or(OtpError::NotFound)?;

        if record.is_expired(now) {
            let used = record.verified;
            codes.remove(&identity);
            if used {
                debug!(identity = %identity, "spent verification code dropped after expiry");
            } else {
                warn!(identity = %identity, "expired verification code presented");
            }
            return Err(OtpError::Expired);
        }
        if record.verified {
            return Err(OtpError::AlreadyUsed);
        }
        if record.attempts >= record.max_attempts {
            codes.remove(&identity);
            warn!(identity = %identity, "verification attempts exhausted");
            return Err(OtpError::AttemptsExceeded);
        }
        if !codes_match(&record.code, code.trim()) {
            record.attempts += 1;
            let remaining = record.attempts_left();
            warn!(identity = %identity, remaining, "incorrect verification code");
            return Err(OtpError::InvalidCode { remaining });
        }

        record.verified = true;
        info!(identity = %identity, "verification code accepted");
        Ok(())
    }

    pub fn status(&self, identity: &str) -> Result<OtpStatus, OtpError> {
        self.status_at(identity, Utc::now())
    }

    pub fn status_at(&self, identity: &str, now: DateTime<Utc>) -> Result<OtpStatus, OtpError> {
        let identity = normalize_identity(identity)?;
        let mut codes = self.lock()?;
        let record = codes.get(&identity).ok_or(OtpError::NotFound)?;

        if record.is_expired(now) {
            codes.remove(&identity);
            debug!(identity = %identity, "expired verification code dropped");
            return Err(OtpError::Expired);
        }

        Ok(OtpStatus {
            identity: identity.clone(),
            remaining_seconds: record.remaining_seconds(now),
            attempts_left: record.attempts_left(),
            verified: record.verified,
        })
    }

    /// Remove any code held for the identity. Returns whether one existed.
    pub fn clear(&self, identity: &str) -> Result<bool, OtpError> {
        let identity = normalize_identity(identity)?;
        let removed = self.lock()?.remove(&identity).is_some();
        debug!(identity = %identity, removed, "verification code cleared");
        Ok(removed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, OtpRecord>>, OtpError> {
        self.codes.lock().map_err(|_| OtpError::Unavailable)
    }
}

/// Emails compare case-insensitively; phone numbers keep digits and a leading `+`.
fn normalize_identity(identity: &str) -> Result<String, OtpError> {
    let trimmed = identity.trim();
    if trimmed.contains('@') {
        let (local, domain) = trimmed.split_once('@').ok_or(OtpError::InvalidIdentity)?;
        if local.is_empty() || !domain.contains('.') || domain.contains('@') {
            return Err(OtpError::InvalidIdentity);
        }
        return Ok(trimmed.to_lowercase());
    }

    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let number = digits.strip_prefix('+').unwrap_or(&digits);
    if number.len() < 7 || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(OtpError::InvalidIdentity);
    }
    Ok(digits)
}

fn codes_match(expected: &str, presented: &str) -> bool {
    expected.len() == presented.len()
        && expected
            .bytes()
            .zip(presented.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
