//! Password Service
//!
//! One-way password hashing (Argon2id), verification, opportunistic rehash
//! detection, and the password-strength heuristic used at signup.

use crate::config::AuthConfig;
use crate::error::AuthError;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};

/// Result of the strength heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordStrength {
    pub valid: bool,
    /// 0..=4 after clamping and rounding.
    pub score: u8,
    pub feedback: Vec<String>,
}

/// Substrings that immediately mark a password as guessable. Matched
/// case-sensitively: these sequences come from keyboard walks and numeric
/// runs typed as-is.
const COMMON_PATTERNS: &[&str] = &["12345", "qwerty", "abcde"];

/// Password hashing and strength checks
#[derive(Debug, Clone)]
pub struct PasswordService {
    memory_cost: u32,
    time_cost: u32,
    parallelism: u32,
}

impl PasswordService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            memory_cost: config.argon2_memory_cost,
            time_cost: config.argon2_time_cost,
            parallelism: config.argon2_parallelism,
        }
    }

    fn hasher(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|_| AuthError::Hashing)?;
        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()?
            .hash_password(password.as_bytes(), &salt)?
            .to_string();
        Ok(hash)
    }

    /// Verify a password against a stored hash.
    ///
    /// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash)?;
        Ok(self
            .hasher()?
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// True when the stored hash was produced with lower cost parameters
    /// than currently configured. Used to upgrade hashes on successful
    /// login.
    pub fn needs_rehash(&self, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash)?;
        let params = Params::try_from(&parsed).map_err(|_| AuthError::Hashing)?;
        Ok(params.m_cost() < self.memory_cost
            || params.t_cost() < self.time_cost
            || params.p_cost() < self.parallelism)
    }

    /// Score a plaintext password.
    ///
    /// Scoring: +1 for length >= 8 (hard requirement for validity), +1 for
    /// length >= 12, +0.25 per character class present, -1 for a run of
    /// three or more repeated characters, -1 for a known common substring.
    /// The final score is clamped to [0, 4] and rounded half-up; a password
    /// is valid when it is at least 8 characters and scores >= 2.
    pub fn strength(&self, password: &str) -> PasswordStrength {
        let mut feedback = Vec::new();
        let mut score = 0.0f32;

        let long_enough = password.chars().count() >= 8;
        if long_enough {
            score += 1.0;
        } else {
            feedback.push("Use at least 8 characters".to_string());
        }

        if password.chars().count() >= 12 {
            score += 1.0;
        }

        let has_lower = password.chars().any(|c| c.is_lowercase());
        let has_upper = password.chars().any(|c| c.is_uppercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_symbol = password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

        for (present, hint) in [
            (has_lower, "Add lowercase letters"),
            (has_upper, "Add uppercase letters"),
            (has_digit, "Add digits"),
            (has_symbol, "Add symbols"),
        ] {
            if present {
                score += 0.25;
            } else {
                feedback.push(hint.to_string());
            }
        }

        if has_repeated_run(password) {
            score -= 1.0;
            feedback.push("Avoid repeated characters".to_string());
        }

        if COMMON_PATTERNS.iter().any(|p| password.contains(p)) {
            score -= 1.0;
            feedback.push("Avoid common patterns".to_string());
        }

        let score = (score.clamp(0.0, 4.0) + 0.5).floor() as u8;
        PasswordStrength {
            valid: long_enough && score >= 2,
            score,
            feedback,
        }
    }
}

/// Three or more of the same character in a row.
fn has_repeated_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn service() -> PasswordService {
        PasswordService::new(&test_config())
    }

    #[test]
    fn hash_then_verify_round_trip() {
        let svc = service();
        let hash = svc.hash("S3cure-enough").unwrap();
        assert!(svc.verify("S3cure-enough", &hash).unwrap());
        assert!(!svc.verify("wrong-password", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let svc = service();
        let a = svc.hash("same-input").unwrap();
        let b = svc.hash("same-input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        let svc = service();
        assert!(svc.verify("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn needs_rehash_detects_weaker_params() {
        let weak = PasswordService {
            memory_cost: 512,
            time_cost: 1,
            parallelism: 1,
        };
        let hash = weak.hash("some-password").unwrap();
        assert!(!weak.needs_rehash(&hash).unwrap());

        let strong = PasswordService {
            memory_cost: 1024,
            time_cost: 2,
            parallelism: 1,
        };
        assert!(strong.needs_rehash(&hash).unwrap());
        let upgraded = strong.hash("some-password").unwrap();
        assert!(!strong.needs_rehash(&upgraded).unwrap());
    }

    #[test]
    fn strength_accepts_mixed_eight_chars() {
        // 8 chars, three classes, no repeats or common patterns
        let result = service().strength("Abcdef12");
        assert!(result.score >= 2, "score was {}", result.score);
        assert!(result.valid);
    }

    #[test]
    fn strength_rejects_repeated_single_class() {
        let result = service().strength("aaaaaaaa");
        assert!(result.score < 2);
        assert!(!result.valid);
        assert!(!result.feedback.is_empty());
    }

    #[test]
    fn strength_rejects_short_input_regardless_of_classes() {
        let result = service().strength("Ab1!");
        assert!(!result.valid);
    }

    #[test]
    fn strength_penalizes_common_patterns() {
        let with_pattern = service().strength("Xqwerty#79");
        let without = service().strength("Xqwgnmy#79");
        assert!(with_pattern.score < without.score);
    }

    #[test]
    fn strength_rewards_length_and_all_classes() {
        let result = service().strength("Tr1cky&Long-Pass");
        assert_eq!(result.score, 3);
        assert!(result.valid);
    }
}
