//! Secure password generation and strength scoring for form assistance.

use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()-_=+[]{};:,.<>?";
// Characters easily confused when read back from a screen or printout.
const AMBIGUOUS: &str = "Il1O0oS5Z2B8";

/// Substrings that sink a password regardless of its other qualities.
const WEAK_SUBSTRINGS: &[&str] = &[
    "password", "qwerty", "letmein", "admin", "welcome", "123456", "abc123", "iloveyou",
    "dragon", "monkey",
];

/// Character-class selection for the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordOptions {
    /// Include `a-z`.
    pub include_lowercase: bool,
    /// Include `A-Z`.
    pub include_uppercase: bool,
    /// Include `0-9`.
    pub include_digits: bool,
    /// Include punctuation symbols.
    pub include_symbols: bool,
    /// Drop visually ambiguous characters (`Il1O0o` and friends).
    pub exclude_ambiguous: bool,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            include_lowercase: true,
            include_uppercase: true,
            include_digits: true,
            include_symbols: true,
            exclude_ambiguous: false,
        }
    }
}

impl PasswordOptions {
    fn charset(&self) -> Vec<char> {
        let mut charset = String::new();
        if self.include_lowercase {
            charset.push_str(LOWERCASE);
        }
        if self.include_uppercase {
            charset.push_str(UPPERCASE);
        }
        if self.include_digits {
            charset.push_str(DIGITS);
        }
        if self.include_symbols {
            charset.push_str(SYMBOLS);
        }
        if self.exclude_ambiguous {
            charset.retain(|c| !AMBIGUOUS.contains(c));
        }
        charset.chars().collect()
    }
}

/// Generate a password of `length` characters from the selected classes.
///
/// Every character is drawn independently and uniformly from the active
/// charset using the platform CSPRNG. An empty effective charset (all
/// classes off, or everything excluded as ambiguous) is
/// [`Error::InvalidOptions`].
pub fn generate_secure_password(length: usize, options: &PasswordOptions) -> Result<String> {
    if length == 0 {
        return Err(Error::InvalidOptions(
            "password length must be at least 1".to_string(),
        ));
    }
    let charset = options.charset();
    if charset.is_empty() {
        return Err(Error::InvalidOptions(
            "no character classes selected".to_string(),
        ));
    }

    let mut rng = OsRng;
    let password = (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())])
        .collect();
    Ok(password)
}

/// Ordered strength tiers. A password is acceptable at `Medium` or above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthTier {
    /// Trivially guessable.
    VeryWeak,
    /// Short or single-class.
    Weak,
    /// Acceptable floor.
    Medium,
    /// Long with class variety.
    Strong,
    /// Long, varied, and pattern-free.
    VeryStrong,
}

impl std::fmt::Display for StrengthTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StrengthTier::VeryWeak => "very weak",
            StrengthTier::Weak => "weak",
            StrengthTier::Medium => "medium",
            StrengthTier::Strong => "strong",
            StrengthTier::VeryStrong => "very strong",
        };
        f.write_str(label)
    }
}

/// Result of scoring a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrengthReport {
    /// Composite score, clamped to 0..=100.
    pub score: u32,
    /// Tier derived from the score.
    pub tier: StrengthTier,
    /// Human-readable improvement hints.
    pub feedback: Vec<String>,
}

impl StrengthReport {
    /// True at [`StrengthTier::Medium`] or above.
    pub fn is_acceptable(&self) -> bool {
        self.tier >= StrengthTier::Medium
    }
}

/// Score a password from length, character-class variety, and pattern
/// penalties. Deterministic and pure.
pub fn score_password_strength(password: &str) -> StrengthReport {
    let mut score: i64 = 0;
    let mut feedback = Vec::new();

    let length = password.chars().count();
    score += (length.min(20) as i64) * 2;
    if length < 8 {
        feedback.push("use at least 8 characters".to_string());
    }

    let classes = [
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace()),
    ];
    let class_count = classes.iter().filter(|present| **present).count();
    score += class_count as i64 * 12;
    if class_count < 3 && length > 0 {
        feedback.push("mix upper case, digits, and symbols".to_string());
    }

    let sequence_runs = count_sequence_runs(password);
    if sequence_runs > 0 {
        score -= (sequence_runs.min(2) as i64) * 10;
        feedback.push("avoid sequential characters".to_string());
    }

    let repeat_runs = count_repeat_runs(password);
    if repeat_runs > 0 {
        score -= (repeat_runs.min(2) as i64) * 10;
        feedback.push("avoid repeated characters".to_string());
    }

    let lowered = password.to_ascii_lowercase();
    if WEAK_SUBSTRINGS.iter().any(|weak| lowered.contains(weak)) {
        score -= 25;
        feedback.push("avoid common words and sequences".to_string());
    }

    let score = score.clamp(0, 100) as u32;
    let tier = match score {
        0..=24 => StrengthTier::VeryWeak,
        25..=44 => StrengthTier::Weak,
        45..=64 => StrengthTier::Medium,
        65..=84 => StrengthTier::Strong,
        _ => StrengthTier::VeryStrong,
    };

    StrengthReport {
        score,
        tier,
        feedback,
    }
}

/// Count maximal ascending or descending runs of length >= 3 within a
/// single character class ("abc", "987").
fn count_sequence_runs(password: &str) -> usize {
    let chars: Vec<char> = password.chars().collect();
    let mut runs = 0;
    let mut i = 0;
    while i + 2 < chars.len() {
        let len = run_length_from(&chars, i, 1).max(run_length_from(&chars, i, -1));
        if len >= 3 {
            runs += 1;
            i += len;
        } else {
            i += 1;
        }
    }
    runs
}

fn run_length_from(chars: &[char], start: usize, direction: i32) -> usize {
    let mut len = 1;
    while start + len < chars.len()
        && is_step(chars[start + len - 1], chars[start + len], direction)
    {
        len += 1;
    }
    len
}

fn is_step(a: char, b: char, direction: i32) -> bool {
    let same_class = (a.is_ascii_lowercase() && b.is_ascii_lowercase())
        || (a.is_ascii_uppercase() && b.is_ascii_uppercase())
        || (a.is_ascii_digit() && b.is_ascii_digit());
    same_class && (b as i32) - (a as i32) == direction
}

/// Count maximal runs of the same character of length >= 3 ("aaa").
fn count_repeat_runs(password: &str) -> usize {
    let chars: Vec<char> = password.chars().collect();
    let mut runs = 0;
    let mut i = 0;
    while i < chars.len() {
        let mut len = 1;
        while i + len < chars.len() && chars[i + len] == chars[i] {
            len += 1;
        }
        if len >= 3 {
            runs += 1;
        }
        i += len;
    }
    runs
}
