//! Secret generation and comparison.
//!
//! The bearer token and pair code guard arbitrary keystroke injection on
//! the host, so they come from the OS entropy source and are only ever
//! compared in constant time.

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::HEXLOWER;
use rand::TryRngCore;
use tracing::warn;

// ============================================================================
// Constants
// ============================================================================

/// Bearer token entropy in bytes (128 bits).
pub const TOKEN_BYTES: usize = 16;

/// Pair codes are drawn from `[0, PAIR_CODE_SPACE)`.
pub const PAIR_CODE_SPACE: u32 = 10_000;

/// Pair code used when the entropy source fails.
pub const FALLBACK_PAIR_CODE: &str = "0000";

/// Largest multiple of [`PAIR_CODE_SPACE`] representable in a `u32`.
const PAIR_CODE_ZONE: u32 = (u32::MAX / PAIR_CODE_SPACE) * PAIR_CODE_SPACE;

// ============================================================================
// Generation
// ============================================================================

/// Generates a hex bearer token, falling back to the current timestamp.
pub fn generate_token<R: TryRngCore>(rng: &mut R) -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    match rng.try_fill_bytes(&mut buf) {
        Ok(()) => HEXLOWER.encode(&buf),
        Err(e) => {
            warn!(error = %e, "Failed to generate session token, falling back to timestamp token");
            fallback_token()
        }
    }
}

/// Generates a 4-digit zero-padded pair code, falling back to `"0000"`.
///
/// Rejection sampling keeps the distribution uniform.
pub fn generate_pair_code<R: TryRngCore>(rng: &mut R) -> String {
    loop {
        match rng.try_next_u32() {
            Ok(value) if value < PAIR_CODE_ZONE => {
                return format!("{:04}", value % PAIR_CODE_SPACE);
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Failed to generate pair code, falling back to 0000");
                return FALLBACK_PAIR_CODE.to_string();
            }
        }
    }
}

/// Timestamp in nanoseconds since the epoch.
fn fallback_token() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Comparison
// ============================================================================

/// Compares a presented value against a secret in constant time.
///
/// Running time depends only on the presented length, never on where the
/// first mismatch is or on the secret's length.
#[must_use]
pub fn constant_time_eq(presented: &[u8], secret: &[u8]) -> bool {
    if secret.is_empty() {
        return presented.is_empty();
    }

    let mut diff = u8::from(presented.len() != secret.len());
    for (i, byte) in presented.iter().enumerate() {
        diff |= byte ^ secret[i % secret.len()];
    }
    diff == 0
}

// ============================================================================
// Tests
// ============================================================================
