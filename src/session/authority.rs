//! Bearer-token authorization and the single pairing slot.
//!
//! The token and pair code are generated once per process and never change.
//! The pairing slot holds at most one device; a successful pair overwrites
//! it, even mid-session. Expiry is lazy: an expired slot is cleared the
//! next time it is checked, never by a timer.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rand::rngs::OsRng;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::secret::{constant_time_eq, generate_pair_code, generate_token};

// ============================================================================
// Constants
// ============================================================================

/// How long a pairing stays valid.
pub const PAIR_TTL: TimeDelta = TimeDelta::hours(24);

// ============================================================================
// Session
// ============================================================================

/// Process-lifetime secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token required on every gated request.
    token: String,
    /// 4-digit pair code.
    pair_code: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Generates fresh secrets from the OS entropy source.
    ///
    /// Falls back to weaker deterministic values (logged) if entropy fails.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            token: generate_token(&mut OsRng),
            pair_code: generate_pair_code(&mut OsRng),
        }
    }

    /// Creates a session with known secrets.
    #[must_use]
    pub fn with_secrets(token: impl Into<String>, pair_code: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            pair_code: pair_code.into(),
        }
    }

    /// The bearer token.
    #[inline]
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The pair code.
    #[inline]
    #[must_use]
    pub fn pair_code(&self) -> &str {
        &self.pair_code
    }
}

// ============================================================================
// PairingState
// ============================================================================

/// Result of a pairing check for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingState {
    /// Device currently holds a valid pairing.
    pub paired: bool,
    /// Pairing expiry, present only when `paired`.
    pub expires_at: Option<DateTime<Utc>>,
}

impl PairingState {
    /// Not paired.
    pub const UNPAIRED: Self = Self {
        paired: false,
        expires_at: None,
    };

    /// Expiry formatted as RFC 3339, or empty when unpaired.
    #[must_use]
    pub fn expires_at_rfc3339(&self) -> String {
        self.expires_at.map(format_timestamp).unwrap_or_default()
    }
}

/// Formats a timestamp the way every API response does.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

// ============================================================================
// SessionAuthority
// ============================================================================

/// The occupied pairing slot.
#[derive(Debug, Clone)]
struct PairingSlot {
    /// Device holding the slot.
    device_id: String,
    /// Pairing is valid while `now < until`.
    until: DateTime<Utc>,
}

/// Owns the session secrets and the pairing slot.
pub struct SessionAuthority {
    /// Immutable secrets.
    session: Session,
    /// Zero or one paired device.
    slot: RwLock<Option<PairingSlot>>,
}

impl fmt::Debug for SessionAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthority")
            .field("paired", &self.slot.read().is_some())
            .finish_non_exhaustive()
    }
}

impl SessionAuthority {
    /// Creates an authority over the given session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            slot: RwLock::new(None),
        }
    }

    /// Creates an authority with freshly generated secrets.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Session::generate())
    }

    /// The bearer token.
    #[inline]
    #[must_use]
    pub fn token(&self) -> &str {
        self.session.token()
    }

    /// The pair code.
    #[inline]
    #[must_use]
    pub fn pair_code(&self) -> &str {
        self.session.pair_code()
    }

    /// Returns `true` if `presented` equals the bearer token.
    ///
    /// Empty presented or stored tokens are never authorized.
    #[must_use]
    pub fn authorize(&self, presented: &str) -> bool {
        let stored = self.session.token();
        if presented.is_empty() || stored.is_empty() {
            return false;
        }
        constant_time_eq(presented.as_bytes(), stored.as_bytes())
    }

    /// Authorizes, mapping failure to [`Error::Unauthorized`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the token does not match.
    pub fn require_token(&self, presented: &str) -> Result<()> {
        if self.authorize(presented) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    /// Pairs `device_id` if `presented_code` matches, evicting any prior device.
    ///
    /// # Errors
    ///
    /// - [`Error::PairingRejected`] if `device_id` is empty (bad request)
    /// - [`Error::PairingRejected`] if the code does not match
    pub fn pair(&self, device_id: &str, presented_code: &str) -> Result<DateTime<Utc>> {
        self.pair_at(device_id, presented_code, Utc::now())
    }

    /// [`pair`](Self::pair) at an explicit instant.
    pub(crate) fn pair_at(
        &self,
        device_id: &str,
        presented_code: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if device_id.is_empty() {
            return Err(Error::missing_device_id());
        }
        if !constant_time_eq(presented_code.as_bytes(), self.session.pair_code().as_bytes()) {
            return Err(Error::invalid_pair_code());
        }

        let until = now + PAIR_TTL;
        let previous = self.slot.write().replace(PairingSlot {
            device_id: device_id.to_string(),
            until,
        });

        if let Some(previous) = previous
            && previous.device_id != device_id
        {
            info!(evicted = %previous.device_id, "Previous pairing evicted");
        }
        info!(device_id, expires = %format_timestamp(until), "Paired device");

        Ok(until)
    }

    /// Returns whether `device_id` currently holds a valid pairing.
    ///
    /// An expired pairing is cleared as a side effect.
    #[must_use]
    pub fn pairing_state(&self, device_id: &str) -> PairingState {
        self.pairing_state_at(device_id, Utc::now())
    }

    /// [`pairing_state`](Self::pairing_state) at an explicit instant.
    pub(crate) fn pairing_state_at(&self, device_id: &str, now: DateTime<Utc>) -> PairingState {
        if device_id.is_empty() {
            return PairingState::UNPAIRED;
        }

        let slot = self.slot.upgradable_read();
        let Some(current) = slot.as_ref() else {
            return PairingState::UNPAIRED;
        };

        if now >= current.until {
            let mut slot = RwLockUpgradableReadGuard::upgrade(slot);
            if let Some(expired) = slot.take() {
                debug!(device_id = %expired.device_id, "Pairing expired");
            }
            return PairingState::UNPAIRED;
        }

        if !constant_time_eq(device_id.as_bytes(), current.device_id.as_bytes()) {
            return PairingState::UNPAIRED;
        }

        PairingState {
            paired: true,
            expires_at: Some(current.until),
        }
    }

    /// Requires a valid pairing, mapping failure to [`Error::PairingRequired`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PairingRequired`] if the device is not paired.
    pub fn require_pairing(&self, device_id: &str) -> Result<DateTime<Utc>> {
        self.pairing_state(device_id)
            .expires_at
            .ok_or(Error::PairingRequired)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";
    const CODE: &str = "4821";

    fn authority() -> SessionAuthority {
        SessionAuthority::new(Session::with_secrets(TOKEN, CODE))
    }

    #[test]
    fn test_generated_session_shape() {
        let session = Session::generate();
        assert_eq!(session.token().len(), 32);
        assert_eq!(session.pair_code().len(), 4);
        assert!(session.pair_code().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_authorize_exact_token() {
        let authority = authority();
        assert!(authority.authorize(TOKEN));
        assert!(authority.require_token(TOKEN).is_ok());
    }

    #[test]
    fn test_authorize_rejects_prefix_and_truncation() {
        let authority = authority();
        assert!(!authority.authorize(&TOKEN[..31]));
        assert!(!authority.authorize(&TOKEN[..1]));
        assert!(!authority.authorize(&format!("{TOKEN}0")));
        assert!(!authority.authorize(""));
        assert!(matches!(
            authority.require_token("nope"),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn test_empty_stored_token_never_authorizes() {
        let authority = SessionAuthority::new(Session::with_secrets("", CODE));
        assert!(!authority.authorize(""));
        assert!(!authority.authorize("anything"));
    }

    proptest! {
        #[test]
        fn test_authorize_only_exact_token(presented in ".{0,40}") {
            let authority = authority();
            prop_assert_eq!(authority.authorize(&presented), presented == TOKEN);
        }

        #[test]
        fn test_authorize_rejects_every_strict_prefix(len in 0usize..32) {
            let authority = authority();
            prop_assert!(!authority.authorize(&TOKEN[..len]));
        }
    }

    #[test]
    fn test_pair_and_state() {
        let authority = authority();
        let now = Utc::now();

        let until = authority.pair_at("phone-a", CODE, now).expect("pair");

        assert_eq!(until, now + PAIR_TTL);
        let state = authority.pairing_state_at("phone-a", now);
        assert!(state.paired);
        assert_eq!(state.expires_at, Some(until));
        assert!(!authority.pairing_state_at("phone-b", now).paired);
    }

    #[test]
    fn test_wrong_code_leaves_state_unchanged() {
        let authority = authority();
        let now = Utc::now();
        authority.pair_at("phone-a", CODE, now).expect("pair");

        let err = authority
            .pair_at("phone-b", "0000", now)
            .expect_err("wrong code");

        assert_eq!(err.to_string(), "invalid pair code");
        assert!(authority.pairing_state_at("phone-a", now).paired);
        assert!(!authority.pairing_state_at("phone-b", now).paired);
    }

    #[test]
    fn test_missing_device_id_rejected() {
        let authority = authority();
        let err = authority.pair("", CODE).expect_err("empty device");
        assert_eq!(err.to_string(), "missing device id");
        assert!(!authority.pairing_state("phone-a").paired);
    }

    #[test]
    fn test_new_pairing_evicts_previous_device() {
        let authority = authority();
        let now = Utc::now();

        authority.pair_at("phone-a", CODE, now).expect("pair a");
        authority.pair_at("phone-b", CODE, now).expect("pair b");

        assert!(!authority.pairing_state_at("phone-a", now).paired);
        assert!(authority.pairing_state_at("phone-b", now).paired);
    }

    #[test]
    fn test_lazy_expiry_boundary() {
        let authority = authority();
        let now = Utc::now();
        let until = authority.pair_at("phone-a", CODE, now).expect("pair");
        let second = TimeDelta::seconds(1);

        assert!(authority.pairing_state_at("phone-a", until - second).paired);
        assert!(!authority.pairing_state_at("phone-a", until).paired);
        assert!(!authority.pairing_state_at("phone-a", until + second).paired);
        // the expired slot was cleared; still unpaired even at an earlier instant
        assert!(!authority.pairing_state_at("phone-a", until - second).paired);
    }

    #[test]
    fn test_empty_device_never_paired() {
        let authority = authority();
        let now = Utc::now();
        authority.pair_at("phone-a", CODE, now).expect("pair");
        assert_eq!(
            authority.pairing_state_at("", now),
            PairingState::UNPAIRED
        );
    }

    #[test]
    fn test_require_pairing() {
        let authority = authority();
        assert!(matches!(
            authority.require_pairing("phone-a"),
            Err(Error::PairingRequired)
        ));
        authority.pair("phone-a", CODE).expect("pair");
        assert!(authority.require_pairing("phone-a").is_ok());
    }

    #[test]
    fn test_expires_at_format() {
        let state = PairingState {
            paired: true,
            expires_at: DateTime::from_timestamp(0, 0),
        };
        assert_eq!(state.expires_at_rfc3339(), "1970-01-01T00:00:00Z");
        assert_eq!(PairingState::UNPAIRED.expires_at_rfc3339(), "");
    }
}
