//! Self-signed TLS identity lifecycle.
//!
//! The identity is persisted as `cert.pem` + `key.pem` and reused across
//! restarts so the phone's browser does not prompt for trust every time.
//! It is regenerated whenever it no longer covers the resolved LAN address
//! or has expired.
//!
//! # Lifecycle
//!
//! 1. Load the persisted pair, if both files exist and parse
//! 2. Reuse it when its SANs cover `127.0.0.1` and the LAN address and it is unexpired
//! 3. Otherwise generate a fresh P-256 identity valid for 365 days
//! 4. Persist with owner-only permissions (failure is logged, not fatal)

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::files::write_owner_only;
use crate::error::{Error, Result};
use crate::net::LOCALHOST;

// ============================================================================
// Constants
// ============================================================================

/// Certificate file name inside the data directory.
pub const CERT_FILE: &str = "cert.pem";

/// Private key file name inside the data directory.
pub const KEY_FILE: &str = "key.pem";

/// Validity of a freshly generated certificate.
const VALIDITY_DAYS: i64 = 365;

/// Subject organization.
const ORGANIZATION: &str = "Ginkgo Talk";

/// Subject common name.
const COMMON_NAME: &str = "Ginkgo Talk Local Server";

// ============================================================================
// Identity
// ============================================================================

/// Certificate and key material plus the facts needed to judge reuse.
#[derive(Clone)]
pub struct Identity {
    /// PEM-encoded certificate, exactly as loaded or generated.
    cert_pem: String,
    /// PEM-encoded private key.
    key_pem: String,
    /// IP and DNS subject-alternative-names, as strings.
    subject_alt_names: Vec<String>,
    /// Start of validity.
    not_before: DateTime<Utc>,
    /// End of validity.
    not_after: DateTime<Utc>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject_alt_names", &self.subject_alt_names)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Builds an identity from PEM material and its parsed parameters.
    fn from_parts(cert_pem: String, key_pem: String, params: &CertificateParams) -> Self {
        let subject_alt_names = params
            .subject_alt_names
            .iter()
            .filter_map(|san| match san {
                SanType::IpAddress(ip) => Some(ip.to_string()),
                SanType::DnsName(name) => Some(name.as_str().to_string()),
                _ => None,
            })
            .collect();

        Self {
            cert_pem,
            key_pem,
            subject_alt_names,
            not_before: to_chrono(params.not_before),
            not_after: to_chrono(params.not_after),
        }
    }

    /// PEM-encoded certificate.
    #[inline]
    #[must_use]
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// PEM-encoded private key.
    #[inline]
    #[must_use]
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Subject-alternative-names (IP addresses and DNS names).
    #[inline]
    #[must_use]
    pub fn subject_alt_names(&self) -> &[String] {
        &self.subject_alt_names
    }

    /// Start of validity.
    #[inline]
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of validity.
    #[inline]
    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Returns `true` if `address` appears among the SANs.
    #[must_use]
    pub fn covers(&self, address: &str) -> bool {
        self.subject_alt_names.iter().any(|san| san == address)
    }

    /// Returns `true` if this identity may be reused for `lan_address` at `now`.
    #[must_use]
    pub fn is_usable_for(&self, lan_address: &str, now: DateTime<Utc>) -> bool {
        self.covers(&Ipv4Addr::LOCALHOST.to_string())
            && self.covers(lan_address)
            && now < self.not_after
    }

    /// Builds a rustls server configuration serving this identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] if the PEM material does not decode,
    /// or [`Error::Tls`] if rustls rejects it.
    pub fn server_config(&self) -> Result<ServerConfig> {
        let certs = CertificateDer::pem_slice_iter(self.cert_pem.as_bytes())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::identity(format!("certificate PEM: {e}")))?;
        let key = PrivateKeyDer::from_pem_slice(self.key_pem.as_bytes())
            .map_err(|e| Error::identity(format!("private key PEM: {e}")))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(config)
    }
}

// ============================================================================
// IdentityManager
// ============================================================================

/// Loads, validates, regenerates and persists the TLS identity.
#[derive(Debug, Clone)]
pub struct IdentityManager {
    /// Path of the persisted certificate.
    cert_path: PathBuf,
    /// Path of the persisted private key.
    key_path: PathBuf,
}

impl IdentityManager {
    /// Creates a manager storing `cert.pem` / `key.pem` under `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            cert_path: dir.join(CERT_FILE),
            key_path: dir.join(KEY_FILE),
        }
    }

    /// Path of the persisted certificate.
    #[inline]
    #[must_use]
    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    /// Path of the persisted private key.
    #[inline]
    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Returns an identity valid for `lan_address`.
    ///
    /// Reuses the persisted identity when it still fits, otherwise
    /// generates and persists a new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] if key or certificate generation fails.
    pub fn obtain(&self, lan_address: &str) -> Result<Identity> {
        let now = Utc::now();

        if let Some(identity) = self.load() {
            if identity.is_usable_for(lan_address, now) {
                info!(
                    valid_until = %identity.not_after().format("%Y-%m-%d"),
                    "Loaded existing TLS certificate"
                );
                return Ok(identity);
            }
            info!(lan_address, "Certificate expired or address changed, regenerating");
        }

        let identity = generate(lan_address)?;
        self.persist(&identity);
        Ok(identity)
    }

    /// Loads the persisted pair. Any read or parse failure yields `None`.
    fn load(&self) -> Option<Identity> {
        let cert_pem = std::fs::read_to_string(&self.cert_path).ok()?;
        let key_pem = std::fs::read_to_string(&self.key_path).ok()?;

        if let Err(e) = KeyPair::from_pem(&key_pem) {
            warn!(error = %e, path = %self.key_path.display(), "Persisted private key unreadable");
            return None;
        }

        let identity = match CertificateParams::from_ca_cert_pem(&cert_pem) {
            Ok(params) => Identity::from_parts(cert_pem, key_pem, &params),
            Err(e) => {
                warn!(error = %e, path = %self.cert_path.display(), "Persisted certificate unreadable");
                return None;
            }
        };

        // a half-written pair leaves a certificate next to a foreign key
        if let Err(e) = identity.server_config() {
            warn!(error = %e, "Persisted certificate and key do not match");
            return None;
        }

        Some(identity)
    }

    /// Writes both files. Failures are logged; the identity stays usable.
    fn persist(&self, identity: &Identity) {
        let mut saved = true;

        if let Err(e) = write_owner_only(&self.cert_path, identity.cert_pem().as_bytes()) {
            warn!(error = %e, path = %self.cert_path.display(), "Could not save certificate");
            saved = false;
        }
        if let Err(e) = write_owner_only(&self.key_path, identity.key_pem().as_bytes()) {
            warn!(error = %e, path = %self.key_path.display(), "Could not save private key");
            saved = false;
        }

        if saved {
            info!(path = %self.cert_path.display(), "Generated new TLS certificate");
        }
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Generates a fresh identity valid from now for [`VALIDITY_DAYS`].
fn generate(lan_address: &str) -> Result<Identity> {
    let now = OffsetDateTime::now_utc();
    generate_with_validity(lan_address, now, now + time::Duration::days(VALIDITY_DAYS))
}

/// Generates a self-signed P-256 identity with explicit validity bounds.
fn generate_with_validity(
    lan_address: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> Result<Identity> {
    let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
        .map_err(|e| Error::identity(format!("key generation failed: {e}")))?;

    let mut params = CertificateParams::new(vec![LOCALHOST.to_string()])
        .map_err(|e| Error::identity(format!("invalid certificate parameters: {e}")))?;

    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    if lan_address != LOCALHOST {
        match lan_address.parse::<IpAddr>() {
            Ok(ip) => params.subject_alt_names.push(SanType::IpAddress(ip)),
            Err(_) => warn!(lan_address, "LAN address is not an IP, omitted from certificate"),
        }
    }

    let mut subject = DistinguishedName::new();
    subject.push(DnType::OrganizationName, ORGANIZATION);
    subject.push(DnType::CommonName, COMMON_NAME);
    params.distinguished_name = subject;

    params.not_before = not_before;
    params.not_after = not_after;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.is_ca = IsCa::ExplicitNoCa;

    let cert = params
        .clone()
        .self_signed(&key_pair)
        .map_err(|e| Error::identity(format!("certificate signing failed: {e}")))?;

    debug!(lan_address, "Self-signed certificate generated");

    Ok(Identity::from_parts(
        cert.pem(),
        key_pair.serialize_pem(),
        &params,
    ))
}

/// Converts an rcgen timestamp to chrono, clamping unrepresentable values.
fn to_chrono(value: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(value.unix_timestamp(), 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ============================================================================
// Tests
// ============================================================================
