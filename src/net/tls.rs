//! TLS material: loading, freshness, and self-signed regeneration.
//!
//! # Responsibilities
//! - Load a PEM certificate/key pair and read its validity window
//! - Build mutual-TLS server and client configurations from the pair
//! - Regenerate the pair when it is missing or close to expiry
//!
//! # Data Flow
//! ```text
//! load_or_generate(cert, key)
//!     → load: ok + fresh      → reuse
//!     → load: ok + stale      → generate → write (atomic, 0600)
//!     → load: NotFound        → generate → write (atomic, 0600)
//!     → load: any other error → surface
//! ```
//!
//! # Design Decisions
//! - The certificate is its own trust root: one self-signed pair serves
//!   as server identity, client identity, and CA pool on both sides
//! - Generated certificates are not flagged as CA; rustls refuses a CA
//!   certificate presented as an end-entity certificate
//! - The clock is a parameter so freshness can be tested deterministically

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, PKCS_RSA_SHA256,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

/// Lifetime of a generated certificate.
pub const CERT_LIFETIME: Duration = Duration::days(30);

/// Material expiring within this window is regenerated.
pub const FRESHNESS_MARGIN: Duration = Duration::days(7);

/// Default RSA modulus size of generated keys.
pub const DEFAULT_KEY_BITS: usize = 4096;

/// Server name the certificate is issued for.
pub const TLS_SERVER_NAME: &str = "localhost";

/// Default file names inside a TLS directory.
pub const CERT_FILE_NAME: &str = "cert.pem";
pub const KEY_FILE_NAME: &str = "key.pem";

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("TLS file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TLS material in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to generate TLS material: {0}")]
    Generate(String),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TlsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TlsError::NotFound { .. })
    }
}

/// A PEM certificate/key pair and the certificate's validity window.
#[derive(Clone)]
pub struct TlsMaterial {
    cert_pem: String,
    key_pem: String,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

impl TlsMaterial {
    /// Read and parse both files.
    pub fn load(cert_file: &Path, key_file: &Path) -> Result<Self, TlsError> {
        let cert_pem = read_pem(cert_file)?;
        let key_pem = read_pem(key_file)?;

        let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| parse_error(cert_file, e.to_string()))?;
        let leaf = certs
            .first()
            .ok_or_else(|| parse_error(cert_file, "no certificate found"))?;

        match rustls_pemfile::private_key(&mut key_pem.as_bytes()) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(parse_error(key_file, "no private key found")),
            Err(e) => return Err(parse_error(key_file, e.to_string())),
        }

        let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref())
            .map_err(|e| parse_error(cert_file, e.to_string()))?;
        let validity = cert.validity();
        let not_before = timestamp(validity.not_before.timestamp(), cert_file)?;
        let not_after = timestamp(validity.not_after.timestamp(), cert_file)?;

        Ok(Self {
            cert_pem,
            key_pem,
            not_before,
            not_after,
        })
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// True iff `now + 7d < not_after`.
    pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
        now + FRESHNESS_MARGIN < self.not_after
    }

    fn identity(&self) -> Identity {
        Identity::from_pem(&self.cert_pem, &self.key_pem)
    }

    fn root(&self) -> Certificate {
        Certificate::from_pem(&self.cert_pem)
    }

    /// Server side: present the pair, require client certificates signed by it.
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(self.identity())
            .client_ca_root(self.root())
    }

    /// Client side: trust the pair, present it as the client certificate.
    pub fn client_tls_config(&self) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .ca_certificate(self.root())
            .identity(self.identity())
            .domain_name(TLS_SERVER_NAME)
    }
}

/// Load a mutual-TLS server configuration.
pub fn load_server(cert_file: &Path, key_file: &Path) -> Result<ServerTlsConfig, TlsError> {
    TlsMaterial::load(cert_file, key_file).map(|m| m.server_tls_config())
}

/// Load a mutual-TLS client configuration.
pub fn load_client(cert_file: &Path, key_file: &Path) -> Result<ClientTlsConfig, TlsError> {
    TlsMaterial::load(cert_file, key_file).map(|m| m.client_tls_config())
}

/// Produces self-signed RSA material.
#[derive(Debug, Clone, Copy)]
pub struct Generator {
    key_bits: usize,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl Generator {
    pub fn with_key_bits(key_bits: usize) -> Self {
        Self { key_bits }
    }

    /// Generate a pair valid from `now` for [`CERT_LIFETIME`].
    pub fn generate(&self, now: OffsetDateTime) -> Result<TlsMaterial, TlsError> {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), self.key_bits)
            .map_err(gen_error)?;
        let key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(gen_error)?;
        let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA256)
            .map_err(gen_error)?;

        let mut params =
            CertificateParams::new(vec![TLS_SERVER_NAME.to_string(), "127.0.0.1".to_string()])
                .map_err(gen_error)?;
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, "runme");
        subject.push(DnType::OrganizationName, "Stateful, Inc.");
        params.distinguished_name = subject;
        // X.509 validity has second precision; match what a reload sees.
        let not_before = now.replace_nanosecond(0).map_err(gen_error)?;
        let not_after = not_before + CERT_LIFETIME;
        params.not_before = not_before;
        params.not_after = not_after;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let cert = params.self_signed(&key_pair).map_err(gen_error)?;

        Ok(TlsMaterial {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
            not_before,
            not_after,
        })
    }
}

/// Load the pair at the given paths, regenerating it when missing or stale.
pub fn load_or_generate(cert_file: &Path, key_file: &Path) -> Result<TlsMaterial, TlsError> {
    load_or_generate_at(cert_file, key_file, OffsetDateTime::now_utc(), &Generator::default())
}

/// [`load_or_generate`] with an explicit clock and generator.
pub fn load_or_generate_at(
    cert_file: &Path,
    key_file: &Path,
    now: OffsetDateTime,
    generator: &Generator,
) -> Result<TlsMaterial, TlsError> {
    match TlsMaterial::load(cert_file, key_file) {
        Ok(material) if material.is_fresh_at(now) => {
            tracing::debug!(
                cert = %cert_file.display(),
                not_after = %material.not_after,
                "Reusing TLS material"
            );
            return Ok(material);
        }
        Ok(material) => {
            tracing::info!(
                cert = %cert_file.display(),
                not_after = %material.not_after,
                "TLS material expires soon, regenerating"
            );
        }
        Err(e) if e.is_not_found() => {
            tracing::info!(cert = %cert_file.display(), "TLS material not found, generating");
        }
        Err(e) => return Err(e),
    }

    let material = generator.generate(now)?;
    write_pair(cert_file, key_file, &material)?;

    tracing::info!(
        cert = %cert_file.display(),
        key = %key_file.display(),
        not_after = %material.not_after,
        "Generated TLS material"
    );
    Ok(material)
}

fn read_pem(path: &Path) -> Result<String, TlsError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            TlsError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            TlsError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn gen_error(e: impl std::fmt::Display) -> TlsError {
    TlsError::Generate(e.to_string())
}

fn parse_error(path: &Path, message: impl Into<String>) -> TlsError {
    TlsError::Parse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn timestamp(secs: i64, path: &Path) -> Result<OffsetDateTime, TlsError> {
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| parse_error(path, e.to_string()))
}

/// Write the certificate, then the key. A failed key write removes the new
/// certificate so the pair on disk never mismatches.
fn write_pair(cert_file: &Path, key_file: &Path, material: &TlsMaterial) -> Result<(), TlsError> {
    write_private(cert_file, material.cert_pem.as_bytes())?;
    if let Err(e) = write_private(key_file, material.key_pem.as_bytes()) {
        if let Err(remove) = fs::remove_file(cert_file) {
            tracing::warn!(
                cert = %cert_file.display(),
                error = %remove,
                "Failed to remove orphaned certificate"
            );
        }
        return Err(e);
    }
    Ok(())
}

/// Write `contents` to `path` with mode 0600 via rename from a sibling
/// temporary file. Missing parent directories are created with mode 0700.
fn write_private(path: &Path, contents: &[u8]) -> Result<(), TlsError> {
    let write_error = |source: io::Error| TlsError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(write_error)?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    file.write_all(contents).map_err(write_error)?;
    file.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    file.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn generator() -> Generator {
        Generator::with_key_bits(2048)
    }

    #[test]
    fn test_generate_then_reuse() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("tls/cert.pem");
        let key = dir.path().join("tls/key.pem");
        let now = OffsetDateTime::now_utc();

        let first = load_or_generate_at(&cert, &key, now, &generator()).unwrap();
        let second = load_or_generate_at(&cert, &key, now, &generator()).unwrap();
        assert_eq!(first.cert_pem(), second.cert_pem());
        assert_eq!(first.key_pem(), second.key_pem());
        assert!(second.is_fresh_at(now));
    }

    #[test]
    fn test_permissions() {
        let dir = TempDir::new().unwrap();
        let tls_dir = dir.path().join("nested/tls");
        let cert = tls_dir.join("cert.pem");
        let key = tls_dir.join("key.pem");

        load_or_generate_at(&cert, &key, OffsetDateTime::now_utc(), &generator()).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&cert), 0o600);
        assert_eq!(mode(&key), 0o600);
        assert_eq!(mode(&tls_dir), 0o700);
    }

    #[test]
    fn test_freshness_boundary() {
        let now = OffsetDateTime::now_utc();
        let material = generator().generate(now).unwrap();

        assert!(material.is_fresh_at(now + Duration::days(22)));
        assert!(!material.is_fresh_at(now + Duration::days(23) + Duration::seconds(1)));
        assert!(!material.is_fresh_at(now + Duration::days(24)));
    }

    #[test]
    fn test_loaded_validity_window() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        let now = OffsetDateTime::now_utc();

        load_or_generate_at(&cert, &key, now, &generator()).unwrap();
        let loaded = TlsMaterial::load(&cert, &key).unwrap();
        let lifetime = loaded.not_after() - loaded.not_before();
        assert_eq!(lifetime.whole_days(), 30);
    }

    #[test]
    fn test_not_found_is_distinguished() {
        let dir = TempDir::new().unwrap();
        let err = TlsMaterial::load(&dir.path().join("cert.pem"), &dir.path().join("key.pem"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_corrupt_material_surfaces() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        fs::write(&cert, "not a certificate").unwrap();
        fs::write(&key, "not a key").unwrap();

        let err = load_or_generate_at(&cert, &key, OffsetDateTime::now_utc(), &generator())
            .unwrap_err();
        assert!(matches!(err, TlsError::Parse { .. }));
        assert_eq!(fs::read_to_string(&cert).unwrap(), "not a certificate");
    }

    #[test]
    fn test_generated_matches_reloaded() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        let now = OffsetDateTime::now_utc().replace_nanosecond(123_456_789).unwrap();

        let generated = load_or_generate_at(&cert, &key, now, &generator()).unwrap();
        let loaded = TlsMaterial::load(&cert, &key).unwrap();
        assert_eq!(generated.not_before(), loaded.not_before());
        assert_eq!(generated.not_after(), loaded.not_after());
        assert_eq!(generated.not_before().nanosecond(), 0);
    }

    #[test]
    fn test_failed_key_write_leaves_no_certificate() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let key = blocker.join("key.pem");

        let err = load_or_generate_at(&cert, &key, OffsetDateTime::now_utc(), &generator())
            .unwrap_err();
        assert!(matches!(err, TlsError::Write { .. }));
        assert!(!cert.exists());
    }
}
