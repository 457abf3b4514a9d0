//! RSA key material for OpenSSL signatures.
//!
//! Private keys are accepted as PKCS#8 PEM (optionally passphrase-encrypted)
//! or PKCS#1 PEM. Public keys are written as SubjectPublicKeyInfo PEM into a
//! `<container>.pubkey` file next to the signed container.
//!
//! Without the `openssl-sig` feature every constructor fails with
//! [`Error::SignatureBackendUnavailable`].

use std::path::{Path, PathBuf};

#[cfg(feature = "openssl-sig")]
use rsa::{
    Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding},
};
#[cfg(feature = "openssl-sig")]
use sha1::Sha1;

#[cfg(feature = "openssl-sig")]
use super::HashType;
use crate::{Error, Result};

#[cfg(not(feature = "openssl-sig"))]
const FEATURE: &str = "openssl-sig";

/// Returns the path of the public key file that accompanies `container`.
///
/// ```
/// use std::path::Path;
/// use pharbox::signature::public_key_path;
///
/// assert_eq!(
///     public_key_path(Path::new("dist/app.phar")),
///     Path::new("dist/app.phar.pubkey")
/// );
/// ```
pub fn public_key_path(container: &Path) -> PathBuf {
    let mut name = container.as_os_str().to_owned();
    name.push(".pubkey");
    PathBuf::from(name)
}

/// An RSA private key used to sign containers.
#[derive(Clone)]
pub struct SigningKey {
    #[cfg(feature = "openssl-sig")]
    inner: RsaPrivateKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").finish_non_exhaustive()
    }
}

/// An RSA public key used to verify containers.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    #[cfg(feature = "openssl-sig")]
    inner: RsaPublicKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey").finish_non_exhaustive()
    }
}

#[cfg(feature = "openssl-sig")]
impl SigningKey {
    /// Parses a PEM private key.
    ///
    /// Encrypted PKCS#8 keys need `passphrase`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the key cannot be parsed or decrypted.
    pub fn from_pem(pem: &str, passphrase: Option<&str>) -> Result<Self> {
        let inner = if pem.contains("BEGIN ENCRYPTED PRIVATE KEY") {
            let passphrase = passphrase.ok_or_else(|| {
                Error::InvalidKey("encrypted private key requires a passphrase".into())
            })?;
            RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase.as_bytes())
                .map_err(|e| Error::InvalidKey(format!("cannot decrypt private key: {e}")))?
        } else if pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| Error::InvalidKey(e.to_string()))?
        } else {
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| Error::InvalidKey(e.to_string()))?
        };
        Ok(Self { inner })
    }

    /// Reads a PEM private key from a file.
    pub fn from_file(path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<Self> {
        let pem = std::fs::read_to_string(path.as_ref())?;
        Self::from_pem(&pem, passphrase)
    }

    /// Derives the public half of this key.
    pub fn public_key(&self) -> Result<PublicKey> {
        Ok(PublicKey {
            inner: self.inner.to_public_key(),
        })
    }

    pub(crate) fn sign_sha1_digest(&self, digest: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .sign(Pkcs1v15Sign::new::<Sha1>(), digest)
            .map_err(|e| Error::InvalidKey(format!("RSA signing failed: {e}")))
    }
}

#[cfg(feature = "openssl-sig")]
impl From<RsaPrivateKey> for SigningKey {
    fn from(inner: RsaPrivateKey) -> Self {
        Self { inner }
    }
}

#[cfg(feature = "openssl-sig")]
impl PublicKey {
    /// Parses a SubjectPublicKeyInfo or PKCS#1 PEM public key.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = if pem.contains("BEGIN RSA PUBLIC KEY") {
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| Error::InvalidKey(e.to_string()))?
        } else {
            RsaPublicKey::from_public_key_pem(pem).map_err(|e| Error::InvalidKey(e.to_string()))?
        };
        Ok(Self { inner })
    }

    /// Reads a PEM public key from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let pem = std::fs::read_to_string(path.as_ref())?;
        Self::from_pem(&pem)
    }

    /// Encodes the key as SubjectPublicKeyInfo PEM.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::InvalidKey(e.to_string()))
    }

    pub(crate) fn verify_sha1_digest(&self, digest: &[u8], signature: &[u8]) -> Result<()> {
        self.inner
            .verify(Pkcs1v15Sign::new::<Sha1>(), digest, signature)
            .map_err(|_| Error::SignatureMismatch {
                hash_type: HashType::OpenSsl,
            })
    }
}

#[cfg(not(feature = "openssl-sig"))]
impl SigningKey {
    /// Parses a PEM private key.
    pub fn from_pem(_pem: &str, _passphrase: Option<&str>) -> Result<Self> {
        Err(Error::SignatureBackendUnavailable { feature: FEATURE })
    }

    /// Reads a PEM private key from a file.
    pub fn from_file(_path: impl AsRef<Path>, _passphrase: Option<&str>) -> Result<Self> {
        Err(Error::SignatureBackendUnavailable { feature: FEATURE })
    }

    /// Derives the public half of this key.
    pub fn public_key(&self) -> Result<PublicKey> {
        Err(Error::SignatureBackendUnavailable { feature: FEATURE })
    }

    pub(crate) fn sign_sha1_digest(&self, _digest: &[u8]) -> Result<Vec<u8>> {
        Err(Error::SignatureBackendUnavailable { feature: FEATURE })
    }
}

#[cfg(not(feature = "openssl-sig"))]
impl PublicKey {
    /// Parses a PEM public key.
    pub fn from_pem(_pem: &str) -> Result<Self> {
        Err(Error::SignatureBackendUnavailable { feature: FEATURE })
    }

    /// Reads a PEM public key from a file.
    pub fn from_file(_path: impl AsRef<Path>) -> Result<Self> {
        Err(Error::SignatureBackendUnavailable { feature: FEATURE })
    }

    /// Encodes the key as PEM.
    pub fn to_pem(&self) -> Result<String> {
        Err(Error::SignatureBackendUnavailable { feature: FEATURE })
    }

    pub(crate) fn verify_sha1_digest(&self, _digest: &[u8], _signature: &[u8]) -> Result<()> {
        Err(Error::SignatureBackendUnavailable { feature: FEATURE })
    }
}
