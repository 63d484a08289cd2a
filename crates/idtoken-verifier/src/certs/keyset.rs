//! Key sets parsed from the provider's certificate document

use std::collections::BTreeMap;
use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey as SpkiPublicKey;

use crate::error::{VerifyError, VerifyResult};

/// RSA public key taken from one provider certificate
#[derive(Clone)]
pub struct PublicKey {
    kid: Arc<str>,
    pem: Arc<str>,
    key: DecodingKey,
}

impl PublicKey {
    /// Extract the RSA public key from a PEM encoded X.509 certificate
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if the PEM or the certificate does not
    /// parse, or the certificate's key is not RSA.
    pub fn from_certificate_pem(kid: &str, pem: &str) -> VerifyResult<Self> {
        let (_, block) = parse_x509_pem(pem.as_bytes()).map_err(|e| {
            VerifyError::Fetch(format!("certificate '{kid}' is not valid PEM: {e}"))
        })?;
        let cert = block.parse_x509().map_err(|e| {
            VerifyError::Fetch(format!("certificate '{kid}' is not valid X.509: {e}"))
        })?;

        let key = match cert.public_key().parsed() {
            Ok(SpkiPublicKey::RSA(rsa)) => DecodingKey::from_rsa_raw_components(
                strip_leading_zeros(rsa.modulus),
                strip_leading_zeros(rsa.exponent),
            ),
            Ok(_) => {
                return Err(VerifyError::Fetch(format!(
                    "certificate '{kid}' does not carry an RSA key"
                )));
            }
            Err(e) => {
                return Err(VerifyError::Fetch(format!(
                    "certificate '{kid}' has an unreadable public key: {e}"
                )));
            }
        };

        Ok(Self {
            kid: Arc::from(kid),
            pem: Arc::from(pem),
            key,
        })
    }

    /// Key identifier this key was published under
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The certificate as published
    pub fn certificate_pem(&self) -> &str {
        &self.pem
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

// DER INTEGERs carry a sign byte; the key components are unsigned
fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.kid == other.kid && self.pem == other.pem
    }
}

/// Mapping from key identifier to public key
///
/// A key set always comes from exactly one fetch of the certificate
/// document; sets from different fetches are never merged, so a key the
/// provider has withdrawn cannot come back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySet {
    keys: BTreeMap<String, PublicKey>,
}

impl KeySet {
    /// Parse a `{kid: pem}` document
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if any certificate fails to parse; a
    /// partially readable document is not used.
    pub fn from_pem_map(certs: &BTreeMap<String, String>) -> VerifyResult<Self> {
        let keys = certs
            .iter()
            .map(|(kid, pem)| Ok((kid.clone(), PublicKey::from_certificate_pem(kid, pem)?)))
            .collect::<VerifyResult<BTreeMap<_, _>>>()?;

        Ok(Self { keys })
    }

    /// Parse the raw certificate document body
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if the body is not a JSON object of
    /// strings or a certificate fails to parse.
    pub fn from_json(body: &[u8]) -> VerifyResult<Self> {
        let certs: BTreeMap<String, String> = serde_json::from_slice(body)
            .map_err(|e| VerifyError::Fetch(format!("invalid certificate document: {e}")))?;
        Self::from_pem_map(&certs)
    }

    /// Find a key by id
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::UnknownKey`] if `kid` is not in this set.
    pub fn lookup(&self, kid: &str) -> VerifyResult<PublicKey> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownKey(kid.to_string()))
    }

    /// Key identifiers in this set
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The `{kid: pem}` form, used to serialize the set into the shared cache
    pub fn to_pem_map(&self) -> BTreeMap<String, String> {
        self.keys
            .iter()
            .map(|(kid, key)| (kid.clone(), key.certificate_pem().to_string()))
            .collect()
    }
}
