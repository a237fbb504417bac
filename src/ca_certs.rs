//! Certificate Provider
//!
//! Key generation, self-signed roots, CSRs and leaf issuance for the simulated
//! CA nodes. The [`CertificateProvider`] trait is the seam the architectures
//! are written against; [`RcgenProvider`] implements it with ECDSA P-256 keys
//! through `rcgen`.
//!
//! ## Key <-> integer conversion
//!
//! The distributed CA shares its root key as a field element. P-256 private
//! scalars are below the group order, which is also the field modulus, so the
//! scalar can be split directly. Rebuilding a key from the scalar needs the
//! matching public point (PKCS#8 carries both), which is published next to the
//! root certificate.

use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequest,
    CertificateSigningRequestParams, DistinguishedName, DnType, IsCa, KeyPair, SerialNumber,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use zeroize::Zeroizing;

use crate::ca_field::FIELD_BYTES;
use crate::ca_shamir::SecretScalar;

/// Validity of a CA root certificate
pub const ROOT_VALIDITY_DAYS: i64 = 365;

/// Validity of an issued leaf certificate
pub const LEAF_VALIDITY_DAYS: i64 = 90;

const COUNTRY: &str = "US";
const ORGANIZATION: &str = "Engineering Project";

// PKCS#8 v1 layout of a P-256 key: header, 32-byte scalar, public key tag,
// 65-byte uncompressed point
const P256_PKCS8_HEADER: [u8; 36] = [
    0x30, 0x81, 0x87, 0x02, 0x01, 0x00, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d,
    0x02, 0x01, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x04, 0x6d, 0x30,
    0x6b, 0x02, 0x01, 0x01, 0x04, 0x20,
];
const P256_PKCS8_PUBLIC_TAG: [u8; 5] = [0xa1, 0x44, 0x03, 0x42, 0x00];
const P256_POINT_BYTES: usize = 65;

/// Errors from certificate operations
#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate backend: {0}")]
    Backend(#[from] rcgen::Error),

    #[error("encoded material is not valid PEM text")]
    NotPem,

    #[error("unsupported private key encoding")]
    UnsupportedKey,

    #[error("reconstructed key does not match the published public key")]
    KeyMismatch,
}

/// Operations the CA architectures need from a certificate toolkit
pub trait CertificateProvider {
    type Key;
    type Cert: Clone;
    type Request;

    /// Fresh asymmetric key
    fn generate_keypair(&self) -> Result<Self::Key, CertError>;

    /// CA root certificate, marked as CA, fixed validity window
    fn self_sign(&self, key: &Self::Key, subject: &str) -> Result<Self::Cert, CertError>;

    /// Certificate signing request for `subject`
    fn create_request(&self, key: &Self::Key, subject: &str) -> Result<Self::Request, CertError>;

    /// Leaf certificate, marked non-CA, shorter validity window
    fn sign_request(
        &self,
        issuer_cert: &Self::Cert,
        issuer_key: &Self::Key,
        request: &Self::Request,
    ) -> Result<Self::Cert, CertError>;

    fn serialize_key(&self, key: &Self::Key) -> Zeroizing<Vec<u8>>;
    fn load_key(&self, bytes: &[u8]) -> Result<Self::Key, CertError>;
    fn serialize_cert(&self, cert: &Self::Cert) -> Vec<u8>;
    fn load_cert(&self, bytes: &[u8]) -> Result<Self::Cert, CertError>;

    /// Public half of `key`, as needed by [`Self::integer_to_key`]
    fn public_key(&self, key: &Self::Key) -> Vec<u8>;

    /// Private key as a field element
    fn key_to_integer(&self, key: &Self::Key) -> Result<SecretScalar, CertError>;

    /// Rebuild a private key from its field element and public half
    fn integer_to_key(
        &self,
        secret: &SecretScalar,
        public_key: &[u8],
    ) -> Result<Self::Key, CertError>;
}

/// PEM-encoded X.509 certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPem(String);

impl CertPem {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// [`CertificateProvider`] backed by `rcgen` with ECDSA P-256 keys
#[derive(Debug, Clone, Copy, Default)]
pub struct RcgenProvider;

impl RcgenProvider {
    pub fn new() -> Self {
        RcgenProvider
    }
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    // keep the DER integer positive
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

fn subject_name(common_name: &str, with_organization: bool) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, COUNTRY);
    if with_organization {
        dn.push(DnType::OrganizationName, ORGANIZATION);
    }
    dn.push(DnType::CommonName, common_name);
    dn
}

fn validity(params: &mut CertificateParams, days: i64) {
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(days);
}

fn pem_text(bytes: &[u8]) -> Result<&str, CertError> {
    std::str::from_utf8(bytes).map_err(|_| CertError::NotPem)
}

impl CertificateProvider for RcgenProvider {
    type Key = KeyPair;
    type Cert = CertPem;
    type Request = CertificateSigningRequest;

    fn generate_keypair(&self) -> Result<KeyPair, CertError> {
        Ok(KeyPair::generate()?)
    }

    fn self_sign(&self, key: &KeyPair, subject: &str) -> Result<CertPem, CertError> {
        let mut params = CertificateParams::default();
        params.distinguished_name = subject_name(subject, true);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.serial_number = Some(random_serial());
        validity(&mut params, ROOT_VALIDITY_DAYS);

        let cert = params.self_signed(key)?;
        Ok(CertPem(cert.pem()))
    }

    fn create_request(
        &self,
        key: &KeyPair,
        subject: &str,
    ) -> Result<CertificateSigningRequest, CertError> {
        let mut params = CertificateParams::default();
        params.distinguished_name = subject_name(subject, false);
        Ok(params.serialize_request(key)?)
    }

    fn sign_request(
        &self,
        issuer_cert: &CertPem,
        issuer_key: &KeyPair,
        request: &CertificateSigningRequest,
    ) -> Result<CertPem, CertError> {
        // rcgen signs with an in-memory issuer certificate; rebuild it from the
        // stored PEM under the issuer key
        let issuer = CertificateParams::from_ca_cert_pem(issuer_cert.as_str())?
            .self_signed(issuer_key)?;

        let mut csr = CertificateSigningRequestParams::from_der(request.der())?;
        csr.params.is_ca = IsCa::ExplicitNoCa;
        csr.params.serial_number = Some(random_serial());
        validity(&mut csr.params, LEAF_VALIDITY_DAYS);

        let cert = csr.signed_by(&issuer, issuer_key)?;
        Ok(CertPem(cert.pem()))
    }

    fn serialize_key(&self, key: &KeyPair) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(key.serialize_pem().into_bytes())
    }

    fn load_key(&self, bytes: &[u8]) -> Result<KeyPair, CertError> {
        Ok(KeyPair::from_pem(pem_text(bytes)?)?)
    }

    fn serialize_cert(&self, cert: &CertPem) -> Vec<u8> {
        cert.0.as_bytes().to_vec()
    }

    fn load_cert(&self, bytes: &[u8]) -> Result<CertPem, CertError> {
        let text = pem_text(bytes)?;
        // parse once so a corrupt file fails here rather than at signing time
        CertificateParams::from_ca_cert_pem(text)?;
        Ok(CertPem(text.to_string()))
    }

    fn public_key(&self, key: &KeyPair) -> Vec<u8> {
        key.public_key_raw().to_vec()
    }

    fn key_to_integer(&self, key: &KeyPair) -> Result<SecretScalar, CertError> {
        let der = Zeroizing::new(key.serialize_der());
        let scalar_end = P256_PKCS8_HEADER.len() + FIELD_BYTES;
        if der.len() < scalar_end || der[..P256_PKCS8_HEADER.len()] != P256_PKCS8_HEADER {
            return Err(CertError::UnsupportedKey);
        }
        Ok(SecretScalar::from_be_bytes(
            &der[P256_PKCS8_HEADER.len()..scalar_end],
        ))
    }

    fn integer_to_key(&self, secret: &SecretScalar, public_key: &[u8]) -> Result<KeyPair, CertError> {
        if public_key.len() != P256_POINT_BYTES || public_key[0] != 0x04 {
            return Err(CertError::UnsupportedKey);
        }

        let scalar = secret.to_fixed_bytes();
        let mut der = Zeroizing::new(Vec::with_capacity(
            P256_PKCS8_HEADER.len() + FIELD_BYTES + P256_PKCS8_PUBLIC_TAG.len() + P256_POINT_BYTES,
        ));
        der.extend_from_slice(&P256_PKCS8_HEADER);
        der.extend_from_slice(&scalar[..]);
        der.extend_from_slice(&P256_PKCS8_PUBLIC_TAG);
        der.extend_from_slice(public_key);

        // the backend checks that scalar and point belong together
        let key = KeyPair::try_from(der.as_slice()).map_err(|_| CertError::KeyMismatch)?;
        if key.public_key_raw() != public_key {
            return Err(CertError::KeyMismatch);
        }
        Ok(key)
    }
}
