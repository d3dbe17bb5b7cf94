// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! X509 certificate wrapper.

use std::str::FromStr;
use std::time::SystemTime;

use rsa::pkcs1v15;
use sha2::Sha256;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    der::{Decode, Encode},
    name::Name,
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
    time::Validity,
    Certificate,
};

use uasc_types::{ByteString, Error, StatusCode};

use crate::{random, thumbprint::Thumbprint, PrivateKey, PublicKey};

/// An X509 certificate, parsed from and serializable back to DER.
#[derive(Debug, Clone)]
pub struct X509 {
    der: Vec<u8>,
    cert: Certificate,
}

impl PartialEq for X509 {
    fn eq(&self, other: &Self) -> bool {
        // Identity is the exact DER bytes
        self.der == other.der
    }
}

impl X509 {
    /// Parse a certificate from DER bytes.
    pub fn from_der(der: &[u8]) -> Result<X509, Error> {
        let cert = Certificate::from_der(der).map_err(|e| {
            Error::new(
                StatusCode::BadCertificateInvalid,
                format!("Certificate cannot be parsed, {}", e),
            )
        })?;
        Ok(X509 {
            der: der.to_vec(),
            cert,
        })
    }

    /// Parse a certificate from a byte string received in a security header.
    pub fn from_byte_string(data: &ByteString) -> Result<X509, Error> {
        if data.is_null_or_empty() {
            Err(Error::new(
                StatusCode::BadCertificateInvalid,
                "Certificate byte string is null",
            ))
        } else {
            Self::from_der(data.as_ref())
        }
    }

    /// Create a self signed certificate over a fresh or existing private key.
    /// Used by tests and samples; production certificates come from files or a PKI.
    pub fn new_self_signed(key: &PrivateKey, common_name: &str, validity_days: u64) -> Result<X509, Error> {
        let err_map = |e: &dyn std::fmt::Display| {
            Error::new(
                StatusCode::BadUnexpectedError,
                format!("Cannot build certificate, {}", e),
            )
        };

        let signing_key = pkcs1v15::SigningKey::<Sha256>::new(key.inner().clone());
        let serial_number = SerialNumber::from(random::u32_id());
        let validity = Validity::from_now(std::time::Duration::from_secs(validity_days * 86400))
            .map_err(|e| err_map(&e))?;
        let subject = Name::from_str(&format!("CN={}", common_name)).map_err(|e| err_map(&e))?;
        let spki_der = key.public_key().to_der()?;
        let spki =
            SubjectPublicKeyInfoOwned::try_from(spki_der.as_slice()).map_err(|e| err_map(&e))?;

        let builder = CertificateBuilder::new(
            Profile::Root,
            serial_number,
            validity,
            subject,
            spki,
            &signing_key,
        )
        .map_err(|e| err_map(&e))?;
        let cert = builder
            .build::<pkcs1v15::Signature>()
            .map_err(|e| err_map(&e))?;
        let der = cert.to_der().map_err(|e| err_map(&e))?;
        Ok(X509 { der, cert })
    }

    /// The certificate as a byte string for the asymmetric security header.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(self.der.clone())
    }

    /// The raw DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The SHA-1 thumbprint of the DER encoded certificate.
    pub fn thumbprint(&self) -> Thumbprint {
        Thumbprint::new(&self.der)
    }

    /// Extract the RSA public key from the certificate.
    pub fn public_key(&self) -> Result<PublicKey, Error> {
        let spki_der = self
            .cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| {
                Error::new(
                    StatusCode::BadCertificateInvalid,
                    format!("Cannot extract public key, {}", e),
                )
            })?;
        PublicKey::from_der(&spki_der)
    }

    /// Test if the certificate is valid at the supplied point in time.
    pub fn is_time_valid(&self, now: SystemTime) -> bool {
        let validity = &self.cert.tbs_certificate.validity;
        let not_before = validity.not_before.to_system_time();
        let not_after = validity.not_after.to_system_time();
        not_before <= now && now <= not_after
    }

    /// The subject of the certificate in RFC 4514 form.
    pub fn subject(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeySize;

    #[test]
    fn self_signed_round_trip() {
        let key = PrivateKey::new(1024).unwrap();
        let cert = X509::new_self_signed(&key, "UASC test", 365).unwrap();

        // DER round trip preserves identity and thumbprint
        let bs = cert.as_byte_string();
        let cert2 = X509::from_byte_string(&bs).unwrap();
        assert_eq!(cert, cert2);
        assert_eq!(cert.thumbprint(), cert2.thumbprint());

        // The public key in the certificate matches the private key
        let public = cert.public_key().unwrap();
        assert_eq!(public.size(), key.size());

        assert!(cert.is_time_valid(SystemTime::now()));
        assert!(!cert.is_time_valid(SystemTime::UNIX_EPOCH));

        assert_eq!(cert.subject(), "CN=UASC test");
    }

    #[test]
    fn reject_garbage() {
        assert!(X509::from_der(&[1, 2, 3]).is_err());
        assert!(X509::from_byte_string(&ByteString::null()).is_err());
    }
}
