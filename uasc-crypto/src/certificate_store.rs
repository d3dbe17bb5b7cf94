// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The certificate store is the PKI provider of the stack. It holds the
//! application's own certificate and private key and decides whether peer
//! certificates are acceptable.

use std::time::SystemTime;

use log::{error, warn};

use uasc_types::{Error, StatusCode};

use crate::{PrivateKey, Thumbprint, X509};

/// Validates peer certificates against a trust list and holds the
/// application instance certificate and private key.
///
/// Certificates are kept in memory. Loading them from a directory layout
/// is the responsibility of the application configuration layer.
#[derive(Debug)]
pub struct CertificateStore {
    own_cert: Option<X509>,
    own_private_key: Option<PrivateKey>,
    trusted_certs: Vec<X509>,
    /// When set, any certificate that passes the time validity check is
    /// accepted even if it is not in the trust list.
    trust_unknown_certs: bool,
    /// Skip the time validity check. Off by default.
    check_time: bool,
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateStore {
    /// Create an empty certificate store that trusts nobody.
    pub fn new() -> CertificateStore {
        CertificateStore {
            own_cert: None,
            own_private_key: None,
            trusted_certs: Vec::new(),
            trust_unknown_certs: false,
            check_time: true,
        }
    }

    /// Create a store with an application instance certificate and key.
    pub fn new_with_cert(cert: X509, key: PrivateKey) -> CertificateStore {
        CertificateStore {
            own_cert: Some(cert),
            own_private_key: Some(key),
            trusted_certs: Vec::new(),
            trust_unknown_certs: false,
            check_time: true,
        }
    }

    /// The application instance certificate, if one is set.
    pub fn read_own_cert(&self) -> Result<X509, Error> {
        self.own_cert.clone().ok_or_else(|| {
            Error::new(
                StatusCode::BadConfigurationError,
                "No application instance certificate is configured",
            )
        })
    }

    /// The application instance private key, if one is set.
    pub fn read_own_pkey(&self) -> Result<PrivateKey, Error> {
        self.own_private_key.clone().ok_or_else(|| {
            Error::new(
                StatusCode::BadConfigurationError,
                "No application instance private key is configured",
            )
        })
    }

    /// Set the application instance certificate and private key.
    pub fn set_own_cert(&mut self, cert: X509, key: PrivateKey) {
        self.own_cert = Some(cert);
        self.own_private_key = Some(key);
    }

    /// Add a certificate to the trust list.
    pub fn trust_cert(&mut self, cert: X509) {
        self.trusted_certs.push(cert);
    }

    /// Accept certificates that are not in the trust list. Useful for
    /// testing, unwise in production.
    pub fn set_trust_unknown_certs(&mut self, trust: bool) {
        if trust {
            warn!("Certificate store will trust unknown certificates");
        }
        self.trust_unknown_certs = trust;
    }

    /// Toggle checking of the certificate validity period.
    pub fn set_check_time(&mut self, check_time: bool) {
        self.check_time = check_time;
    }

    /// Test if a certificate with this thumbprint is in the trust list.
    pub fn is_trusted(&self, thumbprint: &Thumbprint) -> bool {
        self.trusted_certs
            .iter()
            .any(|c| &c.thumbprint() == thumbprint)
    }

    /// Validate the certificate presented by a peer: time validity first,
    /// then the trust list. Failures map onto the certificate error codes
    /// carried in transport level errors.
    pub fn validate_cert(&self, cert: &X509) -> Result<(), Error> {
        if self.check_time && !cert.is_time_valid(SystemTime::now()) {
            error!(
                "Certificate {} is outside its validity period",
                cert.subject()
            );
            return Err(Error::new(
                StatusCode::BadCertificateTimeInvalid,
                "Certificate validity period check failed",
            ));
        }
        if !self.trust_unknown_certs && !self.is_trusted(&cert.thumbprint()) {
            error!("Certificate {} is not trusted", cert.subject());
            return Err(Error::new(
                StatusCode::BadCertificateUntrusted,
                "Certificate is not in the trust list",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_against_trust_list() {
        let key = PrivateKey::new(1024).unwrap();
        let cert = X509::new_self_signed(&key, "peer", 365).unwrap();

        let mut store = CertificateStore::new();
        // Unknown certificate is rejected
        let err = store.validate_cert(&cert).unwrap_err();
        assert_eq!(err.status(), StatusCode::BadCertificateUntrusted);

        // Trusted certificate is accepted
        store.trust_cert(cert.clone());
        assert!(store.validate_cert(&cert).is_ok());

        // Trust-all mode accepts anything inside its validity period
        let other_key = PrivateKey::new(1024).unwrap();
        let other = X509::new_self_signed(&other_key, "other", 365).unwrap();
        let mut store = CertificateStore::new();
        store.set_trust_unknown_certs(true);
        assert!(store.validate_cert(&other).is_ok());
    }
}
