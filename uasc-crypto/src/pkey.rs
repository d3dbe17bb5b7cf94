// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Asymmetric (RSA) key wrappers used for the OpenSecureChannel handshake.

use rand::rngs::OsRng;
use rsa::{
    pkcs1v15,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    signature::{SignatureEncoding, Signer, Verifier},
    traits::PublicKeyParts,
    Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::Sha256;

use uasc_types::{Error, StatusCode};

/// The padding scheme an asymmetric operation uses, dictated by the
/// security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaPadding {
    /// PKCS#1 v1.5 padding (Basic128Rsa15).
    Pkcs1,
    /// OAEP padding with SHA-1 (Basic256, Basic256Sha256).
    OaepSha1,
}

impl RsaPadding {
    /// Number of bytes of each plain text block consumed by the padding.
    pub fn byte_count(&self) -> usize {
        match self {
            RsaPadding::Pkcs1 => 11,
            // 2 + 2 * SHA-1 digest size
            RsaPadding::OaepSha1 => 42,
        }
    }
}

/// Trait for things with a key size, notably private and public RSA keys.
pub trait KeySize {
    /// The size of the key in bytes. This is also the size of a signature
    /// and of a single cipher text block.
    fn size(&self) -> usize;

    /// The number of plain text bytes that fit in one encrypted block under
    /// the given padding.
    fn plain_text_block_size(&self, padding: RsaPadding) -> usize {
        self.size() - padding.byte_count()
    }

    /// The size of the cipher text produced for `plain_text_size` bytes of
    /// input under the given padding. Always a whole number of key-sized blocks.
    fn calculate_cipher_text_size(&self, plain_text_size: usize, padding: RsaPadding) -> usize {
        let block_size = self.plain_text_block_size(padding);
        let blocks = plain_text_size.div_ceil(block_size);
        blocks * self.size()
    }
}

/// An RSA private key.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key: RsaPrivateKey,
}

impl KeySize for PrivateKey {
    fn size(&self) -> usize {
        self.key.size()
    }
}

impl PrivateKey {
    /// Generate a fresh RSA key of `bit_length` bits.
    pub fn new(bit_length: usize) -> Result<PrivateKey, Error> {
        let key = RsaPrivateKey::new(&mut OsRng, bit_length)
            .map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))?;
        Ok(PrivateKey { key })
    }

    /// Read a private key from PKCS#8 PEM.
    pub fn from_pem(pem: &str) -> Result<PrivateKey, Error> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
        Ok(PrivateKey { key })
    }

    /// Write the private key as PKCS#8 PEM.
    pub fn to_pem(&self) -> Result<String, Error> {
        self.key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map(|p| p.to_string())
            .map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.key.to_public_key(),
        }
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.key
    }

    /// Sign `data` with RSA PKCS#1 v1.5 / SHA-1 into `signature`.
    pub fn sign_sha1(&self, data: &[u8], signature: &mut [u8]) -> Result<usize, Error> {
        let signing_key = pkcs1v15::SigningKey::<Sha1>::new(self.key.clone());
        let sig = signing_key.sign(data).to_bytes();
        Self::copy_signature(&sig, signature)
    }

    /// Sign `data` with RSA PKCS#1 v1.5 / SHA-256 into `signature`.
    pub fn sign_sha256(&self, data: &[u8], signature: &mut [u8]) -> Result<usize, Error> {
        let signing_key = pkcs1v15::SigningKey::<Sha256>::new(self.key.clone());
        let sig = signing_key.sign(data).to_bytes();
        Self::copy_signature(&sig, signature)
    }

    fn copy_signature(sig: &[u8], signature: &mut [u8]) -> Result<usize, Error> {
        if signature.len() != sig.len() {
            return Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!(
                    "Signature buffer has size {} but the signature is {} bytes",
                    signature.len(),
                    sig.len()
                ),
            ));
        }
        signature.copy_from_slice(sig);
        Ok(sig.len())
    }

    /// Decrypt `src` into `dst`, processing one key-sized block at a time.
    /// Returns the total number of plain text bytes.
    pub fn decrypt(
        &self,
        src: &[u8],
        dst: &mut [u8],
        padding: RsaPadding,
    ) -> Result<usize, Error> {
        let cipher_block_size = self.size();
        if src.len() % cipher_block_size != 0 {
            return Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!(
                    "Cipher text size {} is not a multiple of the key size {}",
                    src.len(),
                    cipher_block_size
                ),
            ));
        }

        let mut src_idx = 0;
        let mut dst_idx = 0;
        while src_idx < src.len() {
            let block = &src[src_idx..(src_idx + cipher_block_size)];
            let plain = match padding {
                RsaPadding::Pkcs1 => self.key.decrypt(Pkcs1v15Encrypt, block),
                RsaPadding::OaepSha1 => self.key.decrypt(Oaep::new::<Sha1>(), block),
            }
            .map_err(|e| {
                Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    format!("Decryption failed, {}", e),
                )
            })?;
            dst[dst_idx..(dst_idx + plain.len())].copy_from_slice(&plain);
            src_idx += cipher_block_size;
            dst_idx += plain.len();
        }
        Ok(dst_idx)
    }
}

/// An RSA public key, typically extracted from an X509 certificate.
#[derive(Debug, Clone)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl KeySize for PublicKey {
    fn size(&self) -> usize {
        self.key.size()
    }
}

impl PublicKey {
    /// Read a public key from SubjectPublicKeyInfo DER bytes.
    pub fn from_der(der: &[u8]) -> Result<PublicKey, Error> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))?;
        Ok(PublicKey { key })
    }

    /// Write the public key as SubjectPublicKeyInfo DER bytes.
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        self.key
            .to_public_key_der()
            .map(|d| d.as_bytes().to_vec())
            .map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))
    }

    /// Verify an RSA PKCS#1 v1.5 / SHA-1 signature over `data`.
    pub fn verify_sha1(&self, data: &[u8], signature: &[u8]) -> Result<(), Error> {
        let verifying_key = pkcs1v15::VerifyingKey::<Sha1>::new(self.key.clone());
        let sig = pkcs1v15::Signature::try_from(signature)
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
        verifying_key.verify(data, &sig).map_err(|e| {
            Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!("Signature verification failed, {}", e),
            )
        })
    }

    /// Verify an RSA PKCS#1 v1.5 / SHA-256 signature over `data`.
    pub fn verify_sha256(&self, data: &[u8], signature: &[u8]) -> Result<(), Error> {
        let verifying_key = pkcs1v15::VerifyingKey::<Sha256>::new(self.key.clone());
        let sig = pkcs1v15::Signature::try_from(signature)
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
        verifying_key.verify(data, &sig).map_err(|e| {
            Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!("Signature verification failed, {}", e),
            )
        })
    }

    /// Encrypt `src` into `dst`, one plain text block at a time. Returns the
    /// total cipher text size, a whole number of key-sized blocks.
    pub fn encrypt(
        &self,
        src: &[u8],
        dst: &mut [u8],
        padding: RsaPadding,
    ) -> Result<usize, Error> {
        let plain_block_size = self.plain_text_block_size(padding);
        let cipher_block_size = self.size();

        let mut src_idx = 0;
        let mut dst_idx = 0;
        while src_idx < src.len() {
            let end = (src_idx + plain_block_size).min(src.len());
            let block = &src[src_idx..end];
            let cipher = match padding {
                RsaPadding::Pkcs1 => self.key.encrypt(&mut OsRng, Pkcs1v15Encrypt, block),
                RsaPadding::OaepSha1 => self.key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), block),
            }
            .map_err(|e| {
                Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    format!("Encryption failed, {}", e),
                )
            })?;
            if dst.len() < dst_idx + cipher.len() {
                return Err(Error::new(
                    StatusCode::BadEncodingLimitsExceeded,
                    "Destination buffer is too small for the cipher text",
                ));
            }
            dst[dst_idx..(dst_idx + cipher.len())].copy_from_slice(&cipher);
            src_idx = end;
            dst_idx += cipher_block_size;
        }
        Ok(dst_idx)
    }

    pub(crate) fn from_rsa(key: RsaPublicKey) -> PublicKey {
        PublicKey { key }
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> PrivateKey {
        // 2048 bit keys are slow to generate in debug builds, 1024 is plenty
        // for round trip testing
        PrivateKey::new(1024).unwrap()
    }

    #[test]
    fn sign_verify_sha256() {
        let key = test_key();
        let public = key.public_key();
        let mut signature = vec![0u8; key.size()];
        key.sign_sha256(b"message", &mut signature).unwrap();
        assert!(public.verify_sha256(b"message", &signature).is_ok());
        assert!(public.verify_sha256(b"other", &signature).is_err());
    }

    #[test]
    fn sign_verify_sha1() {
        let key = test_key();
        let public = key.public_key();
        let mut signature = vec![0u8; key.size()];
        key.sign_sha1(b"message", &mut signature).unwrap();
        assert!(public.verify_sha1(b"message", &signature).is_ok());
    }

    #[test]
    fn encrypt_decrypt_multi_block() {
        let key = test_key();
        let public = key.public_key();

        // Two and a bit plain text blocks
        let plain_block = public.plain_text_block_size(RsaPadding::OaepSha1);
        let src = vec![5u8; plain_block * 2 + 17];
        let cipher_size = public.calculate_cipher_text_size(src.len(), RsaPadding::OaepSha1);
        assert_eq!(cipher_size, 3 * public.size());

        let mut cipher = vec![0u8; cipher_size];
        let written = public
            .encrypt(&src, &mut cipher, RsaPadding::OaepSha1)
            .unwrap();
        assert_eq!(written, cipher_size);

        let mut plain = vec![0u8; cipher_size];
        let read = key.decrypt(&cipher, &mut plain, RsaPadding::OaepSha1).unwrap();
        assert_eq!(&plain[..read], &src[..]);
    }

    #[test]
    fn pem_round_trip() {
        let key = test_key();
        let pem = key.to_pem().unwrap();
        let key2 = PrivateKey::from_pem(&pem).unwrap();
        assert_eq!(key.size(), key2.size());
    }
}
