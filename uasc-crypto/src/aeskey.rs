// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Symmetric encryption / decryption wrapper.

use std::result::Result;

use aes::cipher::{
    block_padding::NoPadding, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
    KeyIvInit,
};

use uasc_types::status_code::StatusCode;
use uasc_types::Error;

use super::{SecretBytes, SecurityPolicy};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const AES_BLOCK_SIZE: usize = 16;
const AES128_KEY_SIZE: usize = 16;
const AES256_KEY_SIZE: usize = 32;

type AesArray128 = GenericArray<u8, <aes::Aes128 as aes::cipher::BlockSizeUser>::BlockSize>;
type AesArray256 = GenericArray<u8, <aes::Aes256 as aes::cipher::KeySizeUser>::KeySize>;

type EncryptResult = Result<usize, Error>;

#[derive(Debug, Clone, PartialEq)]
/// Wrapper around an AES key. The key material is wiped on drop.
pub struct AesKey {
    value: SecretBytes,
    security_policy: SecurityPolicy,
}

impl AesKey {
    /// Create a new AES key with the given security policy and raw value.
    pub fn new(security_policy: SecurityPolicy, value: &[u8]) -> AesKey {
        AesKey {
            value: SecretBytes::from(value),
            security_policy,
        }
    }

    /// Get the raw value of this AES key.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    fn validate_aes_args(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> Result<(), Error> {
        if dst.len() < src.len() {
            Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!("Dst buffer is too small {} vs {}", dst.len(), src.len()),
            ))
        } else if iv.len() != self.iv_length() {
            Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!("IV is not an expected size, len = {}", iv.len()),
            ))
        } else if src.len() % self.block_size() != 0 {
            Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!(
                    "Input size {} is not a multiple of the block size, check stack",
                    src.len()
                ),
            ))
        } else {
            Ok(())
        }
    }

    fn encrypt_aes128_cbc(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> EncryptResult {
        self.validate_aes_args(src, iv, dst)?;
        Aes128CbcEnc::new(
            AesArray128::from_slice(self.value()),
            AesArray128::from_slice(iv),
        )
        .encrypt_padded_b2b_mut::<NoPadding>(src, dst)
        .map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))?;
        Ok(src.len())
    }

    fn encrypt_aes256_cbc(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> EncryptResult {
        self.validate_aes_args(src, iv, dst)?;
        Aes256CbcEnc::new(
            AesArray256::from_slice(self.value()),
            AesArray128::from_slice(iv),
        )
        .encrypt_padded_b2b_mut::<NoPadding>(src, dst)
        .map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))?;
        Ok(src.len())
    }

    fn decrypt_aes128_cbc(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> EncryptResult {
        self.validate_aes_args(src, iv, dst)?;
        Aes128CbcDec::new(
            AesArray128::from_slice(self.value()),
            AesArray128::from_slice(iv),
        )
        .decrypt_padded_b2b_mut::<NoPadding>(src, dst)
        .map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))?;
        Ok(src.len())
    }

    fn decrypt_aes256_cbc(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> EncryptResult {
        self.validate_aes_args(src, iv, dst)?;
        Aes256CbcDec::new(
            AesArray256::from_slice(self.value()),
            AesArray128::from_slice(iv),
        )
        .decrypt_padded_b2b_mut::<NoPadding>(src, dst)
        .map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))?;
        Ok(src.len())
    }

    /// Get the block size of the associated security policy for this key.
    pub fn block_size(&self) -> usize {
        match self.security_policy {
            SecurityPolicy::Basic128Rsa15
            | SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256 => AES_BLOCK_SIZE,
            _ => 0,
        }
    }

    /// Get the IV length of the associated security policy for this key.
    pub fn iv_length(&self) -> usize {
        match self.security_policy {
            SecurityPolicy::Basic128Rsa15
            | SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256 => AES_BLOCK_SIZE,
            _ => 0,
        }
    }

    /// Get the AES key length.
    pub fn key_length(&self) -> usize {
        match self.security_policy {
            SecurityPolicy::Basic128Rsa15 => AES128_KEY_SIZE,
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => AES256_KEY_SIZE,
            _ => 0,
        }
    }

    /// Encrypt data in `src` into `dst`. The initialization vector is the one derived for the
    /// secure channel.
    pub fn encrypt(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> EncryptResult {
        match self.security_policy {
            SecurityPolicy::Basic128Rsa15 => self.encrypt_aes128_cbc(src, iv, dst),
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => {
                self.encrypt_aes256_cbc(src, iv, dst)
            }
            _ => Err(Error::new(
                StatusCode::BadUnexpectedError,
                "Unsupported security policy",
            )),
        }
    }

    /// Decrypts data in `src` into `dst`.
    pub fn decrypt(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> EncryptResult {
        match self.security_policy {
            SecurityPolicy::Basic128Rsa15 => self.decrypt_aes128_cbc(src, iv, dst),
            SecurityPolicy::Basic256 | SecurityPolicy::Basic256Sha256 => {
                self.decrypt_aes256_cbc(src, iv, dst)
            }
            _ => Err(Error::new(
                StatusCode::BadUnexpectedError,
                "Unsupported security policy",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random;

    #[test]
    fn aes128_round_trip() {
        let mut key_bytes = [0u8; AES128_KEY_SIZE];
        random::bytes(&mut key_bytes);
        let key = AesKey::new(SecurityPolicy::Basic128Rsa15, &key_bytes);

        let mut iv = [0u8; AES_BLOCK_SIZE];
        random::bytes(&mut iv);

        let plaintext = [3u8; 64];
        let mut ciphertext = [0u8; 64];
        let size = key.encrypt(&plaintext, &iv, &mut ciphertext).unwrap();
        assert_eq!(size, 64);
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let mut decrypted = [0u8; 64];
        let size = key.decrypt(&ciphertext, &iv, &mut decrypted).unwrap();
        assert_eq!(size, 64);
        assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn aes256_round_trip() {
        let mut key_bytes = [0u8; AES256_KEY_SIZE];
        random::bytes(&mut key_bytes);
        let key = AesKey::new(SecurityPolicy::Basic256Sha256, &key_bytes);

        let mut iv = [0u8; AES_BLOCK_SIZE];
        random::bytes(&mut iv);

        let plaintext = [9u8; 32];
        let mut ciphertext = [0u8; 32];
        key.encrypt(&plaintext, &iv, &mut ciphertext).unwrap();
        let mut decrypted = [0u8; 32];
        key.decrypt(&ciphertext, &iv, &mut decrypted).unwrap();
        assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn reject_unpadded_input() {
        let key = AesKey::new(SecurityPolicy::Basic128Rsa15, &[0u8; AES128_KEY_SIZE]);
        let iv = [0u8; AES_BLOCK_SIZE];
        // 30 bytes is not a multiple of the block size
        let plaintext = [1u8; 30];
        let mut ciphertext = [0u8; 48];
        assert!(key.encrypt(&plaintext, &iv, &mut ciphertext).is_err());
    }
}
