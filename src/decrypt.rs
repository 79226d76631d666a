//! Decryption of encrypted feature payloads.
//!
//! An encrypted payload is a token `<iv>.<ciphertext>` where both segments, as well as the key,
//! are base64-encoded. The plaintext is a bare feature map (see
//! [`decode_feature_map`](crate::codec::decode_feature_map)).
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    codec::{decode_feature_map, DecodeError},
    FeatureMap,
};

/// Reasons an encrypted payload could not be installed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DecryptError {
    /// The token is not of the form `<iv>.<ciphertext>`.
    #[error("encrypted payload must have an iv and a ciphertext segment")]
    MissingSegment,
    /// One of the inputs is not valid base64.
    #[error("{part} is not valid base64")]
    InvalidBase64 {
        part: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    /// The key has a length the cipher does not support.
    #[error("unsupported key length: {0} bytes")]
    InvalidKeyLength(usize),
    /// The decrypt primitive failed (wrong key, bad iv, bad padding).
    #[error("failed to decrypt payload")]
    Decryption,
    /// Decryption succeeded but the plaintext is not a feature map.
    #[error("decrypted payload is not a feature map")]
    Plaintext(#[source] DecodeError),
}

/// A block-cipher decrypt primitive.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError>;
}

/// AES in CBC mode with PKCS#7 padding. AES-128 or AES-256 is picked by key length.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesCbcDecryptor;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

impl Decryptor for AesCbcDecryptor {
    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        match key.len() {
            16 => Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|_| DecryptError::Decryption)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| DecryptError::Decryption),
            32 => Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|_| DecryptError::Decryption)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| DecryptError::Decryption),
            n => Err(DecryptError::InvalidKeyLength(n)),
        }
    }
}

/// Decrypt `token` with the base64 `key` and decode the plaintext into a feature map.
pub fn decrypt_features(
    token: &str,
    key: &str,
    decryptor: &dyn Decryptor,
) -> Result<FeatureMap, DecryptError> {
    // The iv is the first segment and the ciphertext the last; anything in between is ignored.
    let mut segments = token.trim().split('.');
    let (iv, ciphertext) = match (segments.next(), segments.last()) {
        (Some(iv), Some(ciphertext)) if !iv.is_empty() && !ciphertext.is_empty() => (iv, ciphertext),
        _ => return Err(DecryptError::MissingSegment),
    };

    let base64 = |part: &'static str, value: &str| {
        STANDARD
            .decode(value)
            .map_err(|source| DecryptError::InvalidBase64 { part, source })
    };
    let key = base64("key", key.trim())?;
    let iv = base64("iv", iv)?;
    let ciphertext = base64("ciphertext", ciphertext)?;

    let plaintext = decryptor.decrypt(&key, &iv, &ciphertext)?;

    decode_feature_map(&plaintext).map_err(DecryptError::Plaintext)
}
