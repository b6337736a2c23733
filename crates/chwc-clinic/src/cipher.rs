use aes_gcm_siv::{
    aead::{Aead, KeyInit},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};

const NONCE_LEN: usize = 12;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Base64 decoding error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("Cipher secret invalid length: {0}")]
    CipherKeyInvalidLength(#[from] crypto_common::InvalidLength),
    #[error("Encryption failed")]
    Encrypt,
    #[error("Decryption failed - data is truncated, tampered with or was encrypted under another key")]
    Decrypt,
}

/// Encrypts personal data at rest. Each message carries its own random nonce as a prefix.
pub struct Cipher {
    cipher: Aes256GcmSiv,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    pub fn from_base64_encoded(secret: &str) -> Result<Self, Error> {
        let key = STANDARD_NO_PAD.decode(secret.trim().as_bytes())?;
        Ok(Self {
            cipher: Aes256GcmSiv::new_from_slice(&key)?,
        })
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plain)
            .map_err(|_| Error::Encrypt)?;
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        if data.len() < NONCE_LEN {
            return Err(Error::Decrypt);
        }
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| Error::Decrypt)
    }
}

#[cfg(test)]
pub(crate) fn test_cipher() -> Cipher {
    Cipher::from_base64_encoded(&STANDARD_NO_PAD.encode([7u8; 32])).expect("valid test key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decrypts_what_it_encrypted() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt(b"asthma; penicillin allergy").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"asthma; penicillin allergy".as_slice());
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"asthma; penicillin allergy");
    }

    #[test]
    fn it_uses_a_fresh_nonce_per_message() {
        let cipher = test_cipher();
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b, "identical plaintexts should not produce identical ciphertexts");
    }

    #[test]
    fn it_rejects_tampered_or_truncated_data() {
        let cipher = test_cipher();
        let mut sealed = cipher.encrypt(b"history").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(cipher.decrypt(&sealed), Err(Error::Decrypt)));
        assert!(matches!(cipher.decrypt(&[1, 2, 3]), Err(Error::Decrypt)));
    }

    #[test]
    fn it_rejects_a_key_of_the_wrong_length() {
        let short = STANDARD_NO_PAD.encode([1u8; 16]);
        assert!(matches!(
            Cipher::from_base64_encoded(&short),
            Err(Error::CipherKeyInvalidLength(_))
        ));
    }
}
