//! Envelope codec: AES-256-CFB with a prepended random IV
//!
//! Layout on disk: `[16-byte IV][stream-cipher ciphertext]`. There is no
//! authentication tag, so opening with the wrong key or with corrupted
//! bytes yields garbage plaintext without an error here; the failure only
//! surfaces when the relational engine rejects the payload. This is a
//! documented limitation of the format, reproduced as-is.

use aes::Aes256;
use cfb_mode::cipher::generic_array::GenericArray;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use super::key::SecretKey;
use crate::error::{TallyError, TallyResult};

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// IV length in bytes (one AES block)
pub const IV_SIZE: usize = 16;

/// Encrypt a plaintext blob with a fresh random IV
pub fn seal(key: &SecretKey, plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let mut buf = plaintext.to_vec();
    Aes256CfbEnc::new(key.as_bytes().into(), &iv.into()).encrypt(&mut buf);

    let mut out = Vec::with_capacity(IV_SIZE + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    out
}

/// Decrypt an envelope, stripping the IV
///
/// The only detectable failure is a ciphertext shorter than the IV.
pub fn open(key: &SecretKey, ciphertext: &[u8]) -> TallyResult<Vec<u8>> {
    if ciphertext.len() < IV_SIZE {
        return Err(TallyError::CorruptEnvelope(format!(
            "ciphertext too short: {} bytes",
            ciphertext.len()
        )));
    }

    let (iv, payload) = ciphertext.split_at(IV_SIZE);

    let mut buf = payload.to_vec();
    Aes256CfbDec::new(key.as_bytes().into(), GenericArray::from_slice(iv)).decrypt(&mut buf);
    Ok(buf)
}
