use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroizing;

/// Leading bytes of every sealed ledger. Also bound as associated data, so
/// a file whose header was rewritten fails authentication.
pub const VAULT_HEADER: &[u8; 4] = b"SHV1";

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const KDF_MEMORY_KIB: u32 = 64 * 1024;
const KDF_ITERATIONS: u32 = 3;
const KDF_PARALLELISM: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("sealing failed")]
    Seal,
    #[error("unable to open vault: wrong passphrase or tampered data")]
    Open,
    #[error("not a sealed ledger")]
    UnknownFormat,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, KDF_PARALLELISM, Some(KEY_LEN))
        .map_err(|_| CryptoError::KeyDerivation)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut_slice())
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

fn cipher_for(passphrase: &str, salt: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    let key = derive_key(passphrase, salt)?;
    Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::KeyDerivation)
}

/// Seal `plaintext` under a passphrase.
///
/// Layout: header (4) || salt (32) || nonce (12) || ciphertext
pub fn seal(passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = cipher_for(passphrase, &salt)?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: VAULT_HEADER,
            },
        )
        .map_err(|_| CryptoError::Seal)?;

    let mut sealed =
        Vec::with_capacity(VAULT_HEADER.len() + SALT_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(VAULT_HEADER);
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open bytes produced by [`seal`]. The plaintext is wiped on drop.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let body = sealed
        .strip_prefix(VAULT_HEADER.as_slice())
        .ok_or(CryptoError::UnknownFormat)?;
    if body.len() < SALT_LEN + NONCE_LEN {
        return Err(CryptoError::UnknownFormat);
    }

    let (salt, rest) = body.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = cipher_for(passphrase, salt)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: VAULT_HEADER,
            },
        )
        .map_err(|_| CryptoError::Open)?;
    Ok(Zeroizing::new(plaintext))
}
