//! Opaque bearer tokens and password hashes.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};
use rand_core::{OsRng, RngCore as _};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const TOKEN_BYTES: usize = 32;

/// A fresh random token, base64url without padding.
pub fn generate() -> String {
  let mut bytes = [0u8; TOKEN_BYTES];
  OsRng.fill_bytes(&mut bytes);
  B64.encode(bytes)
}

/// The form a token is stored in: lowercase hex SHA-256.
pub fn digest(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

pub fn hash_password(password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

/// `false` for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
    .is_ok()
}
