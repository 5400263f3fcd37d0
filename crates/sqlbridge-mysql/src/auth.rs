//! MySQL authentication scrambles.
//!
//! Supported plugins:
//! - `mysql_native_password`: SHA1-based (default before MySQL 8.0)
//! - `caching_sha2_password`: SHA256-based (MySQL 8.0+ default), fast
//!   path only; full authentication needs the password on a TLS channel
//!
//! # mysql_native_password
//!
//! ```text
//! SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))
//! ```
//!
//! # caching_sha2_password fast path
//!
//! ```text
//! XOR(SHA256(password), SHA256(SHA256(SHA256(password)) + seed))
//! ```

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Well-known authentication plugin names.
pub mod plugins {
    /// SHA1-based authentication (legacy default)
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    /// SHA256-based authentication (MySQL 8.0+ default)
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    /// Cleartext password (only meaningful over TLS)
    pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// Status bytes in the caching_sha2_password sub-protocol.
pub mod caching_sha2 {
    /// Fast auth succeeded; an OK packet follows
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// Server wants full authentication
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Compute the mysql_native_password response.
///
/// Returns 20 bytes, or empty when the password is empty.
pub fn mysql_native_password(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![];
    }

    // Servers send a 20-byte scramble, sometimes with a trailing NUL.
    let seed = if auth_data.len() > 20 {
        &auth_data[..20]
    } else {
        auth_data
    };

    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let stage1: [u8; 20] = hasher.finalize().into();

    let mut hasher = Sha1::new();
    hasher.update(stage1);
    let stage2: [u8; 20] = hasher.finalize().into();

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// Compute the caching_sha2_password fast-path response.
///
/// Returns 32 bytes, or empty when the password is empty.
pub fn caching_sha2_password(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![];
    }

    // Strip a trailing NUL only from the 21-byte form the server sends,
    // to avoid mangling valid 20-byte seeds.
    let seed = if auth_data.len() == 21 && auth_data.last() == Some(&0) {
        &auth_data[..20]
    } else {
        auth_data
    };

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let password_hash: [u8; 32] = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(password_hash);
    let double_hash: [u8; 32] = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(double_hash);
    hasher.update(seed);
    let scramble: [u8; 32] = hasher.finalize().into();

    password_hash
        .iter()
        .zip(scramble.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// Cleartext password with NUL terminator, for full auth over TLS.
pub fn cleartext_password(password: &str) -> Vec<u8> {
    let mut result = password.as_bytes().to_vec();
    result.push(0);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_password_empty() {
        assert!(mysql_native_password("", &[0; 20]).is_empty());
    }

    #[test]
    fn native_password_deterministic() {
        let seed = [
            0x3d, 0x4c, 0x5e, 0x2f, 0x1a, 0x0b, 0x7c, 0x8d, 0x9e, 0xaf, 0x10, 0x21, 0x32, 0x43,
            0x54, 0x65, 0x76, 0x87, 0x98, 0xa9,
        ];
        let first = mysql_native_password("secret", &seed);
        assert_eq!(first.len(), 20);
        assert_eq!(first, mysql_native_password("secret", &seed));
        assert_ne!(first, mysql_native_password("other", &seed));
    }

    #[test]
    fn caching_sha2_empty() {
        assert!(caching_sha2_password("", &[0; 20]).is_empty());
    }

    #[test]
    fn caching_sha2_strips_trailing_nul() {
        let mut seed = vec![7u8; 20];
        let plain = caching_sha2_password("secret", &seed);
        assert_eq!(plain.len(), 32);

        seed.push(0);
        assert_eq!(caching_sha2_password("secret", &seed), plain);
    }

    #[test]
    fn cleartext_is_nul_terminated() {
        assert_eq!(cleartext_password("pw"), b"pw\0");
        assert_eq!(cleartext_password(""), b"\0");
    }
}
