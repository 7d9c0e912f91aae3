// Password file entry format: `username:salt-hex:hash-hex`, one per line.
// Hashing is salted SHA-512 run for a fixed iteration count; this is the
// same shape the teacher's own passwd module uses (salt + digest), swapped
// to a dependency already in this workspace's stack.

use rand::RngCore;
use sha2::{Digest, Sha512};

use crate::error::{Error, ErrorKind};

pub const SALT_LEN: usize = 16;
const ITERATIONS: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct Passwd {
    salt: [u8; SALT_LEN],
    hash: Vec<u8>,
}

impl Passwd {
    #[must_use]
    pub fn generate(password: &[u8]) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Passwd {
            salt,
            hash: Self::digest(password, &salt),
        }
    }

    fn digest(password: &[u8], salt: &[u8]) -> Vec<u8> {
        let mut state = Vec::from(password);
        state.extend_from_slice(salt);
        let mut hash = Sha512::digest(&state).to_vec();
        for _ in 1..ITERATIONS {
            hash = Sha512::digest(&hash).to_vec();
        }
        hash
    }

    #[must_use]
    pub fn matches(&self, password: &[u8]) -> bool {
        Self::digest(password, &self.salt) == self.hash
    }

    #[must_use]
    pub fn dump(&self, username: &str) -> String {
        format!(
            "{username}:{}:{}",
            hex_encode(&self.salt),
            hex_encode(&self.hash)
        )
    }

    /// Parse one `username:salt:hash` line.
    ///
    /// # Errors
    /// Returns an error if the line is malformed or the hex fields don't
    /// decode.
    pub fn parse_line(line: &str) -> Result<Option<(String, Self)>, Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut parts = line.splitn(3, ':');
        let username = parts
            .next()
            .ok_or_else(|| Error::new(ErrorKind::Config, "missing username"))?;
        let salt_hex = parts
            .next()
            .ok_or_else(|| Error::new(ErrorKind::Config, "missing salt"))?;
        let hash_hex = parts
            .next()
            .ok_or_else(|| Error::new(ErrorKind::Config, "missing hash"))?;
        let salt_bytes = hex_decode(salt_hex)
            .map_err(|_| Error::new(ErrorKind::Config, "invalid salt encoding"))?;
        let salt: [u8; SALT_LEN] = salt_bytes
            .try_into()
            .map_err(|_| Error::new(ErrorKind::Config, "salt has wrong length"))?;
        let hash = hex_decode(hash_hex)
            .map_err(|_| Error::new(ErrorKind::Config, "invalid hash encoding"))?;
        Ok(Some((username.to_string(), Passwd { salt, hash })))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_match() {
        let passwd = Passwd::generate(b"hunter2");
        assert!(passwd.matches(b"hunter2"));
        assert!(!passwd.matches(b"wrong"));
    }

    #[test]
    fn dump_and_parse_round_trip() {
        let passwd = Passwd::generate(b"hunter2");
        let line = passwd.dump("alice");
        let (username, parsed) = Passwd::parse_line(&line).unwrap().unwrap();
        assert_eq!(username, "alice");
        assert!(parsed.matches(b"hunter2"));
    }
}
