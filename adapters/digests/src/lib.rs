//! digests — `Digester` implementations backed by the RustCrypto hash crates.
//!
//! Every digester hashes the UTF-8 bytes of its input and returns lowercase hex.
//! `Algorithm` maps a CLI/config name to a boxed digester.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use domain::{CoreError, Digester};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

fn hex_digest<H: Digest>(input: &str) -> String {
    hex::encode(H::digest(input.as_bytes()))
}

/// MD5, 32 hex characters.
#[derive(Clone, Copy, Debug, Default)]
pub struct Md5Digester;

impl Digester for Md5Digester {
    fn algorithm(&self) -> &str {
        Algorithm::Md5.as_str()
    }

    fn digest(&self, input: &str) -> Result<String, CoreError> {
        Ok(hex_digest::<Md5>(input))
    }
}

/// SHA-1, 40 hex characters.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha1Digester;

impl Digester for Sha1Digester {
    fn algorithm(&self) -> &str {
        Algorithm::Sha1.as_str()
    }

    fn digest(&self, input: &str) -> Result<String, CoreError> {
        Ok(hex_digest::<Sha1>(input))
    }
}

/// SHA-256, 64 hex characters.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Digester;

impl Digester for Sha256Digester {
    fn algorithm(&self) -> &str {
        Algorithm::Sha256.as_str()
    }

    fn digest(&self, input: &str) -> Result<String, CoreError> {
        Ok(hex_digest::<Sha256>(input))
    }
}

/// Supported digest algorithms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Algorithm {
    #[default]
    Md5,
    Sha1,
    Sha256,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
        }
    }

    pub fn digester(&self) -> Box<dyn Digester> {
        match self {
            Algorithm::Md5 => Box::new(Md5Digester),
            Algorithm::Sha1 => Box::new(Sha1Digester),
            Algorithm::Sha256 => Box::new(Sha256Digester),
        }
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Algorithm::Md5),
            "sha1" => Ok(Algorithm::Sha1),
            "sha256" => Ok(Algorithm::Sha256),
            other => Err(CoreError::Digest(format!("unsupported algorithm {other:?}"))),
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
