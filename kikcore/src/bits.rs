//! Signed-integer helpers and the digests the handshake hashes are built from.
//!
//! The server side computes these with JVM integer semantics, so every
//! intermediate value here is an `i32` with wrapping arithmetic.

use md5::compute as md5_compute;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Reinterprets the low 32 bits of an accumulator as a two's-complement `i32`.
#[inline]
pub fn sign_extend_32(x: u64) -> i32 {
    (x & 0xFFFF_FFFF) as u32 as i32
}

/// Interprets an octet as a signed byte, widened to `i32`.
#[inline]
pub fn byte_to_signed_int8(b: u8) -> i32 {
    b as i8 as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha1,
    Md5,
}

impl DigestAlgorithm {
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Md5 => md5_compute(data).0.to_vec(),
        }
    }

    /// Digest of `data` folded down to a single signed 32-bit value.
    pub fn hash_code(self, data: &[u8]) -> i32 {
        fold_digest(&self.digest(data))
    }
}

/// XOR-folds a digest in 4-byte little-endian groups.
///
/// Each byte is sign-extended before being shifted into place and the pieces
/// are OR-ed together, so a negative low byte smears ones over the higher
/// bytes. This matches the reference hash and must not be "fixed".
pub fn fold_digest(digest: &[u8]) -> i32 {
    let acc = digest.chunks_exact(4).fold(0u64, |acc, group| {
        let word = (i64::from(byte_to_signed_int8(group[3])) << 24)
            | (i64::from(byte_to_signed_int8(group[2])) << 16)
            | (i64::from(byte_to_signed_int8(group[1])) << 8)
            | i64::from(byte_to_signed_int8(group[0]));
        acc ^ word as u64
    });
    sign_extend_32(acc)
}
