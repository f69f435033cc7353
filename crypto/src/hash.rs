//! Blake2b content hashing and SHA-256 masking.

use blake2::digest::consts::U32;
use blake2::digest::Digest;
use blake2::Blake2b;
use fedvote_types::MessageHash;
use sha2::Sha256;

type Blake2b256 = Blake2b<U32>;

fn digest_parts<D>(parts: &[&[u8]]) -> [u8; 32]
where
    D: Digest<OutputSize = U32>,
{
    parts
        .iter()
        .fold(D::new(), |hasher, part| hasher.chain_update(*part))
        .finalize()
        .into()
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    digest_parts::<Blake2b256>(&[data])
}

/// Blake2b-256 of the slices in order, without concatenating them.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    digest_parts::<Blake2b256>(parts)
}

/// Content hash of an election message, taken over its signable prefix.
pub fn hash_message(signable: &[u8]) -> MessageHash {
    MessageHash::new(blake2b_256(signable))
}

/// SHA-256 of the slices in order. Feeds the candidate ordering mask.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    digest_parts::<Sha256>(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_input_hashes_like_joined_input() {
        assert_eq!(blake2b_256(b"height=10|slot=2"), blake2b_256_multi(&[b"height=10", b"|slot=2"]));
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256_multi(&[b"a", b"bc"]);
        assert_eq!(digest[..4], [0xba, 0x78, 0x16, 0xbf]);
    }

    #[test]
    fn distinct_prefixes_hash_apart() {
        assert_ne!(hash_message(b"vote r=0"), hash_message(b"vote r=1"));
        assert!(!hash_message(b"").is_zero());
    }
}
