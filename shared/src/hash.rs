use tiny_keccak::{Hasher, Keccak};

pub type Digest = [u8; 32];

/// largest difficulty a 32 byte digest can satisfy
pub const MAX_DIFFICULTY: u8 = 32;

const PREIMAGE_LEN: usize = 32 + 32 + 8;

/// keccak256(current_hash || signer || nonce as little endian)
pub fn hash_chain(current_hash: &[u8; 32], signer: &[u8; 32], nonce: u64) -> Digest {
    let mut preimage = [0u8; PREIMAGE_LEN];
    preimage[..32].copy_from_slice(current_hash);
    preimage[32..64].copy_from_slice(signer);
    preimage[64..].copy_from_slice(&nonce.to_le_bytes());

    let mut hash = [0u8; 32];
    let mut keccak = Keccak::v256();
    keccak.update(&preimage);
    keccak.finalize(&mut hash);
    hash
}

/// The first `difficulty` bytes of the digest must all be zero.
/// A difficulty past the digest length only looks at the bytes that exist.
pub fn is_valid_hash(hash: &[u8], difficulty: u32) -> bool {
    hash.iter().take(difficulty as usize).all(|b| *b == 0)
}

/// Reusable preimage for the search loop, only the nonce tail changes per attempt.
pub struct ChainHasher {
    preimage: [u8; PREIMAGE_LEN],
}

impl ChainHasher {
    pub fn new(current_hash: &[u8; 32], signer: &[u8; 32]) -> Self {
        let mut preimage = [0u8; PREIMAGE_LEN];
        preimage[..32].copy_from_slice(current_hash);
        preimage[32..64].copy_from_slice(signer);
        Self { preimage }
    }

    #[inline]
    pub fn hash(&mut self, nonce: u64) -> Digest {
        self.preimage[64..].copy_from_slice(&nonce.to_le_bytes());
        let mut hash = [0u8; 32];
        let mut keccak = Keccak::v256();
        keccak.update(&self.preimage);
        keccak.finalize(&mut hash);
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(s: &str) -> Digest {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn zero_preimage_vector() {
        assert_eq!(
            hash_chain(&[0; 32], &[0; 32], 0),
            digest("3cac317908c699fe873a7f6ee4e8cd63fbe9918b2315c97be91585590168e301")
        );
    }

    #[test]
    fn nonce_is_little_endian_after_signer() {
        let hash = hash_chain(&[0x11; 32], &[0x22; 32], 0x0102030405060708);
        assert_eq!(
            hash,
            digest("5966b24cf5a1fee62000f4f48a219c3f909e286092704025653fd98845c8b724")
        );
        // swapping the two 32 byte fields must change the digest
        assert_ne!(hash, hash_chain(&[0x22; 32], &[0x11; 32], 0x0102030405060708));
    }

    #[test]
    fn chain_hasher_matches_hash_chain() {
        let current = [7u8; 32];
        let signer = [9u8; 32];
        let mut hasher = ChainHasher::new(&current, &signer);
        for nonce in [0, 1, 980, u64::MAX] {
            assert_eq!(hasher.hash(nonce), hash_chain(&current, &signer, nonce));
        }
    }

    #[test]
    fn difficulty_zero_accepts_everything() {
        assert!(is_valid_hash(&[0xff; 32], 0));
        assert!(is_valid_hash(&hash_chain(&[1; 32], &[2; 32], 3), 0));
    }

    #[test]
    fn leading_bytes_must_be_zero() {
        let mut hash = [0xffu8; 32];
        hash[0] = 0;
        hash[1] = 0;
        assert!(is_valid_hash(&hash, 1));
        assert!(is_valid_hash(&hash, 2));
        assert!(!is_valid_hash(&hash, 3));

        // a single low bit is not a leading zero byte
        let mut hash = [0u8; 32];
        hash[0] = 1;
        assert!(!is_valid_hash(&hash, 1));
    }

    #[test]
    fn difficulty_past_digest_is_clamped() {
        assert!(is_valid_hash(&[0u8; 32], 33));
        assert!(is_valid_hash(&[0u8; 32], u32::MAX));

        let mut hash = [0u8; 32];
        hash[31] = 1;
        assert!(is_valid_hash(&hash, 31));
        assert!(!is_valid_hash(&hash, 40));
    }

    #[test]
    fn pinned_difficulty_one_solution() {
        let hash = hash_chain(&[0; 32], &[0; 32], 980);
        assert_eq!(
            hash,
            digest("00312e69dae696193e62a811d72ba61eaf676171a880d4839688ddd155355213")
        );
        assert!(is_valid_hash(&hash, 1));
        assert!((0..980).all(|n| !is_valid_hash(&hash_chain(&[0; 32], &[0; 32], n), 1)));
    }
}
