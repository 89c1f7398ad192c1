use sha2::{Digest, Sha256};

/// Deterministic rollout bucket in `0..100` for a subject under a given flag.
///
/// The flag name is part of the hash input so that a subject lands in
/// independent buckets for different flags.
pub fn rollout_bucket(flag_name: &str, subject: &str) -> u8 {
    let digest = Sha256::new()
        .chain_update(flag_name.as_bytes())
        .chain_update(b":")
        .chain_update(subject.as_bytes())
        .finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}
