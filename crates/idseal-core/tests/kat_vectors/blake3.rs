//! BLAKE3 reference vectors.

use idseal_core::encoding::encode_hex;
use idseal_core::{hash, HashAlgorithm, HashContext, HashFlags};

#[test]
fn blake3_empty() {
    let digest = hash(HashAlgorithm::Blake3, b"", HashFlags::NONE).expect("hash should succeed");
    assert_eq!(
        encode_hex(digest.expose()),
        "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
    );
}

#[test]
fn blake3_matches_reference_crate() {
    let input: Vec<u8> = (0..=250u8).cycle().take(4096).collect();
    let digest = hash(HashAlgorithm::Blake3, &input, HashFlags::NONE).expect("hash should succeed");
    assert_eq!(digest.expose(), blake3::hash(&input).as_bytes());

    let mut ctx = HashContext::new(HashAlgorithm::Blake3);
    for chunk in input.chunks(1000) {
        ctx.update(chunk).expect("update should succeed");
    }
    assert_eq!(ctx.digest().expect("digest").expose(), blake3::hash(&input).as_bytes());
}
