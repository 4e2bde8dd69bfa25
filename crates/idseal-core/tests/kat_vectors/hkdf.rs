//! RFC 5869 HKDF vectors.
//!
//! The engine always expands with its own info string, so the RFC vector is
//! checked against `ring` and the engine is pinned to `ring` separately.

use idseal_core::encoding::{decode_hex, encode_hex};
use idseal_core::{derive_key, HashFlags, KdfAlgorithm, KdfParams};
use ring::hkdf;

struct Len(usize);

impl hkdf::KeyType for Len {
    fn len(&self) -> usize {
        self.0
    }
}

fn ring_hkdf(alg: hkdf::Algorithm, ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> Vec<u8> {
    let prk = hkdf::Salt::new(alg, salt).extract(ikm);
    let info_refs: &[&[u8]] = &[info];
    let okm = prk.expand(info_refs, Len(len)).expect("HKDF expand should succeed");
    let mut out = vec![0u8; len];
    okm.fill(&mut out).expect("HKDF fill should succeed");
    out
}

/// RFC 5869 Appendix A.1: basic SHA-256 case.
#[test]
fn rfc5869_case1_sha256() {
    let ikm = [0x0bu8; 22];
    let salt = decode_hex("000102030405060708090a0b0c").expect("hex");
    let info = decode_hex("f0f1f2f3f4f5f6f7f8f9").expect("hex");
    let okm = ring_hkdf(hkdf::HKDF_SHA256, &ikm, &salt, &info, 42);
    assert_eq!(
        encode_hex(&okm),
        "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
    );
}

#[test]
fn engine_hkdf_matches_ring_with_engine_info() {
    let ikm = [0x0bu8; 22];
    let salt = [0x5au8; 32];
    let cases = [
        (KdfAlgorithm::HkdfSha256, hkdf::HKDF_SHA256),
        (KdfAlgorithm::HkdfSha384, hkdf::HKDF_SHA384),
        (KdfAlgorithm::HkdfSha512, hkdf::HKDF_SHA512),
    ];
    for (algorithm, ring_alg) in cases {
        let params = KdfParams::for_algorithm(algorithm).with_output_len(48);
        let derived = derive_key(algorithm, &ikm, &salt, Some(&params), HashFlags::NONE)
            .expect("derive should succeed");
        assert_eq!(
            derived.expose(),
            ring_hkdf(ring_alg, &ikm, &salt, b"idseal-kdf-v1", 48).as_slice(),
            "{}",
            algorithm.name()
        );
    }
}

#[test]
fn derive_key_is_deterministic() {
    let salt = [0x11u8; 16];
    let a = derive_key(KdfAlgorithm::HkdfSha256, b"input", &salt, None, HashFlags::NONE)
        .expect("derive should succeed");
    let b = derive_key(KdfAlgorithm::HkdfSha256, b"input", &salt, None, HashFlags::SECURE)
        .expect("derive should succeed");
    assert_eq!(a.expose(), b.expose());
    assert_eq!(a.len(), 32);
}
