//! RFC 7914 Section 11 PBKDF2-HMAC-SHA256 vector.

use std::num::NonZeroU32;

use idseal_core::encoding::encode_hex;
use idseal_core::{derive_key, HashFlags, KdfAlgorithm, KdfParams};
use ring::pbkdf2;

/// P = "passwd", S = "salt", c = 1, dkLen = 64.
///
/// The 4-byte salt is below the engine minimum, so `ring` is checked directly.
#[test]
fn rfc7914_pbkdf2_sha256() {
    let mut out = [0u8; 64];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(1).unwrap(),
        b"salt",
        b"passwd",
        &mut out,
    );
    assert_eq!(
        encode_hex(&out),
        "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc\
         49ca9cccf179b645991664b39d77ef317c71b845b1e30bd509112041d3a19783"
    );
}

#[test]
fn engine_pbkdf2_matches_ring() {
    let salt = b"0123456789abcdef";
    let params = KdfParams {
        output_len: 32,
        iterations: 100,
        memory_kib: 0,
        parallelism: 1,
    };
    let derived = derive_key(KdfAlgorithm::Pbkdf2Sha256, b"passwd", salt, Some(&params), HashFlags::NONE)
        .expect("derive should succeed");

    let mut expected = [0u8; 32];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(100).unwrap(),
        salt,
        b"passwd",
        &mut expected,
    );
    assert_eq!(derived.expose(), &expected);
}
