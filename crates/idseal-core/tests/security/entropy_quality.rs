//! Entropy quality of CSPRNG-backed outputs.
//!
//! Shannon entropy of uniform bytes approaches 8.0 bits/byte only as the
//! sample grows; small samples miss byte values. Thresholds are calibrated
//! per sample size to catch degenerate output (constant fill, repeating
//! patterns) without flaking on natural variance:
//!
//! | Sample size | Expected entropy | Threshold |
//! |-------------|------------------|-----------|
//! | 32 bytes    | ~4.88            | 4.0       |
//! | 1 KB        | ~7.81            | 7.5       |
//! | 64 KB       | ~7.997           | 7.99      |

use idseal_core::memory::random_bytes;
use idseal_core::salt::{self, SaltFlags, MIN_SALT_LEN};
use idseal_core::{generate_challenge, IdentityContext, MAX_CHALLENGE_SIZE};

/// Shannon entropy of a byte slice, in bits per byte.
#[allow(clippy::cast_precision_loss)]
fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] = freq[b as usize].saturating_add(1);
    }
    let len = data.len() as f64;
    freq.iter()
        .filter(|&&f| f > 0)
        .map(|&f| {
            let p = f as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[test]
fn random_bytes_1kb_entropy() {
    let buf = random_bytes(1024).expect("CSPRNG should succeed");
    let entropy = shannon_entropy(buf.expose());
    assert!(
        entropy > 7.5,
        "random_bytes(1024) entropy too low: {entropy:.4} (expected > 7.5)"
    );
}

#[test]
fn random_bytes_64kb_entropy() {
    let buf = random_bytes(65_536).expect("CSPRNG should succeed");
    let entropy = shannon_entropy(buf.expose());
    assert!(
        entropy > 7.99,
        "random_bytes(65536) entropy too low: {entropy:.4} (expected > 7.99)"
    );
}

#[test]
fn salt_entropy_accumulated() {
    // 32 salts of 32 bytes give a 1 KB sample.
    let mut sample = Vec::with_capacity(1024);
    for _ in 0..32 {
        let salt = salt::generate(32, SaltFlags::REQUIRE_QUALITY, None, None)
            .expect("salt generation should succeed");
        assert!(salt::verify(Some(salt.expose()), MIN_SALT_LEN));
        sample.extend_from_slice(salt.expose());
    }
    let entropy = shannon_entropy(&sample);
    assert!(entropy > 7.5, "salt entropy too low: {entropy:.4} (expected > 7.5)");
}

#[test]
fn custom_entropy_cannot_flatten_salts() {
    // Constant caller entropy must not make salts predictable.
    let zeros = [0u8; 64];
    let mut sample = Vec::with_capacity(1024);
    for _ in 0..32 {
        let salt = salt::generate(32, SaltFlags::NONE, Some(&zeros), Some(zeros.len()))
            .expect("salt generation should succeed");
        sample.extend_from_slice(salt.expose());
    }
    let entropy = shannon_entropy(&sample);
    assert!(entropy > 7.5, "mixed salt entropy too low: {entropy:.4} (expected > 7.5)");
}

#[test]
fn challenge_entropy() {
    let ctx = IdentityContext::create(None).expect("context should be created");
    let single = generate_challenge(&ctx, 32).expect("challenge should be generated");
    let entropy = shannon_entropy(&single);
    assert!(entropy > 4.0, "32-byte challenge entropy too low: {entropy:.4} (expected > 4.0)");

    let mut sample = Vec::with_capacity(1024);
    for _ in 0..8 {
        sample.extend(generate_challenge(&ctx, MAX_CHALLENGE_SIZE).expect("challenge"));
    }
    let entropy = shannon_entropy(&sample);
    assert!(entropy > 7.5, "challenge entropy too low: {entropy:.4} (expected > 7.5)");
}

#[test]
fn degenerate_data_is_detected() {
    assert!(shannon_entropy(&[0u8; 1024]) < 0.01);
    let pattern: Vec<u8> = [0xDE, 0xAD].iter().copied().cycle().take(1024).collect();
    assert!((shannon_entropy(&pattern) - 1.0).abs() < 0.01);
    assert!(!salt::verify(Some(&[0u8; 32]), MIN_SALT_LEN));
}
