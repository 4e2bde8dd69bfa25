//! Timing side-channel check for constant-time comparison.
//!
//! A simplified dudect-style analysis: time `constant_time_compare` on equal
//! inputs (class A) and on inputs differing in the first byte (class B),
//! then assert Welch's |t| stays below 4.5. A larger |t| would indicate an
//! early exit at >99.999% confidence.
//!
//! The measurement is statistical and sensitive to scheduler noise, so it is
//! ignored by default. Run it with `cargo test --release -- --ignored`.

use std::time::Instant;

use idseal_core::memory::constant_time_compare;

/// Number of timing samples per class.
const SAMPLES: usize = 10_000;

/// Welch's t-test threshold.
const T_THRESHOLD: f64 = 4.5;

#[inline(never)]
fn black_box_compare(a: &[u8], b: &[u8]) -> i32 {
    std::hint::black_box(constant_time_compare(
        std::hint::black_box(a),
        std::hint::black_box(b),
    ))
}

/// Welch's t-statistic, `(mean_a - mean_b) / sqrt(var_a/n_a + var_b/n_b)`.
///
/// Returns `f64::NAN` when either sample has fewer than two points.
#[allow(clippy::cast_precision_loss)]
fn welch_t_statistic(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return f64::NAN;
    }

    let n_a = a.len() as f64;
    let n_b = b.len() as f64;

    let mean_a: f64 = a.iter().sum::<f64>() / n_a;
    let mean_b: f64 = b.iter().sum::<f64>() / n_b;

    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum::<f64>() / (n_a - 1.0);
    let var_b: f64 = b.iter().map(|x| (x - mean_b).powi(2)).sum::<f64>() / (n_b - 1.0);

    let denominator = (var_a / n_a + var_b / n_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    (mean_a - mean_b) / denominator
}

#[test]
#[ignore = "statistical timing measurement; run in release with --ignored"]
fn constant_time_compare_no_timing_leak() {
    let secret = [0x5Au8; 64];
    let equal = secret;
    let mut differs_first = secret;
    differs_first[0] ^= 0xFF;

    for _ in 0..100 {
        black_box_compare(&secret, &equal);
        black_box_compare(&secret, &differs_first);
    }

    // Interleave the classes to cancel out drift.
    let mut times_a = Vec::with_capacity(SAMPLES);
    let mut times_b = Vec::with_capacity(SAMPLES);
    for _ in 0..SAMPLES {
        let start = Instant::now();
        let _ = black_box_compare(&secret, &equal);
        let elapsed_a = start.elapsed().as_nanos();

        let start = Instant::now();
        let _ = black_box_compare(&secret, &differs_first);
        let elapsed_b = start.elapsed().as_nanos();

        #[allow(clippy::cast_precision_loss)]
        {
            times_a.push(elapsed_a as f64);
            times_b.push(elapsed_b as f64);
        }
    }

    let abs_t = welch_t_statistic(&times_a, &times_b).abs();
    eprintln!(
        "Timing side-channel test: |t| = {abs_t:.2} (threshold: {T_THRESHOLD}), \
         samples = {SAMPLES} per class"
    );
    assert!(
        abs_t < T_THRESHOLD,
        "Timing side-channel detected: |t| = {abs_t:.2} exceeds threshold {T_THRESHOLD}"
    );
}

#[test]
fn compare_result_is_independent_of_mismatch_position() {
    let base = [0x5Au8; 64];
    for position in [0, 31, 63] {
        let mut other = base;
        other[position] ^= 0x01;
        assert_ne!(black_box_compare(&base, &other), 0);
    }
    assert_eq!(black_box_compare(&base, &base), 0);
}

#[test]
fn welch_t_test_identical_distributions() {
    let a = vec![1.0; 100];
    let b = vec![1.0; 100];
    let t = welch_t_statistic(&a, &b);
    assert!(t.abs() < f64::EPSILON, "identical distributions should give t = 0, got {t}");
}

#[test]
fn welch_t_test_different_distributions() {
    #[allow(clippy::cast_precision_loss)]
    let a: Vec<f64> = (0..100).map(|i| 100.0 + f64::from(i % 3)).collect();
    let b: Vec<f64> = (0..100).map(|i| 200.0 + f64::from(i % 3)).collect();
    let t = welch_t_statistic(&a, &b);
    assert!(t.abs() > T_THRESHOLD, "clearly different distributions should give |t| > {T_THRESHOLD}, got {t}");
}

#[test]
fn welch_t_test_too_few_samples() {
    assert!(welch_t_statistic(&[1.0], &[1.0, 2.0]).is_nan());
}
