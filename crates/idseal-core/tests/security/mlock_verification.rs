//! Verify that secure buffers report their `mlock` status and that core
//! dumps can be disabled.
//!
//! Platform-specific: these run on Unix only.

use idseal_core::memory::{disable_core_dumps, SecureBuffer};

#[cfg(unix)]
#[test]
fn secure_buffer_reports_mlock_status() {
    let buf = SecureBuffer::from_slice(b"mlock test data").expect("allocation should succeed");
    // mlock can legitimately fail under container quotas; only report it.
    eprintln!("mlock status: {}", buf.is_mlocked());
    assert!(buf.is_secure());
}

#[cfg(unix)]
#[test]
fn wrapped_buffers_are_never_locked() {
    let buf = SecureBuffer::wrap(vec![0xAA; 4096]);
    assert!(!buf.is_mlocked());
    assert!(!buf.is_secure());
}

#[cfg(target_os = "linux")]
#[test]
fn mlock_does_not_decrease_vmlck_on_linux() {
    let vmlck_before = read_vmlck_kb();
    let buf = SecureBuffer::from_slice(&vec![0xAA; 65_536]).expect("allocation should succeed");

    if buf.is_mlocked() {
        let vmlck_after = read_vmlck_kb();
        assert!(
            vmlck_after >= vmlck_before,
            "VmLck did not increase after mlock: before={vmlck_before}KB, after={vmlck_after}KB"
        );
    } else {
        eprintln!("mlock failed (likely insufficient quota), skipping VmLck check");
    }
}

#[cfg(target_os = "linux")]
fn read_vmlck_kb() -> u64 {
    let status =
        std::fs::read_to_string("/proc/self/status").expect("failed to read /proc/self/status");
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmLck:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(unix)]
#[test]
fn disable_core_dumps_sets_rlimit_zero() {
    disable_core_dumps().expect("disable_core_dumps should succeed");

    let mut rlim = libc::rlimit {
        rlim_cur: 1,
        rlim_max: 1,
    };
    // SAFETY: getrlimit writes into a valid, owned rlimit struct.
    let ret = unsafe { libc::getrlimit(libc::RLIMIT_CORE, &mut rlim) };
    assert_eq!(ret, 0, "getrlimit should succeed");
    assert_eq!(rlim.rlim_cur, 0, "soft core limit should be zero");
}
