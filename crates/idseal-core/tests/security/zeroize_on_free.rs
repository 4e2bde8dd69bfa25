//! Verify that secure buffers and freed identifiers leave no secret bytes
//! behind.
//!
//! Heap blocks may receive allocator metadata after deallocation, so the
//! post-drop checks scan for a sentinel pattern instead of asserting zeros.
//!
//! **UB caveat:** reading freed memory is undefined behavior. These are
//! best-effort smoke tests meant for the debug profile; release builds may
//! elide the reads.

use idseal_core::memory::{self, SecureBuffer};
use idseal_core::{identifier, key, IdentityContext, IdentityData, Identifier, Key};

/// Sentinel pattern, easy to spot in a memory scan.
const SENTINEL: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

fn sentinel_data(len: usize) -> Vec<u8> {
    SENTINEL.iter().copied().cycle().take(len).collect()
}

#[test]
fn secure_buffer_sentinel_not_found_after_drop() {
    let data = sentinel_data(512);
    let data_ptr: *const u8;
    let data_len: usize;

    {
        let buf = SecureBuffer::from_slice(&data).expect("allocation should succeed");
        let exposed = buf.expose();
        data_ptr = exposed.as_ptr();
        data_len = exposed.len();
        assert_eq!(&exposed[..4], &SENTINEL);
    }

    // SAFETY: deliberately reads the freed block; see module docs.
    let sentinel_found = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, data_len);
        slice.windows(4).any(|w| w == SENTINEL)
    };
    assert!(
        !sentinel_found,
        "Sentinel pattern found in memory after SecureBuffer drop"
    );
}

#[test]
fn secure_buffer_large_allocation_sentinel_cleared() {
    let data = sentinel_data(65_536);
    let data_ptr: *const u8;
    let data_len: usize;

    {
        let buf = SecureBuffer::from_slice(&data).expect("allocation should succeed");
        data_ptr = buf.expose().as_ptr();
        data_len = buf.len();
    }

    // SAFETY: deliberately reads the freed block; see module docs.
    let sentinel_found = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, data_len);
        slice.windows(4).any(|w| w == SENTINEL)
    };
    assert!(!sentinel_found, "Sentinel pattern found in 64KB SecureBuffer after drop");
}

#[test]
fn explicit_wipe_zeroes_in_place() {
    let mut buf = SecureBuffer::from_slice(&sentinel_data(256)).expect("allocation should succeed");
    buf.wipe();
    assert!(buf.is_zeroed());
    assert!(buf.canary_intact(), "wipe must not touch the canary");

    let mut raw = sentinel_data(64);
    memory::wipe(&mut raw);
    assert!(raw.iter().all(|&b| b == 0));
}

#[test]
fn freed_identifier_reads_as_zero() {
    let mut ctx = IdentityContext::create(None).expect("context should be created");
    let mut id = Identifier::create(&mut ctx, &IdentityData::new(["user"], ["alice"]), None)
        .expect("create should succeed");
    let hash_len = id.hash_size();
    let salt_len = id.salt_size();

    identifier::free(&mut ctx, Some(&mut id));
    assert!(id.is_freed());
    assert_eq!(id.hash().len(), hash_len);
    assert_eq!(id.salt().len(), salt_len);
    assert!(id.hash().iter().all(|&b| b == 0), "hash not wiped by free");
    assert!(id.salt().iter().all(|&b| b == 0), "salt not wiped by free");
}

#[test]
fn freed_key_reads_as_zero() {
    let mut ctx = IdentityContext::create(None).expect("context should be created");
    let id = Identifier::create(&mut ctx, &IdentityData::new(["user"], ["alice"]), None)
        .expect("create should succeed");
    let mut k = Key::create(&ctx, &id, None).expect("key should be created");
    assert!(k.hash().iter().any(|&b| b != 0));

    key::free(Some(&mut k));
    assert!(k.hash().iter().all(|&b| b == 0), "key hash not wiped by free");
}

#[test]
fn debug_output_never_contains_secret_material() {
    let mut ctx = IdentityContext::create(None).expect("context should be created");
    let data = IdentityData::new(["user"], ["very-secret-value"]);
    let id = Identifier::create(&mut ctx, &data, None).expect("create should succeed");
    let k = Key::create(&ctx, &id, None).expect("key should be created");

    let rendered = format!("{data:?} {id:?} {k:?} {ctx:?}");
    assert!(!rendered.contains("very-secret-value"));
    assert!(!rendered.contains(&idseal_core::encoding::encode_hex(id.salt())));
    assert!(!rendered.contains(&idseal_core::encoding::encode_base64(id.hash())));
}
