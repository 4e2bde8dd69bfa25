//! Identity context: validated configuration plus lifecycle accounting.
//!
//! Every identifier, key and proof operation takes an explicit
//! [`IdentityContext`]. There is no process-wide default. Mutating
//! operations take `&mut self`, so a context shared across threads must be
//! wrapped in a `Mutex` (or one context used per thread).

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{ConfigOverrides, IdentityConfig};
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{IdentityError, Result};
use crate::hash::HashAlgorithm;
use crate::kdf::KdfAlgorithm;
use crate::memory::{self, SecureBuffer};

/// Milliseconds since the Unix epoch, saturating. A clock set before 1970
/// reads as 0.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// ---------------------------------------------------------------------------
// Allocator hooks
// ---------------------------------------------------------------------------

/// Caller-supplied memory backend.
///
/// All four primitives are required; [`IdentityContext::set_allocator`]
/// rejects a partial set.
#[derive(Clone, Copy, Default)]
pub struct AllocatorHooks {
    /// Allocate `size` bytes, contents unspecified.
    pub malloc: Option<fn(usize) -> Vec<u8>>,
    /// Release an allocation. Receives already-wiped bytes.
    pub free: Option<fn(Vec<u8>)>,
    /// Allocate `count * size` zeroed bytes.
    pub calloc: Option<fn(usize, usize) -> Vec<u8>>,
    /// Resize an allocation, preserving its prefix.
    pub realloc: Option<fn(Vec<u8>, usize) -> Vec<u8>>,
}

fn system_malloc(size: usize) -> Vec<u8> {
    vec![0u8; size]
}

fn system_free(bytes: Vec<u8>) {
    drop(bytes);
}

fn system_calloc(count: usize, size: usize) -> Vec<u8> {
    vec![0u8; count.saturating_mul(size)]
}

fn system_realloc(mut bytes: Vec<u8>, size: usize) -> Vec<u8> {
    bytes.resize(size, 0);
    bytes
}

impl AllocatorHooks {
    /// Hooks backed by the global allocator.
    #[must_use]
    pub fn system() -> Self {
        Self {
            malloc: Some(system_malloc),
            free: Some(system_free),
            calloc: Some(system_calloc),
            realloc: Some(system_realloc),
        }
    }

    fn validate(self) -> Result<Allocator> {
        let missing: Vec<&str> = [
            ("malloc", self.malloc.is_none()),
            ("free", self.free.is_none()),
            ("calloc", self.calloc.is_none()),
            ("realloc", self.realloc.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (self.malloc, self.free, self.calloc, self.realloc) {
            (Some(malloc), Some(free), Some(calloc), Some(realloc)) => Ok(Allocator {
                malloc,
                free,
                calloc,
                realloc,
            }),
            _ => Err(IdentityError::InvalidArgument(format!(
                "allocator is missing: {}",
                missing.join(", ")
            ))),
        }
    }
}

impl fmt::Debug for AllocatorHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorHooks")
            .field("malloc", &self.malloc.is_some())
            .field("free", &self.free.is_some())
            .field("calloc", &self.calloc.is_some())
            .field("realloc", &self.realloc.is_some())
            .finish()
    }
}

/// Validated, complete allocator.
#[derive(Clone, Copy)]
struct Allocator {
    malloc: fn(usize) -> Vec<u8>,
    free: fn(Vec<u8>),
    calloc: fn(usize, usize) -> Vec<u8>,
    realloc: fn(Vec<u8>, usize) -> Vec<u8>,
}

fn check_hook_output(bytes: &[u8], requested: usize) -> Result<()> {
    if bytes.len() != requested {
        return Err(IdentityError::CryptoFailure(format!(
            "allocator returned {} bytes for a {requested}-byte request",
            bytes.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// IdentityContext
// ---------------------------------------------------------------------------

/// Configuration, counters and collaborators shared by identity operations.
pub struct IdentityContext {
    config: IdentityConfig,
    active_identifiers: u64,
    memory_used: u64,
    created_at: u64,
    allocator: Option<Allocator>,
    user_data: Option<Box<dyn Any + Send>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    disposed: bool,
}

impl IdentityContext {
    /// Create a context from the default configuration plus `overrides`.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidFormat` if the resulting configuration is invalid
    /// - `IdentityError::UnsupportedAlgorithm` for unknown algorithm names
    pub fn create(overrides: Option<&ConfigOverrides>) -> Result<Self> {
        let config = match overrides {
            Some(overrides) => IdentityConfig::default().apply(overrides)?,
            None => IdentityConfig::default(),
        };
        Self::create_with_config(config)
    }

    /// Create a context from a complete configuration.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidFormat` if `config` fails validation.
    pub fn create_with_config(config: IdentityConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            algorithm = config.hash_algorithm.name(),
            kdf = config.kdf_algorithm.name(),
            salt_length = config.salt_length,
            "identity context created"
        );
        Ok(Self {
            config,
            active_identifiers: 0,
            memory_used: 0,
            created_at: now_millis(),
            allocator: None,
            user_data: None,
            diagnostics: Arc::new(TracingSink),
            disposed: false,
        })
    }

    /// Replace the diagnostic sink.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub const fn config(&self) -> &IdentityConfig {
        &self.config
    }

    #[must_use]
    pub const fn hash_algorithm(&self) -> HashAlgorithm {
        self.config.hash_algorithm
    }

    #[must_use]
    pub const fn kdf_algorithm(&self) -> KdfAlgorithm {
        self.config.kdf_algorithm
    }

    #[must_use]
    pub const fn separator(&self) -> char {
        self.config.separator
    }

    /// Number of identifiers created and not yet freed.
    #[must_use]
    pub const fn active_identifiers(&self) -> u64 {
        self.active_identifiers
    }

    /// Bytes of secret material currently accounted to this context.
    #[must_use]
    pub const fn memory_used(&self) -> u64 {
        self.memory_used
    }

    /// Creation time, milliseconds since the Unix epoch.
    #[must_use]
    pub const fn created_at(&self) -> u64 {
        self.created_at
    }

    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    #[must_use]
    pub const fn has_custom_allocator(&self) -> bool {
        self.allocator.is_some()
    }

    /// Returns `NotInitialized` once the context has been disposed.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotInitialized` after [`dispose`](Self::dispose).
    pub fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(IdentityError::NotInitialized(
                "identity context has been disposed".into(),
            ));
        }
        Ok(())
    }

    // -- counters -----------------------------------------------------------

    /// # Errors
    ///
    /// `NotInitialized` after dispose, `InvalidState` on overflow.
    pub fn increment_active(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.active_identifiers = self
            .active_identifiers
            .checked_add(1)
            .ok_or_else(|| IdentityError::InvalidState("active identifier count overflow".into()))?;
        Ok(())
    }

    /// # Errors
    ///
    /// `NotInitialized` after dispose, `InvalidState` if the count is already 0.
    pub fn decrement_active(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.active_identifiers = self.active_identifiers.checked_sub(1).ok_or_else(|| {
            IdentityError::InvalidState("decrement of active identifiers at zero".into())
        })?;
        Ok(())
    }

    /// # Errors
    ///
    /// `NotInitialized` after dispose, `InvalidState` on overflow.
    pub fn track_allocation(&mut self, bytes: usize) -> Result<()> {
        self.ensure_live()?;
        let bytes = u64::try_from(bytes)
            .map_err(|_| IdentityError::InvalidState("allocation size overflow".into()))?;
        self.memory_used = self
            .memory_used
            .checked_add(bytes)
            .ok_or_else(|| IdentityError::InvalidState("memory accounting overflow".into()))?;
        Ok(())
    }

    /// # Errors
    ///
    /// `NotInitialized` after dispose, `InvalidState` if more bytes are
    /// released than are tracked.
    pub fn track_deallocation(&mut self, bytes: usize) -> Result<()> {
        self.ensure_live()?;
        let bytes = u64::try_from(bytes)
            .map_err(|_| IdentityError::InvalidState("deallocation size overflow".into()))?;
        self.memory_used = self.memory_used.checked_sub(bytes).ok_or_else(|| {
            IdentityError::InvalidState(format!(
                "deallocation of {bytes} bytes exceeds {} tracked",
                self.memory_used
            ))
        })?;
        Ok(())
    }

    /// Independent context with the same configuration and zeroed counters.
    ///
    /// The allocator and diagnostic sink are shared with the copy; user data
    /// stays with `self`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotInitialized` after dispose.
    pub fn clone_fresh(&self) -> Result<Self> {
        self.ensure_live()?;
        Ok(Self {
            config: self.config.clone(),
            active_identifiers: 0,
            memory_used: 0,
            created_at: now_millis(),
            allocator: self.allocator,
            user_data: None,
            diagnostics: Arc::clone(&self.diagnostics),
            disposed: false,
        })
    }

    // -- allocator ----------------------------------------------------------

    /// Route secure allocations through caller-supplied hooks.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidArgument` if any of the four hooks is missing
    /// - `IdentityError::NotInitialized` after dispose
    pub fn set_allocator(&mut self, hooks: AllocatorHooks) -> Result<()> {
        self.ensure_live()?;
        self.allocator = Some(hooks.validate()?);
        Ok(())
    }

    /// Go back to the built-in secure allocator.
    pub fn reset_allocator(&mut self) {
        self.allocator = None;
    }

    fn raw_allocate(&self, size: usize, zeroed: bool) -> Result<SecureBuffer> {
        memory::check_size(size)?;
        match self.allocator {
            Some(alloc) => {
                let bytes = if zeroed {
                    (alloc.calloc)(1, size)
                } else {
                    (alloc.malloc)(size)
                };
                let buffer = SecureBuffer::wrap(bytes);
                check_hook_output(buffer.expose(), size)?;
                Ok(buffer)
            }
            None if self.config.secure_memory => memory::allocate(size),
            None => Ok(SecureBuffer::wrap(vec![0u8; size])),
        }
    }

    /// Allocate `size` zeroed bytes and account for them.
    ///
    /// Without custom hooks the buffer is tagged secure (canary, `mlock`)
    /// unless `secure_memory` is off. Hook-provided memory is never tagged.
    ///
    /// # Errors
    ///
    /// - `IdentityError::InvalidSize` for 0 or oversize requests
    /// - `IdentityError::CryptoFailure` if a hook returns the wrong length
    /// - `IdentityError::NotInitialized` after dispose
    pub fn allocate_secure(&mut self, size: usize) -> Result<SecureBuffer> {
        self.ensure_live()?;
        let buffer = self.raw_allocate(size, true)?;
        self.track_allocation(size)?;
        Ok(buffer)
    }

    /// Allocate accounted storage holding a copy of `data`.
    ///
    /// # Errors
    ///
    /// See [`allocate_secure`](Self::allocate_secure).
    pub fn store_secure(&mut self, data: &[u8]) -> Result<SecureBuffer> {
        self.ensure_live()?;
        let mut buffer = self.raw_allocate(data.len(), false)?;
        buffer.expose_mut().copy_from_slice(data);
        self.track_allocation(data.len())?;
        Ok(buffer)
    }

    /// Grow or shrink a buffer obtained from this context.
    ///
    /// The prefix is preserved and new bytes are zero. With the built-in
    /// allocator the contents move to a fresh buffer and the old one is wiped.
    ///
    /// # Errors
    ///
    /// Same as [`allocate_secure`](Self::allocate_secure), plus
    /// `TamperingDetected` if the old buffer's canary was overwritten. On
    /// any error the old buffer is wiped and no longer counted.
    pub fn resize_secure(&mut self, buffer: SecureBuffer, new_size: usize) -> Result<SecureBuffer> {
        self.ensure_live()?;
        memory::check_size(new_size)?;
        let old_size = buffer.len();
        if !buffer.canary_intact() {
            drop(buffer.into_wiped_vec());
            self.track_deallocation(old_size)?;
            return Err(IdentityError::TamperingDetected(format!(
                "canary of {old_size}-byte buffer was overwritten"
            )));
        }

        // The old buffer is consumed either way, so it leaves the accounting
        // before the new one is checked.
        let keep = old_size.min(new_size);
        let resized = match self.allocator {
            Some(alloc) => {
                let resized = SecureBuffer::wrap((alloc.realloc)(buffer.into_prefix_vec(keep), new_size));
                self.track_deallocation(old_size)?;
                if let Err(err) = check_hook_output(resized.expose(), new_size) {
                    (alloc.free)(resized.into_wiped_vec());
                    return Err(err);
                }
                resized
            }
            None => {
                let fresh = self.raw_allocate(new_size, true);
                self.track_deallocation(old_size)?;
                let mut fresh = fresh?;
                memory::copy(buffer.expose(), fresh.expose_mut(), 0, 0, keep)?;
                drop(buffer);
                fresh
            }
        };
        self.track_allocation(new_size)?;
        Ok(resized)
    }

    /// Wipe a buffer obtained from this context and release it.
    ///
    /// The accounting is updated even when the canary check fails.
    ///
    /// # Errors
    ///
    /// - `IdentityError::TamperingDetected` if the canary was overwritten
    /// - `IdentityError::InvalidState` if the release exceeds tracked memory
    /// - `IdentityError::NotInitialized` after dispose
    pub fn release_secure(&mut self, buffer: SecureBuffer) -> Result<()> {
        self.ensure_live()?;
        let len = buffer.len();
        let released = if buffer.canary_intact() {
            match self.allocator {
                Some(alloc) => {
                    (alloc.free)(buffer.into_wiped_vec());
                    Ok(())
                }
                None => memory::free(Some(buffer), None),
            }
        } else {
            drop(buffer.into_wiped_vec());
            Err(IdentityError::TamperingDetected(format!(
                "canary of {len}-byte buffer was overwritten"
            )))
        };
        self.track_deallocation(len)?;
        released
    }

    // -- diagnostics --------------------------------------------------------

    /// Report a swallowed error to the diagnostic sink.
    pub fn report(&self, operation: &'static str, error: &IdentityError) {
        self.diagnostics.report(Diagnostic::new(operation, error));
    }

    // -- user data ----------------------------------------------------------

    /// Attach opaque caller data, replacing any previous attachment.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotInitialized` after dispose.
    pub fn set_user_data<T: Any + Send>(&mut self, data: T) -> Result<()> {
        self.ensure_live()?;
        self.user_data = Some(Box::new(data));
        Ok(())
    }

    /// Borrow the attached data if it is a `T`.
    #[must_use]
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_deref().and_then(|d| d.downcast_ref::<T>())
    }

    /// Detach and return the user data.
    pub fn take_user_data(&mut self) -> Option<Box<dyn Any + Send>> {
        self.user_data.take()
    }

    /// Clear user data and mark the context unusable. Idempotent.
    ///
    /// Outstanding identifiers are reported to the diagnostic sink; their
    /// bytes are still wiped when they are dropped.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if self.active_identifiers > 0 {
            self.report(
                "context::dispose",
                &IdentityError::InvalidState(format!(
                    "{} identifiers still active at dispose",
                    self.active_identifiers
                )),
            );
        }
        self.user_data = None;
        self.allocator = None;
        self.disposed = true;
        tracing::debug!("identity context disposed");
    }
}

impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityContext")
            .field("config", &self.config)
            .field("active_identifiers", &self.active_identifiers)
            .field("memory_used", &self.memory_used)
            .field("created_at", &self.created_at)
            .field("custom_allocator", &self.allocator.is_some())
            .field("user_data", &self.user_data.is_some())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
