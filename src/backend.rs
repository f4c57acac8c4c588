//! Backend selection module.
//!
//! This module defines the available computation backends for the dense
//! kernels and provides functions to set and get the current backend.
//!
//! # Supported Backends
//!
//! - `Cpu` — Single-threaded kernels (default).
//! - `Parallel` — Multi-threaded kernels on the global `rayon` pool.
//!
//! The backend is stored globally using an `AtomicU8`, enabling fast
//! switching at runtime. It only affects how kernels are scheduled; both
//! backends return bit-identical results, so graphs built under one backend
//! evaluate identically under the other.

use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Backend {
    /// Single-threaded CPU kernels (default).
    #[default]
    Cpu = 0,
    /// Row/column parallel kernels on `rayon`.
    Parallel,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Parallel),
            _ => Err(()),
        }
    }
}

/// Internal global state for the active backend.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the active backend to use for tensor computation.
///
/// # Example
///
/// ```
/// use linalg_grad::backend::{set_backend, Backend};
/// set_backend(Backend::Parallel);
/// # set_backend(Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    log::debug!("switching compute backend to {b:?}");
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the currently active computation backend.
///
/// If the stored value is invalid, defaults to [`Backend::Cpu`].
///
/// # Example
///
/// ```
/// use linalg_grad::backend::get_backend;
/// let backend = get_backend();
/// ```
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
