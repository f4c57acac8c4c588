//! # Operation Dispatch Layer
//!
//! This module defines the dense matrix kernels the tensor type delegates to,
//! and dispatches them across the available compute backends.
//!
//! ## Submodules
//!
//! - [`cpu`] — Single-threaded kernels (default backend)
//! - [`parallel`] — Multi-threaded kernels built on `rayon`
//! - [`dispatch`] — Backend switching and unified operation interfaces
//!
//! ## Backend Selection
//!
//! All kernels are backend-agnostic from the user perspective. Dispatching is
//! driven by the process-wide [`Backend`](crate::backend::Backend).
//!
//! ## Extending the Backend
//!
//! To add a new kernel:
//!
//! 1. Implement it in one or more backends (e.g. `cpu::my_op`, `parallel::my_op`)
//! 2. Add it to the `dispatch` module for unified access
//! 3. Add shape/consistency checks in [`tensors`](crate::tensors), never in a backend
//!
//! ## Notes
//!
//! - Kernels receive flat row-major slices whose shapes were already validated
//! - Every backend must produce bit-identical results for the same input

// dispatch layer...
pub mod dispatch;

// ... across these backends:
pub mod cpu;
pub mod parallel;
