//! Shared infrastructure utilities for Memo.
//!
//! Cross-cutting helpers that don't belong in the domain-pure `memo-types`
//! crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)

pub mod atomic_write;

pub use atomic_write::{SyncPolicy, atomic_write, atomic_write_with, recover_bak_file};
