// src/engine/common.rs
//
// Shared engine utilities.

use crate::error::{MillError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a codec stage with panics converted to errors.
///
/// The C codecs behind mozjpeg/libwebp can abort a call by panicking through
/// their Rust wrappers; an unwind across the pipeline would skip the stats
/// accounting the caller owes. `stage` names the call site in the resulting
/// diagnostic.
pub fn run_with_panic_policy<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(MillError::internal_panic(format!("{stage}: {detail}")))
        }
    }
}
