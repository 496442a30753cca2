//! Progress-callback trait for per-image conversion events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ConverterConfigBuilder::progress_callback`] to receive
//! events as a batch run processes each image.
//!
//! # Example
//!
//! ```rust
//! use fchanger::{BatchProgressCallback, ConverterConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, name: &str, output_bytes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("#{index} {name} done ({output_bytes} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConverterConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by a batch run as it processes each image.
///
/// Items convert concurrently, so `on_item_start`, `on_item_complete` and
/// `on_item_error` may be called from different threads and in any order.
/// All methods have default no-op implementations.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once per run, before any image is dispatched.
    ///
    /// # Arguments
    /// * `total_items` — images this run will convert (succeeded items that
    ///   are skipped are not counted)
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called when an image's conversion task starts.
    fn on_item_start(&self, index: usize, name: &str) {
        let _ = (index, name);
    }

    /// Called when an image has been re-encoded.
    ///
    /// # Arguments
    /// * `index`        — position of the item in the batch
    /// * `name`         — source display name
    /// * `output_bytes` — size of the encoded output
    fn on_item_complete(&self, index: usize, name: &str, output_bytes: usize) {
        let _ = (index, name, output_bytes);
    }

    /// Called when an image failed to decode or encode.
    fn on_item_error(&self, index: usize, name: &str, error: String) {
        let _ = (index, name, error);
    }

    /// Called once after every dispatched image reached a terminal status.
    ///
    /// # Arguments
    /// * `total_items`   — images dispatched in this run
    /// * `success_count` — images that converted without error
    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        let _ = (total_items, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConverterConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
