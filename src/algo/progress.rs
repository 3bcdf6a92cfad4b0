//! Progress reporting for long-running algorithms.
//!
//! Remeshing, simplification and fairing accept a [`Progress`] in their
//! options and call it between passes.
//!
//! # Example
//!
//! ```
//! use tessera::algo::progress::Progress;
//! use tessera::algo::remesh::RemeshOptions;
//!
//! let progress = Progress::new(|current, total, message| {
//!     eprintln!("[{}/{}] {}", current, total, message);
//! });
//! let options = RemeshOptions::uniform(0.1).with_progress(progress);
//! # let _ = options;
//! ```

use std::sync::Arc;

/// A progress callback receiving `(current, total, message)`.
///
/// Cloning shares the callback.
#[derive(Clone)]
pub struct Progress {
    callback: Arc<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Report progress of a sub-step inside step `range_current` of
    /// `range_total`.
    ///
    /// The pair is scaled by 1000 so that sub-steps map onto a finer range
    /// without floating point.
    #[inline]
    pub fn report_sub(
        &self,
        sub_current: usize,
        sub_total: usize,
        range_current: usize,
        range_total: usize,
        message: &str,
    ) {
        if sub_total == 0 || range_total == 0 {
            return;
        }
        let sub_fraction = (sub_current.min(sub_total) * 1000) / sub_total;
        (self.callback)(range_current * 1000 + sub_fraction, range_total * 1000, message);
    }

    /// A reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}
