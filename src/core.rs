//! Run plumbing shared by the sampling and optimization drivers:
//! cooperative cancellation, run status, and progress-bar styling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

/// Cooperative cancellation handle.
///
/// The driver checks the token once per iteration; a cancelled run returns
/// every sample written up to the last completed iteration together with
/// [`RunStatus::Cancelled`].
///
/// ```rust
/// use demc::core::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// assert!(!token.is_cancelled());
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Safe to call from another thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// All configured iterations ran.
    Completed,
    /// The cancel token fired before iteration `iteration` started.
    Cancelled {
        /// Absolute iteration index (tensor row) at which the run stopped.
        iteration: usize,
    },
}

impl RunStatus {
    /// Returns `true` for [`RunStatus::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunStatus::Cancelled { .. })
    }
}

/// Progress bar over the main iterations.
pub(crate) fn iteration_bar(n_iter: usize) -> ProgressBar {
    let pb = ProgressBar::new(n_iter as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("progress template is valid")
            .progress_chars("##-"),
    );
    pb.set_prefix("DE-MCMC");
    pb
}
