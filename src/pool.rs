//! Run a job over many items on a fixed-size pool of worker threads.
//!
//! Each item succeeds or fails on its own: an error or a panic in one item
//! is recorded against that item and the rest carry on.

use std::{
    fmt::Display,
    panic::{catch_unwind, AssertUnwindSafe},
};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, warn};
use rayon::{prelude::*, ThreadPoolBuildError, ThreadPoolBuilder};

/// What happened to each item given to [`run_pool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSummary<K> {
    pub succeeded: Vec<K>,
    /// Items that returned an error or panicked, with the reason.
    pub failed: Vec<(K, String)>,
}

impl<K> PoolSummary<K> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A progress bar in the same style everywhere. `hidden` bars draw nothing.
pub fn progress_bar(len: usize, message: &'static str, hidden: bool) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(
        Some(len as u64),
        if hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stdout()
        },
    )
    .with_message(message)
    .with_position(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{msg:17}: [{wide_bar:.blue}] {pos:3}/{len:3} observations ({elapsed_precise}<{eta_precise})",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Render a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Call `f` on every item using `num_workers` threads (rayon's default if
/// `None`). The order of the summary's lists follows the order of `items`.
pub fn run_pool<K, T, E, F>(
    items: &[K],
    num_workers: Option<usize>,
    progress: ProgressBar,
    f: F,
) -> Result<PoolSummary<K>, ThreadPoolBuildError>
where
    K: Clone + Display + Send + Sync,
    E: Display,
    F: Fn(&K) -> Result<T, E> + Sync,
{
    let mut builder = ThreadPoolBuilder::new();
    if let Some(n) = num_workers {
        builder = builder.num_threads(n);
    }
    let pool = builder.build()?;
    debug!(
        "Processing {} items with {} workers",
        items.len(),
        pool.current_num_threads()
    );

    let outcomes: Vec<(K, Result<(), String>)> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                let outcome = match catch_unwind(AssertUnwindSafe(|| f(item))) {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(payload) => Err(panic_message(payload.as_ref())),
                };
                progress.inc(1);
                (item.clone(), outcome)
            })
            .collect()
    });
    progress.finish();

    let mut summary = PoolSummary {
        succeeded: vec![],
        failed: vec![],
    };
    for (item, outcome) in outcomes {
        match outcome {
            Ok(()) => summary.succeeded.push(item),
            Err(reason) => {
                warn!("{item} failed: {reason}");
                summary.failed.push((item, reason));
            }
        }
    }
    Ok(summary)
}
