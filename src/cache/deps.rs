//! Dependency tag collector for live responses.
//!
//! Uses `tokio::task_local!` so content code can declare "this response also
//! depends on node 42" without threading a collector through every call.
//! The response cache layer scopes a collector around the live handler and
//! registers the collected tags with the cached record.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::deps";

tokio::task_local! {
    static DEPS: Arc<Mutex<BTreeSet<String>>>;
}

/// Record a dependency tag for the response being computed.
///
/// Outside a collector scope the call is silently ignored.
///
/// # Example
///
/// ```ignore
/// tagcache::cache::deps::record("node:42");
/// let node = nodes.load(42).await?;
/// ```
pub fn record(tag: impl Into<String>) {
    let tag = tag.into();
    let _ = DEPS.try_with(|deps| {
        mutex_lock(deps, SOURCE, "record").insert(tag);
    });
}

/// Record several dependency tags at once.
pub fn record_all<I, T>(tags: I)
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    for tag in tags {
        record(tag);
    }
}

/// Tags recorded so far in the current scope; empty outside a scope.
pub fn collect() -> BTreeSet<String> {
    DEPS.try_with(|deps| mutex_lock(deps, SOURCE, "collect").clone())
        .unwrap_or_default()
}

/// Run `f` with a fresh collector and return its output with the tags it
/// recorded.
pub async fn with_collector<F, R>(f: F) -> (R, BTreeSet<String>)
where
    F: Future<Output = R>,
{
    let deps = Arc::new(Mutex::new(BTreeSet::new()));
    let result = DEPS.scope(deps.clone(), f).await;
    let collected = std::mem::take(&mut *mutex_lock(&deps, SOURCE, "with_collector"));
    (result, collected)
}
