use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::task::{Context, Poll};

pub mod build_info;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod fs;
pub mod index;
pub mod orchestrator;
pub mod platform;
pub mod privilege;
pub mod prompt;
pub mod uninstall;
pub mod validate;
pub mod verify;
pub mod version;

/// Runs a blocking closure on a dedicated thread and joins it, the same
/// shape the CLI layer uses everywhere it needs to call into the
/// synchronous core from async subcommand code.
pub async fn spawn_blocking<T: Send + 'static>(
    f: impl FnOnce() -> anyhow::Result<T> + Send + 'static,
) -> anyhow::Result<T> {
    match tokio::task::spawn_blocking(f).await {
        Ok(r) => r,
        Err(_) => Err(anyhow::anyhow!("Failed to join spawned IO task")),
    }
}

/// Thin wrapper over `reqwest::Client` carrying the connect/read timeout
/// the Index Client and Downloader both require (spec 4.4 and 6).
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: std::time::Duration) -> HttpClient {
        let inner = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        HttpClient { inner }
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.inner.get(url)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(30))
    }
}

/// Progress reported by long-running subcommands (`download`, `install`,
/// `update`) to drive an `indicatif` progress bar.
pub enum Status {
    InProgress {
        name: smol_str::SmolStr,
        progress_ratio: Option<(u64, u64)>,
    },
    Stopped,
}

static CANCELLED: AtomicBool = AtomicBool::new(false);

pub fn set_cancelled() {
    CANCELLED.store(true, std::sync::atomic::Ordering::Relaxed);
}

pub fn is_cancelled() -> bool {
    CANCELLED.load(std::sync::atomic::Ordering::Relaxed)
}

#[cfg(test)]
pub fn reset_cancelled_for_test() {
    CANCELLED.store(false, std::sync::atomic::Ordering::Relaxed);
}

/// Wraps a future so that a ctrlc-triggered cancellation resolves it to
/// `None` instead of letting it run to completion.
pub struct CancellableFuture<Fut> {
    inner: Fut,
}

impl<Fut> CancellableFuture<Fut> {
    pub fn new(inner: Fut) -> Self {
        CancellableFuture { inner }
    }
}

impl<Fut> Future for CancellableFuture<Fut>
where
    Fut: Future,
{
    type Output = Option<Fut::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if is_cancelled() {
            Poll::Ready(None)
        } else {
            let inner = unsafe { self.map_unchecked_mut(|s| &mut s.inner) };
            match inner.poll(cx) {
                Poll::Ready(output) => Poll::Ready(Some(output)),
                Poll::Pending => Poll::Pending,
            }
        }
    }
}
