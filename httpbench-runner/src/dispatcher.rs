use futures::future::join_all;
use httpbench_client::{parse_status, Fetch, FetchResult};
use httpbench_common::{Outcome, Status, Target};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Destination for the raw response of a single-request run.
pub type EchoWriter = Arc<Mutex<dyn Write + Send>>;

/// Issues a fixed number of single-shot GETs in batches of at most `concurrency`.
///
/// Every attempt in a batch runs concurrently; the next batch starts only
/// after the whole previous batch has finished, successfully or not.
pub struct Dispatcher<F> {
    fetcher: Arc<F>,
    concurrency: usize,
    pause: Duration,
    echo: EchoWriter,
}

impl<F: Fetch + 'static> Dispatcher<F> {
    pub fn new(fetcher: F, concurrency: usize) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            concurrency: concurrency.max(1),
            pause: Duration::ZERO,
            echo: Arc::new(Mutex::new(std::io::stderr())),
        }
    }

    /// Sleep for `pause` between consecutive batches.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Write the raw response of a single-request run to `echo` instead of stderr.
    pub fn with_echo(mut self, echo: EchoWriter) -> Self {
        self.echo = echo;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `requests` attempts against `target`. Always returns exactly `requests` outcomes.
    /// With a single request the raw response is written to the echo writer.
    pub async fn run(&self, target: &Target, requests: usize) -> Vec<Outcome> {
        let echo = (requests == 1).then(|| Arc::clone(&self.echo));
        let batches = batch_sizes(requests, self.concurrency);
        let last = batches.len().saturating_sub(1);
        let mut outcomes = Vec::with_capacity(requests);

        for (index, size) in batches.into_iter().enumerate() {
            let handles: Vec<_> = (0..size)
                .map(|_| {
                    let fetcher = Arc::clone(&self.fetcher);
                    let target = target.clone();
                    let echo = echo.clone();
                    tokio::spawn(async move { attempt(fetcher.as_ref(), &target, echo).await })
                })
                .collect();

            for joined in join_all(handles).await {
                let outcome = joined.unwrap_or_else(|e| {
                    warn!(error = %e, "attempt task did not finish");
                    Outcome { elapsed_ms: 0, status: Status::TransportError, size_bytes: 0 }
                });
                outcomes.push(outcome);
            }
            debug!(batch = index, size, completed = outcomes.len(), "batch finished");

            if index < last && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        outcomes
    }
}

/// Split `requests` into consecutive batches of at most `concurrency`.
/// 10 requests by 3 gives `[3, 3, 3, 1]`.
pub fn batch_sizes(requests: usize, concurrency: usize) -> Vec<usize> {
    let concurrency = concurrency.max(1);
    (0..requests).step_by(concurrency).map(|start| concurrency.min(requests - start)).collect()
}

/// Map a raw fetch to a status: no bytes after a failure is a transport error,
/// anything else is judged by its first line.
pub fn classify(result: &FetchResult) -> Status {
    if result.error.is_some() && result.bytes.is_empty() {
        return Status::TransportError;
    }
    match parse_status(&result.bytes) {
        Some(code) => Status::Code(code),
        None => Status::ParseError,
    }
}

async fn attempt<F: Fetch + ?Sized>(
    fetcher: &F,
    target: &Target,
    echo: Option<EchoWriter>,
) -> Outcome {
    let start = Instant::now();
    let result = fetcher.fetch(target).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if let Some(error) = &result.error {
        warn!(%error, received = result.bytes.len(), "attempt failed");
    }
    if let Some(echo) = echo {
        write_echo(&echo, &result.bytes);
    }

    Outcome { elapsed_ms, status: classify(&result), size_bytes: result.bytes.len() as u64 }
}

fn write_echo(echo: &EchoWriter, bytes: &[u8]) {
    let Ok(mut out) = echo.lock() else {
        warn!("echo writer poisoned");
        return;
    };
    let written = out
        .write_all(bytes)
        .and_then(|()| out.write_all(b"\n"))
        .and_then(|()| out.flush());
    if let Err(e) = written {
        warn!(error = %e, "failed to echo response");
    }
}
