use async_trait::async_trait;
use httpbench_client::{Fetch, FetchResult};
use httpbench_common::{BenchError, Status, Target};
use httpbench_runner::dispatcher::{batch_sizes, classify, Dispatcher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Start,
    End,
}

/// Shared view of what a `FakeFetcher` observed.
#[derive(Default)]
struct Tally {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    events: Mutex<Vec<Event>>,
}

/// Fake fetcher that sleeps, records start/end events, and tracks peak concurrency.
/// Every `fail_every`-th call (1-based) fails without bytes.
struct FakeFetcher {
    delay: Duration,
    fail_every: Option<usize>,
    tally: Arc<Tally>,
}

fn fake(delay: Duration, fail_every: Option<usize>) -> (FakeFetcher, Arc<Tally>) {
    let tally = Arc::new(Tally::default());
    (FakeFetcher { delay, fail_every, tally: Arc::clone(&tally) }, tally)
}

#[async_trait]
impl Fetch for FakeFetcher {
    async fn fetch(&self, _target: &Target) -> FetchResult {
        let tally = &self.tally;
        let call = tally.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = tally.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        tally.peak.fetch_max(now, Ordering::SeqCst);
        tally.events.lock().unwrap().push(Event::Start);

        tokio::time::sleep(self.delay).await;

        tally.events.lock().unwrap().push(Event::End);
        tally.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.fail_every {
            Some(k) if call % k == 0 => {
                FetchResult::failed(Vec::new(), BenchError::Connect("refused".to_string()))
            }
            _ => FetchResult::complete(b"HTTP/1.1 200 OK\r\n\r\nbody".to_vec()),
        }
    }
}

struct PanickingFetcher;

#[async_trait]
impl Fetch for PanickingFetcher {
    async fn fetch(&self, _target: &Target) -> FetchResult {
        panic!("fetch blew up");
    }
}

fn target() -> Target {
    Target::parse("http://127.0.0.1:9/").unwrap()
}

// --- batch_sizes ---

#[test]
fn test_batch_sizes_splits_with_remainder() {
    assert_eq!(batch_sizes(10, 3), vec![3, 3, 3, 1]);
    assert_eq!(batch_sizes(9, 3), vec![3, 3, 3]);
    assert_eq!(batch_sizes(2, 8), vec![2]);
    assert_eq!(batch_sizes(3, 1), vec![1, 1, 1]);
}

#[test]
fn test_batch_sizes_edge_cases() {
    assert!(batch_sizes(0, 4).is_empty());
    // A zero batch size is treated as one.
    assert_eq!(batch_sizes(2, 0), vec![1, 1]);
}

// --- classify ---

#[test]
fn test_classify_complete_response() {
    let r = FetchResult::complete(b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec());
    assert_eq!(classify(&r), Status::Code("404".to_string()));
}

#[test]
fn test_classify_failure_without_bytes_is_transport_error() {
    let r = FetchResult::failed(Vec::new(), BenchError::ConnectTimeout(5000));
    assert_eq!(classify(&r), Status::TransportError);
}

#[test]
fn test_classify_failure_with_partial_bytes_uses_status_line() {
    let partial = b"HTTP/1.1 200 OK\r\nContent-Le".to_vec();
    let r = FetchResult::failed(partial, BenchError::ReadTimeout(100));
    assert_eq!(classify(&r), Status::Code("200".to_string()));

    let r = FetchResult::failed(b"HTTP/1.1".to_vec(), BenchError::Io("reset".to_string()));
    assert_eq!(classify(&r), Status::ParseError);
}

#[test]
fn test_classify_unparseable_status_line() {
    assert_eq!(classify(&FetchResult::complete(Vec::new())), Status::ParseError);
    assert_eq!(classify(&FetchResult::complete(b"garbage\r\n".to_vec())), Status::ParseError);
}

// --- run ---

#[tokio::test]
async fn test_run_returns_one_outcome_per_request() {
    for (requests, concurrency) in [(1, 1), (5, 1), (5, 2), (7, 7), (4, 16)] {
        let (fetcher, _) = fake(Duration::from_millis(1), None);
        let outcomes = Dispatcher::new(fetcher, concurrency).run(&target(), requests).await;
        assert_eq!(outcomes.len(), requests, "requests={requests} concurrency={concurrency}");
    }
}

#[tokio::test]
async fn test_run_batches_never_exceed_concurrency() {
    let (fetcher, tally) = fake(Duration::from_millis(20), None);
    let dispatcher = Dispatcher::new(fetcher, 3);

    let outcomes = dispatcher.run(&target(), 10).await;

    assert_eq!(outcomes.len(), 10);
    assert_eq!(tally.calls.load(Ordering::SeqCst), 10);
    assert_eq!(tally.peak.load(Ordering::SeqCst), 3);

    // Four batches (3, 3, 3, 1): every batch fully ends before the next starts.
    use Event::{End, Start};
    #[rustfmt::skip]
    let expected = vec![
        Start, Start, Start, End, End, End,
        Start, Start, Start, End, End, End,
        Start, Start, Start, End, End, End,
        Start, End,
    ];
    assert_eq!(*tally.events.lock().unwrap(), expected);
}

#[tokio::test]
async fn test_run_with_concurrency_one_is_sequential() {
    let (fetcher, tally) = fake(Duration::from_millis(5), None);
    let dispatcher = Dispatcher::new(fetcher, 1);

    dispatcher.run(&target(), 4).await;

    assert_eq!(tally.peak.load(Ordering::SeqCst), 1);
    let events = tally.events.lock().unwrap();
    for pair in events.chunks(2) {
        assert_eq!(pair, [Event::Start, Event::End]);
    }
}

#[tokio::test]
async fn test_run_zero_concurrency_is_clamped_to_one() {
    let (fetcher, tally) = fake(Duration::from_millis(1), None);
    let dispatcher = Dispatcher::new(fetcher, 0);
    assert_eq!(dispatcher.concurrency(), 1);

    assert_eq!(dispatcher.run(&target(), 3).await.len(), 3);
    assert_eq!(tally.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_records_elapsed_time() {
    let (fetcher, _) = fake(Duration::from_millis(30), None);
    let outcomes = Dispatcher::new(fetcher, 2).run(&target(), 2).await;
    for o in &outcomes {
        assert!(o.elapsed_ms >= 30, "elapsed {} ms shorter than fetch delay", o.elapsed_ms);
    }
}

#[tokio::test]
async fn test_run_isolates_failed_attempts() {
    let (fetcher, _) = fake(Duration::from_millis(5), Some(2));

    let outcomes = Dispatcher::new(fetcher, 4).run(&target(), 8).await;

    assert_eq!(outcomes.len(), 8);
    let failed: Vec<_> = outcomes.iter().filter(|o| o.status == Status::TransportError).collect();
    let ok: Vec<_> =
        outcomes.iter().filter(|o| o.status == Status::Code("200".to_string())).collect();
    assert_eq!(failed.len(), 4);
    assert_eq!(ok.len(), 4);
    assert!(failed.iter().all(|o| o.size_bytes == 0));
    assert!(ok.iter().all(|o| o.size_bytes == b"HTTP/1.1 200 OK\r\n\r\nbody".len() as u64));
}

#[tokio::test]
async fn test_run_panicking_attempt_still_yields_outcome() {
    let outcomes = Dispatcher::new(PanickingFetcher, 2).run(&target(), 3).await;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.status == Status::TransportError && o.size_bytes == 0));
}

#[tokio::test(start_paused = true)]
async fn test_run_pauses_between_batches_only() {
    let (fetcher, _) = fake(Duration::ZERO, None);
    let dispatcher = Dispatcher::new(fetcher, 1).with_pause(Duration::from_millis(100));

    let start = tokio::time::Instant::now();
    dispatcher.run(&target(), 3).await;

    // Two gaps between three batches, none after the last.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_single_request_echoes_raw_response() {
    let (fetcher, _) = fake(Duration::ZERO, None);
    let sink = Arc::new(Mutex::new(Vec::<u8>::new()));
    let dispatcher = Dispatcher::new(fetcher, 4).with_echo(sink.clone());

    let outcomes = dispatcher.run(&target(), 1).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(*sink.lock().unwrap(), b"HTTP/1.1 200 OK\r\n\r\nbody\n");
}

#[tokio::test]
async fn test_multiple_requests_do_not_echo() {
    let (fetcher, _) = fake(Duration::ZERO, None);
    let sink = Arc::new(Mutex::new(Vec::<u8>::new()));
    let dispatcher = Dispatcher::new(fetcher, 4).with_echo(sink.clone());

    dispatcher.run(&target(), 2).await;

    assert!(sink.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_failed_request_echoes_nothing_but_newline() {
    let (fetcher, _) = fake(Duration::ZERO, Some(1));
    let sink = Arc::new(Mutex::new(Vec::<u8>::new()));
    let dispatcher = Dispatcher::new(fetcher, 1).with_echo(sink.clone());

    let outcomes = dispatcher.run(&target(), 1).await;

    assert_eq!(outcomes[0].status, Status::TransportError);
    assert_eq!(*sink.lock().unwrap(), b"\n");
}
