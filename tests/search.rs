use std::{
    sync::{mpsc, Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use cancellable_search::{
    search, with_timeout, Backend, CancelReason, CancellationToken, CancellationTokenSource, Error,
    InterruptListener, LatencyRange, MayBeCancelled, MockBackend, RouteQuery,
};
use futures::future::join_all;
use rt_local::runtime::core::test;

fn backend(ms: u64) -> Arc<MockBackend> {
    Arc::new(MockBackend::with_seed(LatencyRange::fixed(ms), 0))
}

#[test]
async fn completes_before_deadline() {
    let (cts, _guard) =
        with_timeout(&CancellationToken::default(), Duration::from_secs(2)).unwrap();
    let routes = search(backend(20), &cts.token(), "nyc", "london")
        .await
        .unwrap();
    assert_eq!(
        routes,
        [
            "nyc-london-british airways-11am",
            "nyc-london-delta airlines-12am"
        ]
    );
}

#[test]
async fn deadline_exceeded() {
    let timeout = Duration::from_millis(100);
    let start = Instant::now();
    let (cts, _guard) = with_timeout(&CancellationToken::default(), timeout).unwrap();
    let e = search(backend(2000), &cts.token(), "nyc", "london")
        .await
        .unwrap_err();
    let elapsed = start.elapsed();
    assert_eq!(e.reason(), Some(CancelReason::DeadlineExceeded));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(50), "{elapsed:?}");
}

#[test]
async fn interrupt_before_deadline() {
    let listener = Arc::new(InterruptListener::new());
    let (cts, _guard) =
        with_timeout(&CancellationToken::default(), Duration::from_secs(60)).unwrap();
    let _interrupt = listener.listen({
        let cts = cts.clone();
        move || cts.cancel()
    });
    let start = Instant::now();
    thread::spawn({
        let listener = listener.clone();
        move || {
            thread::sleep(Duration::from_millis(50));
            listener.notify();
        }
    });
    let e = search(backend(5000), &cts.token(), "nyc", "london")
        .await
        .unwrap_err();
    assert_eq!(e.reason(), Some(CancelReason::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
async fn already_cancelled() {
    let cts = CancellationTokenSource::new();
    cts.cancel();
    let e = search(backend(0), &cts.token(), "nyc", "london")
        .await
        .unwrap_err();
    assert!(matches!(e, Error::Cancelled(CancelReason::Cancelled)));
}

#[test]
async fn repeated_cancellation() {
    let (cts, _guard) =
        with_timeout(&CancellationToken::default(), Duration::from_secs(60)).unwrap();
    let cancellers: Vec<_> = (0..8)
        .map(|_| {
            let cts = cts.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cts.cancel();
                cts.cancel_with(CancelReason::DeadlineExceeded);
            })
        })
        .collect();
    let e = search(backend(5000), &cts.token(), "nyc", "london")
        .await
        .unwrap_err();
    for c in cancellers {
        c.join().unwrap();
    }
    assert_eq!(e.reason(), Some(CancelReason::Cancelled));
    assert_eq!(cts.reason(), Some(CancelReason::Cancelled));
}

#[test]
async fn concurrent_searches_resolve_once() {
    let backend = Arc::new(MockBackend::with_seed(LatencyRange::new(0, 80), 5));
    let searches = (0..100).map(|_| {
        let backend = backend.clone();
        async move {
            let (cts, _guard) =
                with_timeout(&CancellationToken::default(), Duration::from_millis(40))?;
            search(backend, &cts.token(), "nyc", "london").await
        }
    });
    let outcomes = join_all(searches).await;
    assert_eq!(outcomes.len(), 100);
    let (mut completed, mut expired) = (0, 0);
    for outcome in &outcomes {
        match outcome {
            Ok(routes) => {
                assert_eq!(routes.len(), 2);
                completed += 1;
            }
            Err(e) => {
                assert_eq!(e.reason(), Some(CancelReason::DeadlineExceeded));
                expired += 1;
            }
        }
    }
    assert!(completed > 0, "no search completed");
    assert!(expired > 0, "no search hit the deadline");
}

/// Reports how each call ended.
struct Outcomes {
    latency: Duration,
    done: Mutex<mpsc::Sender<MayBeCancelled>>,
}

impl Backend for Outcomes {
    fn find_routes(&self, _: &RouteQuery, ct: &CancellationToken) -> MayBeCancelled<Vec<String>> {
        let r = ct.sleep(self.latency);
        let _ = self.done.lock().unwrap().send(r);
        r.map(|()| Vec::new())
    }
}

#[test]
async fn worker_stops_after_deadline() {
    let (tx, rx) = mpsc::channel();
    let backend = Arc::new(Outcomes {
        latency: Duration::from_secs(30),
        done: Mutex::new(tx),
    });
    let (cts, _guard) =
        with_timeout(&CancellationToken::default(), Duration::from_millis(50)).unwrap();
    let e = search(backend, &cts.token(), "nyc", "london")
        .await
        .unwrap_err();
    assert_eq!(e.reason(), Some(CancelReason::DeadlineExceeded));
    let worker = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(worker, Err(CancelReason::DeadlineExceeded));
}

struct Panicking;

impl Backend for Panicking {
    fn find_routes(&self, _: &RouteQuery, _: &CancellationToken) -> MayBeCancelled<Vec<String>> {
        panic!("backend failure");
    }
}

#[test]
async fn worker_lost() {
    let e = search(
        Arc::new(Panicking),
        &CancellationToken::default(),
        "nyc",
        "london",
    )
    .await
    .unwrap_err();
    assert!(matches!(e, Error::WorkerLost));
}
