//! Spec cache protocol behavior against the in-memory service
//!
//! Tenet: at most one caller per hash uploads; everyone else waits.
//! Tenet: a pending answer is never retried before its delay has elapsed.

use futures::future::join_all;
use pretty_assertions::assert_eq;
use specsync_cache::{
    CacheError, CacheOutcome, ClassDocument, PendingCause, PendingState, Resolution, RetryConfig,
    SpecCacheClient, SpecDocument, SpecResolver,
};
use specsync_net::{HttpTransport, Method};
use specsync_test_utils::{frozen_set, test_cache_config, EntryState, MemoryCacheServer};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument::WithSubscriber;
use tracing_subscriber::fmt::MakeWriter;

fn client(server: &Arc<MemoryCacheServer>) -> SpecCacheClient {
    SpecCacheClient::new(Arc::clone(server) as Arc<dyn HttpTransport>, test_cache_config()).unwrap()
}

#[derive(Clone, Default)]
struct LogBuffer {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn lookups(server: &MemoryCacheServer) -> usize {
    server
        .requests()
        .iter()
        .filter(|r| r.method == Method::Get)
        .count()
}

#[tokio::test]
async fn elected_builder_waits_double_delay() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client", "ab", "zz"]);

    let outcome = client(&server).get(&set).await.unwrap();

    assert_eq!(
        outcome,
        CacheOutcome::Pending(PendingState::new(
            Duration::from_millis(2000),
            PendingCause::JustTriggered
        ))
    );
    assert_eq!(server.upload_count(), 1);
    assert_eq!(server.state(set.hash()), EntryState::Materializing);
    assert!(server.requests().iter().all(|r| !r.follow_redirects));
}

#[tokio::test]
async fn concurrent_callers_upload_once() {
    let server = Arc::new(MemoryCacheServer::new().with_materialize_polls(100));
    let set = frozen_set(&["client", "ab"]);

    let clients: Vec<_> = (0..8).map(|_| client(&server)).collect();
    let outcomes = join_all(clients.iter().map(|c| c.get(&set))).await;

    let mut triggered = 0;
    let mut waiting = 0;
    for outcome in outcomes {
        match outcome.unwrap() {
            CacheOutcome::Pending(p) if p.cause == PendingCause::JustTriggered => triggered += 1,
            CacheOutcome::Pending(p) => {
                assert_eq!(p.delay, Duration::from_millis(1000));
                waiting += 1;
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!((triggered, waiting), (1, 7));
    assert_eq!(server.upload_count(), 1);
}

#[tokio::test]
async fn concurrent_tasks_upload_once() {
    let server = Arc::new(MemoryCacheServer::new().with_materialize_polls(100));
    let set = frozen_set(&["client"]);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let client = client(&server);
            let set = set.clone();
            tokio::spawn(async move { client.get(&set).await })
        })
        .collect();
    for handle in handles {
        assert!(matches!(handle.await.unwrap().unwrap(), CacheOutcome::Pending(_)));
    }
    assert_eq!(server.upload_count(), 1);
}

#[tokio::test]
async fn populated_entry_returns_identical_bytes() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);
    server.publish(
        set.hash(),
        &SpecDocument::new().with_class(ClassDocument::new("Client", "client")),
    );

    let first = client(&server).get(&set).await.unwrap();
    let second = client(&server).get(&set).await.unwrap();
    let (CacheOutcome::Ready(a), CacheOutcome::Ready(b)) = (first, second) else {
        panic!("expected ready specs");
    };
    assert_eq!(a.raw(), b.raw());
    assert_eq!(a.hash(), set.hash());
}

#[tokio::test(start_paused = true)]
async fn pending_is_not_retried_early() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);
    server.claim(set.hash());

    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    let resolver = SpecResolver::new(client(&server), RetryConfig::default());
    let task = {
        let set = set.clone();
        tokio::spawn(async move { resolver.resolve(&set).await }.with_subscriber(subscriber))
    };

    tokio::time::sleep(Duration::from_millis(999)).await;
    assert_eq!(lookups(&server), 1);
    assert!(logs
        .contents()
        .contains("Request pending, trying again in 1 seconds"));

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(lookups(&server), 2);

    server.publish(
        set.hash(),
        &SpecDocument::new().with_class(ClassDocument::new("Client", "client")),
    );
    let resolution = task.await.unwrap().unwrap();
    assert!(matches!(resolution, Resolution::Ready(_)));
    assert_eq!(lookups(&server), 3);
}

#[tokio::test(start_paused = true)]
async fn submitted_set_resolves_to_its_own_spec() {
    let server = Arc::new(MemoryCacheServer::new().with_materialize_polls(2));
    let set = frozen_set(&["client", "ab", "zz"]);
    let client = client(&server);

    let pending = client.submit(&set).await.unwrap();
    assert_eq!(pending.cause, PendingCause::JustTriggered);

    let resolver = SpecResolver::new(client, RetryConfig::default());
    let Resolution::Ready(spec) = resolver.resolve(&set).await.unwrap() else {
        panic!("expected a spec");
    };
    let adapted = spec.adapt().unwrap();
    let classes: Vec<_> = adapted.classes().map(|c| c.name.as_str()).collect();
    assert_eq!(classes, vec!["ab", "client", "zz"]);
    assert_eq!(server.upload_count(), 1);
}

#[tokio::test]
async fn rejected_hash_is_fatal() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);
    server.reject(set.hash());

    let resolver = SpecResolver::new(client(&server), RetryConfig::default());
    let err = resolver.resolve(&set).await.unwrap_err();
    assert!(matches!(err, CacheError::Rejected { hash } if hash == set.hash()));
}

#[tokio::test]
async fn invalidated_entry_is_stale_once() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);
    server.invalidate(set.hash());

    let client = client(&server);
    assert_eq!(client.get(&set).await.unwrap(), CacheOutcome::Stale);
    assert!(matches!(client.get(&set).await.unwrap(), CacheOutcome::Pending(_)));
}

#[tokio::test]
async fn unreadable_spec_is_stale_and_can_be_rebuilt() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);
    server.publish_garbage(set.hash());

    let client = client(&server);
    assert_eq!(client.get(&set).await.unwrap(), CacheOutcome::Stale);

    let pending = client.submit(&set).await.unwrap();
    assert_eq!(pending.cause, PendingCause::JustTriggered);
    assert_eq!(server.upload_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_wait() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);
    server.claim(set.hash());

    let resolver = SpecResolver::new(client(&server), RetryConfig::default());
    let token = resolver.cancellation_token();
    let task = {
        let set = set.clone();
        tokio::spawn(async move { resolver.resolve(&set).await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();
    let err = task.await.unwrap().unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(lookups(&server), 1);
}

#[tokio::test(start_paused = true)]
async fn attempt_limit_is_enforced() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);
    server.claim(set.hash());

    let resolver = SpecResolver::new(client(&server), RetryConfig::default().with_max_attempts(3));
    let err = resolver.resolve(&set).await.unwrap_err();
    assert!(matches!(err, CacheError::BackoffExhausted { attempts: 3 }));
    assert_eq!(lookups(&server), 3);
}

#[tokio::test(start_paused = true)]
async fn deadline_is_enforced() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);
    server.claim(set.hash());

    let retry = RetryConfig::default().with_deadline(Duration::from_millis(2500));
    let resolver = SpecResolver::new(client(&server), retry);
    let err = resolver.resolve(&set).await.unwrap_err();
    // waits at 0 and 1000 fit, the one starting at 2000 would end past 2500
    assert!(matches!(err, CacheError::BackoffExhausted { attempts: 3 }));
}

#[tokio::test(start_paused = true)]
async fn rebuild_wait_respects_deadline() {
    let server = Arc::new(MemoryCacheServer::new());
    let set = frozen_set(&["client"]);

    let retry = RetryConfig::default().with_deadline(Duration::from_millis(1500));
    let resolver = SpecResolver::new(client(&server), retry);
    let before = tokio::time::Instant::now();
    let err = resolver.rebuild(&set).await.unwrap_err();

    // the doubled 2000 ms wait would end past the deadline, so none is taken
    assert!(matches!(err, CacheError::BackoffExhausted { attempts: 1 }));
    assert_eq!(before.elapsed(), Duration::ZERO);
    assert_eq!(server.upload_count(), 1);
}
