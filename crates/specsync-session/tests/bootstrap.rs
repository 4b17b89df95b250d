//! Client bootstrap pipeline end to end
//!
//! Tenet: the artifacts a bootstrap reports are exactly the package contents,
//! and the spec it returns was resolved for their hash.

use pretty_assertions::assert_eq;
use specsync_cache::{RetryConfig, SpecCacheClient, SpecResolver};
use specsync_loader::{CrawlResult, Extractor, PackageFetcher, StaticCrawler, KEY_PARAMETER};
use specsync_net::HttpTransport;
use specsync_session::{ClientBootstrap, SessionError};
use specsync_test_utils::{frozen_set, test_cache_config, MemoryCacheServer, PackageFixture};
use std::sync::Arc;

const PACKAGE_URL: &str = "http://game.test/client.pack";

fn fixture() -> PackageFixture {
    PackageFixture::new([
        ("client.class", b"client:code".to_vec()),
        ("ab.class", b"ab:code".to_vec()),
        ("zz.class", b"zz:code".to_vec()),
    ])
}

fn bootstrap(server: &Arc<MemoryCacheServer>) -> ClientBootstrap {
    let transport = Arc::clone(server) as Arc<dyn HttpTransport>;
    let client = SpecCacheClient::new(Arc::clone(&transport), test_cache_config()).unwrap();
    ClientBootstrap::new(
        PackageFetcher::new(transport),
        Extractor::default(),
        SpecResolver::new(client, RetryConfig::default()),
    )
}

fn crawler(fixture: &PackageFixture) -> StaticCrawler {
    StaticCrawler::new(CrawlResult {
        archive: PACKAGE_URL.into(),
        referer: "http://game.test/".into(),
        parameters: fixture.parameters(),
    })
}

#[tokio::test(start_paused = true)]
async fn bootstrap_extracts_and_resolves() {
    let fixture = fixture();
    let server = Arc::new(MemoryCacheServer::new());
    server.serve_package(PACKAGE_URL, fixture.build());

    let loaded = bootstrap(&server).load(&crawler(&fixture)).await.unwrap();

    assert_eq!(loaded.artifacts().len(), 3);
    assert_eq!(loaded.hash(), frozen_set(&["ab", "client", "zz"]).hash());
    assert_eq!(loaded.hash().to_string().len(), 64);
    assert_eq!(loaded.spec().hash(), loaded.hash());
    assert_eq!(loaded.spec().len(), 3);
    assert_eq!(server.upload_count(), 1);

    let mut copy = loaded.artifacts();
    copy.merge(frozen_set(&["extra"]).to_set());
    assert_eq!(loaded.artifacts().len(), 3);
}

#[tokio::test]
async fn missing_parameters_are_reported() {
    let fixture = fixture();
    let server = Arc::new(MemoryCacheServer::new());
    server.serve_package(PACKAGE_URL, fixture.build());

    let mut result = CrawlResult {
        archive: PACKAGE_URL.into(),
        referer: "http://game.test/".into(),
        parameters: fixture.parameters(),
    };
    result.parameters.remove(KEY_PARAMETER);

    let err = bootstrap(&server).load(&StaticCrawler::new(result)).await.unwrap_err();
    assert_eq!(err.user_message(), "error parsing parameters");
}

#[tokio::test]
async fn crawl_failure_asks_to_check_connection() {
    let server = Arc::new(MemoryCacheServer::new());
    let crawler = StaticCrawler::new(CrawlResult {
        archive: String::new(),
        referer: String::new(),
        parameters: Default::default(),
    });

    let err = bootstrap(&server).load(&crawler).await.unwrap_err();
    assert_eq!(err.user_message(), "please check your firewall and internet connection");
}

#[tokio::test]
async fn stale_entry_means_no_spec() {
    let fixture = fixture();
    let server = Arc::new(MemoryCacheServer::new());
    server.serve_package(PACKAGE_URL, fixture.build());
    server.invalidate(frozen_set(&["ab", "client", "zz"]).hash());

    let err = bootstrap(&server).load(&crawler(&fixture)).await.unwrap_err();
    assert!(matches!(err, SessionError::SpecUnavailable(_)));
    assert_eq!(err.user_message(), "error getting spec");
}
