//! In-memory spec cache service
//!
//! Implements [`HttpTransport`] directly, with the service's single-builder
//! semantics:
//!
//! | entry | `GET <base>/<hash>` |
//! |---|---|
//! | absent | becomes `Claimed`, answers `303` to `<upload>/<hash>` |
//! | claimed / uploaded | `202` |
//! | materializing | `202` for the configured number of polls, then published |
//! | published | `200` with the encrypted spec |
//! | stale | `404`, entry removed |
//!
//! A `GET` carrying the rebuild header re-elects a builder for published or
//! stale entries. `PUT <upload>/<hash>` stores the decrypted pack;
//! `PUT <base>/<hash>` starts materializing. Package URLs registered with
//! [`MemoryCacheServer::serve_package`] answer plain `GET`s.

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use specsync_artifact::{read_pack, ContentHash};
use specsync_cache::{CipherSuite, ClassDocument, SpecDocument, SpecKey};
use specsync_net::{HttpRequest, HttpResponse, HttpTransport, Method, StatusCode, TransportError};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Base URL the server answers cache requests on
pub const CACHE_BASE: &str = "http://cache.test/spec";

/// Base URL upload targets are issued under
pub const UPLOAD_BASE: &str = "http://cache.test/upload";

/// Turns uploaded payloads into the spec that gets published
pub type SpecBuilder = Box<dyn Fn(&[Bytes]) -> SpecDocument + Send + Sync>;

/// Externally visible entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    Claimed,
    Uploaded,
    Materializing,
    Published,
    Stale,
}

enum Entry {
    Claimed,
    Uploaded(Vec<Bytes>),
    Materializing { remaining: u32, payloads: Vec<Bytes> },
    Published(Bytes),
    Stale,
    Rejected,
}

/// Spec cache service held in memory
pub struct MemoryCacheServer {
    suite: CipherSuite,
    materialize_polls: u32,
    builder: SpecBuilder,
    entries: Mutex<HashMap<ContentHash, Entry>>,
    packages: Mutex<HashMap<String, Bytes>>,
    requests: Mutex<Vec<HttpRequest>>,
    uploads: AtomicUsize,
}

impl fmt::Debug for MemoryCacheServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCacheServer")
            .field("entries", &self.entries.lock().len())
            .field("uploads", &self.upload_count())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryCacheServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheServer {
    /// Server using [`name_prefix_spec`] and one pending poll while materializing
    pub fn new() -> Self {
        Self {
            suite: CipherSuite::Rc4Sha256,
            materialize_polls: 1,
            builder: Box::new(name_prefix_spec),
            entries: Mutex::new(HashMap::new()),
            packages: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            uploads: AtomicUsize::new(0),
        }
    }

    /// With a custom spec builder
    #[must_use]
    pub fn with_builder(mut self, builder: SpecBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// With the number of `202` polls answered before publishing
    #[must_use]
    pub fn with_materialize_polls(mut self, polls: u32) -> Self {
        self.materialize_polls = polls;
        self
    }

    /// Serve `body` at `url`
    pub fn serve_package(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.packages.lock().insert(url.into(), body.into());
    }

    /// Publish `document` for `hash` directly
    pub fn publish(&self, hash: ContentHash, document: &SpecDocument) {
        let body = self.seal(hash, &document.to_bytes().expect("serialize spec"));
        self.entries.lock().insert(hash, Entry::Published(body));
    }

    /// Publish a body that does not decrypt to a spec
    pub fn publish_garbage(&self, hash: ContentHash) {
        self.entries
            .lock()
            .insert(hash, Entry::Published(Bytes::from_static(&[0x5a; 48])));
    }

    /// Mark the entry for `hash` as claimed by someone else
    pub fn claim(&self, hash: ContentHash) {
        self.entries.lock().insert(hash, Entry::Claimed);
    }

    /// Make the next lookup of `hash` answer `404`
    pub fn invalidate(&self, hash: ContentHash) {
        self.entries.lock().insert(hash, Entry::Stale);
    }

    /// Answer `400` for `hash` from now on
    pub fn reject(&self, hash: ContentHash) {
        self.entries.lock().insert(hash, Entry::Rejected);
    }

    /// State of the entry for `hash`
    pub fn state(&self, hash: ContentHash) -> EntryState {
        match self.entries.lock().get(&hash) {
            None | Some(Entry::Rejected) => EntryState::Absent,
            Some(Entry::Claimed) => EntryState::Claimed,
            Some(Entry::Uploaded(_)) => EntryState::Uploaded,
            Some(Entry::Materializing { .. }) => EntryState::Materializing,
            Some(Entry::Published(_)) => EntryState::Published,
            Some(Entry::Stale) => EntryState::Stale,
        }
    }

    /// Number of accepted uploads
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    fn key(&self, hash: ContentHash) -> SpecKey {
        SpecKey::derive(self.suite, &hash)
    }

    fn seal(&self, hash: ContentHash, plain: &[u8]) -> Bytes {
        Bytes::from(self.key(hash).apply(plain).expect("rc4 key"))
    }

    fn upload_target(hash: ContentHash) -> String {
        format!("{UPLOAD_BASE}/{hash}")
    }

    fn lookup(&self, hash: ContentHash, rebuild: bool) -> HttpResponse {
        let mut entries = self.entries.lock();
        let see_other = || HttpResponse::status(StatusCode::SEE_OTHER).with_header("Location", Self::upload_target(hash));

        match entries.get_mut(&hash) {
            Some(Entry::Rejected) => HttpResponse::status(StatusCode::BAD_REQUEST),
            None => {
                entries.insert(hash, Entry::Claimed);
                see_other()
            }
            Some(Entry::Published(_) | Entry::Stale) if rebuild => {
                entries.insert(hash, Entry::Claimed);
                see_other()
            }
            Some(Entry::Claimed | Entry::Uploaded(_)) => HttpResponse::status(StatusCode::ACCEPTED),
            Some(Entry::Materializing { remaining, payloads }) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    return HttpResponse::status(StatusCode::ACCEPTED);
                }
                let document = (self.builder)(payloads);
                let body = self.seal(hash, &document.to_bytes().expect("serialize spec"));
                entries.insert(hash, Entry::Published(body.clone()));
                HttpResponse::new(StatusCode::OK, body)
            }
            Some(Entry::Published(body)) => HttpResponse::new(StatusCode::OK, body.clone()),
            Some(Entry::Stale) => {
                entries.remove(&hash);
                HttpResponse::status(StatusCode::NOT_FOUND)
            }
        }
    }

    fn upload(&self, hash: ContentHash, body: &[u8]) -> HttpResponse {
        let mut entries = self.entries.lock();
        if !matches!(entries.get(&hash), Some(Entry::Claimed)) {
            return HttpResponse::status(StatusCode::CONFLICT);
        }
        let Ok(compressed) = self.key(hash).apply(body) else {
            return HttpResponse::status(StatusCode::BAD_REQUEST);
        };
        let mut pack = Vec::new();
        if GzDecoder::new(compressed.as_slice()).read_to_end(&mut pack).is_err() {
            return HttpResponse::status(StatusCode::BAD_REQUEST);
        }
        let Ok(payloads) = read_pack(&pack) else {
            return HttpResponse::status(StatusCode::BAD_REQUEST);
        };
        entries.insert(hash, Entry::Uploaded(payloads));
        self.uploads.fetch_add(1, Ordering::SeqCst);
        HttpResponse::status(StatusCode::OK)
    }

    fn notify(&self, hash: ContentHash) -> HttpResponse {
        let mut entries = self.entries.lock();
        match entries.remove(&hash) {
            Some(Entry::Uploaded(payloads)) => {
                entries.insert(
                    hash,
                    Entry::Materializing {
                        remaining: self.materialize_polls,
                        payloads,
                    },
                );
                HttpResponse::status(StatusCode::ACCEPTED)
            }
            Some(other) => {
                entries.insert(hash, other);
                HttpResponse::status(StatusCode::CONFLICT)
            }
            None => HttpResponse::status(StatusCode::CONFLICT),
        }
    }
}

#[async_trait]
impl HttpTransport for MemoryCacheServer {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());

        if let Some(body) = self.packages.lock().get(&request.url) {
            return Ok(HttpResponse::new(StatusCode::OK, body.clone()));
        }

        let entry = request
            .url
            .strip_prefix(CACHE_BASE)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|h| ContentHash::from_str(h).ok());
        let upload = request
            .url
            .strip_prefix(UPLOAD_BASE)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|h| ContentHash::from_str(h).ok());

        let response = match (request.method, entry, upload) {
            (Method::Get, Some(hash), _) => {
                let rebuild = request.header("x-specsync-rebuild").is_some();
                self.lookup(hash, rebuild)
            }
            (Method::Put, Some(hash), _) => self.notify(hash),
            (Method::Put, None, Some(hash)) => {
                self.upload(hash, request.body.as_deref().unwrap_or_default())
            }
            _ => HttpResponse::status(StatusCode::NOT_FOUND),
        };
        Ok(response)
    }
}

/// Default spec builder: each payload of the form `name:...` maps a class
/// `name` onto the artifact `name`.
pub fn name_prefix_spec(payloads: &[Bytes]) -> SpecDocument {
    payloads
        .iter()
        .filter_map(|p| {
            let end = p.iter().position(|b| *b == b':')?;
            std::str::from_utf8(&p[..end]).ok().map(str::to_string)
        })
        .fold(SpecDocument::new(), |doc, name| {
            doc.with_class(ClassDocument::new(name.clone(), name))
        })
}
