//! Async front door to the compiler worker
//!
//! [`CompilerProxy`] owns the worker session: it starts the worker thread
//! once, performs the ready handshake under a timeout, and routes every
//! response back to the caller that issued the matching request id. Clones
//! share the same session.
//!
//! Session lifecycle:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready
//!                              \-> Failed   (until retry())
//! teardown(): any state -> Uninitialized
//! ```

use super::protocol::{CompileOptions, EngineErrorKind, RequestId, WorkerRequest, WorkerResponse};
use super::worker::{spawn_worker, WorkerHandle};
use super::EngineFactory;
use crate::core::config::settings::{
    DEFAULT_COMPILE_TIMEOUT, DEFAULT_INIT_TIMEOUT, DEFAULT_INTERPOLATE_TIMEOUT,
};
use crate::core::errors::{PipelineError, PipelineResult};
use crate::font_source::{Axis, DesignLocation, LayerData};
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Timeouts applied by the proxy
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub init_timeout: Duration,
    pub compile_timeout: Duration,
    pub interpolate_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
            interpolate_timeout: DEFAULT_INTERPOLATE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready { version: String },
    Failed { reason: String },
}

/// Snapshot of the session for diagnostics
#[derive(Debug, Clone)]
pub struct ProxyStatus {
    pub state: SessionState,
    pub font_cached: bool,
    /// Set after a request timed out; the worker may be stuck
    pub suspect: bool,
    pub in_flight: usize,
}

/// Compiled font bytes with the engine-reported compile time
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub request_id: RequestId,
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

type InitOutcome = Option<Result<String, String>>;
type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<WorkerResponse>>>>;

enum Lifecycle {
    Uninitialized,
    Initializing(watch::Receiver<InitOutcome>),
    Ready { version: String },
    Failed { reason: String },
}

/// A running worker plus the requests waiting on it
struct Connection {
    worker: WorkerHandle,
    pending: PendingMap,
    /// The font most recently sent for caching
    cached: Option<CachedFont>,
}

struct CachedFont {
    digest: u64,
    axes: Vec<Axis>,
}

/// The part of a serialized font the proxy keeps for itself
#[derive(Deserialize)]
struct FontAxes {
    #[serde(default)]
    axes: Vec<Axis>,
}

struct Session {
    lifecycle: Lifecycle,
    connection: Option<Connection>,
    /// Bumped by teardown so a late start-up result is not installed
    epoch: u64,
    suspect: bool,
}

struct ProxyInner {
    factory: EngineFactory,
    settings: EngineSettings,
    next_id: AtomicU64,
    session: Mutex<Session>,
}

#[derive(Clone)]
pub struct CompilerProxy {
    inner: Arc<ProxyInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn digest(json: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    hasher.finish()
}

impl CompilerProxy {
    pub fn new(factory: EngineFactory, settings: EngineSettings) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                factory,
                settings,
                next_id: AtomicU64::new(1),
                session: Mutex::new(Session {
                    lifecycle: Lifecycle::Uninitialized,
                    connection: None,
                    epoch: 0,
                    suspect: false,
                }),
            }),
        }
    }

    /// Start the worker and wait for its handshake.
    ///
    /// Idempotent: a ready session returns immediately, concurrent callers
    /// share one start-up, and a failed session keeps failing until
    /// [`retry`](Self::retry). Must be called within a tokio runtime.
    pub async fn initialize(&self) -> PipelineResult<String> {
        let mut outcome = {
            let mut session = lock(&self.inner.session);
            match &session.lifecycle {
                Lifecycle::Ready { version } => return Ok(version.clone()),
                Lifecycle::Failed { reason } => {
                    return Err(PipelineError::Initialization(reason.clone()))
                }
                Lifecycle::Initializing(outcome) => outcome.clone(),
                Lifecycle::Uninitialized => {
                    let (tx, rx) = watch::channel(None);
                    session.lifecycle = Lifecycle::Initializing(rx.clone());
                    let epoch = session.epoch;
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move { inner.start(epoch, tx).await });
                    rx
                }
            }
        };

        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| PipelineError::Initialization("start-up was abandoned".to_string()))?;

        match &*settled {
            Some(Ok(version)) => Ok(version.clone()),
            Some(Err(reason)) => Err(PipelineError::Initialization(reason.clone())),
            None => Err(PipelineError::Initialization("start-up was abandoned".to_string())),
        }
    }

    /// Clear a failed session and initialize again.
    pub async fn retry(&self) -> PipelineResult<String> {
        {
            let mut session = lock(&self.inner.session);
            if matches!(session.lifecycle, Lifecycle::Failed { .. }) {
                info!("Retrying compiler engine initialization");
                session.lifecycle = Lifecycle::Uninitialized;
                session.suspect = false;
            }
        }
        self.initialize().await
    }

    /// Stop the worker and return to `Uninitialized`.
    ///
    /// Outstanding requests fail with [`PipelineError::WorkerGone`].
    pub fn teardown(&self) {
        let mut session = lock(&self.inner.session);
        session.epoch += 1;
        session.lifecycle = Lifecycle::Uninitialized;
        session.suspect = false;
        if let Some(connection) = session.connection.take() {
            lock(&connection.pending).clear();
            info!("Compiler engine torn down");
        }
    }

    pub fn status(&self) -> ProxyStatus {
        let session = lock(&self.inner.session);
        let state = match &session.lifecycle {
            Lifecycle::Uninitialized => SessionState::Uninitialized,
            Lifecycle::Initializing(_) => SessionState::Initializing,
            Lifecycle::Ready { version } => SessionState::Ready {
                version: version.clone(),
            },
            Lifecycle::Failed { reason } => SessionState::Failed {
                reason: reason.clone(),
            },
        };
        let (font_cached, in_flight) = match &session.connection {
            Some(connection) => (
                connection.cached.is_some(),
                lock(&connection.pending).len(),
            ),
            None => (false, 0),
        };
        ProxyStatus {
            state,
            font_cached,
            suspect: session.suspect,
            in_flight,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status().state, SessionState::Ready { .. })
    }

    /// Axes of the cached font, for converting userspace locations.
    pub fn cached_axes(&self) -> Option<Vec<Axis>> {
        lock(&self.inner.session)
            .connection
            .as_ref()
            .and_then(|connection| connection.cached.as_ref())
            .map(|cached| cached.axes.clone())
    }

    /// Cache a serialized font in the worker.
    pub async fn store_font(&self, json: String) -> PipelineResult<()> {
        let font_digest = digest(&json);
        // Unparseable JSON is rejected by the worker, which also drops the cache
        let axes = serde_json::from_str::<FontAxes>(&json)
            .map(|font| font.axes)
            .unwrap_or_default();
        let result = self
            .inner
            .request("store_font", self.inner.settings.compile_timeout, |id, connection| {
                connection.cached = Some(CachedFont {
                    digest: font_digest,
                    axes,
                });
                WorkerRequest::StoreFont { id, json }
            })
            .await;

        match result {
            Ok(WorkerResponse::Stored { .. }) => Ok(()),
            Ok(WorkerResponse::Error { kind, message, .. }) => {
                self.inner.forget_cached(font_digest);
                Err(engine_error(kind, message, None))
            }
            Ok(other) => {
                self.inner.forget_cached(font_digest);
                Err(unexpected(other))
            }
            Err(error) => {
                self.inner.forget_cached(font_digest);
                Err(error)
            }
        }
    }

    /// Compile `json`, or the cached font when `None`.
    pub async fn compile(
        &self,
        json: Option<String>,
        options: CompileOptions,
    ) -> PipelineResult<CompileOutput> {
        let response = self
            .inner
            .request("compile", self.inner.settings.compile_timeout, |id, _| {
                WorkerRequest::Compile { id, json, options }
            })
            .await?;
        compiled(response)
    }

    /// Compile a font, reusing the worker's cache when it already holds it.
    ///
    /// Stores the font first when it is not cached. If caching fails the
    /// font is sent along with the compile request instead.
    pub async fn compile_font(&self, json: String, options: CompileOptions) -> PipelineResult<CompileOutput> {
        let font_digest = digest(&json);

        if self.inner.cached_digest() != Some(font_digest) {
            if let Err(error) = self.store_font(json.clone()).await {
                if matches!(error, PipelineError::NotReady | PipelineError::Initialization(_)) {
                    return Err(error);
                }
                warn!("Caching font failed ({}), sending it with the compile request", error);
                return self.compile(Some(json), options).await;
            }
        }

        // Decided at send time: the channel is FIFO, so a matching digest
        // means the worker will still hold this font when it gets the request.
        let inline = json.clone();
        let response = self
            .inner
            .request("compile", self.inner.settings.compile_timeout, |id, connection| {
                let cached = connection.cached.as_ref().map(|cached| cached.digest);
                let json = (cached != Some(font_digest)).then_some(inline);
                WorkerRequest::Compile {
                    id,
                    json,
                    options: options.clone(),
                }
            })
            .await?;

        match compiled(response) {
            Err(PipelineError::NoCachedFont) => {
                debug!("Worker lost the cached font, resending it inline");
                self.compile(Some(json), options).await
            }
            other => other,
        }
    }

    /// Interpolate one glyph of the cached font at a designspace location.
    pub async fn interpolate_glyph(
        &self,
        glyph_name: &str,
        location: &DesignLocation,
    ) -> PipelineResult<LayerData> {
        if self.inner.cached_digest().is_none() && self.is_ready() {
            return Err(PipelineError::NoCachedFont);
        }

        let location_json = serde_json::to_string(location)?;
        let glyph = glyph_name.to_string();
        let response = self
            .inner
            .request(
                "interpolate",
                self.inner.settings.interpolate_timeout,
                |id, _| WorkerRequest::Interpolate {
                    id,
                    glyph_name: glyph,
                    location_json,
                },
            )
            .await?;

        match response {
            WorkerResponse::Interpolated { result_json, .. } => Ok(serde_json::from_str(&result_json)?),
            WorkerResponse::Error { kind, message, .. } => Err(engine_error(kind, message, Some(glyph_name))),
            other => Err(unexpected(other)),
        }
    }

    /// Drop the worker's cached font.
    pub async fn clear_cache(&self) -> PipelineResult<()> {
        let response = self
            .inner
            .request("clear_cache", self.inner.settings.compile_timeout, |id, connection| {
                connection.cached = None;
                WorkerRequest::ClearCache { id }
            })
            .await?;

        match response {
            WorkerResponse::Cleared { .. } => Ok(()),
            WorkerResponse::Error { kind, message, .. } => Err(engine_error(kind, message, None)),
            other => Err(unexpected(other)),
        }
    }
}

impl ProxyInner {
    /// Spawn the worker, handshake, and install the result for `epoch`.
    async fn start(self: Arc<Self>, epoch: u64, outcome: watch::Sender<InitOutcome>) {
        let result = self.launch().await;

        let mut session = lock(&self.session);
        if session.epoch != epoch {
            drop(session);
            warn!("Compiler engine was torn down during start-up");
            outcome.send_replace(Some(Err("torn down during start-up".to_string())));
            return;
        }

        let reported = match result {
            Ok((version, worker, responses)) => {
                let pending: PendingMap = Arc::default();
                tokio::spawn(dispatch(
                    responses,
                    Arc::clone(&pending),
                    Arc::downgrade(&self),
                    epoch,
                ));
                session.connection = Some(Connection {
                    worker,
                    pending,
                    cached: None,
                });
                session.lifecycle = Lifecycle::Ready {
                    version: version.clone(),
                };
                info!("Compiler engine ready: {}", version);
                Ok(version)
            }
            Err(reason) => {
                error!("Compiler engine failed to initialize: {}", reason);
                session.lifecycle = Lifecycle::Failed {
                    reason: reason.clone(),
                };
                Err(reason)
            }
        };
        drop(session);
        outcome.send_replace(Some(reported));
    }

    async fn launch(
        &self,
    ) -> Result<(String, WorkerHandle, mpsc::UnboundedReceiver<WorkerResponse>), String> {
        let (response_tx, mut responses) = mpsc::unbounded_channel();
        let engine = (self.factory)();
        let worker = spawn_worker(engine, response_tx)
            .map_err(|e| format!("failed to spawn compiler worker thread: {e}"))?;

        worker
            .send(WorkerRequest::Init)
            .map_err(|_| "compiler worker exited before the handshake".to_string())?;

        let timeout = self.settings.init_timeout;
        match tokio::time::timeout(timeout, responses.recv()).await {
            Err(_) => Err(format!("compiler worker did not respond within {timeout:?}")),
            Ok(None) => Err("compiler worker exited during start-up".to_string()),
            Ok(Some(WorkerResponse::Ready { version })) => Ok((version, worker, responses)),
            Ok(Some(WorkerResponse::Error { message, .. })) => Err(message),
            Ok(Some(other)) => Err(format!("unexpected handshake response: {other:?}")),
        }
    }

    fn cached_digest(&self) -> Option<u64> {
        lock(&self.session)
            .connection
            .as_ref()
            .and_then(|connection| connection.cached.as_ref())
            .map(|cached| cached.digest)
    }

    fn forget_cached(&self, font_digest: u64) {
        let mut session = lock(&self.session);
        if let Some(connection) = session.connection.as_mut() {
            if connection.cached.as_ref().map(|cached| cached.digest) == Some(font_digest) {
                connection.cached = None;
            }
        }
    }

    /// Send one request and wait for its correlated response.
    ///
    /// `build` runs under the session lock at send time, so bookkeeping it
    /// does on the connection is ordered with the channel.
    async fn request(
        &self,
        operation: &'static str,
        timeout: Duration,
        build: impl FnOnce(RequestId, &mut Connection) -> WorkerRequest,
    ) -> PipelineResult<WorkerResponse> {
        let (id, receiver, pending) = {
            let mut guard = lock(&self.session);
            let session = &mut *guard;
            let connection = match (&session.lifecycle, session.connection.as_mut()) {
                (Lifecycle::Ready { .. }, Some(connection)) => connection,
                (Lifecycle::Failed { reason }, _) => {
                    return Err(PipelineError::Initialization(reason.clone()))
                }
                _ => return Err(PipelineError::NotReady),
            };

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (sender, receiver) = oneshot::channel();
            lock(&connection.pending).insert(id, sender);

            let request = build(id, connection);
            if connection.worker.send(request).is_err() {
                lock(&connection.pending).remove(&id);
                return Err(PipelineError::WorkerGone);
            }
            (id, receiver, Arc::clone(&connection.pending))
        };

        let _registration = PendingGuard { id, pending };
        debug!("Sent {} request {}", operation, id);

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(PipelineError::WorkerGone),
            Err(_) => {
                warn!("{} request {} timed out after {:?}", operation, id, timeout);
                lock(&self.session).suspect = true;
                Err(PipelineError::Timeout {
                    operation,
                    after: timeout,
                })
            }
        }
    }
}

/// Unregisters a request when its caller stops waiting for it
struct PendingGuard {
    id: RequestId,
    pending: PendingMap,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.id);
    }
}

/// Route worker responses to their waiting requests by id.
async fn dispatch(
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
    pending: PendingMap,
    proxy: Weak<ProxyInner>,
    epoch: u64,
) {
    while let Some(response) = responses.recv().await {
        let Some(id) = response.id() else {
            warn!("Compiler worker sent an uncorrelated message: {:?}", response);
            continue;
        };

        let waiter = lock(&pending).remove(&id);
        match waiter {
            Some(waiter) => {
                if waiter.send(response).is_err() {
                    debug!("Discarding response {}: requester stopped waiting", id);
                }
            }
            None => debug!("Discarding response {}: no request is waiting", id),
        }
    }

    // Fail the session before waking waiters so they observe the new state
    if let Some(proxy) = proxy.upgrade() {
        let mut session = lock(&proxy.session);
        if session.epoch == epoch && matches!(session.lifecycle, Lifecycle::Ready { .. }) {
            error!("Compiler worker exited unexpectedly");
            session.lifecycle = Lifecycle::Failed {
                reason: "compiler worker exited unexpectedly".to_string(),
            };
            session.connection = None;
        }
    }

    // Dropping the senders wakes every waiter with WorkerGone
    lock(&pending).clear();
}

fn compiled(response: WorkerResponse) -> PipelineResult<CompileOutput> {
    match response {
        WorkerResponse::Compiled {
            id,
            bytes,
            duration_ms,
        } => Ok(CompileOutput {
            request_id: id,
            bytes,
            duration: Duration::from_millis(duration_ms),
        }),
        WorkerResponse::Error { kind, message, .. } => Err(engine_error(kind, message, None)),
        other => Err(unexpected(other)),
    }
}

fn engine_error(kind: EngineErrorKind, message: String, glyph: Option<&str>) -> PipelineError {
    match kind {
        EngineErrorKind::Initialization => PipelineError::Initialization(message),
        EngineErrorKind::NoCachedFont => PipelineError::NoCachedFont,
        EngineErrorKind::Protocol => PipelineError::Protocol(message),
        EngineErrorKind::Compilation => PipelineError::Compilation(message),
        EngineErrorKind::Interpolation => PipelineError::Interpolation {
            glyph: glyph.unwrap_or_default().to_string(),
            message,
        },
    }
}

fn unexpected(response: WorkerResponse) -> PipelineError {
    PipelineError::Protocol(format!("unexpected response: {response:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::engine_factory;
    use crate::engine::testing::ScriptedEngine;
    use crate::font_source::tests::sample_font;

    fn proxy_with(engine: ScriptedEngine, settings: EngineSettings) -> CompilerProxy {
        CompilerProxy::new(engine_factory(move || engine.clone()), settings)
    }

    fn font_json(family: &str) -> String {
        let mut font = sample_font();
        font.family_name = family.to_string();
        font.to_json().unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_initialize_starts_one_worker() {
        let engine = ScriptedEngine {
            init_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let counters = Arc::clone(&engine.counters);
        let proxy = proxy_with(engine, EngineSettings::default());

        let (first, second) = tokio::join!(proxy.initialize(), proxy.initialize());
        assert_eq!(first.unwrap(), "scripted 1.0");
        assert_eq!(second.unwrap(), "scripted 1.0");
        assert_eq!(counters.inits(), 1);

        proxy.initialize().await.unwrap();
        assert_eq!(counters.inits(), 1);
        assert!(proxy.is_ready());
    }

    #[tokio::test]
    async fn test_failed_initialization_persists_until_retry() {
        let engine = ScriptedEngine {
            init_error: Some("shared memory unavailable".to_string()),
            ..Default::default()
        };
        let counters = Arc::clone(&engine.counters);
        let proxy = proxy_with(engine, EngineSettings::default());

        let error = proxy.initialize().await.unwrap_err();
        assert_eq!(error, PipelineError::Initialization("shared memory unavailable".to_string()));
        assert!(matches!(proxy.status().state, SessionState::Failed { .. }));

        assert!(proxy.initialize().await.is_err());
        assert_eq!(counters.inits(), 1);

        assert!(matches!(
            proxy.compile(Some(font_json("X")), CompileOptions::default()).await,
            Err(PipelineError::Initialization(_))
        ));

        assert!(proxy.retry().await.is_err());
        assert_eq!(counters.inits(), 2);
    }

    #[tokio::test]
    async fn test_initialization_timeout() {
        let engine = ScriptedEngine {
            init_delay: Duration::from_millis(300),
            ..Default::default()
        };
        let proxy = proxy_with(
            engine,
            EngineSettings {
                init_timeout: Duration::from_millis(30),
                ..Default::default()
            },
        );

        match proxy.initialize().await {
            Err(PipelineError::Initialization(reason)) => assert!(reason.contains("did not respond")),
            other => panic!("expected initialization timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_requests_before_initialize_are_not_ready() {
        let proxy = proxy_with(ScriptedEngine::default(), EngineSettings::default());
        assert_eq!(
            proxy.compile(None, CompileOptions::default()).await.unwrap_err(),
            PipelineError::NotReady
        );
        assert_eq!(proxy.clear_cache().await.unwrap_err(), PipelineError::NotReady);
    }

    #[tokio::test]
    async fn test_interpolate_without_cached_font() {
        let engine = ScriptedEngine::default();
        let counters = Arc::clone(&engine.counters);
        let proxy = proxy_with(engine, EngineSettings::default());
        proxy.initialize().await.unwrap();

        let location = DesignLocation::new().with("wght", 50.0);
        assert_eq!(
            proxy.interpolate_glyph("A", &location).await.unwrap_err(),
            PipelineError::NoCachedFont
        );
        assert_eq!(counters.interpolations(), 0);

        proxy.store_font(font_json("Sample")).await.unwrap();
        let layer = proxy.interpolate_glyph("A", &location).await.unwrap();
        assert_eq!(layer.width, 50.0);

        proxy.clear_cache().await.unwrap();
        assert!(!proxy.status().font_cached);
    }

    #[tokio::test]
    async fn test_concurrent_compiles_are_routed_to_their_callers() {
        let engine = ScriptedEngine {
            compile_delay: Duration::from_millis(10),
            ..Default::default()
        };
        let proxy = proxy_with(engine, EngineSettings::default());
        proxy.initialize().await.unwrap();

        let (first, second, third) = tokio::join!(
            proxy.compile(Some(font_json("First")), CompileOptions::default()),
            proxy.compile(Some(font_json("Second")), CompileOptions::default()),
            proxy.compile(Some(font_json("Broken")), CompileOptions::default()),
        );
        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.bytes, b"First");
        assert_eq!(second.bytes, b"Second");
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(third.unwrap_err(), PipelineError::Compilation("malformed font data".to_string()));
        assert_eq!(proxy.status().in_flight, 0);
    }

    #[tokio::test]
    async fn test_compile_font_uses_cache() {
        let proxy = proxy_with(ScriptedEngine::default(), EngineSettings::default());
        proxy.initialize().await.unwrap();

        let output = proxy.compile_font(font_json("Cached"), CompileOptions::default()).await.unwrap();
        assert_eq!(output.bytes, b"Cached");
        assert!(proxy.status().font_cached);

        // Invalid JSON cannot be cached; it is sent inline and the engine reports it
        let error = proxy
            .compile_font("{broken".to_string(), CompileOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, PipelineError::Protocol(_)));
        assert!(!proxy.status().font_cached);
    }

    #[tokio::test]
    async fn test_request_timeout_marks_session_suspect() {
        let engine = ScriptedEngine {
            compile_delay: Duration::from_millis(300),
            ..Default::default()
        };
        let proxy = proxy_with(
            engine,
            EngineSettings {
                compile_timeout: Duration::from_millis(30),
                ..Default::default()
            },
        );
        proxy.initialize().await.unwrap();

        let error = proxy
            .compile(Some(font_json("Slow")), CompileOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, PipelineError::Timeout { operation: "compile", .. }));
        let status = proxy.status();
        assert!(status.suspect);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn test_teardown_returns_to_uninitialized() {
        let engine = ScriptedEngine::default();
        let counters = Arc::clone(&engine.counters);
        let proxy = proxy_with(engine, EngineSettings::default());
        proxy.initialize().await.unwrap();

        proxy.teardown();
        assert_eq!(proxy.status().state, SessionState::Uninitialized);
        assert_eq!(
            proxy.compile(None, CompileOptions::default()).await.unwrap_err(),
            PipelineError::NotReady
        );

        proxy.initialize().await.unwrap();
        assert_eq!(counters.inits(), 2);
    }

    #[tokio::test]
    async fn test_worker_crash_fails_session_until_retry() {
        let engine = ScriptedEngine {
            compile_delay: Duration::from_millis(200),
            ..Default::default()
        };
        let counters = Arc::clone(&engine.counters);
        let proxy = proxy_with(engine, EngineSettings::default());
        proxy.initialize().await.unwrap();
        proxy.store_font(font_json("Sample")).await.unwrap();

        let crashing = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.compile(Some(font_json("Crash")), CompileOptions::default()).await }
        });
        while proxy.status().in_flight == 0 {
            tokio::task::yield_now().await;
        }
        // Queued behind the compile that takes the worker down
        let location = DesignLocation::new().with("wght", 10.0);
        let queued = proxy.interpolate_glyph("A", &location).await;

        assert_eq!(crashing.await.unwrap().unwrap_err(), PipelineError::WorkerGone);
        assert_eq!(queued.unwrap_err(), PipelineError::WorkerGone);

        let status = proxy.status();
        assert!(matches!(status.state, SessionState::Failed { ref reason } if reason.contains("exited")));
        assert!(!status.font_cached);
        assert_eq!(status.in_flight, 0);
        assert!(matches!(
            proxy.compile(None, CompileOptions::default()).await,
            Err(PipelineError::Initialization(_))
        ));

        proxy.retry().await.unwrap();
        assert!(proxy.is_ready());
        assert_eq!(counters.inits(), 2);
        let output = proxy
            .compile(Some(font_json("Recovered")), CompileOptions::default())
            .await
            .unwrap();
        assert_eq!(output.bytes, b"Recovered");
    }

    #[tokio::test]
    async fn test_teardown_during_initialization() {
        let engine = ScriptedEngine {
            init_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let counters = Arc::clone(&engine.counters);
        let proxy = proxy_with(engine, EngineSettings::default());

        let starting = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.initialize().await }
        });
        while proxy.status().state != SessionState::Initializing {
            tokio::task::yield_now().await;
        }
        proxy.teardown();
        assert_eq!(proxy.status().state, SessionState::Uninitialized);

        match starting.await.unwrap() {
            Err(PipelineError::Initialization(reason)) => assert!(reason.contains("torn down")),
            other => panic!("expected an abandoned start-up, got {other:?}"),
        }
        // The late handshake is not installed
        assert_eq!(proxy.status().state, SessionState::Uninitialized);

        proxy.initialize().await.unwrap();
        assert!(proxy.is_ready());
        assert_eq!(counters.inits(), 2);
    }

    #[tokio::test]
    async fn test_request_ids_are_never_reused() {
        let proxy = proxy_with(ScriptedEngine::default(), EngineSettings::default());
        proxy.initialize().await.unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..5 {
            let output = proxy
                .compile(Some(font_json("Ids")), CompileOptions::default())
                .await
                .unwrap();
            assert!(seen.insert(output.request_id));
        }
    }
}
