//! Auto-compile debouncer
//!
//! Every edit calls [`AutoCompiler::notify_change`]. A compile of the
//! current font with the `editing` target runs once no notification has
//! arrived for the quiet period, and only if the font is still dirty then.

use super::compilation::{CompilationQueue, CompileBackend};
use super::document::{DirtyFlag, DocumentRegistry};
use super::targets::Target;
use crate::core::errors::PipelineError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one auto-compile, reported to the document layer
#[derive(Debug)]
pub enum AutoCompileEvent {
    Compiled {
        document_id: String,
        revision: u64,
        bytes: Vec<u8>,
        duration: Duration,
        /// False when the document was edited during the compile
        cleaned: bool,
    },
    Failed {
        document_id: String,
        error: PipelineError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoCompileStatus {
    pub enabled: bool,
    pub pending: bool,
    /// Compiles started by the debouncer so far
    pub triggers: u64,
}

struct DebounceState {
    enabled: bool,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    triggers: u64,
}

struct Inner<B> {
    queue: CompilationQueue<B>,
    documents: DocumentRegistry,
    delay: Duration,
    events: mpsc::UnboundedSender<AutoCompileEvent>,
    state: Mutex<DebounceState>,
}

/// Dropping the compiler cancels a scheduled compile. A compile that has
/// already started runs to completion.
pub struct AutoCompiler<B: CompileBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: CompileBackend> AutoCompiler<B> {
    pub fn new(
        queue: CompilationQueue<B>,
        documents: DocumentRegistry,
        delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<AutoCompileEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            queue,
            documents,
            delay,
            events,
            state: Mutex::new(DebounceState {
                enabled: true,
                generation: 0,
                pending: None,
                triggers: 0,
            }),
        });
        (Self { inner }, receiver)
    }

    /// Restart the quiet period. Must be called within a tokio runtime.
    pub fn notify_change(&self) {
        let mut state = self.inner.state();
        if !state.enabled {
            return;
        }
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let inner = Arc::downgrade(&self.inner);
        let delay = self.inner.delay;
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Inner::fire(inner, generation).await;
        }));
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.inner.state();
        state.enabled = enabled;
        if !enabled {
            state.generation += 1;
            if let Some(pending) = state.pending.take() {
                pending.abort();
                debug!("Auto-compile disabled, dropped scheduled compile");
            }
        }
    }

    pub fn status(&self) -> AutoCompileStatus {
        let state = self.inner.state();
        AutoCompileStatus {
            enabled: state.enabled,
            pending: state.pending.is_some(),
            triggers: state.triggers,
        }
    }
}

impl<B: CompileBackend> Drop for AutoCompiler<B> {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.state().pending.take() {
            pending.abort();
        }
    }
}

impl<B: CompileBackend> Inner<B> {
    fn state(&self) -> MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fire(inner: Weak<Self>, generation: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        {
            let mut state = inner.state();
            if state.generation != generation || !state.enabled {
                return;
            }
            // From here on a new notification schedules a separate compile
            // instead of aborting this one
            state.pending = None;
        }

        let Some(document) = inner.documents.current_font() else {
            debug!("Auto-compile fired with no current font");
            return;
        };
        if !document.is_dirty(DirtyFlag::Compile) {
            debug!("Auto-compile skipped, '{}' is clean", document.id());
            return;
        }

        inner.state().triggers += 1;
        let document_id = document.id().to_string();
        let result = match document.snapshot_json() {
            Ok((revision, json)) => inner
                .queue
                .compile_target(json, Target::Editing, None)
                .await
                .map(|output| (revision, output)),
            Err(error) => Err(error),
        };

        let event = match result {
            Ok((revision, output)) => {
                let cleaned = document.mark_clean_at(DirtyFlag::Compile, revision);
                info!("Auto-compiled '{}' in {:?}", document_id, output.duration);
                AutoCompileEvent::Compiled {
                    document_id,
                    revision,
                    bytes: output.bytes,
                    duration: output.duration,
                    cleaned,
                }
            }
            Err(error) => {
                warn!("Auto-compile of '{}' failed: {}", document_id, error);
                AutoCompileEvent::Failed { document_id, error }
            }
        };
        let _ = inner.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::PipelineResult;
    use crate::engine::{CompileOptions, CompileOutput};
    use crate::font_source::tests::sample_font;
    use crate::pipeline::document::FontDocument;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    const DELAY: Duration = Duration::from_secs(1);

    #[derive(Clone, Default)]
    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        fired_at: Arc<Mutex<Vec<Instant>>>,
        seen_options: Arc<Mutex<Vec<CompileOptions>>>,
        compile_time: Duration,
        fail: bool,
    }

    impl CompileBackend for CountingBackend {
        fn compile_font(
            &self,
            json: String,
            options: CompileOptions,
        ) -> impl Future<Output = PipelineResult<CompileOutput>> + Send {
            let backend = self.clone();
            async move {
                backend.calls.fetch_add(1, Ordering::SeqCst);
                backend.fired_at.lock().unwrap().push(Instant::now());
                backend.seen_options.lock().unwrap().push(options);
                tokio::time::sleep(backend.compile_time).await;
                if backend.fail {
                    return Err(PipelineError::Compilation("broken".to_string()));
                }
                Ok(CompileOutput {
                    request_id: 1,
                    bytes: json.into_bytes(),
                    duration: backend.compile_time,
                })
            }
        }
    }

    fn setup(
        backend: CountingBackend,
    ) -> (
        AutoCompiler<CountingBackend>,
        mpsc::UnboundedReceiver<AutoCompileEvent>,
        Arc<FontDocument>,
    ) {
        let documents = DocumentRegistry::new();
        let document = documents.open(FontDocument::new("sample", sample_font()));
        let (compiler, events) = AutoCompiler::new(CompilationQueue::new(backend), documents, DELAY);
        (compiler, events, document)
    }

    fn touch(document: &FontDocument) {
        document.edit(|font| font.units_per_em += 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_compile() {
        let backend = CountingBackend::default();
        let (compiler, mut events, document) = setup(backend.clone());

        let mut last_notify = Instant::now();
        for _ in 0..5 {
            touch(&document);
            compiler.notify_change();
            last_notify = Instant::now();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        let fired = backend.fired_at.lock().unwrap()[0];
        assert!(fired >= last_notify + DELAY);

        match events.recv().await {
            Some(AutoCompileEvent::Compiled { cleaned, .. }) => assert!(cleaned),
            other => panic!("expected a compile event, got {other:?}"),
        }
        assert!(!document.is_dirty(DirtyFlag::Compile));
        // Compiled, but still unsaved
        assert!(document.is_dirty(DirtyFlag::File));
        assert_eq!(compiler.status().triggers, 1);
        assert!(backend.seen_options.lock().unwrap()[0].dont_use_production_names);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_scheduled_compile() {
        let backend = CountingBackend::default();
        let (compiler, _events, document) = setup(backend.clone());

        touch(&document);
        compiler.notify_change();
        assert!(compiler.status().pending);
        compiler.set_enabled(false);
        assert!(!compiler.status().pending);

        compiler.notify_change();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(document.is_dirty(DirtyFlag::Compile));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_document_is_not_compiled() {
        let backend = CountingBackend::default();
        let (compiler, _events, _document) = setup(backend.clone());

        compiler.notify_change();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(compiler.status().triggers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_compile_keeps_document_dirty() {
        let backend = CountingBackend {
            compile_time: Duration::from_secs(3),
            ..Default::default()
        };
        let (compiler, mut events, document) = setup(backend.clone());

        touch(&document);
        compiler.notify_change();
        tokio::time::sleep(DELAY + Duration::from_millis(500)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // Lands while the compile is running
        touch(&document);

        match events.recv().await {
            Some(AutoCompileEvent::Compiled { cleaned, .. }) => assert!(!cleaned),
            other => panic!("expected a compile event, got {other:?}"),
        }
        assert!(document.is_dirty(DirtyFlag::Compile));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_compile_leaves_flag_set() {
        let backend = CountingBackend {
            fail: true,
            ..Default::default()
        };
        let (compiler, mut events, document) = setup(backend);

        touch(&document);
        compiler.notify_change();
        match events.recv().await {
            Some(AutoCompileEvent::Failed { error, .. }) => {
                assert_eq!(error, PipelineError::Compilation("broken".to_string()))
            }
            other => panic!("expected a failure event, got {other:?}"),
        }
        assert!(document.is_dirty(DirtyFlag::Compile));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_scheduled_compile() {
        let backend = CountingBackend::default();
        let (compiler, _events, document) = setup(backend.clone());

        touch(&document);
        compiler.notify_change();
        drop(compiler);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
