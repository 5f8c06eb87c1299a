//! The compute unit thread
//!
//! Receives [`WorkerRequest`]s one at a time, runs them against the engine
//! and answers on the response channel. Holds the cached font.

use super::protocol::{EngineErrorKind, RequestId, WorkerRequest, WorkerResponse};
use super::CompilerEngine;
use crate::font_source::{DesignLocation, FontSource};
use std::io;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Owning handle to the detached worker thread.
///
/// Dropping the handle asks the worker to stop; the thread exits after the
/// request it is currently running.
pub(crate) struct WorkerHandle {
    requests: mpsc::UnboundedSender<WorkerRequest>,
}

impl WorkerHandle {
    pub fn send(&self, request: WorkerRequest) -> Result<(), WorkerRequest> {
        self.requests.send(request).map_err(|error| error.0)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
    }
}

pub(crate) fn spawn_worker(
    engine: Box<dyn CompilerEngine>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) -> io::Result<WorkerHandle> {
    let (requests, inbox) = mpsc::unbounded_channel();
    // Not joined: a compile can run for minutes and nothing awaits the thread
    std::thread::Builder::new()
        .name("compiler-engine".to_string())
        .spawn(move || Worker::new(engine, responses).run(inbox))?;

    Ok(WorkerHandle { requests })
}

struct Worker {
    engine: Box<dyn CompilerEngine>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
    cached_font: Option<FontSource>,
}

impl Worker {
    fn new(engine: Box<dyn CompilerEngine>, responses: mpsc::UnboundedSender<WorkerResponse>) -> Self {
        Self {
            engine,
            responses,
            cached_font: None,
        }
    }

    fn run(mut self, mut inbox: mpsc::UnboundedReceiver<WorkerRequest>) {
        while let Some(request) = inbox.blocking_recv() {
            debug!("Worker handling {} request {:?}", request.kind(), request.id());
            let response = match request {
                WorkerRequest::Shutdown => break,
                WorkerRequest::Init => self.init(),
                WorkerRequest::StoreFont { id, json } => self.store_font(id, &json),
                WorkerRequest::Compile { id, json, options } => {
                    self.compile(id, json.as_deref(), &options)
                }
                WorkerRequest::Interpolate {
                    id,
                    glyph_name,
                    location_json,
                } => self.interpolate(id, &glyph_name, &location_json),
                WorkerRequest::ClearCache { id } => {
                    self.cached_font = None;
                    WorkerResponse::Cleared { id }
                }
            };

            if self.responses.send(response).is_err() {
                warn!("Response channel closed, stopping compiler worker");
                break;
            }
        }
        info!("Compiler worker stopped");
    }

    fn init(&mut self) -> WorkerResponse {
        match self.engine.check_capabilities() {
            Ok(()) => WorkerResponse::Ready {
                version: self.engine.version(),
            },
            Err(message) => error(None, EngineErrorKind::Initialization, message),
        }
    }

    fn store_font(&mut self, id: RequestId, json: &str) -> WorkerResponse {
        match FontSource::from_json(json) {
            Ok(font) => {
                debug!("Cached font '{}' ({} glyphs)", font.family_name, font.glyphs.len());
                self.cached_font = Some(font);
                WorkerResponse::Stored { id }
            }
            Err(e) => {
                // A failed store must not leave an older font answering for this one
                self.cached_font = None;
                error(Some(id), EngineErrorKind::Protocol, format!("Font JSON parse error: {e}"))
            }
        }
    }

    fn compile(
        &mut self,
        id: RequestId,
        json: Option<&str>,
        options: &super::CompileOptions,
    ) -> WorkerResponse {
        let parsed;
        let font = match json {
            Some(json) => match FontSource::from_json(json) {
                Ok(font) => {
                    parsed = font;
                    &parsed
                }
                Err(e) => {
                    return error(Some(id), EngineErrorKind::Protocol, format!("Font JSON parse error: {e}"))
                }
            },
            None => match &self.cached_font {
                Some(font) => font,
                None => return error(Some(id), EngineErrorKind::NoCachedFont, "No font cached".to_string()),
            },
        };

        let started = Instant::now();
        match self.engine.compile(font, options) {
            Ok(bytes) => WorkerResponse::Compiled {
                id,
                bytes,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(message) => error(Some(id), EngineErrorKind::Compilation, message),
        }
    }

    fn interpolate(&mut self, id: RequestId, glyph_name: &str, location_json: &str) -> WorkerResponse {
        let Some(font) = &self.cached_font else {
            return error(Some(id), EngineErrorKind::NoCachedFont, "No font cached".to_string());
        };

        let location: DesignLocation = match serde_json::from_str(location_json) {
            Ok(location) => location,
            Err(e) => return error(Some(id), EngineErrorKind::Protocol, format!("Location JSON parse error: {e}")),
        };

        let layer = match self.engine.interpolate(font, glyph_name, &location) {
            Ok(layer) => layer,
            Err(message) => return error(Some(id), EngineErrorKind::Interpolation, message),
        };

        match serde_json::to_string(&layer) {
            Ok(result_json) => WorkerResponse::Interpolated { id, result_json },
            Err(e) => error(Some(id), EngineErrorKind::Protocol, e.to_string()),
        }
    }
}

fn error(id: Option<RequestId>, kind: EngineErrorKind, message: String) -> WorkerResponse {
    WorkerResponse::Error { id, kind, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedEngine;
    use crate::font_source::tests::sample_font;

    fn start() -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_worker(Box::new(ScriptedEngine::default()), tx).unwrap();
        (handle, rx)
    }

    #[test]
    fn test_handshake_and_cache() {
        let (worker, mut responses) = start();

        worker.send(WorkerRequest::Init).unwrap();
        assert!(matches!(responses.blocking_recv(), Some(WorkerResponse::Ready { .. })));

        worker
            .send(WorkerRequest::Interpolate {
                id: 1,
                glyph_name: "A".to_string(),
                location_json: "{}".to_string(),
            })
            .unwrap();
        assert!(matches!(
            responses.blocking_recv(),
            Some(WorkerResponse::Error {
                id: Some(1),
                kind: EngineErrorKind::NoCachedFont,
                ..
            })
        ));

        worker
            .send(WorkerRequest::StoreFont {
                id: 2,
                json: sample_font().to_json().unwrap(),
            })
            .unwrap();
        assert_eq!(responses.blocking_recv(), Some(WorkerResponse::Stored { id: 2 }));

        worker
            .send(WorkerRequest::Compile {
                id: 3,
                json: None,
                options: Default::default(),
            })
            .unwrap();
        assert!(matches!(responses.blocking_recv(), Some(WorkerResponse::Compiled { id: 3, .. })));

        worker.send(WorkerRequest::ClearCache { id: 4 }).unwrap();
        assert_eq!(responses.blocking_recv(), Some(WorkerResponse::Cleared { id: 4 }));

        worker
            .send(WorkerRequest::Compile {
                id: 5,
                json: None,
                options: Default::default(),
            })
            .unwrap();
        assert!(matches!(
            responses.blocking_recv(),
            Some(WorkerResponse::Error {
                id: Some(5),
                kind: EngineErrorKind::NoCachedFont,
                ..
            })
        ));
    }

    #[test]
    fn test_bad_store_clears_cache() {
        let (worker, mut responses) = start();
        worker
            .send(WorkerRequest::StoreFont {
                id: 1,
                json: sample_font().to_json().unwrap(),
            })
            .unwrap();
        assert_eq!(responses.blocking_recv(), Some(WorkerResponse::Stored { id: 1 }));

        worker
            .send(WorkerRequest::StoreFont {
                id: 2,
                json: "{not json".to_string(),
            })
            .unwrap();
        assert!(matches!(
            responses.blocking_recv(),
            Some(WorkerResponse::Error {
                kind: EngineErrorKind::Protocol,
                ..
            })
        ));

        worker.send(WorkerRequest::Compile { id: 3, json: None, options: Default::default() }).unwrap();
        assert!(matches!(
            responses.blocking_recv(),
            Some(WorkerResponse::Error {
                kind: EngineErrorKind::NoCachedFont,
                ..
            })
        ));
    }

    #[test]
    fn test_shutdown_stops_thread() {
        let (worker, mut responses) = start();
        worker.send(WorkerRequest::Shutdown).unwrap();
        assert_eq!(responses.blocking_recv(), None);
    }

    #[test]
    fn test_dropping_handle_stops_thread() {
        let (worker, mut responses) = start();
        worker.send(WorkerRequest::Init).unwrap();
        drop(worker);

        // The queued request still runs before the shutdown
        assert!(matches!(responses.blocking_recv(), Some(WorkerResponse::Ready { .. })));
        assert_eq!(responses.blocking_recv(), None);
    }
}
