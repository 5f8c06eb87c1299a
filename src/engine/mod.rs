//! Compiler engine: the background compute unit and its proxy
//!
//! The engine runs on a dedicated thread and owns the actual compiler. The
//! rest of the application only talks to it through [`CompilerProxy`], which
//! multiplexes async requests over the worker's single message channel.

pub mod fontc;
pub mod protocol;
pub mod proxy;
pub mod variation;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

use crate::font_source::{DesignLocation, FontSource, LayerData};
use std::sync::Arc;

pub use fontc::FontcEngine;
pub use protocol::{CompileOptions, EngineErrorKind, RequestId, WorkerRequest, WorkerResponse};
pub use proxy::{CompileOutput, CompilerProxy, EngineSettings, ProxyStatus, SessionState};

/// The compiler capability driven by the worker thread.
///
/// Methods run on the worker thread and may block; the worker handles one
/// request at a time. Errors are plain messages, classified by the worker.
pub trait CompilerEngine: Send + 'static {
    /// Human-readable engine version, reported in the ready handshake
    fn version(&self) -> String;

    /// Check for everything the engine needs before accepting work
    fn check_capabilities(&mut self) -> Result<(), String>;

    fn compile(&mut self, font: &FontSource, options: &CompileOptions) -> Result<Vec<u8>, String>;

    fn interpolate(
        &mut self,
        font: &FontSource,
        glyph_name: &str,
        location: &DesignLocation,
    ) -> Result<LayerData, String>;
}

/// Creates a fresh engine for every worker start.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn CompilerEngine> + Send + Sync>;

/// Wrap a constructor closure as an [`EngineFactory`].
pub fn engine_factory<F, E>(make: F) -> EngineFactory
where
    F: Fn() -> E + Send + Sync + 'static,
    E: CompilerEngine,
{
    Arc::new(move || Box::new(make()) as Box<dyn CompilerEngine>)
}
