//! Compilation request queue
//!
//! Compile requests are independent: none supersedes another, and each
//! resolves with its own output. Target names are checked before anything
//! reaches the compute unit.

use super::targets::Target;
use crate::core::errors::PipelineResult;
use crate::engine::{CompileOptions, CompileOutput, CompilerProxy};
use std::future::Future;
use tracing::{debug, info};

/// Something that compiles serialized fonts.
pub trait CompileBackend: Send + Sync + 'static {
    fn compile_font(
        &self,
        json: String,
        options: CompileOptions,
    ) -> impl Future<Output = PipelineResult<CompileOutput>> + Send;
}

impl CompileBackend for CompilerProxy {
    fn compile_font(
        &self,
        json: String,
        options: CompileOptions,
    ) -> impl Future<Output = PipelineResult<CompileOutput>> + Send {
        CompilerProxy::compile_font(self, json, options)
    }
}

#[derive(Clone)]
pub struct CompilationQueue<B = CompilerProxy> {
    backend: B,
}

impl<B: CompileBackend> CompilationQueue<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Compile `font_json` for the named target.
    ///
    /// Fails with `UnknownTarget` without contacting the engine when the
    /// name is not one of [`Target::all_names`].
    pub async fn compile(
        &self,
        font_json: String,
        target: &str,
        subset: Option<Vec<String>>,
    ) -> PipelineResult<CompileOutput> {
        let target: Target = target.parse()?;
        self.compile_target(font_json, target, subset).await
    }

    pub async fn compile_target(
        &self,
        font_json: String,
        target: Target,
        subset: Option<Vec<String>>,
    ) -> PipelineResult<CompileOutput> {
        if let Some(glyphs) = &subset {
            debug!("Compiling {} glyph subset for target {}", glyphs.len(), target);
        }
        let output = self
            .backend
            .compile_font(font_json, target.options(subset))
            .await?;
        info!(
            "Compiled target {} in {:?} ({} bytes)",
            target,
            output.duration,
            output.bytes.len()
        );
        Ok(output)
    }
}
