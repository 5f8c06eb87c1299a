//! Orchestration between the editor and the compiler engine
//!
//! - Interpolation requests with per-glyph supersession
//! - Independent compile requests for named targets
//! - Debounced auto-compile of the current font
//! - Open documents and their dirty flags

pub mod compilation;
pub mod debounce;
pub mod document;
pub mod interpolation;
pub mod targets;

pub use compilation::{CompilationQueue, CompileBackend};
pub use debounce::{AutoCompileEvent, AutoCompileStatus, AutoCompiler};
pub use document::{DirtyFlag, DocumentRegistry, FontDocument};
pub use interpolation::InterpolationManager;
pub use targets::Target;
