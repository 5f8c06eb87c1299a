//! fontlive
pub mod core;
pub mod data;
pub mod engine;
pub mod font_source;
pub mod logging;
pub mod pipeline;
