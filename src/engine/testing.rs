//! In-process engine for tests
//!
//! Answers without fontc. Compiling returns the family name as bytes and
//! interpolation returns a layer whose width encodes the requested location,
//! so tests can check which request a result belongs to.

use super::{CompileOptions, CompilerEngine};
use crate::font_source::{DesignLocation, FontSource, LayerData};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct EngineCounters {
    pub inits: AtomicUsize,
    pub compiles: AtomicUsize,
    pub interpolations: AtomicUsize,
}

impl EngineCounters {
    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn interpolations(&self) -> usize {
        self.interpolations.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct ScriptedEngine {
    pub counters: Arc<EngineCounters>,
    pub init_error: Option<String>,
    pub init_delay: Duration,
    pub compile_delay: Duration,
    /// Per-glyph interpolation delay
    pub glyph_delays: Arc<Mutex<HashMap<String, Duration>>>,
    pub failing_glyphs: Vec<String>,
    /// Options seen by each compile call, in order
    pub seen_options: Arc<Mutex<Vec<CompileOptions>>>,
}

impl ScriptedEngine {
    pub fn delay_glyph(&self, glyph: &str, delay: Duration) {
        if let Ok(mut delays) = self.glyph_delays.lock() {
            delays.insert(glyph.to_string(), delay);
        }
    }
}

impl CompilerEngine for ScriptedEngine {
    fn version(&self) -> String {
        "scripted 1.0".to_string()
    }

    fn check_capabilities(&mut self) -> Result<(), String> {
        self.counters.inits.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.init_delay);
        match &self.init_error {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    fn compile(&mut self, font: &FontSource, options: &CompileOptions) -> Result<Vec<u8>, String> {
        self.counters.compiles.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_options.lock() {
            seen.push(options.clone());
        }
        std::thread::sleep(self.compile_delay);
        if font.family_name == "Crash" {
            panic!("scripted engine crashed while compiling");
        }
        if font.family_name == "Broken" {
            return Err("malformed font data".to_string());
        }
        Ok(font.family_name.as_bytes().to_vec())
    }

    fn interpolate(
        &mut self,
        font: &FontSource,
        glyph_name: &str,
        location: &DesignLocation,
    ) -> Result<LayerData, String> {
        self.counters.interpolations.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .glyph_delays
            .lock()
            .ok()
            .and_then(|delays| delays.get(glyph_name).copied());
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.failing_glyphs.iter().any(|g| g == glyph_name) || font.glyph(glyph_name).is_none() {
            return Err(format!("glyph '{glyph_name}' cannot be interpolated"));
        }

        let width = location.iter().map(|(_, value)| value).sum::<f64>();
        Ok(LayerData {
            width,
            anchors: vec![crate::font_source::Anchor {
                name: glyph_name.to_string(),
                x: 0.0,
                y: 0.0,
            }],
            ..Default::default()
        })
    }
}
