//! Interpolation request manager
//!
//! Live preview asks for the same glyph many times a second while an axis
//! slider moves. Only the newest request per glyph is live: starting a new
//! one cancels the previous, and an answer that arrives for a superseded
//! request is discarded instead of returned.

use crate::core::errors::{PipelineError, PipelineResult};
use crate::engine::CompilerProxy;
use crate::font_source::axes::user_location_to_designspace;
use crate::font_source::{DesignLocation, LayerData, UserLocation};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// The live request for one glyph
struct Slot {
    generation: u64,
    cancel: oneshot::Sender<()>,
}

#[derive(Clone)]
pub struct InterpolationManager {
    proxy: CompilerProxy,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    next_generation: Arc<AtomicU64>,
}

impl InterpolationManager {
    pub fn new(proxy: CompilerProxy) -> Self {
        Self {
            proxy,
            slots: Arc::default(),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Id of the live request for `glyph`, if any.
    pub fn current_request(&self, glyph: &str) -> Option<u64> {
        self.slots().get(glyph).map(|slot| slot.generation)
    }

    pub fn pending_count(&self) -> usize {
        self.slots().len()
    }

    /// Interpolate `glyph` at a designspace location.
    ///
    /// Resolves with [`PipelineError::Cancelled`] when a newer request for
    /// the same glyph starts before this one finishes.
    pub async fn request_interpolation(
        &self,
        glyph: &str,
        location: &DesignLocation,
    ) -> PipelineResult<LayerData> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (cancel, mut cancelled) = oneshot::channel();

        let previous = self.slots().insert(glyph.to_string(), Slot { generation, cancel });
        if let Some(previous) = previous {
            debug!(
                "Request {} for '{}' supersedes request {}",
                generation, glyph, previous.generation
            );
            let _ = previous.cancel.send(());
        }
        let _slot = SlotGuard {
            manager: self,
            glyph,
            generation,
        };

        let result = tokio::select! {
            biased;
            _ = &mut cancelled => return Err(PipelineError::Cancelled { glyph: glyph.to_string() }),
            result = self.proxy.interpolate_glyph(glyph, location) => result,
        };

        if self.current_request(glyph) != Some(generation) {
            debug!("Discarding stale result {} for '{}'", generation, glyph);
            return Err(PipelineError::Cancelled {
                glyph: glyph.to_string(),
            });
        }
        result
    }

    /// Like [`request_interpolation`](Self::request_interpolation), taking a
    /// userspace location. It is converted with the axes of the font the
    /// engine holds; axes missing from `location` use their defaults.
    pub async fn request_user_location(
        &self,
        glyph: &str,
        location: &UserLocation,
    ) -> PipelineResult<LayerData> {
        let Some(axes) = self.proxy.cached_axes() else {
            return Err(if self.proxy.is_ready() {
                PipelineError::NoCachedFont
            } else {
                PipelineError::NotReady
            });
        };
        let design = user_location_to_designspace(location, &axes);
        self.request_interpolation(glyph, &design).await
    }

    /// Interpolate several glyphs concurrently.
    ///
    /// Glyphs that fail or are superseded are left out of the result.
    pub async fn interpolate_glyphs(
        &self,
        glyphs: &[String],
        location: &DesignLocation,
    ) -> BTreeMap<String, LayerData> {
        let mut tasks = JoinSet::new();
        for glyph in glyphs {
            let manager = self.clone();
            let glyph = glyph.clone();
            let location = location.clone();
            tasks.spawn(async move {
                let result = manager.request_interpolation(&glyph, &location).await;
                (glyph, result)
            });
        }

        let mut layers = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((glyph, Ok(layer))) => {
                    layers.insert(glyph, layer);
                }
                Ok((glyph, Err(error))) if error.is_cancelled() => {
                    debug!("Interpolation of '{}' was superseded", glyph)
                }
                Ok((glyph, Err(error))) => warn!("Interpolation of '{}' failed: {}", glyph, error),
                Err(e) => warn!("Interpolation task failed: {}", e),
            }
        }
        layers
    }

    /// Cancel every live request.
    pub fn cancel_all(&self) {
        let slots: Vec<(String, Slot)> = self.slots().drain().collect();
        for (glyph, slot) in slots {
            debug!("Cancelling request {} for '{}'", slot.generation, glyph);
            let _ = slot.cancel.send(());
        }
    }
}

/// Returns the glyph to idle when its live request ends, however it ends.
struct SlotGuard<'a> {
    manager: &'a InterpolationManager,
    glyph: &'a str,
    generation: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.manager.slots();
        if slots.get(self.glyph).map(|slot| slot.generation) == Some(self.generation) {
            slots.remove(self.glyph);
        }
    }
}
