//! Open font documents
//!
//! A [`FontDocument`] pairs a font with an edit revision and two dirty
//! flags: [`DirtyFlag::Compile`] is cleared by a finished compile and
//! [`DirtyFlag::File`] by a save. Each flag remembers the revision it was
//! last cleared at, so a compile or save only cleans the document when no
//! edit happened while it was running.

use crate::core::errors::PipelineResult;
use crate::data::ufo::{master_to_norad, ExportParts};
use crate::font_source::FontSource;
use anyhow::{bail, Context};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};

/// What a document can be out of date with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyFlag {
    /// The last compiled font
    Compile,
    /// The file on disk
    File,
}

pub struct FontDocument {
    id: String,
    path: Mutex<Option<PathBuf>>,
    font: RwLock<FontSource>,
    revision: AtomicU64,
    compiled_at: AtomicU64,
    saved_at: AtomicU64,
}

impl FontDocument {
    pub fn new(id: impl Into<String>, font: FontSource) -> Self {
        Self {
            id: id.into(),
            path: Mutex::new(None),
            font: RwLock::new(font),
            revision: AtomicU64::new(0),
            compiled_at: AtomicU64::new(0),
            saved_at: AtomicU64::new(0),
        }
    }

    pub fn with_path(self, path: PathBuf) -> Self {
        *self.path.lock().unwrap_or_else(PoisonError::into_inner) = Some(path);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.path.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn mark(&self, flag: DirtyFlag) -> &AtomicU64 {
        match flag {
            DirtyFlag::Compile => &self.compiled_at,
            DirtyFlag::File => &self.saved_at,
        }
    }

    pub fn is_dirty(&self, flag: DirtyFlag) -> bool {
        self.mark(flag).load(Ordering::SeqCst) != self.revision()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Apply an edit; marks the document dirty for both compile and file.
    pub fn edit<R>(&self, f: impl FnOnce(&mut FontSource) -> R) -> R {
        let mut font = self.font.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut font);
        self.revision.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Swap in a font read back from the document's file. Needs compiling,
    /// but matches what is on disk.
    pub fn reload(&self, font: FontSource) {
        let mut current = self.font.write().unwrap_or_else(PoisonError::into_inner);
        *current = font;
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.saved_at.store(revision, Ordering::SeqCst);
    }

    pub fn read<R>(&self, f: impl FnOnce(&FontSource) -> R) -> R {
        let font = self.font.read().unwrap_or_else(PoisonError::into_inner);
        f(&font)
    }

    /// Serialize the current font together with the revision it reflects.
    pub fn snapshot_json(&self) -> PipelineResult<(u64, String)> {
        let font = self.font.read().unwrap_or_else(PoisonError::into_inner);
        let revision = self.revision();
        Ok((revision, font.to_json()?))
    }

    /// Clear `flag` if the document is still at `revision`.
    ///
    /// Returns whether the flag was cleared.
    pub fn mark_clean_at(&self, flag: DirtyFlag, revision: u64) -> bool {
        // The write lock orders this against concurrent edits
        let _font = self.font.write().unwrap_or_else(PoisonError::into_inner);
        if self.revision() != revision {
            debug!("Document '{}' changed since revision {}, staying dirty", self.id, revision);
            return false;
        }
        self.mark(flag).store(revision, Ordering::SeqCst);
        true
    }

    /// Write the font to the document's path.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = self
            .path()
            .with_context(|| format!("Document '{}' has no file to save to", self.id))?;
        self.save_as(&path)?;
        Ok(path)
    }

    /// Write the font to `path` and make it the document's file.
    ///
    /// `.ufo` paths take single-master fonts; anything else is written as
    /// JSON. Clears [`DirtyFlag::File`] unless the font was edited while
    /// being written.
    pub fn save_as(&self, path: &Path) -> anyhow::Result<()> {
        let revision = {
            let font = self.font.read().unwrap_or_else(PoisonError::into_inner);
            write_font(&font, path)?;
            self.revision()
        };

        *self.path.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
        self.mark_clean_at(DirtyFlag::File, revision);
        info!("Saved '{}' to {}", self.id, path.display());
        Ok(())
    }
}

fn write_font(font: &FontSource, path: &Path) -> anyhow::Result<()> {
    let is_ufo = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("ufo"))
        .unwrap_or(false);
    if is_ufo {
        let [master] = font.masters.as_slice() else {
            bail!(
                "Cannot save {} masters as a single UFO at {}",
                font.masters.len(),
                path.display()
            );
        };
        let ufo = master_to_norad(font, master, ExportParts::default())?;
        ufo.save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let json = serde_json::to_string_pretty(font)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

#[derive(Default)]
struct Registry {
    documents: BTreeMap<String, Arc<FontDocument>>,
    current: Option<String>,
}

/// The fonts open in the editor and which one is current.
#[derive(Clone, Default)]
pub struct DocumentRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a document. The first open document becomes current.
    pub fn open(&self, document: FontDocument) -> Arc<FontDocument> {
        let document = Arc::new(document);
        let mut registry = self.lock();
        let id = document.id().to_string();
        if registry.current.is_none() {
            registry.current = Some(id.clone());
        }
        registry.documents.insert(id.clone(), Arc::clone(&document));
        info!("Opened font document '{}'", id);
        document
    }

    pub fn get(&self, id: &str) -> Option<Arc<FontDocument>> {
        self.lock().documents.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().documents.keys().cloned().collect()
    }

    pub fn current_font(&self) -> Option<Arc<FontDocument>> {
        let registry = self.lock();
        registry
            .current
            .as_ref()
            .and_then(|id| registry.documents.get(id))
            .cloned()
    }

    /// Make `id` current. Returns `None` and leaves the current font
    /// unchanged when no such document is open.
    pub fn set_current_font(&self, id: &str) -> Option<Arc<FontDocument>> {
        let mut registry = self.lock();
        let document = registry.documents.get(id).cloned()?;
        registry.current = Some(id.to_string());
        debug!("Current font is now '{}'", id);
        Some(document)
    }

    pub fn close(&self, id: &str) -> Option<Arc<FontDocument>> {
        let mut registry = self.lock();
        let document = registry.documents.remove(id)?;
        if registry.current.as_deref() == Some(id) {
            registry.current = registry.documents.keys().next().cloned();
        }
        info!("Closed font document '{}'", id);
        Some(document)
    }
}
