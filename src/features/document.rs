//! The open source document and its page handles.
//!
//! A [`PageSource`] hands out one [`PageHandle`] at a time: the handle
//! borrows the source mutably, so the next page cannot be opened (and the
//! source cannot be closed) until the current handle is dropped.

use crate::config::ViewerConfig;
use crate::error::Result;
use crate::features::storage::{ensure_cached_copy, AssetRef};
use crate::logging::{log_debug, log_info};
use image::RgbaImage;
use std::path::{Path, PathBuf};

pub trait PageSource {
    fn page_count(&self) -> u32;
    fn open_page(&mut self, index: u32) -> Result<Box<dyn PageHandle + '_>>;
}

pub trait PageHandle {
    fn index(&self) -> u32;
    /// Page size in pixels at native resolution (one pixel per PDF point).
    fn size(&self) -> (u32, u32);
    /// Rasterizes the whole page into an RGBA surface of exactly `size()`.
    fn render(&self) -> Result<RgbaImage>;
}

/// Opens a rasterizer over a file on disk.
pub type SourceOpener = fn(&Path, &ViewerConfig) -> Result<Box<dyn PageSource>>;

pub struct DocumentSource {
    path: PathBuf,
    backend: Box<dyn PageSource>,
}

impl DocumentSource {
    pub fn open(
        asset: AssetRef,
        cache_dir: &Path,
        config: &ViewerConfig,
        opener: SourceOpener,
    ) -> Result<Self> {
        let cached = ensure_cached_copy(asset, cache_dir, &config.pdf_asset_name)?;
        let backend = opener(&cached.path, config)?;
        log_info(&format!(
            "opened {} ({} pages)",
            cached.path.display(),
            backend.page_count()
        ));
        Ok(Self {
            path: cached.path,
            backend,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> u32 {
        self.backend.page_count()
    }

    pub fn open_page(&mut self, index: u32) -> Result<Box<dyn PageHandle + '_>> {
        log_debug(&format!("open page {index}"));
        self.backend.open_page(index)
    }

    /// Releases the rasterizer, then the file it was reading.
    pub fn close(self) {
        let Self { path, backend } = self;
        drop(backend);
        log_info(&format!("closed {}", path.display()));
    }
}

impl PageSource for DocumentSource {
    fn page_count(&self) -> u32 {
        DocumentSource::page_count(self)
    }

    fn open_page(&mut self, index: u32) -> Result<Box<dyn PageHandle + '_>> {
        DocumentSource::open_page(self, index)
    }
}
