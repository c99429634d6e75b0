//! PDFium-backed rasterizer.
//!
//! The library binding is loaded lazily, once per UI thread, and lives for
//! the rest of the process so documents can borrow it for `'static`.

use crate::config::ViewerConfig;
use crate::error::{Error, Result};
use crate::features::document::{PageHandle, PageSource};
use crate::logging::log_info;
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::cell::Cell;
use std::path::{Path, PathBuf};

pub struct PdfiumLoader;

impl PdfiumLoader {
    /// Load the PDFium library from known search paths or system library.
    ///
    /// Search order:
    /// 1. the configured library directory
    /// 2. the current working directory
    /// 3. next to the executable
    /// 4. System library fallback (on Android this finds the APK's `libpdfium.so`)
    pub fn load(library_dir: Option<&Path>) -> Result<Pdfium> {
        for dir in Self::search_paths(library_dir) {
            let candidate = Pdfium::pdfium_platform_library_name_at_path(&dir);
            if Path::new(&candidate).exists() {
                if let Ok(bindings) = Pdfium::bind_to_library(&candidate) {
                    log_info(&format!("pdfium bound from {}", dir.display()));
                    return Ok(Pdfium::new(bindings));
                }
            }
        }
        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| Error::Render(format!("pdfium_load_failed:{e:?}")))
    }

    fn search_paths(library_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = library_dir {
            paths.push(dir.to_path_buf());
        }
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join("lib"));
        }
        if let Ok(exe) = std::env::current_exe() {
            if let Some(parent) = exe.parent() {
                paths.push(parent.to_path_buf());
            }
        }
        paths
    }
}

thread_local! {
    static PDFIUM: Cell<Option<&'static Pdfium>> = const { Cell::new(None) };
}

fn shared_pdfium(config: &ViewerConfig) -> Result<&'static Pdfium> {
    PDFIUM.with(|slot| {
        if let Some(pdfium) = slot.get() {
            return Ok(pdfium);
        }
        let pdfium: &'static Pdfium =
            Box::leak(Box::new(PdfiumLoader::load(config.pdfium_library_dir.as_deref())?));
        slot.set(Some(pdfium));
        Ok(pdfium)
    })
}

/// Pixel size of a page rendered at one pixel per point.
pub fn native_size(width_pt: f32, height_pt: f32) -> (u32, u32) {
    let px = |v: f32| if v.is_finite() { v.round().max(1.0) as u32 } else { 1 };
    (px(width_pt), px(height_pt))
}

pub struct PdfiumSource {
    document: PdfDocument<'static>,
}

pub fn open(path: &Path, config: &ViewerConfig) -> Result<Box<dyn PageSource>> {
    let pdfium = shared_pdfium(config)?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| Error::Render(format!("pdf_open_failed:{e:?}")))?;
    Ok(Box::new(PdfiumSource { document }))
}

impl PageSource for PdfiumSource {
    fn page_count(&self) -> u32 {
        self.document.pages().len() as u32
    }

    fn open_page(&mut self, index: u32) -> Result<Box<dyn PageHandle + '_>> {
        let page_count = self.page_count();
        let page_index = PdfPageIndex::try_from(index)
            .map_err(|_| Error::PageOutOfRange { index, page_count })?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|e| Error::Render(format!("page_open_failed:{e:?}")))?;
        Ok(Box::new(PdfiumPage { index, page }))
    }
}

struct PdfiumPage<'a> {
    index: u32,
    page: PdfPage<'a>,
}

impl PageHandle for PdfiumPage<'_> {
    fn index(&self) -> u32 {
        self.index
    }

    fn size(&self) -> (u32, u32) {
        native_size(self.page.width().value, self.page.height().value)
    }

    fn render(&self) -> Result<RgbaImage> {
        let (width, height) = self.size();
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = self
            .page
            .render_with_config(&config)
            .map_err(|e| Error::Render(format!("{e:?}")))?;
        let (bw, bh) = (bitmap.width() as u32, bitmap.height() as u32);
        RgbaImage::from_raw(bw, bh, bitmap.as_rgba_bytes())
            .ok_or_else(|| Error::Render(format!("bitmap_size_mismatch:{bw}x{bh}")))
    }
}
