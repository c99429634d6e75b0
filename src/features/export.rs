//! Export pipeline: rasterize every page, stamp the overlay on the displayed
//! one, and write the result as a new image-only PDF.

use crate::error::{Error, IoContext, Result};
use crate::features::document::PageSource;
use crate::features::overlay::composite_overlay;
use crate::features::storage::create_export_file;
use crate::logging::{log_debug, log_info};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

const IMAGE_NAME: &str = "Im0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub page_count: u32,
    pub stamped_page: Option<u32>,
}

/// Writer-side document that pages are appended to during export.
pub struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl OutputDocument {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.kids.len() as u32
    }

    /// Adds one page sized to `raster`: white background, then the raster
    /// drawn edge to edge.
    pub fn add_raster_page(&mut self, raster: &RgbaImage) -> Result<ObjectId> {
        let (width, height) = raster.dimensions();
        let (w, h) = (i64::from(width), i64::from(height));

        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        let mut alpha = Vec::with_capacity(width as usize * height as usize);
        for pixel in raster.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let smask_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        );
        let smask_id = self.doc.add_object(smask_stream);

        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
                "SMask" => smask_id,
            },
            deflate(&rgb)?,
        );
        let image_id = self.doc.add_object(image_stream);

        let content = Content {
            operations: vec![
                Operation::new("rg", vec![1.into(), 1.into(), 1.into()]),
                Operation::new("re", vec![0.into(), 0.into(), w.into(), h.into()]),
                Operation::new("f", vec![]),
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_NAME => image_id,
                },
            },
        });
        self.kids.push(Object::Reference(page_id));
        Ok(page_id)
    }

    /// Closes the page tree and hands back the finished document.
    pub fn finish(self) -> Document {
        let Self {
            mut doc,
            pages_id,
            kids,
        } = self;
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).io_context("deflate_failed")?;
    encoder.finish().io_context("deflate_failed")
}

/// Rasterizes every page of `source` at native resolution. Only the page at
/// `stamp_index` gets the overlay.
pub fn build_output(
    source: &mut dyn PageSource,
    overlay: Option<&RgbaImage>,
    stamp_index: Option<u32>,
) -> Result<OutputDocument> {
    let mut output = OutputDocument::new();
    for index in 0..source.page_count() {
        let raster = {
            let page = source.open_page(index)?;
            page.render()?
        };
        let stamp = if Some(index) == stamp_index { overlay } else { None };
        let merged = composite_overlay(raster, stamp);
        output.add_raster_page(&merged)?;
        log_debug(&format!(
            "export page {} ({}x{}){}",
            index + 1,
            merged.width(),
            merged.height(),
            if stamp.is_some() { " stamped" } else { "" }
        ));
    }
    Ok(output)
}

/// Serializes `doc` into a fresh `PDF_<timestamp>_<random>.pdf` in `dir`.
/// Nothing is left behind if writing fails.
pub fn write_output(mut doc: Document, dir: &Path, now: OffsetDateTime) -> Result<PathBuf> {
    let mut file = create_export_file(dir, now)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        doc.save_to(&mut writer)
            .map_err(|e| Error::Write(e.to_string()))?;
        writer.flush().io_context("export_flush_failed")?;
    }
    let (_, path) = file
        .keep()
        .map_err(|e| Error::io("export_keep_failed", e.error))?;
    Ok(path)
}

pub fn export_document(
    source: &mut dyn PageSource,
    overlay: Option<&RgbaImage>,
    stamp_index: Option<u32>,
    dir: &Path,
    now: OffsetDateTime,
) -> Result<ExportReport> {
    let output = build_output(source, overlay, stamp_index)?;
    let page_count = output.page_count();
    let path = write_output(output.finish(), dir, now)?;
    log_info(&format!("exported {page_count} pages to {}", path.display()));
    Ok(ExportReport {
        path,
        page_count,
        stamped_page: stamp_index.filter(|i| *i < page_count),
    })
}
