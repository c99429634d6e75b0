use std::io;
use thiserror::Error;

/// Failures the viewer core can hit. The `Display` strings follow the
/// `code:detail` shape the Kotlin shell already matches on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{context}:{source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("render_failed:{0}")]
    Render(String),
    #[error("image_decode_failed:{0}")]
    Image(#[from] image::ImageError),
    #[error("pdf_encode_failed:{0}")]
    Pdf(#[from] lopdf::Error),
    #[error("pdf_write_failed:{0}")]
    Write(String),
    #[error("invalid_asset:{0}")]
    InvalidAsset(String),
    #[error("no_open_document")]
    NoOpenDocument,
    #[error("page_out_of_range:{index}/{page_count}")]
    PageOutOfRange { index: u32, page_count: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Error::Io { context, source }
    }
}

/// Shorthand for tagging an `io::Result` with the step that produced it.
pub trait IoContext<T> {
    fn io_context(self, context: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| Error::io(context, e))
    }
}
