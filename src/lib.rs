rust_i18n::i18n!("locales", fallback = "en");

mod config;
mod error;
mod features;
mod i18n;
mod logging;
mod router;
mod state;
mod ui;


pub use router::Java_com_example_pdfinsert_PdfRenderFragment_dispatch;
