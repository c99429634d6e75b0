pub mod document;
pub mod export;
pub mod navigator;
pub mod overlay;
pub mod pdfium_backend;
pub mod storage;
pub mod viewer;
