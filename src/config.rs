use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PDF_ASSET: &str = "sample.pdf";
pub const DEFAULT_OVERLAY_ASSET: &str = "ap1025_ic_person.png";
pub const DEFAULT_EXPORT_SUBFOLDER: &str = "pdfinsert";

pub const ENV_CACHE_DIR: &str = "PDFINSERT_CACHE_DIR";
pub const ENV_EXPORT_DIR: &str = "PDFINSERT_EXPORT_DIR";
pub const ENV_PDFIUM_DIR: &str = "PDFINSERT_PDFIUM_DIR";

/// Knobs for one viewer session. Kotlin may send any subset; the rest keeps
/// the bundled defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub pdf_asset_name: String,
    pub overlay_asset_name: String,
    pub export_subfolder: String,
    pub pdfium_library_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            pdf_asset_name: DEFAULT_PDF_ASSET.to_string(),
            overlay_asset_name: DEFAULT_OVERLAY_ASSET.to_string(),
            export_subfolder: DEFAULT_EXPORT_SUBFOLDER.to_string(),
            pdfium_library_dir: None,
        }
    }
}

impl ViewerConfig {
    /// Applies `PDFINSERT_PDFIUM_DIR` on top of whatever the command sent.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = env_path(ENV_PDFIUM_DIR) {
            self.pdfium_library_dir = Some(dir);
        }
        self
    }
}

/// Directories handed over by the Android context at screen start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDirs {
    pub cache_dir: PathBuf,
    pub external_files_dir: Option<PathBuf>,
}

impl SessionDirs {
    pub fn resolve(cache_dir: Option<&str>, external_files_dir: Option<&str>) -> Self {
        let cache_dir = env_path(ENV_CACHE_DIR)
            .or_else(|| non_empty_path(cache_dir))
            .unwrap_or_else(crate::features::storage::preferred_cache_dir);
        let external_files_dir =
            env_path(ENV_EXPORT_DIR).or_else(|| non_empty_path(external_files_dir));
        Self {
            cache_dir,
            external_files_dir,
        }
    }
}

fn non_empty_path(raw: Option<&str>) -> Option<PathBuf> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .as_deref()
        .and_then(|v| non_empty_path(Some(v)))
}
