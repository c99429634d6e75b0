use crate::error::{Error, IoContext, Result};
use crate::logging::{log_debug, log_info};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::macros::format_description;
use time::OffsetDateTime;

#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(test)]
pub fn test_env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

pub fn preferred_cache_dir() -> PathBuf {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(tmpdir) = std::env::var("TMPDIR") {
        candidates.push(PathBuf::from(tmpdir));
    }
    candidates.push(PathBuf::from("/data/user/0/com.example.pdfinsert/cache"));
    candidates.push(PathBuf::from("/data/data/com.example.pdfinsert/cache"));
    candidates.push(std::env::temp_dir());

    for dir in candidates {
        if let Ok(meta) = fs::metadata(&dir) {
            if meta.is_dir() {
                return dir;
            }
        }
    }
    std::env::temp_dir()
}

/// A bundled asset as Kotlin hands it over: either a plain path, or the
/// descriptor triple from `AssetManager.openFd` (the asset lives inside the
/// APK at `offset`). Descriptors are adopted: the core closes them.
#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AssetRef {
    Descriptor {
        fd: i32,
        #[serde(default)]
        offset: u64,
        #[serde(default)]
        length: Option<u64>,
    },
    Path {
        path: PathBuf,
    },
}

impl AssetRef {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        AssetRef::Path { path: path.into() }
    }

    pub fn open(self) -> Result<Box<dyn Read>> {
        match self {
            AssetRef::Path { path } => {
                let file = File::open(&path).io_context("asset_open_failed")?;
                Ok(Box::new(file))
            }
            AssetRef::Descriptor { fd, offset, length } => {
                if fd < 0 {
                    return Err(Error::InvalidAsset("invalid_fd".into()));
                }
                let mut file = unsafe { File::from_raw_fd(fd as RawFd) };
                if offset > 0 {
                    file.seek(SeekFrom::Start(offset))
                        .io_context("asset_seek_failed")?;
                }
                match length {
                    Some(len) => Ok(Box::new(file.take(len))),
                    None => Ok(Box::new(file)),
                }
            }
        }
    }

    pub fn read_all(self) -> Result<Vec<u8>> {
        let mut reader = self.open()?;
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .io_context("asset_read_failed")?;
        Ok(buffer)
    }

    /// Closes an adopted descriptor that turned out not to be needed.
    pub fn discard(self) {
        if let AssetRef::Descriptor { fd, .. } = self {
            if fd >= 0 {
                drop(unsafe { File::from_raw_fd(fd as RawFd) });
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCopy {
    pub path: PathBuf,
    pub copied: bool,
}

/// Makes sure `cache_dir/file_name` holds a readable copy of the asset. An
/// existing copy is reused as is; otherwise the asset is streamed into a temp
/// file next to it and renamed into place.
pub fn ensure_cached_copy(asset: AssetRef, cache_dir: &Path, file_name: &str) -> Result<CachedCopy> {
    let target = cache_dir.join(file_name);
    if target.exists() {
        asset.discard();
        log_debug(&format!("reusing cached copy {}", target.display()));
        return Ok(CachedCopy {
            path: target,
            copied: false,
        });
    }

    // Adopt the descriptor first so every later failure still closes it.
    let mut reader = asset.open()?;
    fs::create_dir_all(cache_dir).io_context("cache_dir_create_failed")?;
    let mut staging = NamedTempFile::new_in(cache_dir).io_context("cache_copy_failed")?;
    let bytes = io::copy(&mut reader, staging.as_file_mut()).io_context("cache_copy_failed")?;
    staging
        .persist(&target)
        .map_err(|e| Error::io("cache_copy_failed", e.error))?;
    log_info(&format!("copied {bytes} bytes into {}", target.display()));
    Ok(CachedCopy {
        path: target,
        copied: true,
    })
}

/// `<external_files_dir>/<subfolder>`, created when missing.
pub fn export_dir(external_files_dir: Option<&Path>, subfolder: &str) -> Result<PathBuf> {
    let base = external_files_dir.ok_or_else(|| {
        Error::io(
            "export_dir_missing",
            io::Error::new(io::ErrorKind::NotFound, "no external files dir"),
        )
    })?;
    let dir = base.join(subfolder);
    if !dir.is_dir() {
        fs::create_dir_all(&dir).io_context("export_dir_create_failed")?;
        log_info(&format!("created export dir {}", dir.display()));
    }
    Ok(dir)
}

pub fn export_timestamp(now: OffsetDateTime) -> String {
    now.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Creates `PDF_<yyyyMMdd_HHmmss>_<random>.pdf` inside `dir`. The file only
/// survives if the caller keeps it.
pub fn create_export_file(dir: &Path, now: OffsetDateTime) -> Result<NamedTempFile> {
    let prefix = format!("PDF_{}_", export_timestamp(now));
    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".pdf")
        .rand_bytes(6)
        .tempfile_in(dir)
        .io_context("export_file_create_failed")
}
