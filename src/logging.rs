//! Logcat shim. On Android messages go to `__android_log_print` under the
//! `pdfinsert` tag; host builds (tests, desktop runs) print to stderr.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[cfg(target_os = "android")]
fn logcat(level: Level, msg: &str) {
    use android_log_sys::LogPriority;
    use std::ffi::CString;

    let priority = match level {
        Level::Debug => LogPriority::DEBUG,
        Level::Info => LogPriority::INFO,
        Level::Warn => LogPriority::WARN,
        Level::Error => LogPriority::ERROR,
    };
    let c_msg = CString::new(msg.replace('\0', "")).unwrap_or_default();
    unsafe {
        let tag = b"pdfinsert\0";
        android_log_sys::__android_log_print(
            priority as _,
            tag.as_ptr() as *const _,
            b"%s\0".as_ptr() as *const _,
            c_msg.as_ptr(),
        );
    }
}

#[cfg(not(target_os = "android"))]
fn logcat(level: Level, msg: &str) {
    let label = match level {
        Level::Debug => "D",
        Level::Info => "I",
        Level::Warn => "W",
        Level::Error => "E",
    };
    eprintln!("{label}/pdfinsert: {msg}");
}

pub fn log_debug(msg: &str) {
    logcat(Level::Debug, msg);
}

pub fn log_info(msg: &str) {
    logcat(Level::Info, msg);
}

pub fn log_warn(msg: &str) {
    logcat(Level::Warn, msg);
}

pub fn log_error(msg: &str) {
    logcat(Level::Error, msg);
}
