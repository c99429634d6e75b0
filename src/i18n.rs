use crate::state::AppState;
use rust_i18n::t;

pub fn update_locale(state: &mut AppState, locale_str: &str) {
    let normalized = normalize_locale(locale_str);
    state.locale = normalized.to_string();
    rust_i18n::set_locale(normalized);
}

pub fn normalize_locale(locale_str: &str) -> &'static str {
    let trimmed = locale_str.trim();
    if trimmed.is_empty() {
        return "en";
    }

    // rust-i18n looks up compiled locales by name (e.g. "en", "is"), so normalize
    // incoming BCP-47 tags like "is-IS" / "en_US" down to a supported language.
    let lower = trimmed.to_ascii_lowercase().replace('_', "-");
    let lang = lower.split('-').next().unwrap_or("en");

    match lang {
        "is" => "is",
        _ => "en",
    }
}

pub fn page_status(locale: &str, page: u32, total: u32) -> String {
    t!("status.page_of", locale = locale, page = page, total = total).to_string()
}

pub fn error_toast(locale: &str, message: &str) -> String {
    t!("toast.error", locale = locale, message = message).to_string()
}

pub fn export_ok_toast(locale: &str) -> String {
    t!("toast.export_ok", locale = locale).to_string()
}
