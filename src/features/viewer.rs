//! The viewer screen: one session per visible-screen lifetime, from
//! `screen_start` to `screen_stop`.

use crate::config::{SessionDirs, ViewerConfig};
use crate::error::{Error, Result};
use crate::features::document::{DocumentSource, SourceOpener};
use crate::features::export::{export_document, ExportReport};
use crate::features::navigator::{NavControls, PageNavigator};
use crate::features::overlay::{decode_overlay, encode_png_base64};
use crate::features::storage::{export_dir, local_now, AssetRef};
use crate::i18n::{error_toast, export_ok_toast, page_status};
use crate::logging::{log_error, log_info, log_warn};
use crate::state::AppState;
use crate::ui::{to_value_or_text, Button, Column, ImageBase64, Row, Text, Toast};
use image::RgbaImage;
use rust_i18n::t;
use serde_json::Value;

pub struct StartRequest {
    pub dirs: SessionDirs,
    pub pdf_asset: AssetRef,
    pub overlay_asset: Option<AssetRef>,
    pub config: ViewerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

pub struct ViewerSession {
    document: DocumentSource,
    navigator: PageNavigator,
    overlay: Option<RgbaImage>,
    config: ViewerConfig,
    dirs: SessionDirs,
    page_preview: Option<String>,
    overlay_preview: Option<String>,
}

impl ViewerSession {
    /// Opens the document, loads the overlay and shows `start_index`.
    pub fn start(request: StartRequest, start_index: u32, opener: SourceOpener) -> Result<Self> {
        let StartRequest {
            dirs,
            pdf_asset,
            overlay_asset,
            config,
        } = request;
        let config = config.with_env_overrides();
        let document = match DocumentSource::open(pdf_asset, &dirs.cache_dir, &config, opener) {
            Ok(document) => document,
            Err(e) => {
                if let Some(asset) = overlay_asset {
                    asset.discard();
                }
                return Err(e);
            }
        };
        let overlay = match overlay_asset {
            Some(asset) => load_overlay(&asset.read_all()?),
            None => None,
        };
        let overlay_preview = overlay.as_ref().and_then(|img| preview(img, "overlay"));
        let mut session = Self {
            document,
            navigator: PageNavigator::new(start_index),
            overlay,
            config,
            dirs,
            page_preview: None,
            overlay_preview,
        };
        session.navigator.show_requested(&mut session.document)?;
        session.refresh_page_preview();
        Ok(session)
    }

    pub fn page_count(&self) -> u32 {
        self.document.page_count()
    }

    pub fn requested_index(&self) -> u32 {
        self.navigator.requested_index()
    }

    pub fn displayed_index(&self) -> Option<u32> {
        self.navigator.displayed_index()
    }

    pub fn controls(&self) -> NavControls {
        self.navigator.controls()
    }

    pub fn page_preview(&self) -> Option<&str> {
        self.page_preview.as_deref()
    }

    pub fn overlay_preview(&self) -> Option<&str> {
        self.overlay_preview.as_deref()
    }

    pub fn go_to(&mut self, index: u32) -> Result<bool> {
        let moved = self.navigator.show_page(&mut self.document, index)?;
        if moved {
            self.refresh_page_preview();
        }
        Ok(moved)
    }

    pub fn navigate(&mut self, direction: Direction) -> Result<bool> {
        let moved = match direction {
            Direction::Previous => self.navigator.previous(&mut self.document)?,
            Direction::Next => self.navigator.next(&mut self.document)?,
        };
        if moved {
            self.refresh_page_preview();
        }
        Ok(moved)
    }

    /// Writes every page to a new file, stamping the overlay on the page
    /// currently on screen. The displayed page does not change.
    pub fn export(&mut self) -> Result<ExportReport> {
        let dir = export_dir(
            self.dirs.external_files_dir.as_deref(),
            &self.config.export_subfolder,
        )?;
        export_document(
            &mut self.document,
            self.overlay.as_ref(),
            self.navigator.displayed_index(),
            &dir,
            local_now(),
        )
    }

    /// Drops the current raster, then the document.
    pub fn close(self) {
        let Self {
            document,
            mut navigator,
            ..
        } = self;
        navigator.clear();
        document.close();
    }

    fn refresh_page_preview(&mut self) {
        self.page_preview = self
            .navigator
            .current()
            .and_then(|page| preview(&page.image, "page"));
    }
}

/// Undecodable overlay bytes leave the session without a stamp.
fn load_overlay(bytes: &[u8]) -> Option<RgbaImage> {
    match decode_overlay(bytes) {
        Ok(image) => Some(image),
        Err(e) => {
            log_warn(&format!("overlay ignored: {e}"));
            None
        }
    }
}

fn preview(image: &RgbaImage, what: &str) -> Option<String> {
    match encode_png_base64(image) {
        Ok(b64) => Some(b64),
        Err(e) => {
            log_warn(&format!("{what} preview failed: {e}"));
            None
        }
    }
}

pub fn handle_view_created(state: &mut AppState, saved_index: Option<u32>) {
    state.page_index = saved_index.unwrap_or(0);
}

/// Errors here reach the user as an "Error! ..." toast.
pub fn handle_screen_start(state: &mut AppState, request: StartRequest) {
    if let Some(previous) = state.session.take() {
        log_warn("screen_start with a session still open; closing it");
        previous.close();
    }
    match ViewerSession::start(request, state.page_index, state.opener) {
        Ok(session) => {
            state.session = Some(session);
            state.sync_page_index();
        }
        Err(e) => {
            log_error(&format!("screen start failed: {e}"));
            state.toast = Some(error_toast(&state.locale, &e.to_string()));
        }
    }
}

/// Teardown failures are only logged.
pub fn handle_screen_stop(state: &mut AppState) {
    state.sync_page_index();
    match state.session.take() {
        Some(session) => session.close(),
        None => log_info("screen_stop without an open document"),
    }
}

pub fn handle_navigate(state: &mut AppState, direction: Direction) {
    let Some(session) = state.session.as_mut() else {
        log_warn(&format!("{direction:?}: {}", Error::NoOpenDocument));
        return;
    };
    if let Err(e) = session.navigate(direction) {
        log_error(&format!("navigation failed: {e}"));
    }
    state.sync_page_index();
}

pub fn handle_restore_index(state: &mut AppState, index: u32) {
    state.page_index = index;
    if let Some(session) = state.session.as_mut() {
        if let Err(e) = session.go_to(index) {
            log_error(&format!("restore to page {index} failed: {e}"));
        }
    }
}

/// Export failures are logged only; success shows a toast.
pub fn handle_export(state: &mut AppState) -> Option<ExportReport> {
    let Some(session) = state.session.as_mut() else {
        log_warn(&format!("save: {}", Error::NoOpenDocument));
        return None;
    };
    match session.export() {
        Ok(report) => {
            state.toast = Some(export_ok_toast(&state.locale));
            Some(report)
        }
        Err(e) => {
            log_error(&format!("export failed: {e}"));
            None
        }
    }
}

pub fn render_viewer_screen(state: &AppState) -> Value {
    let locale = state.locale.as_str();
    let title = t!("viewer.title", locale = locale).to_string();
    let mut children = vec![to_value_or_text(Text::new(&title).size(20.0), "title")];

    let controls = state
        .session
        .as_ref()
        .map(ViewerSession::controls)
        .unwrap_or(NavControls {
            previous_enabled: false,
            next_enabled: false,
            position: None,
        });

    match &state.session {
        Some(session) => {
            if let Some((page, total)) = controls.position {
                let status = page_status(locale, page, total);
                children.push(to_value_or_text(
                    Text::new(&status).size(14.0).id("page_status"),
                    "status",
                ));
            }
            if let Some(b64) = session.page_preview() {
                children.push(to_value_or_text(
                    ImageBase64::new(b64)
                        .id("page_image")
                        .content_description("Current PDF page"),
                    "page_image",
                ));
            }
            if let Some(b64) = session.overlay_preview() {
                let label = t!("viewer.overlay_preview", locale = locale).to_string();
                children.push(to_value_or_text(Text::new(&label).size(12.0), "overlay_label"));
                children.push(to_value_or_text(
                    ImageBase64::new(b64)
                        .id("overlay_image")
                        .content_description("Signature preview"),
                    "overlay_image",
                ));
            }
        }
        None => {
            let text = t!("viewer.no_document", locale = locale).to_string();
            children.push(to_value_or_text(Text::new(&text).size(14.0), "no_document"));
        }
    }

    let previous = t!("buttons.previous", locale = locale).to_string();
    let next = t!("buttons.next", locale = locale).to_string();
    let save = t!("buttons.save", locale = locale).to_string();
    children.push(to_value_or_text(
        Row::new(vec![
            to_value_or_text(
                Button::new(&previous, "previous_page")
                    .id("previous")
                    .enabled(controls.previous_enabled),
                "previous",
            ),
            to_value_or_text(
                Button::new(&next, "next_page")
                    .id("next")
                    .enabled(controls.next_enabled),
                "next",
            ),
            to_value_or_text(
                Button::new(&save, "save")
                    .id("save")
                    .content_description("Save stamped copy as PDF")
                    .enabled(state.session.is_some()),
                "save",
            ),
        ]),
        "controls",
    ));

    if let Some(err) = &state.last_error {
        children.push(to_value_or_text(
            Text::new(&format!("Error: {err}"))
                .size(12.0)
                .content_description("viewer_error"),
            "error",
        ));
    }

    if let Some(toast) = &state.toast {
        children.push(to_value_or_text(Toast::new(toast).long(true), "toast"));
    }

    to_value_or_text(
        Column::new(children)
            .padding(16)
            .content_description("pdf_viewer"),
        "viewer_root",
    )
}
