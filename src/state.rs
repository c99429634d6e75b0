use crate::features::document::SourceOpener;
use crate::features::pdfium_backend;
use crate::features::viewer::ViewerSession;
use serde::{Deserialize, Serialize};

fn default_opener() -> SourceOpener {
    pdfium_backend::open
}

fn default_locale() -> String {
    "en".to_string()
}

/// All state behind the viewer screen. Only the page index and locale survive
/// a snapshot; the open session belongs to the current screen lifetime.
#[derive(Serialize, Deserialize)]
pub struct AppState {
    pub page_index: u32,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(skip)]
    pub last_error: Option<String>,
    #[serde(skip)]
    pub toast: Option<String>,
    #[serde(skip)]
    pub session: Option<ViewerSession>,
    #[serde(skip, default = "default_opener")]
    pub opener: SourceOpener,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            page_index: 0,
            locale: default_locale(),
            last_error: None,
            toast: None,
            session: None,
            opener: default_opener(),
        }
    }

    /// Copies the navigator's position back into the persisted index.
    pub fn sync_page_index(&mut self) {
        if let Some(session) = &self.session {
            self.page_index = session.requested_index();
        }
    }

    pub fn reset_runtime(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        self.page_index = 0;
        self.last_error = None;
        self.toast = None;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
