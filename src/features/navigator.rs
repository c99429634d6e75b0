use crate::error::Result;
use crate::features::document::PageSource;
use crate::logging::log_debug;
use image::RgbaImage;

/// A page raster ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub index: u32,
    pub image: RgbaImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavControls {
    pub previous_enabled: bool,
    pub next_enabled: bool,
    /// `(page_number, page_count)` with a 1-based page number.
    pub position: Option<(u32, u32)>,
}

#[derive(Debug, Default)]
pub struct PageNavigator {
    requested: u32,
    page_count: u32,
    current: Option<RenderedPage>,
}

impl PageNavigator {
    pub fn new(start_index: u32) -> Self {
        Self {
            requested: start_index,
            page_count: 0,
            current: None,
        }
    }

    /// Index the screen asked for last (restored or navigated to).
    pub fn requested_index(&self) -> u32 {
        self.requested
    }

    pub fn displayed_index(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.index)
    }

    pub fn current(&self) -> Option<&RenderedPage> {
        self.current.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Shows the requested index. Used right after the source opens.
    pub fn show_requested(&mut self, source: &mut dyn PageSource) -> Result<bool> {
        let index = self.requested;
        self.show_page(source, index)
    }

    /// Renders page `index`. Returns `false` without touching anything when
    /// the index is past the last page.
    pub fn show_page(&mut self, source: &mut dyn PageSource, index: u32) -> Result<bool> {
        self.page_count = source.page_count();
        if index >= self.page_count {
            return Ok(false);
        }
        let image = {
            let page = source.open_page(index)?;
            page.render()?
        };
        log_debug(&format!("showing page {} of {}", index + 1, self.page_count));
        self.requested = index;
        self.current = Some(RenderedPage { index, image });
        Ok(true)
    }

    pub fn next(&mut self, source: &mut dyn PageSource) -> Result<bool> {
        match self.displayed_index() {
            Some(index) => self.show_page(source, index + 1),
            None => Ok(false),
        }
    }

    pub fn previous(&mut self, source: &mut dyn PageSource) -> Result<bool> {
        match self.displayed_index().and_then(|i| i.checked_sub(1)) {
            Some(index) => self.show_page(source, index),
            None => Ok(false),
        }
    }

    pub fn controls(&self) -> NavControls {
        match self.displayed_index() {
            Some(index) => NavControls {
                previous_enabled: index > 0,
                next_enabled: index + 1 < self.page_count,
                position: Some((index + 1, self.page_count)),
            },
            None => NavControls {
                previous_enabled: false,
                next_enabled: false,
                position: None,
            },
        }
    }

    /// Drops the raster and forgets the page count; the requested index stays
    /// so a later start shows the same page again.
    pub fn clear(&mut self) {
        self.current = None;
        self.page_count = 0;
    }
}
