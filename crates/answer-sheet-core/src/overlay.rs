//! Overlay management for answer fields
//!
//! The renderer decides which controls exist and where they go; an
//! [`OverlaySurface`] implementation owns the actual controls (DOM inputs in
//! the browser, plain structs in tests). Controls never hold answers of their
//! own: initial values come from the [`AnswerStore`] and every edit is written
//! back to it.

use crate::answers::AnswerStore;
use crate::coords::{pdf_rect_to_screen, resolve_page_size, PageLayout, ScreenRect};
use crate::error::SurfaceError;
use crate::template::Template;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where field controls are materialized
pub trait OverlaySurface {
    /// Remove every field control and any placeholder
    fn clear_fields(&mut self);

    /// Create a positioned text control initialized to `value`
    fn mount_field(
        &mut self,
        field_id: &str,
        rect: ScreenRect,
        value: &str,
    ) -> Result<(), SurfaceError>;

    /// Live text of a mounted control
    fn read_value(&self, field_id: &str) -> Option<String>;

    fn focus_field(&mut self, field_id: &str);

    /// Replace the page with a message (image could not be shown)
    fn show_placeholder(&mut self, message: &str);
}

/// Pixel dimensions of a loaded page image, as reported by the layout engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageLayout {
    pub natural_width: f64,
    pub natural_height: f64,
    pub displayed_width: f64,
    pub displayed_height: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Placed {
        mounted: usize,
        focused: Option<String>,
    },
    /// The image reported no usable size; nothing was placed
    LayoutUnavailable,
}

#[derive(Debug, Default)]
pub struct FieldOverlayRenderer {
    mounted: Vec<String>,
    page: Option<usize>,
    autofocus_filled: bool,
}

impl FieldOverlayRenderer {
    pub fn new(autofocus_filled: bool) -> Self {
        Self {
            mounted: Vec::new(),
            page: None,
            autofocus_filled,
        }
    }

    /// Place controls for every field on `page`, replacing whatever was mounted.
    ///
    /// Calling this twice for the same page leaves exactly one control per field.
    pub fn render_page<S: OverlaySurface + ?Sized>(
        &mut self,
        surface: &mut S,
        template: &Template,
        page: usize,
        image: &ImageLayout,
        store: &AnswerStore,
    ) -> Result<RenderOutcome, SurfaceError> {
        self.clear(surface);
        self.page = Some(page);

        let page_size = resolve_page_size(
            template.page_size(page),
            template.fallback_size(),
            image.natural_width,
            image.natural_height,
        );
        let Some(layout) =
            PageLayout::new(image.displayed_width, image.displayed_height, page_size)
        else {
            debug!(page, ?image, "Page image has no usable layout yet");
            return Ok(RenderOutcome::LayoutUnavailable);
        };

        let mut focus = None;
        for field in template.fields_on_page(page) {
            let rect = pdf_rect_to_screen(&field.rect(), &layout);
            let value = store.get(&field.id).unwrap_or("");
            surface.mount_field(&field.id, rect, value)?;
            self.mounted.push(field.id.clone());

            if self.autofocus_filled && !value.trim().is_empty() {
                focus = Some(field.id.clone());
            }
        }

        if let Some(id) = &focus {
            surface.focus_field(id);
        }

        debug!(
            page,
            mounted = self.mounted.len(),
            scale_x = layout.scale_x(),
            scale_y = layout.scale_y(),
            "Rendered field overlay"
        );

        Ok(RenderOutcome::Placed {
            mounted: self.mounted.len(),
            focused: focus,
        })
    }

    /// Keystroke in a control: store the raw value.
    ///
    /// Returns false for controls that are no longer mounted.
    pub fn record_input(&self, store: &mut AnswerStore, field_id: &str, raw: &str) -> bool {
        if !self.is_mounted(field_id) {
            return false;
        }
        store.set(field_id, raw);
        true
    }

    /// Control lost focus: store the trimmed value
    pub fn record_blur(&self, store: &mut AnswerStore, field_id: &str, raw: &str) -> bool {
        if !self.is_mounted(field_id) {
            return false;
        }
        store.set_trimmed(field_id, raw);
        true
    }

    /// Copy every mounted control's live value into the store, trimmed.
    ///
    /// Covers controls that still have focus and never fired a blur.
    pub fn flush<S: OverlaySurface + ?Sized>(&self, surface: &S, store: &mut AnswerStore) -> usize {
        let mut flushed = 0;
        for id in &self.mounted {
            if let Some(value) = surface.read_value(id) {
                store.set_trimmed(id, &value);
                flushed += 1;
            }
        }
        flushed
    }

    /// The page image failed to load: show a placeholder, place nothing
    pub fn image_failed<S: OverlaySurface + ?Sized>(&mut self, surface: &mut S, message: &str) {
        self.clear(surface);
        surface.show_placeholder(message);
    }

    pub fn clear<S: OverlaySurface + ?Sized>(&mut self, surface: &mut S) {
        surface.clear_fields();
        self.mounted.clear();
        self.page = None;
    }

    pub fn mounted(&self) -> &[String] {
        &self.mounted
    }

    pub fn is_mounted(&self, field_id: &str) -> bool {
        self.mounted.iter().any(|id| id == field_id)
    }

    /// Page whose controls are currently mounted
    pub fn page(&self) -> Option<usize> {
        self.page
    }
}
