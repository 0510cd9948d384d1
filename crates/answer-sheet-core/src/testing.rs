//! Headless overlay surface for tests

use crate::coords::ScreenRect;
use crate::error::SurfaceError;
use crate::overlay::OverlaySurface;

#[derive(Debug, Clone, PartialEq)]
pub struct MountedControl {
    pub field_id: String,
    pub rect: ScreenRect,
    pub value: String,
}

/// Records controls in mount order, duplicates included
#[derive(Debug, Default)]
pub struct MemorySurface {
    controls: Vec<MountedControl>,
    focused: Option<String>,
    placeholder: Option<String>,
    fail_mounts: bool,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mount fail
    pub fn failing() -> Self {
        Self {
            fail_mounts: true,
            ..Self::default()
        }
    }

    /// Change a control's text the way typing would, without notifying anyone
    pub fn type_text(&mut self, field_id: &str, text: &str) {
        if let Some(control) = self.controls.iter_mut().find(|c| c.field_id == field_id) {
            control.value = text.to_string();
        }
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    pub fn control_ids(&self) -> Vec<&str> {
        self.controls.iter().map(|c| c.field_id.as_str()).collect()
    }

    pub fn value(&self, field_id: &str) -> Option<String> {
        self.read_value(field_id)
    }

    pub fn rect(&self, field_id: &str) -> Option<ScreenRect> {
        self.controls
            .iter()
            .find(|c| c.field_id == field_id)
            .map(|c| c.rect)
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }
}

impl OverlaySurface for MemorySurface {
    fn clear_fields(&mut self) {
        self.controls.clear();
        self.focused = None;
        self.placeholder = None;
    }

    fn mount_field(
        &mut self,
        field_id: &str,
        rect: ScreenRect,
        value: &str,
    ) -> Result<(), SurfaceError> {
        if self.fail_mounts {
            return Err(SurfaceError(format!("cannot mount {}", field_id)));
        }
        self.controls.push(MountedControl {
            field_id: field_id.to_string(),
            rect,
            value: value.to_string(),
        });
        Ok(())
    }

    fn read_value(&self, field_id: &str) -> Option<String> {
        self.controls
            .iter()
            .find(|c| c.field_id == field_id)
            .map(|c| c.value.clone())
    }

    fn focus_field(&mut self, field_id: &str) {
        self.focused = Some(field_id.to_string());
    }

    fn show_placeholder(&mut self, message: &str) {
        self.placeholder = Some(message.to_string());
    }
}
