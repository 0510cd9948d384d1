//! DOM implementation of the overlay surface
//!
//! The viewer holds one `div.document-page` containing the page image.
//! Each answer field is an absolutely positioned `div.student-field-wrapper`
//! with an `input.student-field` inside, placed over the image.

use crate::http::describe_js_error;
use answer_sheet_core::{ImageLayout, OverlaySurface, ScreenRect, SurfaceError};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, HtmlElement, HtmlImageElement, HtmlInputElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEventKind {
    Input,
    Blur,
}

/// Edit reported by a field control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEvent {
    pub kind: FieldEventKind,
    pub field_id: String,
    pub value: String,
}

/// Receives field edits; called from DOM event handlers
pub type FieldSink = Rc<dyn Fn(FieldEvent)>;

struct MountedInput {
    field_id: String,
    wrapper: HtmlElement,
    input: HtmlInputElement,
    on_input: Closure<dyn FnMut(Event)>,
    on_blur: Closure<dyn FnMut(Event)>,
}

impl MountedInput {
    /// Unhook listeners before removal so a blur fired by removing a
    /// focused input never reaches the sink
    fn detach(self) {
        let _ = self
            .input
            .remove_event_listener_with_callback("input", self.on_input.as_ref().unchecked_ref());
        let _ = self
            .input
            .remove_event_listener_with_callback("blur", self.on_blur.as_ref().unchecked_ref());
        self.wrapper.remove();
    }
}

struct ImageHandlers {
    _on_load: Closure<dyn FnMut()>,
    _on_error: Closure<dyn FnMut()>,
}

pub struct DomSurface {
    document: Document,
    page: HtmlElement,
    image: HtmlImageElement,
    controls: Vec<MountedInput>,
    placeholder: Option<Element>,
    image_handlers: Option<ImageHandlers>,
    sink: FieldSink,
}

impl DomSurface {
    /// Build the page container inside `viewer`, replacing its content
    ///
    /// # Errors
    /// Returns JsValue error if the elements cannot be created
    pub fn mount(document: Document, viewer: &Element, sink: FieldSink) -> Result<Self, JsValue> {
        viewer.set_inner_html("");

        let page: HtmlElement = document.create_element("div")?.dyn_into()?;
        page.set_class_name("document-page");
        page.style().set_property("position", "relative")?;
        page.style().set_property("display", "inline-block")?;

        let image: HtmlImageElement = document.create_element("img")?.dyn_into()?;
        image.set_class_name("page-image");
        image.style().set_property("width", "100%")?;
        image.style().set_property("display", "block")?;

        page.append_child(&image)?;
        viewer.append_child(&page)?;

        Ok(Self {
            document,
            page,
            image,
            controls: Vec::new(),
            placeholder: None,
            image_handlers: None,
            sink,
        })
    }

    /// Start loading a page image. Previous handlers are replaced, so only
    /// the latest request reports back.
    pub fn load_image(
        &mut self,
        url: &str,
        on_load: Closure<dyn FnMut()>,
        on_error: Closure<dyn FnMut()>,
    ) {
        self.remove_placeholder();
        let _ = self.image.style().set_property("display", "block");
        self.watch_image(on_load, on_error);
        self.image.set_src(url);
    }

    /// Replace the handlers of the image currently loading
    pub fn watch_image(&mut self, on_load: Closure<dyn FnMut()>, on_error: Closure<dyn FnMut()>) {
        self.image.set_onload(Some(on_load.as_ref().unchecked_ref()));
        self.image.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        self.image_handlers = Some(ImageHandlers {
            _on_load: on_load,
            _on_error: on_error,
        });
    }

    /// Current size of the page image, if it has finished loading
    pub fn measure(&self) -> Option<ImageLayout> {
        if !self.image.complete() || self.image.natural_width() == 0 {
            return None;
        }
        let rect = self.image.get_bounding_client_rect();
        Some(ImageLayout {
            natural_width: f64::from(self.image.natural_width()),
            natural_height: f64::from(self.image.natural_height()),
            displayed_width: rect.width(),
            displayed_height: rect.height(),
        })
    }

    /// Remove every field and detach the image handlers
    pub fn teardown(&mut self) {
        self.clear_fields();
        self.image.set_onload(None);
        self.image.set_onerror(None);
        self.image_handlers = None;
    }

    fn remove_placeholder(&mut self) {
        if let Some(placeholder) = self.placeholder.take() {
            placeholder.remove();
        }
    }

    fn control(&self, field_id: &str) -> Option<&MountedInput> {
        self.controls.iter().find(|c| c.field_id == field_id)
    }

    fn create_control(
        &self,
        field_id: &str,
        rect: ScreenRect,
        value: &str,
    ) -> Result<MountedInput, JsValue> {
        let wrapper: HtmlElement = self.document.create_element("div")?.dyn_into()?;
        wrapper.set_class_name("student-field-wrapper");
        let style = wrapper.style();
        style.set_property("position", "absolute")?;
        style.set_property("left", &format!("{}px", rect.left))?;
        style.set_property("top", &format!("{}px", rect.top))?;
        style.set_property("width", &format!("{}px", rect.width))?;
        style.set_property("height", &format!("{}px", rect.height))?;

        let input: HtmlInputElement = self.document.create_element("input")?.dyn_into()?;
        input.set_type("text");
        input.set_class_name("student-field");
        input.set_attribute("data-field-id", field_id)?;
        input.set_value(value);

        let on_input = self.listener(FieldEventKind::Input, field_id, &input);
        let on_blur = self.listener(FieldEventKind::Blur, field_id, &input);
        input.add_event_listener_with_callback("input", on_input.as_ref().unchecked_ref())?;
        input.add_event_listener_with_callback("blur", on_blur.as_ref().unchecked_ref())?;

        wrapper.append_child(&input)?;
        self.page.append_child(&wrapper)?;

        Ok(MountedInput {
            field_id: field_id.to_string(),
            wrapper,
            input,
            on_input,
            on_blur,
        })
    }

    fn listener(
        &self,
        kind: FieldEventKind,
        field_id: &str,
        input: &HtmlInputElement,
    ) -> Closure<dyn FnMut(Event)> {
        let sink = Rc::clone(&self.sink);
        let field_id = field_id.to_string();
        let input = input.clone();
        Closure::wrap(Box::new(move |_event: Event| {
            sink(FieldEvent {
                kind,
                field_id: field_id.clone(),
                value: input.value(),
            });
        }) as Box<dyn FnMut(Event)>)
    }
}

impl OverlaySurface for DomSurface {
    fn clear_fields(&mut self) {
        for control in self.controls.drain(..) {
            control.detach();
        }
        self.remove_placeholder();
    }

    fn mount_field(
        &mut self,
        field_id: &str,
        rect: ScreenRect,
        value: &str,
    ) -> Result<(), SurfaceError> {
        let control = self
            .create_control(field_id, rect, value)
            .map_err(|e| SurfaceError(describe_js_error(&e)))?;
        self.controls.push(control);
        Ok(())
    }

    fn read_value(&self, field_id: &str) -> Option<String> {
        self.control(field_id).map(|c| c.input.value())
    }

    fn focus_field(&mut self, field_id: &str) {
        if let Some(control) = self.control(field_id) {
            let _ = control.input.focus();
        }
    }

    fn show_placeholder(&mut self, message: &str) {
        self.remove_placeholder();
        let _ = self.image.style().set_property("display", "none");
        if let Ok(placeholder) = self.document.create_element("div") {
            placeholder.set_class_name("placeholder");
            placeholder.set_text_content(Some(message));
            if self.page.append_child(&placeholder).is_ok() {
                self.placeholder = Some(placeholder);
            }
        }
    }
}
