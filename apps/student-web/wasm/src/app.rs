//! JavaScript-facing student application
//!
//! Owns the selection wizard and the session controller, performs their
//! backend calls, and forwards every engine event to a listener set from
//! JavaScript. Events are delivered after the engine borrow is released, so
//! a listener may call straight back into the app.

use crate::dom::{DomSurface, FieldEvent, FieldEventKind, FieldSink};
use crate::http;
use answer_sheet_core::{
    ApiCall, ClientConfig, EntryMode, EventQueue, FetchError, NoticeKind, PageTicket,
    SelectionWizard, SessionController, SessionError, SessionEvent, Ticket,
};
use serde::Serialize;
use serde_json::Value;
use std::cell::{OnceCell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;

/// Which component a backend response belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Wizard,
    Template,
    Grading,
}

struct Inner {
    config: ClientConfig,
    wizard: SelectionWizard,
    session: SessionController,
    surface: DomSurface,
    queue: EventQueue,
    listener: Option<js_sys::Function>,
}

/// Student test-taking app bound to a viewer element
#[wasm_bindgen]
pub struct StudentApp {
    inner: Rc<RefCell<Inner>>,
    on_viewport: Closure<dyn FnMut()>,
}

/// Window events that change the page image's displayed size
const VIEWPORT_EVENTS: [&str; 2] = ["orientationchange", "resize"];

#[wasm_bindgen]
impl StudentApp {
    /// Create the app inside the element with id `viewer_id`.
    ///
    /// `config_json` is an optional JSON object of client settings; the
    /// entry mode is taken from the current location path.
    #[wasm_bindgen(constructor)]
    pub fn new(viewer_id: &str, config_json: Option<String>) -> Result<StudentApp, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) => ClientConfig::from_json_str(json)
                .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?,
            None => ClientConfig::default(),
        };

        let window =
            web_sys::window().ok_or_else(|| JsValue::from_str("No window object available"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("No document object available"))?;
        let viewer = document
            .get_element_by_id(viewer_id)
            .ok_or_else(|| JsValue::from_str(&format!("Element #{} not found", viewer_id)))?;
        let path = window.location().pathname()?;
        let mode = EntryMode::from_path(&path);
        info!(?mode, "Starting student app");

        let slot: Rc<OnceCell<Weak<RefCell<Inner>>>> = Rc::new(OnceCell::new());
        let sink_slot = Rc::clone(&slot);
        let sink: FieldSink = Rc::new(move |event| {
            if let Some(inner) = sink_slot.get().and_then(Weak::upgrade) {
                field_event(&inner, event);
            }
        });
        let surface = DomSurface::mount(document, &viewer, sink)?;

        let inner = Rc::new(RefCell::new(Inner {
            wizard: SelectionWizard::new(mode, config.fallback_classes.clone()),
            session: SessionController::new(config.clone()),
            config,
            surface,
            queue: EventQueue::new(),
            listener: None,
        }));
        let _ = slot.set(Rc::downgrade(&inner));

        let weak = Rc::downgrade(&inner);
        let on_viewport = Closure::wrap(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                orientation_changed(&inner);
            }
        }) as Box<dyn FnMut()>);
        for event in VIEWPORT_EVENTS {
            window.add_event_listener_with_callback(event, on_viewport.as_ref().unchecked_ref())?;
        }

        Ok(StudentApp { inner, on_viewport })
    }

    /// Set the event listener
    /// Callback signature: (event: { type: string, ... }) => void
    #[wasm_bindgen(js_name = setListener)]
    pub fn set_listener(&self, listener: js_sys::Function) {
        self.inner.borrow_mut().listener = Some(listener);
    }

    /// Load the first selection step
    pub fn begin(&self) {
        let call = {
            let mut inner = self.inner.borrow_mut();
            let Inner { wizard, queue, .. } = &mut *inner;
            wizard.begin(queue)
        };
        self.after(call, Route::Wizard);
    }

    #[wasm_bindgen(js_name = selectClass)]
    pub fn select_class(&self, class_level: u32) -> Result<(), JsValue> {
        self.wizard_step(|wizard, queue| wizard.select_class(class_level, queue))
    }

    #[wasm_bindgen(js_name = selectSubject)]
    pub fn select_subject(&self, subject_id: &str) -> Result<(), JsValue> {
        self.wizard_step(|wizard, queue| wizard.select_subject(subject_id, queue))
    }

    #[wasm_bindgen(js_name = selectTopic)]
    pub fn select_topic(&self, topic: &str) -> Result<(), JsValue> {
        self.wizard_step(|wizard, queue| wizard.select_topic(topic, queue))
    }

    #[wasm_bindgen(js_name = selectTemplate)]
    pub fn select_template(&self, template_id: &str) -> Result<(), JsValue> {
        self.wizard_step(|wizard, queue| wizard.select_template(template_id, queue))
    }

    /// Return to the previous selection step
    #[wasm_bindgen(js_name = goBack)]
    pub fn go_back(&self) {
        let call = {
            let mut inner = self.inner.borrow_mut();
            let Inner { wizard, queue, .. } = &mut *inner;
            wizard.go_back(queue)
        };
        self.after(call, Route::Wizard);
    }

    /// Current wizard state as a plain object
    #[wasm_bindgen(js_name = wizardState)]
    pub fn wizard_state(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.borrow().wizard.snapshot())
    }

    /// Start answering the chosen test
    pub fn start(&self, student_name: &str, student_class: &str) -> Result<(), JsValue> {
        let result = {
            let mut inner = self.inner.borrow_mut();
            let Inner {
                wizard,
                session,
                queue,
                ..
            } = &mut *inner;
            match wizard.complete(student_class) {
                Ok(selection) => session.start(
                    student_name,
                    &selection.student_class,
                    &selection.template_id,
                    queue,
                ),
                Err(e) => {
                    queue.notify(NoticeKind::Validation, e.to_string());
                    Err(SessionError::from(e))
                }
            }
        };
        match result {
            Ok(call) => {
                self.after(Some(call), Route::Template);
                Ok(())
            }
            Err(e) => {
                deliver(&self.inner);
                Err(JsValue::from_str(&e.to_string()))
            }
        }
    }

    #[wasm_bindgen(js_name = nextPage)]
    pub fn next_page(&self) -> Result<(), JsValue> {
        self.session_step(|session, surface, queue| session.next_page(surface, queue))
    }

    #[wasm_bindgen(js_name = prevPage)]
    pub fn prev_page(&self) -> Result<(), JsValue> {
        self.session_step(|session, surface, queue| session.prev_page(surface, queue))
    }

    #[wasm_bindgen(js_name = goToPage)]
    pub fn go_to_page(&self, index: usize) -> Result<(), JsValue> {
        self.session_step(|session, surface, queue| session.go_to_page(index, surface, queue))
    }

    /// Re-place fields after the viewport changed size
    #[wasm_bindgen(js_name = orientationChanged)]
    pub fn orientation_changed(&self) {
        orientation_changed(&self.inner);
    }

    /// Send the answers for grading. An incomplete sheet is only sent when
    /// `confirmed` is true; otherwise a `confirmation_required` event asks
    /// the page to confirm and call again.
    pub fn submit(&self, confirmed: bool) -> Result<(), JsValue> {
        let result = {
            let mut inner = self.inner.borrow_mut();
            let Inner {
                session,
                surface,
                queue,
                ..
            } = &mut *inner;
            session.submit(confirmed, surface, queue)
        };
        match result {
            Ok(call) => {
                self.after(call, Route::Grading);
                Ok(())
            }
            Err(e) => {
                deliver(&self.inner);
                Err(JsValue::from_str(&e.to_string()))
            }
        }
    }

    /// Answers progress as `{ filled, total }`, or null without a session
    pub fn progress(&self) -> Result<JsValue, JsValue> {
        match self.inner.borrow().session.progress() {
            Some(progress) => to_js(&progress),
            None => Ok(JsValue::NULL),
        }
    }

    /// Drop the current session and go back to test selection
    pub fn reset(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            let Inner {
                session,
                surface,
                queue,
                ..
            } = &mut *inner;
            session.reset(surface, queue);
            surface.teardown();
        }
        deliver(&self.inner);
    }
}

impl StudentApp {
    fn after(&self, call: Option<ApiCall>, route: Route) {
        deliver(&self.inner);
        if let Some(call) = call {
            dispatch(&self.inner, call, route);
        }
    }

    fn wizard_step<E: std::fmt::Display>(
        &self,
        step: impl FnOnce(&mut SelectionWizard, &mut EventQueue) -> Result<ApiCall, E>,
    ) -> Result<(), JsValue> {
        let result = {
            let mut inner = self.inner.borrow_mut();
            let Inner { wizard, queue, .. } = &mut *inner;
            step(wizard, queue)
        };
        match result {
            Ok(call) => {
                self.after(Some(call), Route::Wizard);
                Ok(())
            }
            Err(e) => {
                deliver(&self.inner);
                Err(JsValue::from_str(&e.to_string()))
            }
        }
    }

    fn session_step<E: std::fmt::Display>(
        &self,
        step: impl FnOnce(&mut SessionController, &mut DomSurface, &mut EventQueue) -> Result<(), E>,
    ) -> Result<(), JsValue> {
        let result = {
            let mut inner = self.inner.borrow_mut();
            let Inner {
                session,
                surface,
                queue,
                ..
            } = &mut *inner;
            step(session, surface, queue)
        };
        deliver(&self.inner);
        result.map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

impl Drop for StudentApp {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            for event in VIEWPORT_EVENTS {
                let _ = window.remove_event_listener_with_callback(
                    event,
                    self.on_viewport.as_ref().unchecked_ref(),
                );
            }
        }
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.surface.teardown();
        }
    }
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Perform a backend call and route the response to its component
fn dispatch(inner: &Rc<RefCell<Inner>>, call: ApiCall, route: Route) {
    let inner = Rc::clone(inner);
    let api_base = inner.borrow().config.api_base.clone();
    spawn_local(async move {
        let mut pending = (route == Route::Grading).then(|| PendingGrading {
            inner: Rc::clone(&inner),
            ticket: call.ticket,
            settled: false,
        });
        let result = http::perform(&api_base, &call.request).await;
        if let Err(e) = &result {
            warn!(path = %call.request.path, error = %e, "Backend request failed");
        }
        complete(&inner, route, call.ticket, result);
        if let Some(pending) = pending.as_mut() {
            pending.settled = true;
        }
    });
}

/// Releases the submit busy state if a grading request ends without its
/// response being handled
struct PendingGrading {
    inner: Rc<RefCell<Inner>>,
    ticket: Ticket,
    settled: bool,
}

impl Drop for PendingGrading {
    fn drop(&mut self) {
        if self.settled || self.inner.try_borrow_mut().is_err() {
            return;
        }
        warn!(ticket = self.ticket.0, "Grading request abandoned");
        complete(
            &self.inner,
            Route::Grading,
            self.ticket,
            Err(FetchError::Network("Submission was interrupted".to_string())),
        );
    }
}

fn complete(
    inner: &Rc<RefCell<Inner>>,
    route: Route,
    ticket: Ticket,
    result: Result<Value, FetchError>,
) {
    let follow_up = {
        let mut guard = inner.borrow_mut();
        let Inner {
            wizard,
            session,
            surface,
            queue,
            ..
        } = &mut *guard;
        match route {
            Route::Wizard => wizard.fetch_completed(ticket, result, queue),
            Route::Template => {
                if let Err(e) = session.template_loaded(ticket, result, surface, queue) {
                    debug!(error = %e, "Test did not start");
                }
                None
            }
            Route::Grading => {
                if let Err(e) = session.grading_completed(ticket, result, queue) {
                    debug!(error = %e, "Grading did not complete");
                }
                None
            }
        }
    };
    deliver(inner);
    if let Some(call) = follow_up {
        dispatch(inner, call, Route::Wizard);
    }
}

/// Drain queued events: act on the ones addressed to the binding layer and
/// pass every event to the listener
fn deliver(inner: &Rc<RefCell<Inner>>) {
    loop {
        let (events, listener) = {
            let mut guard = inner.borrow_mut();
            (guard.queue.drain(), guard.listener.clone())
        };
        if events.is_empty() {
            return;
        }
        for event in events {
            match &event {
                SessionEvent::PageImageRequested { ticket, url } => {
                    load_page_image(inner, *ticket, url);
                }
                SessionEvent::LayoutRequested { ticket, settle_ms } => {
                    schedule_layout(inner, *ticket, *settle_ms);
                }
                _ => {}
            }
            if let Some(listener) = &listener {
                match to_js(&event) {
                    Ok(value) => {
                        if let Err(e) = listener.call1(&JsValue::NULL, &value) {
                            warn!(error = %http::describe_js_error(&e), "Event listener threw");
                        }
                    }
                    Err(e) => warn!(error = ?e, "Failed to serialize event"),
                }
            }
        }
    }
}

fn image_handlers(
    inner: &Rc<RefCell<Inner>>,
    ticket: PageTicket,
) -> (Closure<dyn FnMut()>, Closure<dyn FnMut()>) {
    let weak = Rc::downgrade(inner);
    let on_load = Closure::wrap(Box::new(move || {
        if let Some(inner) = weak.upgrade() {
            page_image_ready(&inner, ticket);
        }
    }) as Box<dyn FnMut()>);

    let weak = Rc::downgrade(inner);
    let on_error = Closure::wrap(Box::new(move || {
        if let Some(inner) = weak.upgrade() {
            page_image_failed(&inner, ticket);
        }
    }) as Box<dyn FnMut()>);

    (on_load, on_error)
}

fn load_page_image(inner: &Rc<RefCell<Inner>>, ticket: PageTicket, url: &str) {
    let (on_load, on_error) = image_handlers(inner, ticket);
    inner.borrow_mut().surface.load_image(url, on_load, on_error);
}

/// Measure the image once the viewport has settled. An image still loading
/// reports through its load handler instead.
fn schedule_layout(inner: &Rc<RefCell<Inner>>, ticket: PageTicket, settle_ms: u32) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let weak = Rc::downgrade(inner);
    let callback = Closure::once_into_js(move || {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let measured = inner.borrow().surface.measure();
        match measured {
            Some(_) => page_image_ready(&inner, ticket),
            None => {
                let (on_load, on_error) = image_handlers(&inner, ticket);
                inner.borrow_mut().surface.watch_image(on_load, on_error);
            }
        }
    });
    let timeout = i32::try_from(settle_ms).unwrap_or(i32::MAX);
    if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref(),
        timeout,
    ) {
        warn!(error = %http::describe_js_error(&e), "Failed to schedule relayout");
    }
}

fn page_image_ready(inner: &Rc<RefCell<Inner>>, ticket: PageTicket) {
    {
        let mut guard = inner.borrow_mut();
        let Inner {
            session,
            surface,
            queue,
            ..
        } = &mut *guard;
        match surface.measure() {
            Some(layout) => {
                if let Err(e) = session.page_image_loaded(ticket, layout, surface, queue) {
                    debug!(error = %e, "Page fields not placed");
                }
            }
            None => session.page_image_failed(ticket, surface, queue),
        }
    }
    deliver(inner);
}

fn page_image_failed(inner: &Rc<RefCell<Inner>>, ticket: PageTicket) {
    {
        let mut guard = inner.borrow_mut();
        let Inner {
            session,
            surface,
            queue,
            ..
        } = &mut *guard;
        session.page_image_failed(ticket, surface, queue);
    }
    deliver(inner);
}

fn orientation_changed(inner: &Rc<RefCell<Inner>>) {
    {
        let mut guard = inner.borrow_mut();
        let Inner {
            session,
            surface,
            queue,
            ..
        } = &mut *guard;
        if session.orientation_changed(surface, queue).is_err() {
            return;
        }
    }
    deliver(inner);
}

/// Field edits arrive from DOM handlers. Removing a focused input can fire
/// blur while the engine is already borrowed; the value was flushed by then.
fn field_event(inner: &Rc<RefCell<Inner>>, event: FieldEvent) {
    {
        let Ok(mut guard) = inner.try_borrow_mut() else {
            debug!(field_id = %event.field_id, "Field event during update, skipped");
            return;
        };
        let Inner { session, queue, .. } = &mut *guard;
        match event.kind {
            FieldEventKind::Input => session.input(&event.field_id, &event.value, queue),
            FieldEventKind::Blur => session.blur(&event.field_id, &event.value, queue),
        }
    }
    deliver(inner);
}
