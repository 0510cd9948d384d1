//! The answering session: start, navigation, submission and results
//!
//! A [`SessionController`] owns at most one active session. Starting loads
//! the template; every answer, page change and submission goes through the
//! controller, which publishes [`SessionEvent`]s for the binding layer.

use crate::answers::{AnswerStore, Progress};
use crate::api::{self, ApiCall, GradingRequest, GradingResponse, StudentInfo, Ticket, TicketCounter};
use crate::config::ClientConfig;
use crate::error::{FetchError, SessionError, ValidationError};
use crate::events::{EventQueue, NoticeKind, SessionEvent, View};
use crate::overlay::{FieldOverlayRenderer, ImageLayout, OverlaySurface, RenderOutcome};
use crate::pagination::{PageTicket, PaginationController};
use crate::report::ResultReport;
use crate::template::Template;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Who is answering which test. Fixed for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub student_name: String,
    pub student_class: String,
    pub template_id: String,
    pub sheet_url: Option<String>,
}

#[derive(Debug)]
struct PendingStart {
    ticket: Ticket,
    student_name: String,
    student_class: String,
    template_id: String,
}

#[derive(Debug)]
struct ActiveSession {
    info: SessionInfo,
    template: Template,
    pages: PaginationController,
    overlay: FieldOverlayRenderer,
    answers: AnswerStore,
    submitting: Option<Ticket>,
}

impl ActiveSession {
    fn progress(&self) -> Progress {
        Progress::compute(&self.answers, &self.template.fields)
    }

    fn request_image(&self, ticket: PageTicket, uploads_prefix: &str, events: &mut EventQueue) {
        match self.template.image_url(uploads_prefix, ticket.page) {
            Some(url) => events.emit(SessionEvent::PageImageRequested { ticket, url }),
            None => events.notify(
                NoticeKind::Rendering,
                format!("Page {} has no image", ticket.page + 1),
            ),
        }
    }

    fn page_moved(
        &self,
        ticket: Option<PageTicket>,
        uploads_prefix: &str,
        events: &mut EventQueue,
    ) {
        if let Some(ticket) = ticket {
            events.emit(SessionEvent::PageChanged(self.pages.indicator()));
            self.request_image(ticket, uploads_prefix, events);
        }
        events.emit(SessionEvent::ProgressChanged(self.progress()));
    }
}

#[derive(Debug)]
pub struct SessionController {
    config: ClientConfig,
    view: View,
    tickets: TicketCounter,
    pending_start: Option<PendingStart>,
    active: Option<ActiveSession>,
    report: Option<ResultReport>,
}

impl SessionController {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            view: View::Selection,
            tickets: TicketCounter::default(),
            pending_start: None,
            active: None,
            report: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn info(&self) -> Option<&SessionInfo> {
        self.active.as_ref().map(|a| &a.info)
    }

    pub fn template(&self) -> Option<&Template> {
        self.active.as_ref().map(|a| &a.template)
    }

    pub fn answers(&self) -> Option<&AnswerStore> {
        self.active.as_ref().map(|a| &a.answers)
    }

    pub fn progress(&self) -> Option<Progress> {
        self.active.as_ref().map(ActiveSession::progress)
    }

    /// 0-based index of the displayed page
    pub fn current_page(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.pages.current())
    }

    pub fn mounted_fields(&self) -> &[String] {
        self.active
            .as_ref()
            .map(|a| a.overlay.mounted())
            .unwrap_or(&[])
    }

    pub fn is_submitting(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.submitting.is_some())
    }

    pub fn report(&self) -> Option<&ResultReport> {
        self.report.as_ref()
    }

    /// Validate the student's input and request the template.
    ///
    /// Each missing value is reported with its own message, in form order.
    pub fn start(
        &mut self,
        student_name: &str,
        student_class: &str,
        template_id: &str,
        events: &mut EventQueue,
    ) -> Result<ApiCall, SessionError> {
        let checked = [
            (student_name.trim(), ValidationError::MissingName),
            (student_class.trim(), ValidationError::MissingClass),
            (template_id.trim(), ValidationError::MissingTemplate),
        ];
        for (value, error) in checked {
            if value.is_empty() {
                events.notify(NoticeKind::Validation, error.to_string());
                return Err(error.into());
            }
        }

        let ticket = self.tickets.issue();
        let template_id = template_id.trim().to_string();
        info!(%template_id, "Loading test");
        let request = api::load_template(&template_id);
        self.pending_start = Some(PendingStart {
            ticket,
            student_name: student_name.trim().to_string(),
            student_class: student_class.trim().to_string(),
            template_id,
        });
        Ok(ApiCall { ticket, request })
    }

    /// The template requested by [`start`](Self::start) arrived (or failed).
    ///
    /// On success the previous session, if any, is replaced: answers start
    /// empty and the first page image is requested.
    pub fn template_loaded<S: OverlaySurface + ?Sized>(
        &mut self,
        ticket: Ticket,
        result: Result<Value, FetchError>,
        surface: &mut S,
        events: &mut EventQueue,
    ) -> Result<(), SessionError> {
        let pending = match self.pending_start.take() {
            Some(p) if p.ticket == ticket => p,
            other => {
                self.pending_start = other;
                debug!(ticket = ticket.0, "Ignoring stale template response");
                return Ok(());
            }
        };

        let value = result.map_err(|e| {
            warn!(template_id = %pending.template_id, error = %e, "Template request failed");
            events.notify(NoticeKind::Fetch, format!("Failed to load the test: {}", e));
            SessionError::from(e)
        })?;

        let mut template = Template::from_json(value)
            .and_then(|t| t.validate().map(|_| t))
            .map_err(|e| {
                warn!(template_id = %pending.template_id, error = %e, "Template rejected");
                events.notify(NoticeKind::Template, e.to_string());
                SessionError::from(e)
            })?;
        if template.id.is_empty() {
            template.id = pending.template_id.clone();
        }

        if let Some(previous) = self.active.as_mut() {
            previous.overlay.clear(surface);
        }

        let info = SessionInfo {
            student_name: pending.student_name,
            student_class: pending.student_class,
            template_id: pending.template_id,
            sheet_url: template.sheet_url.clone(),
        };
        let (pages, first) = PaginationController::open(template.page_count());
        info!(
            template_id = %info.template_id,
            pages = template.page_count(),
            fields = template.total_fields(),
            "Session started"
        );

        let session = ActiveSession {
            info,
            template,
            pages,
            overlay: FieldOverlayRenderer::new(self.config.autofocus_filled),
            answers: AnswerStore::new(),
            submitting: None,
        };

        self.view = View::Answering;
        self.report = None;
        events.emit(SessionEvent::ViewChanged { view: View::Answering });
        events.emit(SessionEvent::StudentShown {
            name: session.info.student_name.clone(),
            class: session.info.student_class.clone(),
        });
        session.page_moved(Some(first), &self.config.uploads_prefix, events);
        self.active = Some(session);
        Ok(())
    }

    /// A page image finished loading; place its fields if it is still current
    pub fn page_image_loaded<S: OverlaySurface + ?Sized>(
        &mut self,
        ticket: PageTicket,
        image: ImageLayout,
        surface: &mut S,
        events: &mut EventQueue,
    ) -> Result<(), SessionError> {
        let Some(active) = self.active.as_mut() else {
            debug!(page = ticket.page, "Page image loaded without a session");
            return Ok(());
        };
        if !active.pages.is_current(ticket) {
            debug!(page = ticket.page, generation = ticket.generation, "Ignoring stale page image");
            return Ok(());
        }

        match active
            .overlay
            .render_page(surface, &active.template, ticket.page, &image, &active.answers)
        {
            Ok(RenderOutcome::Placed { .. }) => Ok(()),
            Ok(RenderOutcome::LayoutUnavailable) => {
                warn!(page = ticket.page, "Page image has no size, fields not placed");
                Ok(())
            }
            Err(e) => {
                warn!(page = ticket.page, error = %e, "Failed to place answer fields");
                active.overlay.image_failed(surface, "Answer fields could not be displayed");
                events.notify(NoticeKind::Rendering, e.to_string());
                Err(e.into())
            }
        }
    }

    /// A page image could not be loaded: placeholder instead of fields
    pub fn page_image_failed<S: OverlaySurface + ?Sized>(
        &mut self,
        ticket: PageTicket,
        surface: &mut S,
        events: &mut EventQueue,
    ) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.pages.is_current(ticket) {
            debug!(page = ticket.page, "Ignoring stale page image failure");
            return;
        }
        warn!(page = ticket.page, "Page image failed to load");
        active.overlay.image_failed(surface, "Failed to load page image");
        events.notify(
            NoticeKind::Rendering,
            format!("Failed to load page {}", ticket.page + 1),
        );
    }

    /// Keystroke in a field control
    pub fn input(&mut self, field_id: &str, raw: &str, events: &mut EventQueue) {
        self.record(field_id, raw, false, events);
    }

    /// A field control lost focus
    pub fn blur(&mut self, field_id: &str, raw: &str, events: &mut EventQueue) {
        self.record(field_id, raw, true, events);
    }

    fn record(&mut self, field_id: &str, raw: &str, trimmed: bool, events: &mut EventQueue) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let stored = if trimmed {
            active.overlay.record_blur(&mut active.answers, field_id, raw)
        } else {
            active.overlay.record_input(&mut active.answers, field_id, raw)
        };
        if !stored {
            debug!(%field_id, "Ignoring input from unmounted field");
            return;
        }

        let value = active.answers.get(field_id).unwrap_or_default().to_string();
        events.emit(SessionEvent::AnswerChanged {
            field_id: field_id.to_string(),
            value,
        });
        events.emit(SessionEvent::ProgressChanged(active.progress()));
    }

    pub fn next_page<S: OverlaySurface + ?Sized>(
        &mut self,
        surface: &mut S,
        events: &mut EventQueue,
    ) -> Result<(), SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        let ticket = active
            .pages
            .next(&mut active.overlay, surface, &mut active.answers);
        active.page_moved(ticket, &self.config.uploads_prefix, events);
        Ok(())
    }

    pub fn prev_page<S: OverlaySurface + ?Sized>(
        &mut self,
        surface: &mut S,
        events: &mut EventQueue,
    ) -> Result<(), SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        let ticket = active
            .pages
            .prev(&mut active.overlay, surface, &mut active.answers);
        active.page_moved(ticket, &self.config.uploads_prefix, events);
        Ok(())
    }

    pub fn go_to_page<S: OverlaySurface + ?Sized>(
        &mut self,
        index: usize,
        surface: &mut S,
        events: &mut EventQueue,
    ) -> Result<(), SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        let ticket = active
            .pages
            .go_to(index, &mut active.overlay, surface, &mut active.answers);
        active.page_moved(ticket, &self.config.uploads_prefix, events);
        Ok(())
    }

    /// The viewport rotated: keep page and answers, recompute field positions
    pub fn orientation_changed<S: OverlaySurface + ?Sized>(
        &mut self,
        surface: &mut S,
        events: &mut EventQueue,
    ) -> Result<(), SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        let ticket = active
            .pages
            .relayout(&active.overlay, surface, &mut active.answers);
        events.emit(SessionEvent::LayoutRequested {
            ticket,
            settle_ms: self.config.orientation_settle_ms,
        });
        Ok(())
    }

    /// Submit the answers for grading.
    ///
    /// An incomplete sheet is only sent when `confirmed` is set; otherwise
    /// [`SessionEvent::ConfirmationRequired`] is emitted and nothing is sent.
    pub fn submit<S: OverlaySurface + ?Sized>(
        &mut self,
        confirmed: bool,
        surface: &mut S,
        events: &mut EventQueue,
    ) -> Result<Option<ApiCall>, SessionError> {
        if self.view != View::Answering {
            return Err(SessionError::NoActiveSession);
        }
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        if active.submitting.is_some() {
            return Err(SessionError::SubmissionInFlight);
        }

        active.overlay.flush(surface, &mut active.answers);
        let progress = active.progress();
        events.emit(SessionEvent::ProgressChanged(progress));

        if !progress.is_complete() && !confirmed {
            debug!(filled = progress.filled, total = progress.total, "Submission needs confirmation");
            events.emit(SessionEvent::ConfirmationRequired {
                filled: progress.filled,
                total: progress.total,
            });
            return Ok(None);
        }

        let answers: BTreeMap<String, String> = active
            .answers
            .entries()
            .iter()
            .map(|(id, value)| (id.clone(), value.trim().to_string()))
            .collect();
        let request = api::check_answers(&GradingRequest {
            template_id: active.info.template_id.clone(),
            answers,
            student_info: StudentInfo {
                student_name: active.info.student_name.clone(),
                student_class: active.info.student_class.clone(),
            },
            sheet_url: active.info.sheet_url.clone(),
        })?;

        let ticket = self.tickets.issue();
        active.submitting = Some(ticket);
        info!(
            template_id = %active.info.template_id,
            filled = progress.filled,
            total = progress.total,
            "Submitting answers"
        );
        events.emit(SessionEvent::SubmitBusy { busy: true });
        Ok(Some(ApiCall { ticket, request }))
    }

    /// The grading service answered. The busy state is always released.
    ///
    /// On failure the session stays in the answering view with every answer
    /// kept, so the student can retry.
    pub fn grading_completed(
        &mut self,
        ticket: Ticket,
        result: Result<Value, FetchError>,
        events: &mut EventQueue,
    ) -> Result<(), SessionError> {
        let Some(active) = self.active.as_mut() else {
            debug!(ticket = ticket.0, "Grading response without a session");
            return Ok(());
        };
        if active.submitting != Some(ticket) {
            debug!(ticket = ticket.0, "Ignoring stale grading response");
            return Ok(());
        }
        active.submitting = None;
        events.emit(SessionEvent::SubmitBusy { busy: false });

        let response = match result.and_then(GradingResponse::decode) {
            Ok(response) => response,
            Err(e) => {
                warn!(template_id = %active.info.template_id, error = %e, "Grading failed");
                events.notify(NoticeKind::Grading, e.to_string());
                return Err(e.into());
            }
        };

        let report = ResultReport::reconcile(&response, &active.template.fields);
        info!(
            correct = report.correct_count,
            total = report.total_count,
            percentage = report.percentage,
            "Grading finished"
        );
        self.view = View::Results;
        events.emit(SessionEvent::ViewChanged { view: View::Results });
        events.emit(SessionEvent::ResultReady(report.clone()));
        self.report = Some(report);
        Ok(())
    }

    /// Discard the session and return to selection
    pub fn reset<S: OverlaySurface + ?Sized>(&mut self, surface: &mut S, events: &mut EventQueue) {
        if let Some(mut active) = self.active.take() {
            active.overlay.clear(surface);
            if active.submitting.is_some() {
                events.emit(SessionEvent::SubmitBusy { busy: false });
            }
        }
        self.pending_start = None;
        self.report = None;
        self.view = View::Selection;
        info!("Session reset");
        events.emit(SessionEvent::ViewChanged {
            view: View::Selection,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySurface;
    use serde_json::json;

    fn template_json() -> Value {
        json!({
            "template_id": "t1",
            "files": ["p0.png", "p1.png"],
            "fields": [
                {"id": "f1", "page": 0, "x": 10.0, "y": 10.0, "w": 50.0, "h": 20.0},
                {"id": "f2", "page": 1, "x": 10.0, "y": 10.0, "w": 50.0, "h": 20.0}
            ],
            "width": 600.0,
            "height": 800.0
        })
    }

    #[test]
    fn test_start_validates_in_form_order() {
        let mut session = SessionController::new(ClientConfig::default());
        let mut events = EventQueue::new();

        let err = session.start(" ", "", "", &mut events).unwrap_err();
        assert_eq!(err, SessionError::Validation(ValidationError::MissingName));
        let err = session.start("Ivan", "", "t1", &mut events).unwrap_err();
        assert_eq!(err, SessionError::Validation(ValidationError::MissingClass));
        let err = session.start("Ivan", "7A", "", &mut events).unwrap_err();
        assert_eq!(err, SessionError::Validation(ValidationError::MissingTemplate));
        assert_eq!(events.drain().len(), 3);
    }

    #[test]
    fn test_template_with_bad_page_reference_is_reported() {
        let mut session = SessionController::new(ClientConfig::default());
        let mut surface = MemorySurface::new();
        let mut events = EventQueue::new();

        let call = session.start("Ivan", "7A", "t1", &mut events).unwrap();
        let mut body = template_json();
        body["fields"][1]["page"] = json!(5);
        let err = session
            .template_loaded(call.ticket, Ok(body), &mut surface, &mut events)
            .unwrap_err();

        assert!(matches!(err, SessionError::Template(_)));
        assert_eq!(session.view(), View::Selection);
        assert!(session.info().is_none());
    }

    #[test]
    fn test_start_requests_first_page_image() {
        let mut session = SessionController::new(ClientConfig::default());
        let mut surface = MemorySurface::new();
        let mut events = EventQueue::new();

        let call = session.start("Ivan", "7A", "t1", &mut events).unwrap();
        assert_eq!(call.request.path, "/load_template/t1");
        session
            .template_loaded(call.ticket, Ok(template_json()), &mut surface, &mut events)
            .unwrap();

        let events = events.drain();
        assert!(events.contains(&SessionEvent::ViewChanged {
            view: View::Answering
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::PageImageRequested { ticket, url }
                if ticket.page == 0 && url == "/uploads/p0.png"
        )));
        assert_eq!(session.progress(), Some(Progress { filled: 0, total: 2 }));
    }

    #[test]
    fn test_stale_template_response_is_ignored() {
        let mut session = SessionController::new(ClientConfig::default());
        let mut surface = MemorySurface::new();
        let mut events = EventQueue::new();

        let first = session.start("Ivan", "7A", "t1", &mut events).unwrap();
        let second = session.start("Ivan", "7A", "t2", &mut events).unwrap();
        session
            .template_loaded(first.ticket, Ok(template_json()), &mut surface, &mut events)
            .unwrap();
        assert!(session.info().is_none());

        session
            .template_loaded(second.ticket, Ok(template_json()), &mut surface, &mut events)
            .unwrap();
        assert_eq!(session.info().map(|i| i.template_id.as_str()), Some("t2"));
    }

    #[test]
    fn test_navigation_without_session() {
        let mut session = SessionController::new(ClientConfig::default());
        let mut surface = MemorySurface::new();
        let mut events = EventQueue::new();
        assert_eq!(
            session.next_page(&mut surface, &mut events),
            Err(SessionError::NoActiveSession)
        );
    }
}
