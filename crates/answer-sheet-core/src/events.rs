//! Typed notifications from the engine to the UI binding layer
//!
//! Components push events into an [`EventQueue`]; the embedding layer drains
//! the queue after each call and updates the page. Draining after the call
//! returns lets listeners call back into the engine without re-entrancy.

use crate::answers::Progress;
use crate::pagination::{PageIndicator, PageTicket};
use crate::report::ResultReport;
use crate::wizard::WizardSnapshot;
use serde::Serialize;
use std::collections::VecDeque;

/// Which top-level panel is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Selection,
    Answering,
    Results,
}

/// Error classes surfaced to the student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Validation,
    Fetch,
    EmptyResult,
    Grading,
    Rendering,
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    ViewChanged {
        view: View,
    },
    SelectionChanged(WizardSnapshot),
    /// Student header shown above the document
    StudentShown {
        name: String,
        class: String,
    },
    /// The binding layer must load this image and report its layout
    PageImageRequested {
        ticket: PageTicket,
        url: String,
    },
    /// The displayed image is unchanged but its size may have; measure it
    /// again once the viewport has settled
    LayoutRequested {
        ticket: PageTicket,
        settle_ms: u32,
    },
    PageChanged(PageIndicator),
    AnswerChanged {
        field_id: String,
        value: String,
    },
    ProgressChanged(Progress),
    /// Submission is incomplete; resubmit with confirmation to proceed
    ConfirmationRequired {
        filled: usize,
        total: usize,
    },
    SubmitBusy {
        busy: bool,
    },
    ResultReady(ResultReport),
    Notice(Notice),
}

#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<SessionEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.pending.push_back(event);
    }

    pub fn notify(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.emit(SessionEvent::Notice(Notice::new(kind, message)));
    }

    /// Take every pending event in emission order
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
