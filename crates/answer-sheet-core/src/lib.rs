//! Session engine for answering scanned test sheets
//!
//! This crate holds the browser-independent part of the student client:
//! placing answer fields over page images, keeping the student's answers,
//! paging, the test selection wizard, and turning a grading response into a
//! result report.
//!
//! The engine performs no I/O. Operations that need the backend return an
//! [`ApiCall`]; the embedder performs it and passes the decoded body back
//! with the call's ticket. Field controls are created through an
//! [`OverlaySurface`], and UI updates are published as [`SessionEvent`]s.

pub mod answers;
pub mod api;
pub mod config;
pub mod coords;
pub mod error;
pub mod events;
pub mod overlay;
pub mod pagination;
pub mod report;
pub mod session;
pub mod template;
pub mod wizard;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use answers::{AnswerStore, Progress};
pub use api::{ApiCall, ApiRequest, Method, Ticket};
pub use config::ClientConfig;
pub use coords::{pdf_rect_to_screen, screen_rect_to_pdf, PageLayout, PageSize, PdfRect, ScreenRect};
pub use error::{FetchError, SessionError, SurfaceError, TemplateError, ValidationError};
pub use events::{EventQueue, Notice, NoticeKind, SessionEvent, View};
pub use overlay::{FieldOverlayRenderer, ImageLayout, OverlaySurface};
pub use pagination::{PageIndicator, PageTicket, PaginationController};
pub use report::{CheckMethod, ResultReport, ScoreBand, SheetsStatus};
pub use session::{SessionController, SessionInfo};
pub use template::{Field, Template, TemplateSummary};
pub use wizard::{EntryMode, SelectionWizard, WizardSnapshot, WizardStep};
