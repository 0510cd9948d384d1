//! Test selection before a session starts
//!
//! With a school in the entry URL the student narrows the pool step by step:
//! class, subject, topic, test. Without one, a flat test list and a class
//! picker are offered instead (legacy mode).
//!
//! A selection only takes effect once the data for the next step has arrived
//! and is non-empty. Until then the wizard stays where it was, so a failed
//! fetch never moves it forward. Going back is immediate: the step is
//! decremented and its selection dropped before the reload is sent.

use crate::api::{self, ApiCall, ApiRequest, SchoolScope, Subject, Ticket, TicketCounter};
use crate::error::{FetchError, ValidationError};
use crate::events::{EventQueue, NoticeKind, SessionEvent};
use crate::template::{Template, TemplateSummary};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

lazy_static! {
    static ref SCHOOL_PATH: Regex = Regex::new(r"^/student/([^/]+)/([^/]+)/?$").unwrap();
}

/// How the selection page was entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMode {
    Wizard {
        city_code: String,
        school_code: String,
    },
    Legacy,
}

impl EntryMode {
    /// `/student/{city}/{school}` enables the wizard; any other path is legacy
    pub fn from_path(path: &str) -> Self {
        let Some(caps) = SCHOOL_PATH.captures(path) else {
            return EntryMode::Legacy;
        };
        let decode = |raw: &str| {
            urlencoding::decode(raw)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        };
        EntryMode::Wizard {
            city_code: decode(&caps[1]),
            school_code: decode(&caps[2]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WizardStep {
    Class = 1,
    Subject = 2,
    Topic = 3,
    Test = 4,
}

impl WizardStep {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            WizardStep::Class => None,
            WizardStep::Subject => Some(WizardStep::Class),
            WizardStep::Topic => Some(WizardStep::Subject),
            WizardStep::Test => Some(WizardStep::Topic),
        }
    }

    fn empty_message(self) -> &'static str {
        match self {
            WizardStep::Class => "No classes are available for this school",
            WizardStep::Subject => "No subjects are available for this class",
            WizardStep::Topic => "No topics are available for this subject",
            WizardStep::Test => "No tests are available for this topic",
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            WizardStep::Class => "Failed to load classes",
            WizardStep::Subject => "Failed to load subjects",
            WizardStep::Topic => "Failed to load topics",
            WizardStep::Test => "Failed to load tests",
        }
    }
}

/// Options for the final class confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassChoices {
    pub options: Vec<String>,
    pub preselected: Option<String>,
}

impl ClassChoices {
    fn list(options: Vec<String>) -> Self {
        Self {
            options,
            preselected: None,
        }
    }

    fn single(label: String) -> Self {
        Self {
            options: vec![label.clone()],
            preselected: Some(label),
        }
    }
}

/// The pair a session is started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub template_id: String,
    pub student_class: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Wizard,
    Legacy,
}

/// Everything the selection panel shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardSnapshot {
    pub mode: ModeKind,
    /// 1..=4 in wizard mode
    pub step: Option<u8>,
    pub loading: bool,
    pub can_go_back: bool,
    pub class_levels: Vec<u32>,
    pub subjects: Vec<Subject>,
    pub topics: Vec<String>,
    pub templates: Vec<TemplateSummary>,
    pub selected_class: Option<u32>,
    pub selected_subject_id: Option<String>,
    pub selected_topic: Option<String>,
    pub selected_template: Option<String>,
    pub class_choices: Option<ClassChoices>,
}

/// Selection made on the step before the one being loaded
#[derive(Debug, Clone, PartialEq)]
enum Choice {
    None,
    Class(u32),
    Subject(Subject),
    Topic(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Pending {
    /// Options for `step`; `choice` is committed with them
    Options { step: WizardStep, choice: Choice },
    TemplateClasses {
        template_id: String,
    },
    LegacyTemplates,
    LegacyTemplateClasses {
        template_id: String,
    },
    StaticClasses,
}

enum StepOptions {
    Classes(Vec<u32>),
    Subjects(Vec<Subject>),
    Topics(Vec<String>),
    Templates(Vec<TemplateSummary>),
}

impl StepOptions {
    fn decode(step: WizardStep, value: Value) -> Result<Self, FetchError> {
        Ok(match step {
            WizardStep::Class => StepOptions::Classes(api::decode_classes(value)?),
            WizardStep::Subject => StepOptions::Subjects(api::decode_subjects(value)?),
            WizardStep::Topic => StepOptions::Topics(api::decode_topics(value)?),
            WizardStep::Test => StepOptions::Templates(api::decode_filtered_templates(value)?),
        })
    }

    fn is_empty(&self) -> bool {
        match self {
            StepOptions::Classes(v) => v.is_empty(),
            StepOptions::Subjects(v) => v.is_empty(),
            StepOptions::Topics(v) => v.is_empty(),
            StepOptions::Templates(v) => v.is_empty(),
        }
    }
}

#[derive(Debug)]
pub struct SelectionWizard {
    mode: EntryMode,
    step: WizardStep,
    class_levels: Vec<u32>,
    subjects: Vec<Subject>,
    topics: Vec<String>,
    templates: Vec<TemplateSummary>,
    selected_class: Option<u32>,
    selected_subject: Option<Subject>,
    selected_topic: Option<String>,
    selected_template: Option<String>,
    class_choices: Option<ClassChoices>,
    fallback_classes: Vec<String>,
    tickets: TicketCounter,
    outstanding: Option<(Ticket, Pending)>,
}

impl SelectionWizard {
    pub fn new(mode: EntryMode, fallback_classes: Vec<String>) -> Self {
        Self {
            mode,
            step: WizardStep::Class,
            class_levels: Vec::new(),
            subjects: Vec::new(),
            topics: Vec::new(),
            templates: Vec::new(),
            selected_class: None,
            selected_subject: None,
            selected_topic: None,
            selected_template: None,
            class_choices: None,
            fallback_classes,
            tickets: TicketCounter::default(),
            outstanding: None,
        }
    }

    pub fn mode(&self) -> &EntryMode {
        &self.mode
    }

    /// Current step; `None` in legacy mode
    pub fn step(&self) -> Option<WizardStep> {
        match self.mode {
            EntryMode::Wizard { .. } => Some(self.step),
            EntryMode::Legacy => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Load the first data set: class levels, or the flat test list
    pub fn begin(&mut self, events: &mut EventQueue) -> Option<ApiCall> {
        let call = match &self.mode {
            EntryMode::Wizard { .. } => self.request_options(WizardStep::Class, Choice::None),
            EntryMode::Legacy => Some(self.issue(Pending::LegacyTemplates, api::list_templates())),
        };
        self.publish(events);
        call
    }

    pub fn select_class(
        &mut self,
        level: u32,
        events: &mut EventQueue,
    ) -> Result<ApiCall, ValidationError> {
        self.require_wizard()?;
        if !self.class_levels.contains(&level) {
            return Err(ValidationError::UnknownOption(level.to_string()));
        }
        self.forward(WizardStep::Subject, Choice::Class(level), events)
    }

    pub fn select_subject(
        &mut self,
        subject_id: &str,
        events: &mut EventQueue,
    ) -> Result<ApiCall, ValidationError> {
        self.require_step(WizardStep::Subject)?;
        let subject = self
            .subjects
            .iter()
            .find(|s| s.id == subject_id)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownOption(subject_id.to_string()))?;
        self.forward(WizardStep::Topic, Choice::Subject(subject), events)
    }

    pub fn select_topic(
        &mut self,
        topic: &str,
        events: &mut EventQueue,
    ) -> Result<ApiCall, ValidationError> {
        self.require_step(WizardStep::Topic)?;
        if !self.topics.iter().any(|t| t == topic) {
            return Err(ValidationError::UnknownOption(topic.to_string()));
        }
        self.forward(WizardStep::Test, Choice::Topic(topic.to_string()), events)
    }

    /// Pick a test and load its class list for the final confirmation
    pub fn select_template(
        &mut self,
        template_id: &str,
        events: &mut EventQueue,
    ) -> Result<ApiCall, ValidationError> {
        if self.step().is_some() {
            self.require_step(WizardStep::Test)?;
        }
        if !self.templates.iter().any(|t| t.id == template_id) {
            return Err(ValidationError::UnknownOption(template_id.to_string()));
        }

        let template_id = template_id.to_string();
        let request = api::load_template(&template_id);
        let pending = match self.mode {
            EntryMode::Wizard { .. } => Pending::TemplateClasses { template_id },
            EntryMode::Legacy => {
                self.selected_template = Some(template_id.clone());
                Pending::LegacyTemplateClasses { template_id }
            }
        };
        let call = self.issue(pending, request);
        self.publish(events);
        Ok(call)
    }

    /// Step back one step and reload its options. No-op on the first step
    /// and in legacy mode.
    pub fn go_back(&mut self, events: &mut EventQueue) -> Option<ApiCall> {
        let target = self.step()?.previous()?;
        let call = self.retreat_to(target);
        self.publish(events);
        call
    }

    /// Feed the outcome of a request issued by this wizard.
    ///
    /// Returns a follow-up request when the outcome needs one (reloading
    /// after an empty step, or walking the class fallback chain).
    pub fn fetch_completed(
        &mut self,
        ticket: Ticket,
        result: Result<Value, FetchError>,
        events: &mut EventQueue,
    ) -> Option<ApiCall> {
        match &self.outstanding {
            Some((expected, _)) if *expected == ticket => {}
            _ => {
                debug!(ticket = ticket.0, "Ignoring stale selection response");
                return None;
            }
        }
        let (_, pending) = self.outstanding.take()?;

        let next = match pending {
            Pending::Options { step, choice } => self.options_loaded(step, choice, result, events),
            Pending::TemplateClasses { template_id } => {
                self.template_classes_loaded(template_id, result, events);
                None
            }
            Pending::LegacyTemplates => self.legacy_templates_loaded(result, events),
            Pending::LegacyTemplateClasses { template_id } => {
                self.legacy_template_classes_loaded(template_id, result)
            }
            Pending::StaticClasses => {
                self.static_classes_loaded(result);
                None
            }
        };

        self.publish(events);
        next
    }

    /// Final (template, class) pair, validated
    pub fn complete(&self, student_class: &str) -> Result<Selection, ValidationError> {
        let template_id = self
            .selected_template
            .clone()
            .ok_or(ValidationError::MissingTemplate)?;
        let student_class = student_class.trim();
        if student_class.is_empty() {
            return Err(ValidationError::MissingClass);
        }
        Ok(Selection {
            template_id,
            student_class: student_class.to_string(),
        })
    }

    pub fn class_choices(&self) -> Option<&ClassChoices> {
        self.class_choices.as_ref()
    }

    pub fn chosen_template(&self) -> Option<&str> {
        self.selected_template.as_deref()
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        let wizard = self.step();
        WizardSnapshot {
            mode: match wizard {
                Some(_) => ModeKind::Wizard,
                None => ModeKind::Legacy,
            },
            step: wizard.map(WizardStep::number),
            loading: self.is_loading(),
            can_go_back: wizard.and_then(WizardStep::previous).is_some(),
            class_levels: self.class_levels.clone(),
            subjects: self.subjects.clone(),
            topics: self.topics.clone(),
            templates: self.templates.clone(),
            selected_class: self.selected_class,
            selected_subject_id: self.selected_subject.as_ref().map(|s| s.id.clone()),
            selected_topic: self.selected_topic.clone(),
            selected_template: self.selected_template.clone(),
            class_choices: self.class_choices.clone(),
        }
    }

    fn publish(&self, events: &mut EventQueue) {
        events.emit(SessionEvent::SelectionChanged(self.snapshot()));
    }

    fn require_wizard(&self) -> Result<WizardStep, ValidationError> {
        self.step().ok_or(ValidationError::WrongMode)
    }

    fn require_step(&self, step: WizardStep) -> Result<(), ValidationError> {
        let current = self.require_wizard()?;
        if current < step {
            return Err(ValidationError::WrongStep {
                expected: step.number(),
                actual: current.number(),
            });
        }
        Ok(())
    }

    fn forward(
        &mut self,
        step: WizardStep,
        choice: Choice,
        events: &mut EventQueue,
    ) -> Result<ApiCall, ValidationError> {
        let call = self
            .request_options(step, choice)
            .ok_or(ValidationError::WrongStep {
                expected: step.number(),
                actual: self.step.number(),
            })?;
        self.publish(events);
        Ok(call)
    }

    fn issue(&mut self, pending: Pending, request: ApiRequest) -> ApiCall {
        let ticket = self.tickets.issue();
        if let Some((superseded, _)) = self.outstanding.replace((ticket, pending)) {
            debug!(ticket = superseded.0, "Superseded selection request");
        }
        ApiCall { ticket, request }
    }

    fn scope<'a>(&'a self, class_level: u32, subject_id: &'a str) -> Option<SchoolScope<'a>> {
        match &self.mode {
            EntryMode::Wizard {
                city_code,
                school_code,
            } => Some(SchoolScope {
                city_code,
                school_code,
                class_level,
                subject_id,
            }),
            EntryMode::Legacy => None,
        }
    }

    /// Build the request for `step`, given the choice made on the step before it
    fn options_request(&self, step: WizardStep, choice: &Choice) -> Option<ApiRequest> {
        match (step, choice) {
            (WizardStep::Class, Choice::None) => match &self.mode {
                EntryMode::Wizard {
                    city_code,
                    school_code,
                } => Some(api::classes_by_school(city_code, school_code)),
                EntryMode::Legacy => None,
            },
            (WizardStep::Subject, Choice::Class(level)) => Some(api::subjects(*level)),
            (WizardStep::Topic, Choice::Subject(subject)) => {
                let scope = self.scope(self.selected_class?, &subject.id)?;
                Some(api::topics(&scope))
            }
            (WizardStep::Test, Choice::Topic(topic)) => {
                let subject = self.selected_subject.as_ref()?;
                let scope = self.scope(self.selected_class?, &subject.id)?;
                Some(api::filtered_templates(&scope, topic))
            }
            _ => None,
        }
    }

    fn request_options(&mut self, step: WizardStep, choice: Choice) -> Option<ApiCall> {
        let request = self.options_request(step, &choice)?;
        Some(self.issue(Pending::Options { step, choice }, request))
    }

    /// Move back to `step` at once, dropping the selection made on it and
    /// everything after it, then reload its options
    fn retreat_to(&mut self, step: WizardStep) -> Option<ApiCall> {
        if self.step != step {
            info!(from = self.step.number(), to = step.number(), "Wizard going back");
        }
        self.truncate(step);
        self.step = step;
        self.refetch(step)
    }

    /// Reload the options of `step` from the committed selections
    fn refetch(&mut self, step: WizardStep) -> Option<ApiCall> {
        let choice = match step {
            WizardStep::Class => Some(Choice::None),
            WizardStep::Subject => self.selected_class.map(Choice::Class),
            WizardStep::Topic => self.selected_subject.clone().map(Choice::Subject),
            WizardStep::Test => self.selected_topic.clone().map(Choice::Topic),
        };
        match choice {
            Some(choice) => self.request_options(step, choice),
            None => {
                warn!(step = step.number(), "Selection missing for reload, restarting");
                self.step = WizardStep::Class;
                self.truncate(WizardStep::Class);
                self.request_options(WizardStep::Class, Choice::None)
            }
        }
    }

    fn options_loaded(
        &mut self,
        step: WizardStep,
        choice: Choice,
        result: Result<Value, FetchError>,
        events: &mut EventQueue,
    ) -> Option<ApiCall> {
        let options = match result.and_then(|value| StepOptions::decode(step, value)) {
            Ok(options) => options,
            Err(e) => {
                warn!(step = step.number(), error = %e, "Selection fetch failed");
                events.notify(
                    NoticeKind::Fetch,
                    format!("{}: {}", step.failure_message(), e),
                );
                return None;
            }
        };

        if !options.is_empty() {
            self.commit(step, choice, options);
            return None;
        }

        info!(step = step.number(), "Selection step has no options");
        events.notify(NoticeKind::EmptyResult, step.empty_message());

        // Drop the choice and go back to the step it was made on; a reload
        // that is empty again keeps walking back until step 1
        match step.previous() {
            Some(previous) => self.retreat_to(previous),
            None => {
                self.commit(step, choice, options);
                None
            }
        }
    }

    fn commit(&mut self, step: WizardStep, choice: Choice, options: StepOptions) {
        match choice {
            Choice::None => {}
            Choice::Class(level) => self.selected_class = Some(level),
            Choice::Subject(subject) => self.selected_subject = Some(subject),
            Choice::Topic(topic) => self.selected_topic = Some(topic),
        }
        self.truncate(step);

        match options {
            StepOptions::Classes(levels) => self.class_levels = levels,
            StepOptions::Subjects(subjects) => self.subjects = subjects,
            StepOptions::Topics(topics) => self.topics = topics,
            StepOptions::Templates(templates) => self.templates = templates,
        }

        if self.step != step {
            info!(from = self.step.number(), to = step.number(), "Wizard step changed");
        }
        self.step = step;
    }

    /// Clear selections made on `step` and later, and options after it
    fn truncate(&mut self, step: WizardStep) {
        if step <= WizardStep::Class {
            self.selected_class = None;
            self.subjects.clear();
        }
        if step <= WizardStep::Subject {
            self.selected_subject = None;
            self.topics.clear();
        }
        if step <= WizardStep::Topic {
            self.selected_topic = None;
            self.templates.clear();
        }
        self.selected_template = None;
        self.class_choices = None;
    }

    fn template_classes_loaded(
        &mut self,
        template_id: String,
        result: Result<Value, FetchError>,
        events: &mut EventQueue,
    ) {
        let template = result.and_then(|value| {
            Template::from_json(value).map_err(|e| FetchError::Decode(e.to_string()))
        });
        match template {
            Ok(template) => {
                let choices = if template.classes.is_empty() {
                    let label = self.selected_class.map(|l| l.to_string()).unwrap_or_default();
                    ClassChoices::single(label)
                } else {
                    ClassChoices::list(template.classes)
                };
                debug!(%template_id, options = choices.options.len(), "Test chosen");
                self.selected_template = Some(template_id);
                self.class_choices = Some(choices);
            }
            Err(e) => {
                warn!(%template_id, error = %e, "Failed to load test classes");
                events.notify(NoticeKind::Fetch, format!("Failed to load the test: {}", e));
            }
        }
    }

    fn legacy_templates_loaded(
        &mut self,
        result: Result<Value, FetchError>,
        events: &mut EventQueue,
    ) -> Option<ApiCall> {
        match result.and_then(api::decode_template_list) {
            Ok(templates) => {
                if templates.is_empty() {
                    events.notify(NoticeKind::EmptyResult, "No tests are available");
                }
                self.templates = templates;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load test list");
                events.notify(
                    NoticeKind::Fetch,
                    format!("Failed to load the test list: {}", e),
                );
            }
        }

        if self.class_choices.is_none() {
            Some(self.issue(Pending::StaticClasses, api::static_classes()))
        } else {
            None
        }
    }

    fn legacy_template_classes_loaded(
        &mut self,
        template_id: String,
        result: Result<Value, FetchError>,
    ) -> Option<ApiCall> {
        let classes = result
            .ok()
            .and_then(|value| Template::from_json(value).ok())
            .map(|t| t.classes)
            .unwrap_or_default();

        if classes.is_empty() {
            debug!(%template_id, "Test declares no classes, using site list");
            return Some(self.issue(Pending::StaticClasses, api::static_classes()));
        }
        self.class_choices = Some(ClassChoices::list(classes));
        None
    }

    fn static_classes_loaded(&mut self, result: Result<Value, FetchError>) {
        let classes = match result.and_then(api::decode_static_classes) {
            Ok(classes) if !classes.is_empty() => classes,
            Ok(_) => {
                warn!("Site class list is empty, using configured classes");
                self.fallback_classes.clone()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load site class list, using configured classes");
                self.fallback_classes.clone()
            }
        };
        self.class_choices = Some(ClassChoices::list(classes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Method;
    use crate::events::Notice;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn wizard() -> SelectionWizard {
        SelectionWizard::new(EntryMode::from_path("/student/msk/1535"), vec![])
    }

    fn notices(events: &mut EventQueue) -> Vec<Notice> {
        events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Notice(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Walk to step 2 with class 7 selected
    fn at_subjects(w: &mut SelectionWizard, events: &mut EventQueue) {
        let call = w.begin(events).unwrap();
        w.fetch_completed(call.ticket, Ok(json!({"success": true, "classes": [5, 7]})), events);
        let call = w.select_class(7, events).unwrap();
        w.fetch_completed(
            call.ticket,
            Ok(json!({"success": true, "subjects": [{"id": 1, "name": "Math"}, {"id": 2, "name": "Physics"}]})),
            events,
        );
    }

    #[test]
    fn test_entry_mode_from_path() {
        assert_eq!(
            EntryMode::from_path("/student/msk/1535"),
            EntryMode::Wizard {
                city_code: "msk".to_string(),
                school_code: "1535".to_string()
            }
        );
        assert_eq!(
            EntryMode::from_path("/student/%D0%BC%D1%81%D0%BA/7/"),
            EntryMode::Wizard {
                city_code: "мск".to_string(),
                school_code: "7".to_string()
            }
        );
        assert_eq!(EntryMode::from_path("/student"), EntryMode::Legacy);
        assert_eq!(EntryMode::from_path("/student/msk"), EntryMode::Legacy);
        assert_eq!(EntryMode::from_path("/student/a/b/c"), EntryMode::Legacy);
    }

    #[test]
    fn test_begin_requests_school_classes() {
        let mut w = wizard();
        let mut events = EventQueue::new();
        let call = w.begin(&mut events).unwrap();
        assert_eq!(call.request.path, "/api/classes/by-school/msk/1535");
        assert_eq!(call.request.method, Method::Get);
        assert!(w.is_loading());
    }

    #[test]
    fn test_selection_commits_only_after_data_arrives() {
        let mut w = wizard();
        let mut events = EventQueue::new();
        let call = w.begin(&mut events).unwrap();
        w.fetch_completed(call.ticket, Ok(json!({"success": true, "classes": [7]})), &mut events);

        let call = w.select_class(7, &mut events).unwrap();
        assert_eq!(call.request.path, "/api/subjects?class_level=7");
        assert_eq!(w.step(), Some(WizardStep::Class));
        assert_eq!(w.snapshot().selected_class, None);

        w.fetch_completed(
            call.ticket,
            Ok(json!({"success": true, "subjects": [{"id": "1", "name": "Math"}]})),
            &mut events,
        );
        assert_eq!(w.step(), Some(WizardStep::Subject));
        assert_eq!(w.snapshot().selected_class, Some(7));
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let mut w = wizard();
        let mut events = EventQueue::new();
        at_subjects(&mut w, &mut events);
        assert_eq!(
            w.select_class(11, &mut events).unwrap_err(),
            ValidationError::UnknownOption("11".to_string())
        );
        assert_eq!(
            w.select_topic("Fractions", &mut events).unwrap_err(),
            ValidationError::WrongStep {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_empty_step_goes_back() {
        let mut w = wizard();
        let mut events = EventQueue::new();
        at_subjects(&mut w, &mut events);
        events.drain();

        let call = w.select_subject("2", &mut events).unwrap();
        let reload = w
            .fetch_completed(call.ticket, Ok(json!({"success": true, "topics": []})), &mut events)
            .unwrap();

        assert_eq!(reload.request.path, "/api/subjects?class_level=7");
        assert_eq!(w.step(), Some(WizardStep::Subject));
        assert_eq!(w.snapshot().selected_subject_id, None);
        assert_eq!(
            notices(&mut events),
            vec![Notice::new(
                NoticeKind::EmptyResult,
                "No topics are available for this subject"
            )]
        );
    }

    #[test]
    fn test_fetch_error_does_not_advance() {
        let mut w = wizard();
        let mut events = EventQueue::new();
        at_subjects(&mut w, &mut events);
        events.drain();

        let call = w.select_subject("1", &mut events).unwrap();
        let next = w.fetch_completed(
            call.ticket,
            Err(FetchError::Network("offline".to_string())),
            &mut events,
        );
        assert_eq!(next, None);
        assert_eq!(w.step(), Some(WizardStep::Subject));
        assert!(!w.is_loading());
        let notices = notices(&mut events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Fetch);
    }

    #[test]
    fn test_stale_response_is_ignored() {
        let mut w = wizard();
        let mut events = EventQueue::new();
        at_subjects(&mut w, &mut events);

        let first = w.select_subject("1", &mut events).unwrap();
        let second = w.select_subject("2", &mut events).unwrap();

        w.fetch_completed(
            first.ticket,
            Ok(json!({"success": true, "topics": ["Mechanics"]})),
            &mut events,
        );
        assert_eq!(w.step(), Some(WizardStep::Subject));

        w.fetch_completed(
            second.ticket,
            Ok(json!({"success": true, "topics": ["Optics"]})),
            &mut events,
        );
        let snapshot = w.snapshot();
        assert_eq!(snapshot.selected_subject_id.as_deref(), Some("2"));
        assert_eq!(snapshot.topics, vec!["Optics".to_string()]);
    }

    #[test]
    fn test_go_back_reloads_previous_step() {
        let mut w = wizard();
        let mut events = EventQueue::new();
        at_subjects(&mut w, &mut events);

        let call = w.go_back(&mut events).unwrap();
        assert_eq!(call.request.path, "/api/classes/by-school/msk/1535");
        w.fetch_completed(call.ticket, Ok(json!({"success": true, "classes": [5, 7, 9]})), &mut events);

        let snapshot = w.snapshot();
        assert_eq!(snapshot.step, Some(1));
        assert_eq!(snapshot.selected_class, None);
        assert!(snapshot.subjects.is_empty());
        assert_eq!(snapshot.class_levels, vec![5, 7, 9]);
        assert!(w.go_back(&mut events).is_none());
    }

    #[test]
    fn test_template_without_classes_falls_back_to_selected_level() {
        let mut w = wizard();
        let mut events = EventQueue::new();
        at_subjects(&mut w, &mut events);
        let call = w.select_subject("1", &mut events).unwrap();
        w.fetch_completed(call.ticket, Ok(json!({"success": true, "topics": ["Fractions"]})), &mut events);
        let call = w.select_topic("Fractions", &mut events).unwrap();
        w.fetch_completed(
            call.ticket,
            Ok(json!({"success": true, "templates": [{"id": "t1", "name": "Fractions 1"}]})),
            &mut events,
        );

        let call = w.select_template("t1", &mut events).unwrap();
        assert_eq!(call.request.path, "/load_template/t1");
        w.fetch_completed(
            call.ticket,
            Ok(json!({"files": ["p0.png"], "fields": [], "classes": []})),
            &mut events,
        );

        assert_eq!(w.chosen_template(), Some("t1"));
        assert_eq!(
            w.class_choices(),
            Some(&ClassChoices {
                options: vec!["7".to_string()],
                preselected: Some("7".to_string())
            })
        );
        assert_eq!(
            w.complete("7").unwrap(),
            Selection {
                template_id: "t1".to_string(),
                student_class: "7".to_string()
            }
        );
    }

    #[test]
    fn test_complete_requires_template_and_class() {
        let w = wizard();
        assert_eq!(w.complete("7A"), Err(ValidationError::MissingTemplate));
    }

    #[test]
    fn test_legacy_mode_loads_list_then_site_classes() {
        let mut w = SelectionWizard::new(EntryMode::Legacy, vec!["5А".to_string()]);
        let mut events = EventQueue::new();

        let call = w.begin(&mut events).unwrap();
        assert_eq!(call.request.path, "/list_templates");
        let classes_call = w
            .fetch_completed(call.ticket, Ok(json!([{"id": "t1", "name": "Algebra"}])), &mut events)
            .unwrap();
        assert_eq!(classes_call.request.path, "/static/classes.json");

        w.fetch_completed(
            classes_call.ticket,
            Err(FetchError::Status {
                status: 404,
                message: "HTTP 404".to_string(),
            }),
            &mut events,
        );
        assert_eq!(
            w.class_choices().map(|c| c.options.clone()),
            Some(vec!["5А".to_string()])
        );
        assert_eq!(w.step(), None);
        assert_eq!(
            w.select_class(7, &mut events).unwrap_err(),
            ValidationError::WrongMode
        );
    }

    #[test]
    fn test_legacy_template_classes_take_precedence() {
        let mut w = SelectionWizard::new(EntryMode::Legacy, vec![]);
        let mut events = EventQueue::new();
        let call = w.begin(&mut events).unwrap();
        let classes_call = w
            .fetch_completed(call.ticket, Ok(json!([{"id": "t1"}])), &mut events)
            .unwrap();
        w.fetch_completed(classes_call.ticket, Ok(json!(["5А", "5Б"])), &mut events);

        let call = w.select_template("t1", &mut events).unwrap();
        assert_eq!(w.chosen_template(), Some("t1"));
        let next = w.fetch_completed(
            call.ticket,
            Ok(json!({"files": ["p0.png"], "classes": ["7А", "7Б"]})),
            &mut events,
        );
        assert_eq!(next, None);
        assert_eq!(
            w.class_choices().map(|c| c.options.clone()),
            Some(vec!["7А".to_string(), "7Б".to_string()])
        );
    }
}
