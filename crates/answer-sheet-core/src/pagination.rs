//! Page navigation for the active template
//!
//! Every transition flushes the mounted controls into the answer store before
//! the page index moves. The new page is not rendered here: the controller
//! hands out a [`PageTicket`] for the page image, and fields are placed once
//! the image reports its layout under a ticket that is still current.

use crate::answers::AnswerStore;
use crate::overlay::{FieldOverlayRenderer, OverlaySurface};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies one page image load.
///
/// The generation changes on every navigation and re-layout, so a load that
/// finishes after the student has moved on is recognisably stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageTicket {
    pub page: usize,
    pub generation: u64,
}

/// State of the page indicator and navigation buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageIndicator {
    /// 1-based
    pub current: usize,
    pub total: usize,
    pub prev_enabled: bool,
    pub next_enabled: bool,
    /// Hidden for single-page templates
    pub visible: bool,
}

#[derive(Debug)]
pub struct PaginationController {
    current: usize,
    page_count: usize,
    generation: u64,
}

impl PaginationController {
    /// Start at the first page. The caller loads the image for the returned ticket.
    pub fn open(page_count: usize) -> (Self, PageTicket) {
        let controller = Self {
            current: 0,
            page_count,
            generation: 1,
        };
        let ticket = controller.ticket();
        (controller, ticket)
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Advance one page. No-op on the last page.
    pub fn next<S: OverlaySurface + ?Sized>(
        &mut self,
        overlay: &mut FieldOverlayRenderer,
        surface: &mut S,
        store: &mut AnswerStore,
    ) -> Option<PageTicket> {
        let target = self.current + 1;
        self.transition(target, overlay, surface, store)
    }

    /// Go back one page. No-op on the first page.
    pub fn prev<S: OverlaySurface + ?Sized>(
        &mut self,
        overlay: &mut FieldOverlayRenderer,
        surface: &mut S,
        store: &mut AnswerStore,
    ) -> Option<PageTicket> {
        let target = self.current.checked_sub(1)?;
        self.transition(target, overlay, surface, store)
    }

    /// Jump to `index`. Out-of-range indices are ignored.
    pub fn go_to<S: OverlaySurface + ?Sized>(
        &mut self,
        index: usize,
        overlay: &mut FieldOverlayRenderer,
        surface: &mut S,
        store: &mut AnswerStore,
    ) -> Option<PageTicket> {
        self.transition(index, overlay, surface, store)
    }

    /// The rendering surface changed size: keep the page, recompute geometry.
    ///
    /// Answers are flushed first; the current controls stay mounted until the
    /// image reports its new layout.
    pub fn relayout<S: OverlaySurface + ?Sized>(
        &mut self,
        overlay: &FieldOverlayRenderer,
        surface: &S,
        store: &mut AnswerStore,
    ) -> PageTicket {
        overlay.flush(surface, store);
        self.generation += 1;
        debug!(page = self.current, generation = self.generation, "Re-layout requested");
        self.ticket()
    }

    /// Whether an image load still matches the displayed page and layout
    pub fn is_current(&self, ticket: PageTicket) -> bool {
        ticket.page == self.current && ticket.generation == self.generation
    }

    pub fn indicator(&self) -> PageIndicator {
        PageIndicator {
            current: self.current + 1,
            total: self.page_count,
            prev_enabled: self.current > 0,
            next_enabled: self.current + 1 < self.page_count,
            visible: self.page_count > 1,
        }
    }

    fn ticket(&self) -> PageTicket {
        PageTicket {
            page: self.current,
            generation: self.generation,
        }
    }

    fn transition<S: OverlaySurface + ?Sized>(
        &mut self,
        target: usize,
        overlay: &mut FieldOverlayRenderer,
        surface: &mut S,
        store: &mut AnswerStore,
    ) -> Option<PageTicket> {
        overlay.flush(surface, store);

        if target >= self.page_count {
            return None;
        }

        overlay.clear(surface);
        self.current = target;
        self.generation += 1;
        debug!(page = target, generation = self.generation, "Page changed");
        Some(self.ticket())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::ImageLayout;
    use crate::template::Template;
    use crate::testing::MemorySurface;
    use serde_json::json;

    fn template() -> Template {
        Template::from_json(json!({
            "template_id": "t1",
            "files": ["p0.png", "p1.png", "p2.png"],
            "fields": [
                {"id": "a", "page": 0, "x": 10.0, "y": 10.0, "w": 50.0, "h": 20.0},
                {"id": "b", "page": 1, "x": 10.0, "y": 10.0, "w": 50.0, "h": 20.0}
            ],
            "width": 600.0,
            "height": 800.0
        }))
        .unwrap()
    }

    const IMAGE: ImageLayout = ImageLayout {
        natural_width: 600.0,
        natural_height: 800.0,
        displayed_width: 300.0,
        displayed_height: 400.0,
    };

    struct Harness {
        pages: PaginationController,
        overlay: FieldOverlayRenderer,
        surface: MemorySurface,
        store: AnswerStore,
        template: Template,
    }

    impl Harness {
        fn new() -> Self {
            let template = template();
            let (pages, _) = PaginationController::open(template.page_count());
            Self {
                pages,
                overlay: FieldOverlayRenderer::new(true),
                surface: MemorySurface::new(),
                store: AnswerStore::new(),
                template,
            }
        }

        fn render(&mut self) {
            let page = self.pages.current();
            self.overlay
                .render_page(&mut self.surface, &self.template, page, &IMAGE, &self.store)
                .unwrap();
        }

        fn next(&mut self) -> Option<PageTicket> {
            self.pages
                .next(&mut self.overlay, &mut self.surface, &mut self.store)
        }

        fn prev(&mut self) -> Option<PageTicket> {
            self.pages
                .prev(&mut self.overlay, &mut self.surface, &mut self.store)
        }
    }

    #[test]
    fn test_open_starts_at_first_page() {
        let (pages, ticket) = PaginationController::open(3);
        assert_eq!(ticket.page, 0);
        assert!(pages.is_current(ticket));
        assert_eq!(
            pages.indicator(),
            PageIndicator {
                current: 1,
                total: 3,
                prev_enabled: false,
                next_enabled: true,
                visible: true
            }
        );
    }

    #[test]
    fn test_prev_is_noop_on_first_page() {
        let mut h = Harness::new();
        assert_eq!(h.prev(), None);
        assert_eq!(h.pages.current(), 0);
    }

    #[test]
    fn test_next_is_noop_on_last_page() {
        let mut h = Harness::new();
        assert!(h.next().is_some());
        assert!(h.next().is_some());
        assert_eq!(h.next(), None);
        assert_eq!(h.pages.current(), 2);
        assert!(!h.pages.indicator().next_enabled);
    }

    #[test]
    fn test_navigation_flushes_focused_control() {
        let mut h = Harness::new();
        h.render();
        h.surface.type_text("a", "42 ");

        let ticket = h.next().unwrap();
        assert_eq!(ticket.page, 1);
        assert_eq!(h.store.get("a"), Some("42"));
        assert_eq!(h.surface.control_count(), 0);
    }

    #[test]
    fn test_noop_navigation_still_flushes() {
        let mut h = Harness::new();
        h.render();
        h.surface.type_text("a", "x");
        assert_eq!(h.prev(), None);
        assert_eq!(h.store.get("a"), Some("x"));
    }

    #[test]
    fn test_old_ticket_becomes_stale() {
        let mut h = Harness::new();
        let (_, first) = PaginationController::open(3);
        let second = h.next().unwrap();
        assert!(!h.pages.is_current(first));
        assert!(h.pages.is_current(second));

        let back = h.prev().unwrap();
        assert_eq!(back.page, 0);
        assert_ne!(back, first);
    }

    #[test]
    fn test_go_to_out_of_range_is_ignored() {
        let mut h = Harness::new();
        let result = h
            .pages
            .go_to(7, &mut h.overlay, &mut h.surface, &mut h.store);
        assert_eq!(result, None);
        assert_eq!(h.pages.current(), 0);
    }

    #[test]
    fn test_relayout_keeps_page_and_answers() {
        let mut h = Harness::new();
        h.next();
        h.render();
        h.surface.type_text("b", "seven");

        let before = h.pages.indicator();
        let ticket = h.pages.relayout(&h.overlay, &h.surface, &mut h.store);
        assert_eq!(ticket.page, 1);
        assert!(h.pages.is_current(ticket));
        assert_eq!(h.pages.indicator(), before);
        assert_eq!(h.store.get("b"), Some("seven"));
    }

    #[test]
    fn test_single_page_indicator_is_hidden() {
        let (pages, _) = PaginationController::open(1);
        let indicator = pages.indicator();
        assert!(!indicator.visible);
        assert!(!indicator.prev_enabled);
        assert!(!indicator.next_enabled);
    }
}
