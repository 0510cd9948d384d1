//! Drives a session against the headless surface

#![allow(dead_code)]

use answer_sheet_core::testing::MemorySurface;
use answer_sheet_core::{
    ClientConfig, EventQueue, ImageLayout, PageTicket, SessionController, SessionEvent,
};
use serde_json::{json, Value};

pub const IMAGE: ImageLayout = ImageLayout {
    natural_width: 1190.0,
    natural_height: 1684.0,
    displayed_width: 595.0,
    displayed_height: 842.0,
};

/// A template with `fields_per_page[i]` fields on page `i`, ids `p{page}f{n}`
pub fn template(fields_per_page: &[usize]) -> Value {
    let files: Vec<String> = (0..fields_per_page.len())
        .map(|p| format!("t1_page{}.png", p))
        .collect();
    let mut fields = Vec::new();
    for (page, count) in fields_per_page.iter().enumerate() {
        for n in 0..*count {
            fields.push(json!({
                "id": format!("p{}f{}", page, n),
                "page": page,
                "x": 72.0,
                "y": 700.0 - 40.0 * n as f64,
                "w": 120.0,
                "h": 24.0
            }));
        }
    }
    let images_data: Vec<Value> = fields_per_page
        .iter()
        .map(|_| json!({"page_width": 595.0, "page_height": 842.0, "zoom": 2.0}))
        .collect();
    json!({
        "template_id": "t1",
        "name": "Fractions",
        "files": files,
        "fields": fields,
        "images_data": images_data
    })
}

pub struct Harness {
    pub session: SessionController,
    pub surface: MemorySurface,
    pub queue: EventQueue,
    pub log: Vec<SessionEvent>,
    pub pending_image: Option<PageTicket>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            session: SessionController::new(ClientConfig::default()),
            surface: MemorySurface::new(),
            queue: EventQueue::new(),
            log: Vec::new(),
            pending_image: None,
        }
    }

    /// Move queued events into the log, remembering the latest image request
    pub fn pump(&mut self) {
        for event in self.queue.drain() {
            match &event {
                SessionEvent::PageImageRequested { ticket, .. }
                | SessionEvent::LayoutRequested { ticket, .. } => {
                    self.pending_image = Some(*ticket);
                }
                _ => {}
            }
            self.log.push(event);
        }
    }

    /// Start as Ivan, 7A and serve `body` as the template
    pub fn start(&mut self, body: Value) {
        let call = self
            .session
            .start("Ivan", "7A", "t1", &mut self.queue)
            .unwrap();
        self.session
            .template_loaded(call.ticket, Ok(body), &mut self.surface, &mut self.queue)
            .unwrap();
        self.pump();
    }

    /// Report the requested page image as loaded
    pub fn show_page(&mut self) {
        self.show_page_at(IMAGE);
    }

    pub fn show_page_at(&mut self, image: ImageLayout) {
        let ticket = self.pending_image.take().expect("no image requested");
        self.session
            .page_image_loaded(ticket, image, &mut self.surface, &mut self.queue)
            .unwrap();
        self.pump();
    }

    pub fn next_page(&mut self) {
        self.session
            .next_page(&mut self.surface, &mut self.queue)
            .unwrap();
        self.pump();
    }

    pub fn prev_page(&mut self) {
        self.session
            .prev_page(&mut self.surface, &mut self.queue)
            .unwrap();
        self.pump();
    }

    pub fn notices(&self) -> Vec<String> {
        self.log
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Notice(n) => Some(n.message.clone()),
                _ => None,
            })
            .collect()
    }
}
