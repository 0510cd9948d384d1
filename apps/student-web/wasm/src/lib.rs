//! Browser bindings for the answer sheet session engine
//!
//! Wires [`answer_sheet_core`] to the page: backend requests go through
//! `fetch`, answer fields are `<input>` elements laid over the page image,
//! and engine events are handed to a JavaScript listener as plain objects.

use wasm_bindgen::prelude::*;

pub mod app;
pub mod dom;
pub mod http;
pub mod logging;

pub use app::StudentApp;

/// Initialize panic hook and console logging
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    logging::init();
}

#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
