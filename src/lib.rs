mod app;
mod components;
pub mod config;
pub mod error;
pub mod models;
mod pages;
pub mod rank;
pub mod realtime;
pub mod reorder;
mod state;
mod storage;
pub mod store;
pub mod sync;
pub mod util;

pub use app::App;

use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

/// Route `tracing` events to the browser console.
fn init_logging() {
    #[cfg(target_arch = "wasm32")]
    tracing_wasm::set_as_global_default();
}


// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    init_logging();
    mount_to_body(App);
}
