mod home;
mod list;

pub use home::HomePage;
pub use list::ListPage;

use crate::util::share_url;
use leptos::task::spawn_local;
use wasm_bindgen_futures::JsFuture;

fn alert(message: &str) {
    if let Some(w) = web_sys::window() {
        let _ = w.alert_with_message(message);
    }
}

fn confirm(message: &str) -> bool {
    web_sys::window()
        .and_then(|w| w.confirm_with_message(message).ok())
        .unwrap_or(false)
}

/// Copy a `?list=` link for `list_id`. The clipboard needs a secure context;
/// elsewhere the link is shown in a prompt for manual copying.
pub(crate) fn share_list(list_id: &str) {
    let Some(w) = web_sys::window() else {
        return;
    };
    let location = w.location();
    let url = share_url(
        &location.origin().unwrap_or_default(),
        &location.pathname().unwrap_or_default(),
        list_id,
    );

    if !w.is_secure_context() {
        let _ = w.prompt_with_message_and_default("Copy this link:", &url);
        return;
    }

    let promise = w.navigator().clipboard().write_text(&url);
    spawn_local(async move {
        match JsFuture::from(promise).await {
            Ok(_) => alert("Shareable link copied"),
            Err(e) => {
                tracing::warn!(error = ?e, "clipboard write failed");
                alert("Copy failed. Long-press/copy the URL.");
            }
        }
    });
}

/// Current value of the input that fired `ev`.
fn input_value(ev: &web_sys::Event) -> Option<String> {
    use wasm_bindgen::JsCast;
    ev.target()
        .and_then(|t| t.dyn_into::<web_sys::HtmlInputElement>().ok())
        .map(|i| i.value())
}
