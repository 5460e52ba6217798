use crate::pages::{HomePage, ListPage};
use crate::state::{AppContext, AppState};
use crate::storage::Theme;
use leptos::prelude::*;
use leptos_router::components::{Route, Router, Routes};
use leptos_router::hooks::use_query_map;
use leptos_router::path;

#[component]
pub fn App() -> impl IntoView {
    let state = AppState::new();
    let (theme, show_timestamps) = (state.theme, state.show_timestamps);
    provide_context(AppContext(state));

    // Preferences are applied as classes on <html> so the stylesheet can react.
    Effect::new(move |_| {
        let dark = theme.get() == Theme::Dark;
        let hide_meta = !show_timestamps.get();
        let Some(root) = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.document_element())
        else {
            return;
        };
        let classes = root.class_list();
        let _ = classes.toggle_with_force("dark", dark);
        let _ = classes.toggle_with_force("hide-meta", hide_meta);
    });

    // IMPORTANT:
    // - Leptos CSR requires the `csr` feature on `leptos`.
    // - `use_query_map()` requires a <Router> context.
    view! {
        <Router>
            <Routes fallback=Shell>
                <Route path=path!("") view=Shell />
            </Routes>
        </Router>
    }
}

/// `?list=<id>` opens that list, anything else shows every list.
#[component]
fn Shell() -> impl IntoView {
    let query = use_query_map();
    let list_id = Memo::new(move |_| {
        query
            .read()
            .get("list")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    });

    move || match list_id.get() {
        Some(id) => view! { <ListPage list_id=id /> }.into_any(),
        None => view! { <HomePage /> }.into_any(),
    }
}
