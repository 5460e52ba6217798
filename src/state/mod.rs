use crate::config::{AppConfig, EnvConfig};
use crate::error::MutationError;
use crate::storage::{
    load_show_timestamps, load_theme, save_show_timestamps, save_theme, Theme,
};
use crate::store::SupabaseStore;
use crate::sync::{Notifier, SessionDeps, Spawner, ViewRenderer};
use crate::util::SystemClock;
use futures_util::future::LocalBoxFuture;
use leptos::prelude::*;
use std::rc::Rc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: AppConfig,

    /// One backend connection shared by every view. Kept in local storage
    /// because the realtime socket is not `Send`.
    pub store: StoredValue<Rc<SupabaseStore>, LocalStorage>,

    /// Local preferences, persisted on change.
    pub theme: RwSignal<Theme>,
    pub show_timestamps: RwSignal<bool>,
}

impl AppState {
    pub fn new() -> Self {
        let env = EnvConfig::new();
        tracing::info!(url = %env.supabase_url, "connecting to backend");
        let store = Rc::new(SupabaseStore::new(&env));

        Self {
            config: AppConfig::default(),
            store: StoredValue::new_local(store),
            theme: RwSignal::new(load_theme()),
            show_timestamps: RwSignal::new(load_show_timestamps()),
        }
    }

    pub fn session_deps(&self) -> SessionDeps<SupabaseStore, SystemClock> {
        SessionDeps {
            store: self.store.get_value(),
            config: self.config.clone(),
            clock: SystemClock,
            notifier: Rc::new(BrowserNotifier),
            spawner: browser_spawner(),
        }
    }

    pub fn toggle_theme(&self) {
        let next = self.theme.get_untracked().toggled();
        self.theme.set(next);
        save_theme(next);
    }

    pub fn toggle_timestamps(&self) {
        let next = !self.show_timestamps.get_untracked();
        self.show_timestamps.set(next);
        save_show_timestamps(next);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);

/// Failed writes pop a blocking alert naming the operation.
pub(crate) struct BrowserNotifier;

impl Notifier for BrowserNotifier {
    fn mutation_failed(&self, err: &MutationError) {
        if let Some(w) = web_sys::window() {
            let _ = w.alert_with_message(&err.to_string());
        }
    }
}

/// Pushes each snapshot into signals the view renders from.
pub(crate) struct SignalRenderer<T: Send + Sync + 'static> {
    pub rows: RwSignal<Vec<T>>,
    /// False until the first snapshot arrives.
    pub loaded: RwSignal<bool>,
}

impl<T: Send + Sync + 'static> SignalRenderer<T> {
    pub fn new() -> Self {
        Self {
            rows: RwSignal::new(vec![]),
            loaded: RwSignal::new(false),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ViewRenderer<T> for SignalRenderer<T> {
    fn render(&self, rows: &[T]) {
        self.rows.set(rows.to_vec());
        self.loaded.set(true);
    }
}

pub(crate) fn browser_spawner() -> Spawner {
    Rc::new(|fut: LocalBoxFuture<'static, ()>| leptos::task::spawn_local(fut))
}
