//! Browser wiring for long-press drag reordering.
//!
//! Entries are children of one container carrying `data-reorder-id`; the drag
//! handle inside each entry carries `data-drag-handle`. The gesture itself is
//! decided by [`DragController`]; this module only translates DOM events.

use crate::config::AppConfig;
use crate::reorder::{DragController, EntryBox, GestureConfig, MoveOutcome, PointerTarget};
use gloo_timers::callback::Timeout;
use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use leptos_dom::helpers::window_event_listener;
use wasm_bindgen::JsCast;

const ENTRY_ATTR: &str = "data-reorder-id";
const HANDLE_SELECTOR: &str = "[data-drag-handle]";
const INTERACTIVE_SELECTOR: &str = "input, button, textarea, select, a";

/// How long a finished drag suppresses the click that follows it.
const CLICK_GUARD_MS: u32 = 100;

pub(crate) fn gesture_config(config: &AppConfig) -> GestureConfig {
    GestureConfig {
        long_press_ms: config.long_press_ms,
        jitter_px: config.jitter_px,
        handle_required: true,
    }
}

#[derive(Clone, Copy)]
pub(crate) struct Reorderable {
    /// Display order of entry ids, updated live while dragging.
    pub order: RwSignal<Vec<String>>,
    pub dragging: RwSignal<Option<String>>,
    /// True briefly after a drag ends, so the release doesn't count as a click.
    pub just_dragged: RwSignal<bool>,
    controller: StoredValue<DragController>,
    timer: StoredValue<Option<Timeout>, LocalStorage>,
    container: NodeRef<html::Div>,
    haptic_ms: u32,
    on_commit: Callback<Vec<String>>,
}

/// Attach drag reordering to `container`. `on_commit` receives the new order
/// after a drag that changed it.
pub(crate) fn use_reorderable(
    container: NodeRef<html::Div>,
    config: &AppConfig,
    on_commit: Callback<Vec<String>>,
) -> Reorderable {
    let r = Reorderable {
        order: RwSignal::new(vec![]),
        dragging: RwSignal::new(None),
        just_dragged: RwSignal::new(false),
        controller: StoredValue::new(DragController::new(gesture_config(config))),
        timer: StoredValue::new_local(None),
        container,
        haptic_ms: config.haptic_ms,
        on_commit,
    };

    // The mouse may leave the entry mid-drag; follow it on the window.
    let move_handle = window_event_listener(ev::mousemove, move |ev: web_sys::MouseEvent| {
        r.moved(ev.client_x() as f64, ev.client_y() as f64);
    });
    let up_handle = window_event_listener(ev::mouseup, move |_: web_sys::MouseEvent| {
        r.release();
    });
    on_cleanup(move || {
        move_handle.remove();
        up_handle.remove();
    });

    r
}

impl Reorderable {
    /// Adopt the order of a fresh snapshot unless a drag is in progress.
    pub fn sync(&self, ids: Vec<String>) {
        self.controller.update_value(|c| c.reset(ids));
        if self.dragging.get_untracked().is_none() {
            let order = self.controller.with_value(|c| c.order().to_vec());
            self.order.set(order);
        }
    }

    pub fn on_mousedown(&self, ev: web_sys::MouseEvent) {
        if ev.button() != 0 {
            return;
        }
        self.press(ev.target(), ev.client_x() as f64, ev.client_y() as f64);
    }

    pub fn on_touchstart(&self, ev: web_sys::TouchEvent) {
        if let Some(t) = ev.touches().get(0) {
            self.press(ev.target(), t.client_x() as f64, t.client_y() as f64);
        }
    }

    pub fn on_touchmove(&self, ev: web_sys::TouchEvent) {
        if self.dragging.get_untracked().is_some() {
            ev.prevent_default();
        }
        if let Some(t) = ev.touches().get(0) {
            self.moved(t.client_x() as f64, t.client_y() as f64);
        }
    }

    /// Touch end/cancel and the pointer leaving the container.
    pub fn on_end(&self) {
        self.release();
    }

    fn press(&self, target: Option<web_sys::EventTarget>, x: f64, y: f64) {
        let target = pointer_target(target);
        let started = self
            .controller
            .try_update_value(|c| c.pointer_down(&target, x, y))
            .unwrap_or(false);
        if !started {
            return;
        }

        let delay = self.controller.with_value(|c| c.config().long_press_ms);
        let this = *self;
        self.timer
            .set_value(Some(Timeout::new(delay, move || this.long_press())));
    }

    fn long_press(&self) {
        let Some(entry) = self
            .controller
            .try_update_value(|c| c.long_press_elapsed())
            .flatten()
        else {
            return;
        };
        tracing::debug!(entry = %entry, "drag started");
        self.dragging.set(Some(entry));
        vibrate(self.haptic_ms);
    }

    fn moved(&self, x: f64, y: f64) {
        let boxes = if self.dragging.get_untracked().is_some() {
            self.entry_boxes()
        } else {
            vec![]
        };
        let outcome = self
            .controller
            .try_update_value(|c| c.pointer_move(x, y, &boxes))
            .unwrap_or(MoveOutcome::Ignored);

        match outcome {
            MoveOutcome::Cancelled => self.timer.set_value(None),
            MoveOutcome::Reordered => {
                let order = self.controller.with_value(|c| c.order().to_vec());
                self.order.set(order);
            }
            _ => {}
        }
    }

    fn release(&self) {
        self.timer.set_value(None);
        let commit = self.controller.try_update_value(|c| c.pointer_up()).flatten();
        if self.dragging.get_untracked().is_none() {
            return;
        }

        // Show whatever the controller settled on, including a snapshot that
        // arrived while the entry was lifted.
        let order = self.controller.with_value(|c| c.order().to_vec());
        self.order.set(order);
        self.dragging.set(None);
        self.just_dragged.set(true);
        let guard = self.just_dragged;
        Timeout::new(CLICK_GUARD_MS, move || guard.set(false)).forget();

        if let Some(order) = commit {
            tracing::debug!(entries = order.len(), "drag committed");
            self.on_commit.run(order);
        }
    }

    fn entry_boxes(&self) -> Vec<EntryBox> {
        let Some(container) = self.container.get_untracked() else {
            return vec![];
        };
        let children = container.children();
        (0..children.length())
            .filter_map(|i| children.item(i))
            .filter_map(|el| {
                let id = el.get_attribute(ENTRY_ATTR)?;
                let rect = el.get_bounding_client_rect();
                Some(EntryBox {
                    id,
                    top: rect.top(),
                    height: rect.height(),
                })
            })
            .collect()
    }
}

fn pointer_target(target: Option<web_sys::EventTarget>) -> PointerTarget {
    let Some(el) = target.and_then(|t| t.dyn_into::<web_sys::Element>().ok()) else {
        return PointerTarget::default();
    };
    let closest = |selector: &str| el.closest(selector).ok().flatten();

    PointerTarget {
        entry: closest(&format!("[{ENTRY_ATTR}]")).and_then(|e| e.get_attribute(ENTRY_ATTR)),
        on_handle: closest(HANDLE_SELECTOR).is_some(),
        on_interactive: closest(INTERACTIVE_SELECTOR).is_some(),
    }
}

fn vibrate(ms: u32) {
    if ms == 0 {
        return;
    }
    if let Some(w) = web_sys::window() {
        let _ = w.navigator().vibrate_with_duration(ms);
    }
}
