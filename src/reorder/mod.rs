//! Long-press drag reordering of a vertical list of entries.
//!
//! [`DragController`] holds no DOM references. The browser binding feeds it
//! pointer positions and sibling boxes and applies what it answers.

/// Gesture tuning shared by every reorderable container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureConfig {
    pub long_press_ms: u32,
    /// Pointer travel that cancels a pending long-press.
    pub jitter_px: f64,
    /// Drags may only start on an entry's handle.
    pub handle_required: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press_ms: 300,
            jitter_px: 8.0,
            handle_required: true,
        }
    }
}

/// What lies under the pointer when a press begins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointerTarget {
    /// Entry containing the pressed element, if any.
    pub entry: Option<String>,
    pub on_handle: bool,
    /// Press landed on an input, button or similar control.
    pub on_interactive: bool,
}

/// Vertical extent of one rendered entry.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryBox {
    pub id: String,
    pub top: f64,
    pub height: f64,
}

impl EntryBox {
    fn midpoint(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DragState {
    Idle,
    Pending {
        entry: String,
        start_x: f64,
        start_y: f64,
    },
    Dragging {
        entry: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Nothing pressed.
    Ignored,
    /// Pointer wandered before the long-press fired; the press is dropped.
    Cancelled,
    /// Still pending and within jitter.
    Waiting,
    /// The dragged entry moved to a new position.
    Reordered,
    Unchanged,
}

/// Entry the dragged one should be placed before: the sibling whose vertical
/// midpoint is nearest below the pointer. `None` means the end of the list.
pub fn insertion_point<'a>(y: f64, boxes: &'a [EntryBox], dragged: &str) -> Option<&'a str> {
    boxes
        .iter()
        .filter(|b| b.id != dragged)
        .map(|b| (b, y - b.midpoint()))
        .filter(|(_, offset)| *offset < 0.0)
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(b, _)| b.id.as_str())
}

pub struct DragController {
    config: GestureConfig,
    state: DragState,
    /// Working order, updated live while dragging.
    order: Vec<String>,
    /// Order at the moment the drag started.
    origin: Vec<String>,
    /// Latest snapshot that arrived mid-drag, adopted on release.
    deferred: Option<Vec<String>>,
}

impl DragController {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            state: DragState::Idle,
            order: vec![],
            origin: vec![],
            deferred: None,
        }
    }

    pub fn config(&self) -> GestureConfig {
        self.config
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Adopt a freshly rendered order. Mid-drag the order is held back so a
    /// reconciliation pass can't yank the entry out from under the pointer.
    pub fn reset(&mut self, ids: Vec<String>) {
        if self.is_dragging() {
            self.deferred = Some(ids);
        } else {
            self.order = ids;
        }
    }

    /// Returns true when a long-press timer should be started.
    pub fn pointer_down(&mut self, target: &PointerTarget, x: f64, y: f64) -> bool {
        if !matches!(self.state, DragState::Idle) {
            return false;
        }
        let Some(entry) = target.entry.as_ref() else {
            return false;
        };
        if target.on_interactive || (self.config.handle_required && !target.on_handle) {
            return false;
        }
        if !self.order.iter().any(|id| id == entry) {
            return false;
        }

        self.state = DragState::Pending {
            entry: entry.clone(),
            start_x: x,
            start_y: y,
        };
        true
    }

    /// Long-press timer fired. Returns the entry now being dragged.
    pub fn long_press_elapsed(&mut self) -> Option<String> {
        let DragState::Pending { entry, .. } = &self.state else {
            return None;
        };
        let entry = entry.clone();
        self.origin = self.order.clone();
        self.state = DragState::Dragging {
            entry: entry.clone(),
        };
        Some(entry)
    }

    pub fn pointer_move(&mut self, x: f64, y: f64, boxes: &[EntryBox]) -> MoveOutcome {
        match &self.state {
            DragState::Idle => MoveOutcome::Ignored,
            DragState::Pending {
                start_x, start_y, ..
            } => {
                let moved = (x - start_x).abs() > self.config.jitter_px
                    || (y - start_y).abs() > self.config.jitter_px;
                if moved {
                    self.state = DragState::Idle;
                    MoveOutcome::Cancelled
                } else {
                    MoveOutcome::Waiting
                }
            }
            DragState::Dragging { entry } => {
                let entry = entry.clone();
                let before = insertion_point(y, boxes, &entry).map(str::to_string);
                if self.move_before(&entry, before.as_deref()) {
                    MoveOutcome::Reordered
                } else {
                    MoveOutcome::Unchanged
                }
            }
        }
    }

    /// Pointer released, left the container or was cancelled. Returns the new
    /// order when a drag changed it.
    ///
    /// A snapshot held back during the drag is adopted when nothing is
    /// committed. After a commit the working order stays until the write's own
    /// notification brings the next snapshot.
    pub fn pointer_up(&mut self) -> Option<Vec<String>> {
        let was_dragging = self.is_dragging();
        self.state = DragState::Idle;
        let origin = std::mem::take(&mut self.origin);
        let deferred = self.deferred.take();
        if was_dragging && origin != self.order {
            return Some(self.order.clone());
        }
        if let Some(ids) = deferred {
            self.order = ids;
        }
        None
    }

    fn move_before(&mut self, entry: &str, before: Option<&str>) -> bool {
        let Some(from) = self.order.iter().position(|id| id == entry) else {
            return false;
        };
        let moved = self.order.remove(from);
        let to = before
            .and_then(|b| self.order.iter().position(|id| id == b))
            .unwrap_or(self.order.len());
        self.order.insert(to, moved);
        to != from
    }
}
