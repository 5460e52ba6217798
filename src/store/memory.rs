//! In-process row store used by tests. Shared between simulated clients to
//! model one backend with several subscribers.

use super::{ChangeCallback, ChannelId, RemoteStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{ChangeEvent, ChangeKind, Filter, OrderBy, Scope, Select, Table};
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::Notify;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Write {
    Insert(Table),
    Update(Table, Vec<Filter>, serde_json::Value),
    Delete(Table, Vec<Filter>),
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: RefCell<HashMap<Table, Vec<serde_json::Value>>>,
    channels: RefCell<Vec<(ChannelId, Scope, ChangeCallback)>>,
    next_id: Cell<u64>,
    next_channel: Cell<u64>,
    writes: RefCell<Vec<Write>>,
    selects: Cell<usize>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    read_gate: RefCell<Option<Rc<Notify>>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn writes(&self) -> Vec<Write> {
        self.writes.borrow().clone()
    }

    pub(crate) fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    pub(crate) fn select_count(&self) -> usize {
        self.selects.get()
    }

    pub(crate) fn active_channels(&self) -> usize {
        self.channels.borrow().len()
    }

    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub(crate) fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Park every read until [`release_reads`](Self::release_reads).
    pub(crate) fn hold_reads(&self) {
        *self.read_gate.borrow_mut() = Some(Rc::new(Notify::new()));
    }

    pub(crate) fn release_reads(&self) {
        let gate = self.read_gate.borrow_mut().take();
        if let Some(gate) = gate {
            gate.notify_waiters();
        }
    }

    pub(crate) fn rows(&self, table: Table) -> Vec<serde_json::Value> {
        self.tables.borrow().get(&table).cloned().unwrap_or_default()
    }

    /// Seed a row without notifying anyone.
    pub(crate) fn seed(&self, table: Table, row: serde_json::Value) {
        self.tables.borrow_mut().entry(table).or_default().push(row);
    }

    fn notify(&self, table: Table, kind: ChangeKind, rows: &[serde_json::Value]) {
        // Collect first so callbacks run without any borrow held.
        let targets: Vec<ChangeCallback> = self
            .channels
            .borrow()
            .iter()
            .filter(|(_, scope, _)| {
                scope.table() == table
                    && rows
                        .iter()
                        .any(|row| scope.filters().iter().all(|f| f.matches(row)))
            })
            .map(|(_, _, cb)| cb.clone())
            .collect();

        for cb in targets {
            cb(ChangeEvent { table, kind });
        }
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.get() {
            Err(StoreError::Http {
                status: 503,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn compare_field(a: &serde_json::Value, b: &serde_json::Value, order: &OrderBy) -> Ordering {
    use serde_json::Value;
    let (x, y) = (a.get(order.field), b.get(order.field));
    let is_null = |v: Option<&Value>| matches!(v, None | Some(Value::Null));

    // Nulls last regardless of direction.
    match (is_null(x), is_null(y)) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    let ord = match (x, y) {
        (Some(Value::Number(p)), Some(Value::Number(q))) => p
            .as_f64()
            .partial_cmp(&q.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(p), Some(q)) => p.to_string().cmp(&q.to_string()),
        _ => Ordering::Equal,
    };

    if order.descending {
        ord.reverse()
    } else {
        ord
    }
}

#[async_trait(?Send)]
impl RemoteStore for MemoryStore {
    async fn select(&self, query: &Select) -> StoreResult<Vec<serde_json::Value>> {
        self.selects.set(self.selects.get() + 1);
        let gate = self.read_gate.borrow().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_reads.get() {
            return Err(StoreError::Network("connection reset".to_string()));
        }

        let mut rows: Vec<serde_json::Value> = self
            .rows(query.table)
            .into_iter()
            .filter(|row| query.filters.iter().all(|f| f.matches(row)))
            .collect();
        rows.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|o| compare_field(a, b, o))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: serde_json::Value) -> StoreResult<serde_json::Value> {
        self.check_write()?;

        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        if let Some(obj) = row.as_object_mut() {
            obj.insert("id".to_string(), serde_json::Value::String(format!("row-{id}")));
        }

        self.tables.borrow_mut().entry(table).or_default().push(row.clone());
        self.writes.borrow_mut().push(Write::Insert(table));
        self.notify(table, ChangeKind::Insert, std::slice::from_ref(&row));
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: serde_json::Value,
    ) -> StoreResult<()> {
        self.check_write()?;

        let mut touched = vec![];
        {
            let mut tables = self.tables.borrow_mut();
            for row in tables.entry(table).or_default().iter_mut() {
                if !filters.iter().all(|f| f.matches(row)) {
                    continue;
                }
                if let (Some(obj), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                    for (k, v) in changes {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                touched.push(row.clone());
            }
        }

        self.writes
            .borrow_mut()
            .push(Write::Update(table, filters.to_vec(), patch));
        self.notify(table, ChangeKind::Update, &touched);
        Ok(())
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> StoreResult<()> {
        self.check_write()?;

        let removed: Vec<serde_json::Value> = {
            let mut tables = self.tables.borrow_mut();
            let rows = tables.entry(table).or_default();
            let (gone, kept): (Vec<_>, Vec<_>) = rows
                .drain(..)
                .partition(|row| filters.iter().all(|f| f.matches(row)));
            *rows = kept;
            gone
        };

        // Cascade the way the backend's foreign key does.
        if table == Table::Lists {
            let ids: Vec<String> = removed
                .iter()
                .filter_map(|r| r.get("id").and_then(|v| v.as_str()).map(String::from))
                .collect();
            let mut tables = self.tables.borrow_mut();
            if let Some(items) = tables.get_mut(&Table::Items) {
                items.retain(|item| {
                    item.get("list_id")
                        .and_then(|v| v.as_str())
                        .map_or(true, |l| !ids.iter().any(|id| id == l))
                });
            }
        }

        self.writes
            .borrow_mut()
            .push(Write::Delete(table, filters.to_vec()));
        self.notify(table, ChangeKind::Delete, &removed);
        Ok(())
    }

    fn subscribe(&self, scope: &Scope, on_change: ChangeCallback) -> StoreResult<ChannelId> {
        let id = ChannelId(self.next_channel.get() + 1);
        self.next_channel.set(id.0);
        self.channels.borrow_mut().push((id, scope.clone(), on_change));
        Ok(id)
    }

    fn unsubscribe(&self, channel: ChannelId) {
        self.channels.borrow_mut().retain(|(id, _, _)| *id != channel);
    }
}
