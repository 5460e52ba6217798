//! Remote row store seam.
//!
//! The client never owns durable state: every read and write goes through a
//! [`RemoteStore`], and change fan-out arrives through its subscriptions.

#[cfg(test)]
pub(crate) mod memory;
mod supabase;

pub use supabase::SupabaseStore;

use crate::error::{StoreError, StoreResult};
use crate::models::{ChangeEvent, Filter, Scope, Select, Table};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::rc::Rc;

/// Invoked for every insert/update/delete matching a subscription's scope.
pub type ChangeCallback = Rc<dyn Fn(ChangeEvent)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// Row-level CRUD against the backend plus change subscriptions.
///
/// Futures are `?Send`: the client runs on a single browser thread.
#[async_trait(?Send)]
pub trait RemoteStore {
    async fn select(&self, query: &Select) -> StoreResult<Vec<serde_json::Value>>;

    /// Insert one row and return it as stored (with its backend-assigned id).
    async fn insert(&self, table: Table, row: serde_json::Value) -> StoreResult<serde_json::Value>;

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: serde_json::Value,
    ) -> StoreResult<()>;

    async fn delete(&self, table: Table, filters: &[Filter]) -> StoreResult<()>;

    fn subscribe(&self, scope: &Scope, on_change: ChangeCallback) -> StoreResult<ChannelId>;

    fn unsubscribe(&self, channel: ChannelId);
}

pub(crate) fn to_row<T: Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(StoreError::decode)
}

/// Decode rows one by one. A row that still fails is logged and left out so
/// the rest of the collection renders.
pub(crate) fn from_rows<T: DeserializeOwned>(rows: Vec<serde_json::Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(error = %e, %row, "skipping row that does not decode");
                None
            }
        })
        .collect()
}

/// Id of a row returned by an insert.
pub(crate) fn row_id(row: &serde_json::Value) -> StoreResult<String> {
    match row.get("id") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(StoreError::Decode(format!(
            "insert succeeded but response is missing an id: {row}"
        ))),
    }
}
