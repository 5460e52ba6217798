use super::{ChangeCallback, ChannelId, RemoteStore};
use crate::config::EnvConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{Filter, OrderBy, Scope, Select, Table};
use crate::realtime::RealtimeClient;
use async_trait::async_trait;
use std::rc::Rc;

/// PostgREST rows + Realtime channels of a Supabase project, accessed with
/// the anonymous key.
#[derive(Clone)]
pub struct SupabaseStore {
    client: reqwest::Client,
    rest_url: String,
    anon_key: String,
    realtime: Rc<RealtimeClient>,
}

impl SupabaseStore {
    pub fn new(env: &EnvConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_url: env.rest_url(),
            anon_key: env.supabase_anon_key.clone(),
            realtime: RealtimeClient::new(env.realtime_url(), env.supabase_anon_key.clone()),
        }
    }

    fn request(&self, method: reqwest::Method, table: Table) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.rest_url, table.as_ref());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn send(req: reqwest::RequestBuilder) -> StoreResult<reqwest::Response> {
        let res = req.send().await.map_err(StoreError::network)?;
        if res.status().is_success() {
            Ok(res)
        } else {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(StoreError::Http { status, body })
        }
    }
}

/// PostgREST query parameters for equality filters.
pub(crate) fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.field.clone(), format!("eq.{}", f.value)))
        .collect()
}

/// PostgREST `order=` value, e.g. `order_index.desc.nullslast,updated_at.desc`.
pub(crate) fn order_param(order: &[OrderBy]) -> Option<String> {
    if order.is_empty() {
        return None;
    }
    Some(
        order
            .iter()
            .map(|o| {
                if o.descending {
                    format!("{}.desc.nullslast", o.field)
                } else {
                    format!("{}.asc.nullslast", o.field)
                }
            })
            .collect::<Vec<_>>()
            .join(","),
    )
}

pub(crate) fn select_params(query: &Select) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));
    if let Some(order) = order_param(&query.order) {
        params.push(("order".to_string(), order));
    }
    params
}

#[async_trait(?Send)]
impl RemoteStore for SupabaseStore {
    async fn select(&self, query: &Select) -> StoreResult<Vec<serde_json::Value>> {
        let req = self
            .request(reqwest::Method::GET, query.table)
            .query(&select_params(query));
        let res = Self::send(req).await?;
        res.json().await.map_err(StoreError::decode)
    }

    async fn insert(&self, table: Table, row: serde_json::Value) -> StoreResult<serde_json::Value> {
        let req = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&row);
        let res = Self::send(req).await?;
        let mut rows: Vec<serde_json::Value> = res.json().await.map_err(StoreError::decode)?;
        if rows.is_empty() {
            return Err(StoreError::Decode(format!(
                "insert into {} returned no rows",
                table.as_ref()
            )));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: serde_json::Value,
    ) -> StoreResult<()> {
        let req = self
            .request(reqwest::Method::PATCH, table)
            .header("Prefer", "return=minimal")
            .query(&filter_params(filters))
            .json(&patch);
        Self::send(req).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> StoreResult<()> {
        let req = self
            .request(reqwest::Method::DELETE, table)
            .header("Prefer", "return=minimal")
            .query(&filter_params(filters));
        Self::send(req).await?;
        Ok(())
    }

    fn subscribe(&self, scope: &Scope, on_change: ChangeCallback) -> StoreResult<ChannelId> {
        self.realtime.subscribe(scope, on_change)
    }

    fn unsubscribe(&self, channel: ChannelId) {
        self.realtime.unsubscribe(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrderingRule;
    use crate::rank::order_for;

    #[test]
    fn test_select_params_for_items_of_list() {
        let query = Select {
            table: Table::Items,
            filters: Scope::ItemsOf("l-1".into()).filters(),
            order: order_for(Table::Items, OrderingRule::RankDescending),
        };
        assert_eq!(
            select_params(&query),
            vec![
                ("select".to_string(), "*".to_string()),
                ("list_id".to_string(), "eq.l-1".to_string()),
                (
                    "order".to_string(),
                    "order_index.desc.nullslast,created_at.desc.nullslast".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_select_params_without_order() {
        let query = Select {
            table: Table::Lists,
            filters: vec![Filter::id("x")],
            order: vec![],
        };
        assert_eq!(
            select_params(&query),
            vec![
                ("select".to_string(), "*".to_string()),
                ("id".to_string(), "eq.x".to_string()),
            ]
        );
    }

    #[test]
    fn test_clear_completed_filters() {
        let filters = vec![Filter::eq("list_id", "l1"), Filter::eq("done", true)];
        assert_eq!(
            filter_params(&filters),
            vec![
                ("list_id".to_string(), "eq.l1".to_string()),
                ("done".to_string(), "eq.true".to_string()),
            ]
        );
    }
}
