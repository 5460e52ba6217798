use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Persisted sort key. Higher ranks render first.
pub type Rank = i64;

/// Backend timestamp, tolerant of what Postgres may hand back: RFC 3339,
/// `timestamp` columns without an offset (read as UTC), or junk (`None`).
fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(d)?;
    Ok(raw.as_ref().and_then(|v| v.as_str()).and_then(parse_timestamp))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|t| t.and_utc())
}

/// Row ids are text on some tables and bigint on others.
fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    use serde::de::Error;
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected an id, got {other}"))),
    }
}

/// `null` columns read as the field's default.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// `numeric` ranks arrive as integers, floats or numeric strings. Fractions
/// are floored; anything else is treated as missing.
fn lenient_rank<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Rank>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(d)?;
    Ok(raw.as_ref().and_then(rank_from_value))
}

fn rank_from_value(v: &serde_json::Value) -> Option<Rank> {
    use serde_json::Value;
    let floored = |f: f64| f.is_finite().then(|| f.floor() as Rank);
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(floored)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<Rank>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(floored))
        }
        _ => None,
    }
}

/// Table names as exposed by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
pub enum Table {
    #[strum(serialize = "lists")]
    Lists,
    #[strum(serialize = "items")]
    Items,
}

/// Which rows a load or a change subscription targets.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    AllLists,
    /// The single `lists` row with this id.
    List(String),
    ItemsOf(String),
}

impl Scope {
    pub fn table(&self) -> Table {
        match self {
            Scope::AllLists | Scope::List(_) => Table::Lists,
            Scope::ItemsOf(_) => Table::Items,
        }
    }

    /// Equality filters a row must satisfy to belong to this scope.
    pub fn filters(&self) -> Vec<Filter> {
        match self {
            Scope::AllLists => vec![],
            Scope::List(list_id) => vec![Filter::id(list_id)],
            Scope::ItemsOf(list_id) => vec![Filter::eq("list_id", list_id.as_str())],
        }
    }

    /// Stable channel name for the realtime subscription of this scope.
    pub fn channel_name(&self) -> String {
        match self {
            Scope::AllLists => "lists_all".to_string(),
            Scope::List(list_id) => format!("list_row_{list_id}"),
            Scope::ItemsOf(list_id) => format!("list_{list_id}"),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::AllLists => write!(f, "lists"),
            Scope::List(list_id) => write!(f, "list {list_id}"),
            Scope::ItemsOf(list_id) => write!(f, "items of list {list_id}"),
        }
    }
}

/// Exact-match predicate on one column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

impl Filter {
    pub fn eq(field: &str, value: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn id(id: &str) -> Self {
        Self::eq("id", id)
    }

    /// Does a JSON row satisfy this predicate? Values compare by their textual form.
    pub fn matches(&self, row: &serde_json::Value) -> bool {
        match row.get(&self.field) {
            Some(serde_json::Value::String(s)) => *s == self.value,
            Some(serde_json::Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    pub fn asc(field: &'static str) -> Self {
        Self {
            field,
            descending: false,
        }
    }
}

/// A read against one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Select {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ShoppingList {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_rank")]
    pub order_index: Option<Rank>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(deserialize_with = "lenient_id")]
    pub list_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub done: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quantity: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub note: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_rank")]
    pub order_index: Option<Rank>,
}

/// Insert payload for `lists`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewList {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub order_index: Rank,
}

/// Insert payload for `items`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewItem {
    pub list_id: String,
    pub text: String,
    pub done: bool,
    pub quantity: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub order_index: Rank,
}

/// Partial update for `lists`; only set fields are sent.
#[derive(Serialize, Clone, Debug, Default)]
pub struct ListPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<Rank>,
}

/// Partial update for `items`; only set fields are sent.
#[derive(Serialize, Clone, Debug, Default)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<Rank>,
}

/// Kind of row change carried by a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Channel (re)joined; rows may have changed while we were away.
    Resync,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
}
