use crate::models::Scope;
use thiserror::Error;

/// Failure talking to the remote row store or its change channel.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request failed ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("change channel error: {0}")]
    Channel(String),
}

impl StoreError {
    pub(crate) fn network(e: impl std::fmt::Display) -> Self {
        Self::Network(e.to_string())
    }

    pub(crate) fn decode(e: impl std::fmt::Display) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A read or subscribe failed. The view that asked stays as it was.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("could not load {scope}: {source}")]
pub struct RetrievalError {
    pub scope: Scope,
    #[source]
    pub source: StoreError,
}

/// User-visible name of each write the client performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Operation {
    #[strum(serialize = "creating list")]
    CreateList,
    #[strum(serialize = "renaming list")]
    RenameList,
    #[strum(serialize = "deleting list")]
    DeleteList,
    #[strum(serialize = "adding item")]
    AddItem,
    #[strum(serialize = "updating")]
    ToggleDone,
    #[strum(serialize = "editing")]
    EditItem,
    #[strum(serialize = "deleting")]
    RemoveItem,
    #[strum(serialize = "clearing")]
    ClearAll,
    #[strum(serialize = "clearing completed")]
    ClearCompleted,
    #[strum(serialize = "saving order")]
    Reorder,
}

/// A write failed. Nothing was applied locally, so nothing needs rolling back.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Error {op}: {source}")]
pub struct MutationError {
    pub op: Operation,
    #[source]
    pub source: StoreError,
}

impl MutationError {
    pub fn new(op: Operation, source: StoreError) -> Self {
        Self { op, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_error_names_operation() {
        let e = MutationError::new(
            Operation::AddItem,
            StoreError::Http {
                status: 500,
                body: "boom".into(),
            },
        );
        assert_eq!(e.to_string(), "Error adding item: request failed (500): boom");
    }

    #[test]
    fn test_retrieval_error_names_scope() {
        let e = RetrievalError {
            scope: Scope::ItemsOf("l1".into()),
            source: StoreError::Network("offline".into()),
        };
        assert_eq!(
            e.to_string(),
            "could not load items of list l1: network error: offline"
        );
    }
}
