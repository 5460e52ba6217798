//! Keeps one view in step with the backend.
//!
//! Every change notification for a view's scope triggers a full refetch and
//! re-render. Writes are sent and awaited but never applied locally; the view
//! only ever shows what the backend returned, including after our own writes.

use crate::config::{AppConfig, OrderingRule};
use crate::error::{MutationError, Operation, RetrievalError, StoreError, StoreResult};
use crate::models::{
    ChangeEvent, Filter, Item, ItemPatch, ListPatch, NewItem, NewList, Rank, Scope, Select,
    ShoppingList, Table,
};
use crate::rank::{order_for, sort_by_rank, RankAllocator, Ranked};
use crate::store::{from_rows, row_id, to_row, ChangeCallback, ChannelId, RemoteStore};
use crate::util::Clock;
use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Receives every freshly loaded snapshot, already in display order.
pub trait ViewRenderer<T> {
    fn render(&self, rows: &[T]);
}

/// Surfaces failed writes to the user.
pub trait Notifier {
    fn mutation_failed(&self, err: &MutationError);
}

/// Runs a reconciliation pass in the background.
pub type Spawner = Rc<dyn Fn(LocalBoxFuture<'static, ()>)>;

/// Everything a session needs besides its renderer.
pub struct SessionDeps<S, C> {
    pub store: Rc<S>,
    pub config: AppConfig,
    pub clock: C,
    pub notifier: Rc<dyn Notifier>,
    pub spawner: Spawner,
}

impl<S, C: Clone> Clone for SessionDeps<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
            notifier: self.notifier.clone(),
            spawner: self.spawner.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    ListCreated(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HomeCommand {
    CreateList { name: String },
    RenameList { id: String, name: String },
    DeleteList { id: String },
    Reorder { ordered_ids: Vec<String> },
}

impl HomeCommand {
    fn operation(&self) -> Operation {
        match self {
            HomeCommand::CreateList { .. } => Operation::CreateList,
            HomeCommand::RenameList { .. } => Operation::RenameList,
            HomeCommand::DeleteList { .. } => Operation::DeleteList,
            HomeCommand::Reorder { .. } => Operation::Reorder,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListCommand {
    AddItem { text: String },
    ToggleDone { id: String },
    EditItem { id: String, text: String },
    RemoveItem { id: String },
    ClearAll,
    ClearCompleted,
    RenameList { name: String },
    Reorder { ordered_ids: Vec<String> },
}

impl ListCommand {
    fn operation(&self) -> Operation {
        match self {
            ListCommand::AddItem { .. } => Operation::AddItem,
            ListCommand::ToggleDone { .. } => Operation::ToggleDone,
            ListCommand::EditItem { .. } => Operation::EditItem,
            ListCommand::RemoveItem { .. } => Operation::RemoveItem,
            ListCommand::ClearAll => Operation::ClearAll,
            ListCommand::ClearCompleted => Operation::ClearCompleted,
            ListCommand::RenameList { .. } => Operation::RenameList,
            ListCommand::Reorder { .. } => Operation::Reorder,
        }
    }
}

trait During<T> {
    fn during(self, op: Operation) -> Result<T, MutationError>;
}

impl<T> During<T> for StoreResult<T> {
    fn during(self, op: Operation) -> Result<T, MutationError> {
        self.map_err(|e| MutationError::new(op, e))
    }
}

/// Active change channels, at most one per scope.
pub struct ScopeChannels<S: RemoteStore> {
    store: Rc<S>,
    active: RefCell<HashMap<Scope, ChannelId>>,
}

impl<S: RemoteStore> ScopeChannels<S> {
    pub fn new(store: Rc<S>) -> Self {
        Self {
            store,
            active: RefCell::new(HashMap::new()),
        }
    }

    /// Subscribe `scope`, replacing any channel already open for it.
    pub fn open(&self, scope: &Scope, on_change: ChangeCallback) -> StoreResult<()> {
        self.close(scope);
        let id = self.store.subscribe(scope, on_change)?;
        self.active.borrow_mut().insert(scope.clone(), id);
        Ok(())
    }

    pub fn close(&self, scope: &Scope) {
        let previous = self.active.borrow_mut().remove(scope);
        if let Some(id) = previous {
            self.store.unsubscribe(id);
        }
    }

    pub fn close_all(&self) {
        let all: Vec<ChannelId> = self.active.borrow_mut().drain().map(|(_, id)| id).collect();
        for id in all {
            self.store.unsubscribe(id);
        }
    }
}

impl<S: RemoteStore> Drop for ScopeChannels<S> {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Last snapshot of one scope plus the machinery to refresh it.
struct CollectionView<S, T, C: Clock> {
    store: Rc<S>,
    scope: Scope,
    rule: OrderingRule,
    renderer: Rc<dyn ViewRenderer<T>>,
    snapshot: RefCell<Vec<T>>,
    allocator: RankAllocator<C>,
    in_flight: Cell<bool>,
    dirty: Cell<bool>,
}

impl<S, T, C> CollectionView<S, T, C>
where
    S: RemoteStore + 'static,
    T: Ranked + DeserializeOwned + Clone + 'static,
    C: Clock + 'static,
{
    fn new(
        store: Rc<S>,
        scope: Scope,
        rule: OrderingRule,
        renderer: Rc<dyn ViewRenderer<T>>,
        clock: C,
    ) -> Rc<Self> {
        Rc::new(Self {
            store,
            scope,
            rule,
            renderer,
            snapshot: RefCell::new(vec![]),
            allocator: RankAllocator::new(clock),
            in_flight: Cell::new(false),
            dirty: Cell::new(false),
        })
    }

    async fn load(&self) -> Result<Vec<T>, RetrievalError> {
        let table = self.scope.table();
        let query = Select {
            table,
            filters: self.scope.filters(),
            order: order_for(table, self.rule),
        };
        let fail = |source| RetrievalError {
            scope: self.scope.clone(),
            source,
        };

        let rows = self.store.select(&query).await.map_err(fail)?;
        let mut rows: Vec<T> = from_rows(rows);
        // The backend's null ordering differs from ours; re-sort so the
        // creation-time fallback holds.
        sort_by_rank(&mut rows, self.rule);
        Ok(rows)
    }

    /// Refetch and re-render. Calls arriving while a pass is running collapse
    /// into one extra pass that starts after it.
    async fn reconcile(&self) {
        if self.in_flight.replace(true) {
            self.dirty.set(true);
            return;
        }

        loop {
            self.dirty.set(false);
            match self.load().await {
                Ok(rows) => {
                    tracing::debug!(scope = %self.scope, rows = rows.len(), "reconciled");
                    self.allocator.observe(&rows);
                    *self.snapshot.borrow_mut() = rows.clone();
                    self.renderer.render(&rows);
                }
                Err(e) => tracing::warn!(error = %e, "reconciliation failed, keeping last view"),
            }
            if !self.dirty.get() {
                break;
            }
        }
        self.in_flight.set(false);
    }

    fn change_callback(self: &Rc<Self>, spawner: &Spawner) -> ChangeCallback {
        let weak = Rc::downgrade(self);
        let spawner = spawner.clone();
        Rc::new(move |event: ChangeEvent| {
            tracing::debug!(table = %event.table, kind = ?event.kind, "change notification");
            let weak = weak.clone();
            spawner(
                async move {
                    if let Some(view) = weak.upgrade() {
                        view.reconcile().await;
                    }
                }
                .boxed_local(),
            );
        })
    }

    /// Persist `ordered_ids` as the collection's order, one row at a time.
    async fn write_order<P, F>(&self, ordered_ids: &[String], patch: F) -> StoreResult<()>
    where
        P: serde::Serialize,
        F: Fn(Rank) -> P,
    {
        let table = self.scope.table();
        for (id, rank) in self.allocator.ranks_for_order(ordered_ids) {
            self.store
                .update(table, &[Filter::id(id)], to_row(&patch(rank))?)
                .await?;
        }
        Ok(())
    }
}

/// Session behind the lists index.
pub struct HomeSession<S: RemoteStore + 'static, C: Clock + 'static> {
    view: Rc<CollectionView<S, ShoppingList, C>>,
    channels: ScopeChannels<S>,
    config: AppConfig,
    notifier: Rc<dyn Notifier>,
    spawner: Spawner,
}

impl<S: RemoteStore + 'static, C: Clock + 'static> HomeSession<S, C> {
    pub fn new(deps: SessionDeps<S, C>, renderer: Rc<dyn ViewRenderer<ShoppingList>>) -> Self {
        let view = CollectionView::new(
            deps.store.clone(),
            Scope::AllLists,
            deps.config.list_ordering,
            renderer,
            deps.clock,
        );
        Self {
            view,
            channels: ScopeChannels::new(deps.store),
            config: deps.config,
            notifier: deps.notifier,
            spawner: deps.spawner,
        }
    }

    /// Subscribe to list changes and render the first snapshot.
    pub async fn open(&self) {
        open_view(&self.view, &self.channels, &self.spawner).await;
    }

    pub fn close(&self) {
        self.channels.close_all();
    }

    pub async fn dispatch(&self, cmd: HomeCommand) -> Result<CommandOutcome, MutationError> {
        let op = cmd.operation();
        let result = self.execute(cmd, op).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "list write failed");
            self.notifier.mutation_failed(e);
        }
        result
    }

    async fn execute(&self, cmd: HomeCommand, op: Operation) -> Result<CommandOutcome, MutationError> {
        let store = &self.view.store;
        let now = self.view.allocator.clock().now();

        match cmd {
            HomeCommand::CreateList { name } => {
                let row = NewList {
                    name: self.config.new_list_name(&name),
                    created_at: now,
                    updated_at: now,
                    order_index: self.view.allocator.rank_for_new_entity(),
                };
                let stored = store.insert(Table::Lists, to_row(&row).during(op)?).await.during(op)?;
                let id = row_id(&stored).during(op)?;
                tracing::debug!(list = %id, "list created");
                Ok(CommandOutcome::ListCreated(id))
            }
            HomeCommand::RenameList { id, name } => {
                let patch = ListPatch {
                    name: Some(self.config.renamed_list_name(&name)),
                    updated_at: Some(now),
                    ..Default::default()
                };
                store
                    .update(Table::Lists, &[Filter::id(&id)], to_row(&patch).during(op)?)
                    .await
                    .during(op)?;
                Ok(CommandOutcome::Done)
            }
            HomeCommand::DeleteList { id } => {
                store.delete(Table::Lists, &[Filter::id(&id)]).await.during(op)?;
                Ok(CommandOutcome::Done)
            }
            HomeCommand::Reorder { ordered_ids } => {
                if !self.config.reorder_lists {
                    return Ok(CommandOutcome::Done);
                }
                self.view
                    .write_order(&ordered_ids, |rank| ListPatch {
                        order_index: Some(rank),
                        ..Default::default()
                    })
                    .await
                    .during(op)?;
                Ok(CommandOutcome::Done)
            }
        }
    }
}

/// Session behind one list's item view.
pub struct ListSession<S: RemoteStore + 'static, C: Clock + 'static> {
    list_id: String,
    view: Rc<CollectionView<S, Item, C>>,
    channels: ScopeChannels<S>,
    config: AppConfig,
    notifier: Rc<dyn Notifier>,
    spawner: Spawner,
}

impl<S: RemoteStore + 'static, C: Clock + 'static> ListSession<S, C> {
    pub fn new(
        deps: SessionDeps<S, C>,
        list_id: impl Into<String>,
        renderer: Rc<dyn ViewRenderer<Item>>,
    ) -> Self {
        let list_id = list_id.into();
        let view = CollectionView::new(
            deps.store.clone(),
            Scope::ItemsOf(list_id.clone()),
            deps.config.item_ordering,
            renderer,
            deps.clock,
        );
        Self {
            list_id,
            view,
            channels: ScopeChannels::new(deps.store),
            config: deps.config,
            notifier: deps.notifier,
            spawner: deps.spawner,
        }
    }

    pub async fn open(&self) {
        open_view(&self.view, &self.channels, &self.spawner).await;
    }

    pub fn close(&self) {
        self.channels.close_all();
    }

    /// Items not yet checked off in the last snapshot.
    pub fn remaining(&self) -> usize {
        self.view.snapshot.borrow().iter().filter(|i| !i.done).count()
    }

    /// Current name of the list, for the header.
    pub async fn load_list_name(&self) -> Result<String, RetrievalError> {
        let scope = Scope::List(self.list_id.clone());
        let query = Select {
            table: scope.table(),
            filters: scope.filters(),
            order: vec![],
        };
        let fail = |source| RetrievalError {
            scope: scope.clone(),
            source,
        };

        let result = async {
            let rows = self.view.store.select(&query).await.map_err(fail)?;
            let lists: Vec<ShoppingList> = from_rows(rows);
            lists
                .into_iter()
                .next()
                .map(|l| l.name)
                .ok_or_else(|| fail(StoreError::NotFound(self.list_id.clone())))
        }
        .await;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "could not load list name");
        }
        result
    }

    pub async fn dispatch(&self, cmd: ListCommand) -> Result<CommandOutcome, MutationError> {
        let op = cmd.operation();
        let result = self.execute(cmd, op).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, list = %self.list_id, "item write failed");
            self.notifier.mutation_failed(e);
        }
        result
    }

    async fn execute(&self, cmd: ListCommand, op: Operation) -> Result<CommandOutcome, MutationError> {
        let store = &self.view.store;
        let now = self.view.allocator.clock().now();
        let in_list = || Filter::eq("list_id", &self.list_id);

        match cmd {
            ListCommand::AddItem { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(CommandOutcome::Done);
                }
                let row = NewItem {
                    list_id: self.list_id.clone(),
                    text: text.to_string(),
                    done: false,
                    quantity: String::new(),
                    note: String::new(),
                    created_at: now,
                    updated_at: now,
                    order_index: self.view.allocator.rank_for_new_entity(),
                };
                store.insert(Table::Items, to_row(&row).during(op)?).await.during(op)?;
            }
            ListCommand::ToggleDone { id } => {
                let done = self
                    .view
                    .snapshot
                    .borrow()
                    .iter()
                    .find(|i| i.id == id)
                    .map(|i| i.done)
                    .ok_or_else(|| MutationError::new(op, StoreError::NotFound(id.clone())))?;
                let patch = ItemPatch {
                    done: Some(!done),
                    updated_at: Some(now),
                    ..Default::default()
                };
                store
                    .update(Table::Items, &[Filter::id(&id)], to_row(&patch).during(op)?)
                    .await
                    .during(op)?;
            }
            ListCommand::EditItem { id, text } => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(CommandOutcome::Done);
                }
                let patch = ItemPatch {
                    text: Some(text.to_string()),
                    updated_at: Some(now),
                    ..Default::default()
                };
                store
                    .update(Table::Items, &[Filter::id(&id)], to_row(&patch).during(op)?)
                    .await
                    .during(op)?;
            }
            ListCommand::RemoveItem { id } => {
                store.delete(Table::Items, &[Filter::id(&id)]).await.during(op)?;
            }
            ListCommand::ClearAll => {
                store.delete(Table::Items, &[in_list()]).await.during(op)?;
            }
            ListCommand::ClearCompleted => {
                store
                    .delete(Table::Items, &[in_list(), Filter::eq("done", true)])
                    .await
                    .during(op)?;
            }
            ListCommand::RenameList { name } => {
                let patch = ListPatch {
                    name: Some(self.config.renamed_list_name(&name)),
                    updated_at: Some(now),
                    ..Default::default()
                };
                store
                    .update(
                        Table::Lists,
                        &[Filter::id(&self.list_id)],
                        to_row(&patch).during(op)?,
                    )
                    .await
                    .during(op)?;
            }
            ListCommand::Reorder { ordered_ids } => {
                if self.config.reorder_items {
                    self.view
                        .write_order(&ordered_ids, |rank| ItemPatch {
                            order_index: Some(rank),
                            ..Default::default()
                        })
                        .await
                        .during(op)?;
                }
            }
        }
        Ok(CommandOutcome::Done)
    }
}

async fn open_view<S, T, C>(
    view: &Rc<CollectionView<S, T, C>>,
    channels: &ScopeChannels<S>,
    spawner: &Spawner,
) where
    S: RemoteStore + 'static,
    T: Ranked + DeserializeOwned + Clone + 'static,
    C: Clock + 'static,
{
    // Subscribe before the first fetch so nothing written in between is missed.
    if let Err(source) = channels.open(&view.scope, view.change_callback(spawner)) {
        let e = RetrievalError {
            scope: view.scope.clone(),
            source,
        };
        tracing::warn!(error = %e, "live updates unavailable");
    }
    view.reconcile().await;
}
