use super::{confirm, input_value, share_list};
use crate::components::reorderable::{use_reorderable, Reorderable};
use crate::components::ui::{
    Button, ButtonSize, ButtonVariant, Input, ItemMeta, Spinner, Toolbar, DRAGGING_CLASS,
    HANDLE_CLASS, ITEM_ROW_CLASS,
};
use crate::models::Item;
use crate::state::{AppContext, SignalRenderer};
use crate::storage::Theme;
use crate::store::SupabaseStore;
use crate::sync::{ListCommand, ListSession};
use crate::util::{format_timestamp, SystemClock};
use icons::{ArrowLeft, GripVertical, Moon, Plus, Share2, Sun, Trash2};
use leptos::html;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::hooks::{use_location, use_navigate};
use std::rc::Rc;
use wasm_bindgen::JsCast;

type Session = Rc<ListSession<SupabaseStore, SystemClock>>;

#[component]
pub fn ListPage(#[prop(into)] list_id: String) -> impl IntoView {
    let app = expect_context::<AppContext>().0;
    let navigate = StoredValue::new(use_navigate());
    let pathname = use_location().pathname;
    let (theme, show_timestamps) = (app.theme, app.show_timestamps);
    let prefs = StoredValue::new(app.clone());

    let renderer = SignalRenderer::new();
    let (items, loaded) = (renderer.rows, renderer.loaded);
    let session: StoredValue<Session, LocalStorage> = StoredValue::new_local(Rc::new(
        ListSession::new(app.session_deps(), list_id.clone(), Rc::new(renderer)),
    ));

    let list_name: RwSignal<String> = RwSignal::new(String::new());
    // Name as last read or written; `None` until the first read succeeds.
    let saved_name: RwSignal<Option<String>> = RwSignal::new(None);

    spawn_local(async move {
        let s = session.get_value();
        if let Ok(name) = s.load_list_name().await {
            list_name.set(name.clone());
            saved_name.set(Some(name));
        }
        s.open().await;
    });
    on_cleanup(move || {
        session.try_with_value(|s| s.close());
    });

    let dispatch = move |cmd: ListCommand| {
        let s = session.get_value();
        spawn_local(async move {
            let _ = s.dispatch(cmd).await;
        });
    };

    let go_home = move |_: web_sys::MouseEvent| {
        let path = pathname.get_untracked();
        navigate.with_value(|nav| nav(&path, Default::default()));
    };

    let save_name = move |_: web_sys::FocusEvent| {
        let saved = saved_name.get_untracked();
        let Some(name) = rename_to_save(saved.as_deref(), &list_name.get_untracked(), |n| {
            prefs.with_value(|a| a.config.renamed_list_name(n))
        }) else {
            return;
        };
        list_name.set(name.clone());
        saved_name.set(Some(name.clone()));
        dispatch(ListCommand::RenameList { name });
    };

    let new_item: RwSignal<String> = RwSignal::new(String::new());
    let add_item = Callback::new(move |_: ()| {
        let text = new_item.get_untracked();
        new_item.set(String::new());
        dispatch(ListCommand::AddItem { text });
    });

    let remaining = move || {
        items.track();
        session.with_value(|s| s.remaining())
    };

    let clear_all = move |_: web_sys::MouseEvent| {
        if confirm("Remove every item from this list?") {
            dispatch(ListCommand::ClearAll);
        }
    };

    let container: NodeRef<html::Div> = NodeRef::new();
    let draggable = app.config.reorder_items;
    let reorder = use_reorderable(
        container,
        &app.config,
        Callback::new(move |ordered_ids: Vec<String>| {
            dispatch(ListCommand::Reorder { ordered_ids })
        }),
    );

    Effect::new(move |_| {
        let ids = items.with(|rows| rows.iter().map(|i| i.id.clone()).collect());
        reorder.sync(ids);
    });

    let ordered = move || {
        let rows = items.get();
        reorder
            .order
            .get()
            .into_iter()
            .filter_map(|id| rows.iter().find(|i| i.id == id).cloned())
            .collect::<Vec<_>>()
    };

    let share_id = StoredValue::new(list_id);
    let row_dispatch = Callback::new(dispatch);

    view! {
        <div class="min-h-screen bg-background text-foreground">
            <div class="mx-auto flex w-full max-w-2xl flex-col gap-4 px-4 py-6">
                <Toolbar>
                    <Button variant=ButtonVariant::Ghost size=ButtonSize::Icon on:click=go_home attr:title="All lists">
                        <ArrowLeft />
                    </Button>
                    <input
                        class="min-w-0 flex-1 rounded-md border-none bg-transparent px-1 text-xl font-semibold outline-none focus:ring-2 focus:ring-ring/50"
                        placeholder="List name"
                        prop:value=move || list_name.get()
                        on:input=move |ev| {
                            if let Some(v) = input_value(&ev) {
                                list_name.set(v);
                            }
                        }
                        on:blur=save_name
                    />
                    <Button
                        variant=ButtonVariant::Ghost
                        size=ButtonSize::Icon
                        attr:title="Share"
                        on:click=move |_| share_list(&share_id.get_value())
                    >
                        <Share2 />
                    </Button>
                    <Button
                        variant=ButtonVariant::Ghost
                        size=ButtonSize::Icon
                        attr:title="Toggle theme"
                        on:click=move |_| prefs.with_value(|a| a.toggle_theme())
                    >
                        {move || if theme.get() == Theme::Dark {
                            view! { <Sun /> }.into_any()
                        } else {
                            view! { <Moon /> }.into_any()
                        }}
                    </Button>
                    <Button
                        variant=ButtonVariant::Ghost
                        size=ButtonSize::Sm
                        on:click=move |_| prefs.with_value(|a| a.toggle_timestamps())
                    >
                        {move || if show_timestamps.get() { "Hide times" } else { "Show times" }}
                    </Button>
                </Toolbar>

                <div class="flex gap-2">
                    <Input
                        id="new-item"
                        placeholder="Add an item"
                        bind_value=new_item
                        on_enter=add_item
                        autofocus=true
                    />
                    <Button on:click=move |_| add_item.run(())>
                        <Plus />
                        "Add"
                    </Button>
                </div>

                <Toolbar class="justify-between text-sm text-muted-foreground">
                    <span>{move || format!("{} remaining", remaining())}</span>
                    <div class="flex gap-1">
                        <Button
                            variant=ButtonVariant::Outline
                            size=ButtonSize::Sm
                            on:click=move |_| dispatch(ListCommand::ClearCompleted)
                        >
                            "Clear completed"
                        </Button>
                        <Button variant=ButtonVariant::Destructive size=ButtonSize::Sm on:click=clear_all>
                            "Clear all"
                        </Button>
                    </div>
                </Toolbar>

                <Show when=move || !loaded.get()>
                    <Spinner class="mx-auto my-8" />
                </Show>

                <div
                    node_ref=container
                    class="flex flex-col gap-2"
                    on:mousedown=move |ev| reorder.on_mousedown(ev)
                    on:mouseleave=move |_| reorder.on_end()
                    on:touchstart=move |ev| reorder.on_touchstart(ev)
                    on:touchmove=move |ev| reorder.on_touchmove(ev)
                    on:touchend=move |_| reorder.on_end()
                    on:touchcancel=move |_| reorder.on_end()
                >
                    <For
                        each=ordered
                        key=|i: &Item| (i.id.clone(), i.text.clone(), i.done, i.updated_at)
                        children=move |item: Item| {
                            view! { <ItemRowView item=item dispatch=row_dispatch reorder=reorder draggable=draggable /> }
                        }
                    />
                </div>
            </div>
        </div>
    }
}

#[component]
fn ItemRowView(
    item: Item,
    dispatch: Callback<ListCommand>,
    reorder: Reorderable,
    draggable: bool,
) -> impl IntoView {
    let id = StoredValue::new(item.id.clone());
    let done = item.done;

    let class = move || {
        let lifted = reorder.dragging.get().as_deref() == Some(id.get_value().as_str());
        let base = if done {
            format!("{ITEM_ROW_CLASS} opacity-60")
        } else {
            ITEM_ROW_CLASS.to_string()
        };
        if lifted {
            format!("{base} {DRAGGING_CLASS}")
        } else {
            base
        }
    };

    let original = StoredValue::new(item.text.clone());
    let on_edit = move |ev: web_sys::Event| {
        let Some(input) = ev
            .target()
            .and_then(|t| t.dyn_into::<web_sys::HtmlInputElement>().ok())
        else {
            return;
        };
        match item_edit(id.get_value(), input.value()) {
            Some(cmd) => dispatch.run(cmd),
            // Blank edits are dropped, so show the stored text again.
            None => input.set_value(&original.get_value()),
        }
    };

    view! {
        <div data-reorder-id=item.id.clone() class=class>
            {draggable.then(|| view! {
                <span data-drag-handle="" class=HANDLE_CLASS title="Hold to drag">
                    <GripVertical />
                </span>
            })}
            <input
                type="checkbox"
                class="size-4 shrink-0 accent-primary"
                prop:checked=done
                on:change=move |_| dispatch.run(ListCommand::ToggleDone { id: id.get_value() })
            />
            <input
                class=if done {
                    "min-w-0 flex-1 bg-transparent text-sm line-through outline-none"
                } else {
                    "min-w-0 flex-1 bg-transparent text-sm outline-none"
                }
                prop:value=item.text.clone()
                on:change=on_edit
            />
            <ItemMeta>
                <div>{format!("Added: {}", format_timestamp(item.created_at.as_ref()))}</div>
                <div>{format!("Updated: {}", format_timestamp(item.updated_at.as_ref()))}</div>
            </ItemMeta>
            <Button
                variant=ButtonVariant::Ghost
                size=ButtonSize::Icon
                class="text-destructive"
                attr:title="Delete"
                on:click=move |_| dispatch.run(ListCommand::RemoveItem { id: id.get_value() })
            >
                <Trash2 />
            </Button>
        </div>
    }
}

/// Header rename worth writing: only once the stored name is known and the
/// normalized value differs from it.
fn rename_to_save(
    saved: Option<&str>,
    typed: &str,
    normalize: impl Fn(&str) -> String,
) -> Option<String> {
    let saved = saved?;
    let name = normalize(typed);
    (name != saved).then_some(name)
}

/// Edit command for a committed item text, or `None` when it is blank.
fn item_edit(id: String, text: String) -> Option<ListCommand> {
    if text.trim().is_empty() {
        None
    } else {
        Some(ListCommand::EditItem { id, text })
    }
}
