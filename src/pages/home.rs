use super::{confirm, input_value, share_list};
use crate::components::reorderable::{use_reorderable, Reorderable};
use crate::components::ui::{
    Button, ButtonSize, ButtonVariant, CardActions, CardMeta, CardTitle, Input, Spinner,
    DRAGGING_CLASS, HANDLE_CLASS, LIST_CARD_CLASS,
};
use crate::models::ShoppingList;
use crate::state::{AppContext, SignalRenderer};
use crate::store::SupabaseStore;
use crate::sync::{CommandOutcome, HomeCommand, HomeSession};
use crate::util::{format_timestamp, SystemClock};
use icons::{GripVertical, Plus, Share2, Trash2};
use leptos::html;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::hooks::{use_location, use_navigate};
use std::rc::Rc;

type Session = Rc<HomeSession<SupabaseStore, SystemClock>>;

/// Card-level actions, shared by every card.
#[derive(Clone, Copy)]
struct ListActions {
    open: Callback<String>,
    rename: Callback<(String, String)>,
    delete: Callback<(String, String)>,
}

#[component]
pub fn HomePage() -> impl IntoView {
    let app = expect_context::<AppContext>().0;
    let navigate = StoredValue::new(use_navigate());
    let pathname = use_location().pathname;

    let renderer = SignalRenderer::new();
    let (lists, loaded) = (renderer.rows, renderer.loaded);
    let session: StoredValue<Session, LocalStorage> = StoredValue::new_local(Rc::new(
        HomeSession::new(app.session_deps(), Rc::new(renderer)),
    ));

    spawn_local(async move {
        let s = session.get_value();
        s.open().await;
    });
    on_cleanup(move || {
        session.try_with_value(|s| s.close());
    });

    let dispatch = move |cmd: HomeCommand| {
        let s = session.get_value();
        spawn_local(async move {
            // Failures already reached the user through the notifier.
            let _ = s.dispatch(cmd).await;
        });
    };

    let open_list = move |id: String| {
        let path = pathname.get_untracked();
        navigate.with_value(|nav| {
            nav(
                &format!("{path}?list={}", urlencoding::encode(&id)),
                Default::default(),
            )
        });
    };

    let new_name: RwSignal<String> = RwSignal::new(String::new());
    let create_list = Callback::new(move |_: ()| {
        let name = new_name.get_untracked();
        new_name.set(String::new());
        let s = session.get_value();
        spawn_local(async move {
            if let Ok(CommandOutcome::ListCreated(id)) =
                s.dispatch(HomeCommand::CreateList { name }).await
            {
                open_list(id);
            }
        });
    });

    let actions = ListActions {
        open: Callback::new(open_list),
        rename: Callback::new(move |(id, name): (String, String)| {
            dispatch(HomeCommand::RenameList { id, name })
        }),
        delete: Callback::new(move |(id, name): (String, String)| {
            if confirm(&format!("Delete \"{name}\" and all its items?")) {
                dispatch(HomeCommand::DeleteList { id });
            }
        }),
    };

    let container: NodeRef<html::Div> = NodeRef::new();
    let draggable = app.config.reorder_lists;
    let reorder = use_reorderable(
        container,
        &app.config,
        Callback::new(move |ordered_ids: Vec<String>| {
            dispatch(HomeCommand::Reorder { ordered_ids })
        }),
    );

    Effect::new(move |_| {
        let ids = lists.with(|ls| ls.iter().map(|l| l.id.clone()).collect());
        reorder.sync(ids);
    });

    let ordered = move || {
        let rows = lists.get();
        reorder
            .order
            .get()
            .into_iter()
            .filter_map(|id| rows.iter().find(|l| l.id == id).cloned())
            .collect::<Vec<_>>()
    };

    view! {
        <div class="min-h-screen bg-background text-foreground">
            <div class="mx-auto flex w-full max-w-4xl flex-col gap-4 px-4 py-6">
                <header class="flex items-center justify-between">
                    <h1 class="text-xl font-semibold">"Shopping Lists"</h1>
                </header>

                <div class="flex gap-2">
                    <Input
                        id="new-list-name"
                        placeholder="New list name"
                        bind_value=new_name
                        on_enter=create_list
                    />
                    <Button on:click=move |_| create_list.run(())>
                        <Plus />
                        "Create"
                    </Button>
                </div>

                <Show when=move || !loaded.get()>
                    <Spinner class="mx-auto my-8" />
                </Show>
                <Show when=move || loaded.get() && lists.with(|l| l.is_empty())>
                    <p class="py-8 text-center text-sm text-muted-foreground">"No lists yet."</p>
                </Show>

                <div
                    node_ref=container
                    class="grid gap-3 sm:grid-cols-2 lg:grid-cols-3"
                    on:mousedown=move |ev| reorder.on_mousedown(ev)
                    on:mouseleave=move |_| reorder.on_end()
                    on:touchstart=move |ev| reorder.on_touchstart(ev)
                    on:touchmove=move |ev| reorder.on_touchmove(ev)
                    on:touchend=move |_| reorder.on_end()
                    on:touchcancel=move |_| reorder.on_end()
                >
                    <For
                        each=ordered
                        key=|l: &ShoppingList| (l.id.clone(), l.name.clone(), l.updated_at, l.created_at)
                        children=move |l: ShoppingList| {
                            view! { <ListCardView list=l actions=actions reorder=reorder draggable=draggable /> }
                        }
                    />
                </div>
            </div>
        </div>
    }
}

#[component]
fn ListCardView(
    list: ShoppingList,
    actions: ListActions,
    reorder: Reorderable,
    draggable: bool,
) -> impl IntoView {
    let editing = RwSignal::new(false);
    let draft = RwSignal::new(list.name.clone());
    let rename_ref: NodeRef<html::Input> = NodeRef::new();

    Effect::new(move |_| {
        if editing.get() {
            if let Some(input) = rename_ref.get() {
                let _ = input.focus();
                input.select();
            }
        }
    });

    let id = StoredValue::new(list.id.clone());
    let name = StoredValue::new(list.name.clone());
    let meta = format!(
        "Updated: {} • Created: {}",
        format_timestamp(list.updated_at.as_ref()),
        format_timestamp(list.created_at.as_ref())
    );

    let class = move || {
        let lifted = reorder.dragging.get().as_deref() == Some(id.get_value().as_str());
        if lifted {
            format!("{LIST_CARD_CLASS} {DRAGGING_CLASS}")
        } else {
            LIST_CARD_CLASS.to_string()
        }
    };

    let on_card_click = move |_: web_sys::MouseEvent| {
        if editing.get_untracked() || reorder.just_dragged.get_untracked() {
            return;
        }
        actions.open.run(id.get_value());
    };

    let start_rename = move |ev: web_sys::MouseEvent| {
        ev.stop_propagation();
        draft.set(name.get_value());
        editing.set(true);
    };

    let save_rename = move || {
        if !editing.get_untracked() {
            return;
        }
        editing.set(false);
        actions.rename.run((id.get_value(), draft.get_untracked()));
    };

    let on_rename_key = move |ev: web_sys::KeyboardEvent| match ev.key().as_str() {
        "Enter" => {
            ev.prevent_default();
            save_rename();
        }
        "Escape" => editing.set(false),
        _ => {}
    };

    view! {
        <div data-reorder-id=list.id.clone() class=class on:click=on_card_click>
            <div class="flex items-center gap-2">
                {draggable.then(|| view! {
                    <span data-drag-handle="" class=HANDLE_CLASS title="Hold to drag">
                        <GripVertical />
                    </span>
                })}
                <Show
                    when=move || editing.get()
                    fallback=move || view! {
                        <CardTitle attr:title="Double-click to rename" on:dblclick=start_rename>
                            {name.get_value()}
                        </CardTitle>
                    }
                >
                    <input
                        class="flex-1 rounded-md border bg-transparent px-2 py-1 text-sm"
                        prop:value=move || draft.get()
                        on:input=move |ev| {
                            if let Some(v) = input_value(&ev) {
                                draft.set(v);
                            }
                        }
                        on:keydown=on_rename_key
                        on:blur=move |_| save_rename()
                        on:click=|ev| ev.stop_propagation()
                        node_ref=rename_ref
                    />
                </Show>
            </div>
            <CardMeta>{meta}</CardMeta>
            <CardActions>
                <Button
                    variant=ButtonVariant::Outline
                    size=ButtonSize::Sm
                    on:click=move |ev: web_sys::MouseEvent| {
                        ev.stop_propagation();
                        actions.open.run(id.get_value());
                    }
                >
                    "Open"
                </Button>
                <Button
                    variant=ButtonVariant::Ghost
                    size=ButtonSize::Sm
                    on:click=move |ev: web_sys::MouseEvent| {
                        ev.stop_propagation();
                        share_list(&id.get_value());
                    }
                >
                    <Share2 />
                    "Share"
                </Button>
                <Button
                    variant=ButtonVariant::Ghost
                    size=ButtonSize::Sm
                    class="text-destructive"
                    on:click=move |ev: web_sys::MouseEvent| {
                        ev.stop_propagation();
                        actions.delete.run((id.get_value(), name.get_value()));
                    }
                >
                    <Trash2 />
                    "Delete"
                </Button>
            </CardActions>
        </div>
    }
}
