use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {CardTitle, h2, "flex-1 truncate leading-none font-semibold"}
    clx! {CardMeta, p, "meta text-muted-foreground text-xs"}
    clx! {CardActions, div, "flex flex-wrap items-center gap-1 pt-1"}
    clx! {ItemMeta, div, "meta text-muted-foreground flex shrink-0 flex-col text-right text-[10px] leading-tight"}
    clx! {Toolbar, div, "flex flex-wrap items-center gap-2"}
}

pub use components::*;

/// Wrapper of one reorderable entry; `dragging` is added while it is lifted.
pub const LIST_CARD_CLASS: &str = "bg-card text-card-foreground flex flex-col gap-2 rounded-xl border p-4 shadow-sm transition-shadow hover:shadow-md cursor-pointer select-none";
pub const ITEM_ROW_CLASS: &str =
    "bg-card flex items-center gap-2 rounded-lg border px-2 py-2 select-none";
pub const DRAGGING_CLASS: &str = "dragging opacity-70 shadow-lg ring-2 ring-primary/40";
pub const HANDLE_CLASS: &str =
    "text-muted-foreground cursor-grab touch-none px-1 active:cursor-grabbing";
