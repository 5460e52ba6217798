//! Change-notification channels over the Supabase Realtime websocket
//! (Phoenix v1 JSON protocol).
//!
//! One socket carries every channel. Each channel joins a `postgres_changes`
//! topic for one table and optional row filter. On reconnect every channel is
//! rejoined and its callback fires once with [`ChangeKind::Resync`], since
//! events may have been missed while disconnected.

use crate::error::{StoreError, StoreResult};
use crate::models::{ChangeEvent, ChangeKind, Scope, Table};
use crate::store::{ChangeCallback, ChannelId};
use gloo_timers::callback::{Interval, Timeout};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

const HEARTBEAT_MS: u32 = 25_000;
const RECONNECT_BACKOFF_MS: [u32; 4] = [1_000, 2_000, 5_000, 10_000];

/// One Phoenix frame.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

pub(crate) fn topic_for(scope: &Scope) -> String {
    format!("realtime:{}", scope.channel_name())
}

/// Row filter in Realtime syntax (`list_id=eq.42`), if the scope has one.
pub(crate) fn postgres_filter(scope: &Scope) -> Option<String> {
    let filters = scope.filters();
    if filters.is_empty() {
        return None;
    }
    Some(
        filters
            .iter()
            .map(|f| format!("{}=eq.{}", f.field, f.value))
            .collect::<Vec<_>>()
            .join(","),
    )
}

pub(crate) fn join_message(scope: &Scope, access_token: &str, msg_ref: u64) -> PhoenixMessage {
    let mut change = serde_json::json!({
        "event": "*",
        "schema": "public",
        "table": scope.table().as_ref(),
    });
    if let Some(filter) = postgres_filter(scope) {
        change["filter"] = serde_json::Value::String(filter);
    }

    PhoenixMessage {
        topic: topic_for(scope),
        event: "phx_join".to_string(),
        payload: serde_json::json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            },
            "access_token": access_token,
        }),
        msg_ref: Some(msg_ref.to_string()),
    }
}

pub(crate) fn leave_message(topic: &str, msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_leave".to_string(),
        payload: serde_json::json!({}),
        msg_ref: Some(msg_ref.to_string()),
    }
}

pub(crate) fn heartbeat_message(msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: serde_json::json!({}),
        msg_ref: Some(msg_ref.to_string()),
    }
}

/// Row change carried by a `postgres_changes` frame, if this frame is one.
pub(crate) fn parse_change(msg: &PhoenixMessage) -> Option<ChangeEvent> {
    if msg.event != "postgres_changes" {
        return None;
    }
    let data = msg.payload.get("data")?;
    let kind = match data.get("type")?.as_str()? {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        _ => return None,
    };
    let table = match data.get("table")?.as_str()? {
        "lists" => Table::Lists,
        "items" => Table::Items,
        _ => return None,
    };
    Some(ChangeEvent { table, kind })
}

/// Error text from a rejected join or a channel `system` error, if any.
pub(crate) fn channel_error(msg: &PhoenixMessage) -> Option<String> {
    let status = msg.payload.get("status").and_then(|s| s.as_str());
    match (msg.event.as_str(), status) {
        ("phx_reply", Some("error")) | ("system", Some("error")) | ("phx_error", _) => Some(
            msg.payload
                .get("response")
                .or_else(|| msg.payload.get("message"))
                .map(|v| v.to_string())
                .unwrap_or_else(|| "channel error".to_string()),
        ),
        _ => None,
    }
}

pub(crate) fn backoff_ms(attempt: usize) -> u32 {
    RECONNECT_BACKOFF_MS[attempt.min(RECONNECT_BACKOFF_MS.len() - 1)]
}

struct Channel {
    scope: Scope,
    topic: String,
    callback: ChangeCallback,
}

struct SocketHandlers {
    _on_open: Closure<dyn FnMut()>,
    _on_message: Closure<dyn FnMut(web_sys::MessageEvent)>,
    _on_close: Closure<dyn FnMut(web_sys::CloseEvent)>,
}

pub struct RealtimeClient {
    url: String,
    access_token: String,
    socket: RefCell<Option<web_sys::WebSocket>>,
    handlers: RefCell<Option<SocketHandlers>>,
    heartbeat: RefCell<Option<Interval>>,
    reconnect: RefCell<Option<Timeout>>,
    channels: RefCell<BTreeMap<u64, Channel>>,
    next_channel: Cell<u64>,
    next_ref: Cell<u64>,
    attempts: Cell<usize>,
    has_opened: Cell<bool>,
    me: Weak<RealtimeClient>,
}

impl RealtimeClient {
    pub fn new(url: String, access_token: String) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            url,
            access_token,
            socket: RefCell::new(None),
            handlers: RefCell::new(None),
            heartbeat: RefCell::new(None),
            reconnect: RefCell::new(None),
            channels: RefCell::new(BTreeMap::new()),
            next_channel: Cell::new(0),
            next_ref: Cell::new(0),
            attempts: Cell::new(0),
            has_opened: Cell::new(false),
            me: me.clone(),
        })
    }

    pub fn subscribe(&self, scope: &Scope, callback: ChangeCallback) -> StoreResult<ChannelId> {
        let id = self.next_channel.get() + 1;
        self.next_channel.set(id);

        let topic = topic_for(scope);
        self.channels.borrow_mut().insert(
            id,
            Channel {
                scope: scope.clone(),
                topic,
                callback,
            },
        );

        if self.is_open() {
            let join = join_message(scope, &self.access_token, self.bump_ref());
            self.send(&join)?;
        } else if self.socket.borrow().is_none() {
            self.connect()?;
        }
        // Otherwise the socket is still connecting; on_open joins every channel.

        tracing::debug!(channel = id, %scope, "realtime channel subscribed");
        Ok(ChannelId(id))
    }

    pub fn unsubscribe(&self, channel: ChannelId) {
        let Some(removed) = self.channels.borrow_mut().remove(&channel.0) else {
            return;
        };

        // Another channel may still use the same topic; only leave the last one.
        let topic_in_use = self
            .channels
            .borrow()
            .values()
            .any(|c| c.topic == removed.topic);
        if !topic_in_use && self.is_open() {
            let leave = leave_message(&removed.topic, self.bump_ref());
            if let Err(e) = self.send(&leave) {
                tracing::warn!(error = %e, topic = %removed.topic, "failed to leave channel");
            }
        }
        tracing::debug!(channel = channel.0, "realtime channel removed");
    }

    fn bump_ref(&self) -> u64 {
        let r = self.next_ref.get() + 1;
        self.next_ref.set(r);
        r
    }

    fn is_open(&self) -> bool {
        self.socket
            .borrow()
            .as_ref()
            .is_some_and(|ws| ws.ready_state() == web_sys::WebSocket::OPEN)
    }

    fn send(&self, msg: &PhoenixMessage) -> StoreResult<()> {
        let text = serde_json::to_string(msg).map_err(StoreError::decode)?;
        let socket = self.socket.borrow();
        let ws = socket
            .as_ref()
            .ok_or_else(|| StoreError::Channel("socket not connected".to_string()))?;
        ws.send_with_str(&text)
            .map_err(|e| StoreError::Channel(format!("{e:?}")))
    }

    fn connect(&self) -> StoreResult<()> {
        let ws = web_sys::WebSocket::new(&self.url)
            .map_err(|e| StoreError::Channel(format!("{e:?}")))?;

        let me = self.me.clone();
        let on_open = Closure::<dyn FnMut()>::new(move || {
            if let Some(client) = me.upgrade() {
                client.handle_open();
            }
        });

        let me = self.me.clone();
        let on_message =
            Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |ev: web_sys::MessageEvent| {
                let (Some(client), Some(text)) = (me.upgrade(), ev.data().as_string()) else {
                    return;
                };
                client.handle_text(&text);
            });

        let me = self.me.clone();
        let on_close =
            Closure::<dyn FnMut(web_sys::CloseEvent)>::new(move |ev: web_sys::CloseEvent| {
                if let Some(client) = me.upgrade() {
                    client.handle_close(ev.code());
                }
            });

        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        *self.socket.borrow_mut() = Some(ws);
        *self.handlers.borrow_mut() = Some(SocketHandlers {
            _on_open: on_open,
            _on_message: on_message,
            _on_close: on_close,
        });
        Ok(())
    }

    fn handle_open(&self) {
        let reconnected = self.has_opened.replace(true);
        self.attempts.set(0);

        let joins: Vec<PhoenixMessage> = self
            .channels
            .borrow()
            .values()
            .map(|c| c.scope.clone())
            .collect::<Vec<_>>()
            .iter()
            .map(|scope| join_message(scope, &self.access_token, self.bump_ref()))
            .collect();
        for join in &joins {
            if let Err(e) = self.send(join) {
                tracing::warn!(error = %e, topic = %join.topic, "failed to join channel");
            }
        }

        let me = self.me.clone();
        *self.heartbeat.borrow_mut() = Some(Interval::new(HEARTBEAT_MS, move || {
            if let Some(client) = me.upgrade() {
                let hb = heartbeat_message(client.bump_ref());
                if let Err(e) = client.send(&hb) {
                    tracing::warn!(error = %e, "realtime heartbeat failed");
                }
            }
        }));

        tracing::debug!(channels = joins.len(), reconnected, "realtime socket open");

        if reconnected {
            let callbacks: Vec<(Table, ChangeCallback)> = self
                .channels
                .borrow()
                .values()
                .map(|c| (c.scope.table(), c.callback.clone()))
                .collect();
            for (table, cb) in callbacks {
                cb(ChangeEvent {
                    table,
                    kind: ChangeKind::Resync,
                });
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let msg: PhoenixMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable realtime frame");
                return;
            }
        };

        if let Some(err) = channel_error(&msg) {
            tracing::warn!(topic = %msg.topic, error = %err, "realtime channel error");
            return;
        }

        let Some(change) = parse_change(&msg) else {
            return;
        };

        let callbacks: Vec<ChangeCallback> = self
            .channels
            .borrow()
            .values()
            .filter(|c| c.topic == msg.topic)
            .map(|c| c.callback.clone())
            .collect();
        for cb in callbacks {
            cb(change.clone());
        }
    }

    fn handle_close(&self, code: u16) {
        // The handlers stay alive until the next connect replaces them; this
        // runs inside one of them.
        self.heartbeat.borrow_mut().take();
        self.socket.borrow_mut().take();

        if self.channels.borrow().is_empty() {
            tracing::debug!(code, "realtime socket closed");
            return;
        }

        let attempt = self.attempts.get();
        self.attempts.set(attempt + 1);
        let delay = backoff_ms(attempt);
        tracing::warn!(code, delay_ms = delay, "realtime socket closed, reconnecting");

        let me = self.me.clone();
        *self.reconnect.borrow_mut() = Some(Timeout::new(delay, move || {
            let Some(client) = me.upgrade() else {
                return;
            };
            if client.socket.borrow().is_some() {
                return;
            }
            if let Err(e) = client.connect() {
                tracing::warn!(error = %e, "realtime reconnect failed");
            }
        }));
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(ws) = self.socket.get_mut().take() {
            ws.set_onopen(None);
            ws.set_onmessage(None);
            ws.set_onclose(None);
            let _ = ws.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_message_for_items_scope() {
        let msg = join_message(&Scope::ItemsOf("l1".into()), "anon", 3);
        let v = serde_json::to_value(&msg).expect("should serialize");
        assert_eq!(v["topic"], "realtime:list_l1");
        assert_eq!(v["event"], "phx_join");
        assert_eq!(v["ref"], "3");
        let change = &v["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "*");
        assert_eq!(change["schema"], "public");
        assert_eq!(change["table"], "items");
        assert_eq!(change["filter"], "list_id=eq.l1");
        assert_eq!(v["payload"]["access_token"], "anon");
    }

    #[test]
    fn test_join_message_for_all_lists_has_no_filter() {
        let msg = join_message(&Scope::AllLists, "anon", 1);
        assert_eq!(msg.topic, "realtime:lists_all");
        let change = &msg.payload["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "lists");
        assert!(change.get("filter").is_none());
    }

    #[test]
    fn test_parse_postgres_change_frame() {
        let text = r#"{
            "topic": "realtime:list_l1",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "type": "UPDATE",
                    "table": "items",
                    "schema": "public",
                    "record": {"id": "i1", "done": true}
                },
                "ids": [123]
            },
            "ref": null
        }"#;
        let msg: PhoenixMessage = serde_json::from_str(text).expect("frame should parse");
        assert_eq!(
            parse_change(&msg),
            Some(ChangeEvent {
                table: Table::Items,
                kind: ChangeKind::Update
            })
        );
    }

    #[test]
    fn test_replies_and_heartbeats_are_not_changes() {
        let reply = PhoenixMessage {
            topic: "phoenix".into(),
            event: "phx_reply".into(),
            payload: serde_json::json!({"status": "ok", "response": {}}),
            msg_ref: Some("4".into()),
        };
        assert_eq!(parse_change(&reply), None);
        assert_eq!(channel_error(&reply), None);
    }

    #[test]
    fn test_rejected_join_is_reported() {
        let reply = PhoenixMessage {
            topic: "realtime:lists_all".into(),
            event: "phx_reply".into(),
            payload: serde_json::json!({"status": "error", "response": {"reason": "bad filter"}}),
            msg_ref: Some("1".into()),
        };
        let err = channel_error(&reply).expect("error reply should be reported");
        assert!(err.contains("bad filter"));
    }

    #[test]
    fn test_backoff_caps_at_last_step() {
        assert_eq!(backoff_ms(0), 1_000);
        assert_eq!(backoff_ms(2), 5_000);
        assert_eq!(backoff_ms(9), 10_000);
    }

    #[test]
    fn test_leave_and_heartbeat_frames() {
        let leave = leave_message("realtime:list_l1", 7);
        assert_eq!(leave.event, "phx_leave");
        assert_eq!(leave.msg_ref.as_deref(), Some("7"));
        let hb = heartbeat_message(8);
        assert_eq!(hb.topic, "phoenix");
        assert_eq!(hb.event, "heartbeat");
    }
}
