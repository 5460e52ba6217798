use serde::{Deserialize, Serialize};

/// Backend connection settings.
///
/// Read from `window.ENV` so one static build can point at any project.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EnvConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

const DEFAULT_SUPABASE_URL: &str = "http://localhost:54321";

impl EnvConfig {
    pub fn new() -> Self {
        let mut cfg = Self {
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_anon_key: String::new(),
        };

        // Accept both `SUPABASE_URL` (README style) and `supabase_url`.
        if let Some(env) = web_sys::window().and_then(|w| w.get("ENV")) {
            if !env.is_undefined() && env.is_object() {
                if let Some(url) = read_env_string(&env, &["SUPABASE_URL", "supabase_url"]) {
                    cfg.supabase_url = url;
                }
                if let Some(key) =
                    read_env_string(&env, &["SUPABASE_ANON_KEY", "supabase_anon_key"])
                {
                    cfg.supabase_anon_key = key;
                }
            }
        }

        cfg.supabase_url = cfg.supabase_url.trim_end_matches('/').to_string();
        cfg
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.supabase_url.clone()
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            urlencoding::encode(&self.supabase_anon_key)
        )
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn read_env_string(env: &wasm_bindgen::JsValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        js_sys::Reflect::get(env, &(*k).into())
            .ok()
            .and_then(|v| v.as_string())
            .filter(|s| !s.trim().is_empty())
    })
}

/// How a collection is ordered on every read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OrderingRule {
    /// Highest rank first; ties by the entity's recency key, newest first.
    #[default]
    RankDescending,
    /// Oldest creation first; ranks are ignored.
    CreatedAscending,
}

/// Client behavior knobs. One instance is fixed for the app's lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub list_ordering: OrderingRule,
    pub item_ordering: OrderingRule,
    pub reorder_lists: bool,
    pub reorder_items: bool,
    pub long_press_ms: u32,
    pub jitter_px: f64,
    pub haptic_ms: u32,
    /// Name given to a list created with a blank name.
    pub new_list_name: &'static str,
    /// Name persisted when a list is renamed to blank.
    pub untitled_list_name: &'static str,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            list_ordering: OrderingRule::RankDescending,
            item_ordering: OrderingRule::RankDescending,
            reorder_lists: true,
            reorder_items: true,
            long_press_ms: 300,
            jitter_px: 8.0,
            haptic_ms: 8,
            new_list_name: "My Shopping List",
            untitled_list_name: "Untitled list",
        }
    }
}

impl AppConfig {
    pub fn new_list_name(&self, input: &str) -> String {
        non_blank_or(input, self.new_list_name)
    }

    pub fn renamed_list_name(&self, input: &str) -> String {
        non_blank_or(input, self.untitled_list_name)
    }
}

fn non_blank_or(input: &str, fallback: &str) -> String {
    let t = input.trim();
    if t.is_empty() {
        fallback.to_string()
    } else {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(url: &str) -> EnvConfig {
        EnvConfig {
            supabase_url: url.to_string(),
            supabase_anon_key: "anon key".to_string(),
        }
    }

    #[test]
    fn test_realtime_url_switches_scheme() {
        assert_eq!(
            cfg("https://abc.supabase.co").realtime_url(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon%20key&vsn=1.0.0"
        );
        assert!(cfg("http://localhost:54321")
            .realtime_url()
            .starts_with("ws://localhost:54321/realtime/v1/websocket"));
    }

    #[test]
    fn test_rest_url() {
        assert_eq!(
            cfg("https://abc.supabase.co").rest_url(),
            "https://abc.supabase.co/rest/v1"
        );
    }

    #[test]
    fn test_blank_names_get_defaults() {
        let c = AppConfig::default();
        assert_eq!(c.new_list_name("   "), "My Shopping List");
        assert_eq!(c.renamed_list_name(""), "Untitled list");
        assert_eq!(c.renamed_list_name("  Party  "), "Party");
    }
}
