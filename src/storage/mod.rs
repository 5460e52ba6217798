//! Device-local preferences. Everything else lives on the backend.

pub(crate) const THEME_KEY: &str = "theme";
pub(crate) const SHOW_TIMESTAMPS_KEY: &str = "showTimestamps";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    /// Stored choice wins; otherwise follow the system color scheme.
    pub fn from_stored(stored: Option<&str>, prefers_dark: bool) -> Self {
        stored
            .and_then(|s| s.parse().ok())
            .unwrap_or(if prefers_dark { Theme::Dark } else { Theme::Light })
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Timestamps are shown unless explicitly turned off.
pub(crate) fn parse_show_timestamps(stored: Option<&str>) -> bool {
    !matches!(stored, Some("0") | Some("false"))
}

fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window().and_then(|w| w.local_storage().ok().flatten())
}

fn load_item(key: &str) -> Option<String> {
    local_storage()?.get_item(key).ok().flatten()
}

fn save_item(key: &str, value: &str) {
    if let Some(storage) = local_storage() {
        if let Err(e) = storage.set_item(key, value) {
            tracing::warn!(key, error = ?e, "could not save preference");
        }
    }
}

fn system_prefers_dark() -> bool {
    web_sys::window()
        .and_then(|w| w.match_media("(prefers-color-scheme: dark)").ok().flatten())
        .is_some_and(|m| m.matches())
}

pub(crate) fn load_theme() -> Theme {
    Theme::from_stored(load_item(THEME_KEY).as_deref(), system_prefers_dark())
}

pub(crate) fn save_theme(theme: Theme) {
    save_item(THEME_KEY, &theme.to_string());
}

pub(crate) fn load_show_timestamps() -> bool {
    parse_show_timestamps(load_item(SHOW_TIMESTAMPS_KEY).as_deref())
}

pub(crate) fn save_show_timestamps(show: bool) {
    save_item(SHOW_TIMESTAMPS_KEY, if show { "1" } else { "0" });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_theme_wins_over_system() {
        assert_eq!(Theme::from_stored(Some("light"), true), Theme::Light);
        assert_eq!(Theme::from_stored(Some("dark"), false), Theme::Dark);
    }

    #[test]
    fn test_missing_or_unknown_theme_follows_system() {
        assert_eq!(Theme::from_stored(None, true), Theme::Dark);
        assert_eq!(Theme::from_stored(Some("sepia"), false), Theme::Light);
    }

    #[test]
    fn test_theme_round_trips_through_its_stored_form() {
        assert_eq!(Theme::Dark.to_string(), "dark");
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
    }

    #[test]
    fn test_show_timestamps_defaults_on() {
        assert!(parse_show_timestamps(None));
        assert!(parse_show_timestamps(Some("1")));
        assert!(!parse_show_timestamps(Some("0")));
    }
}
