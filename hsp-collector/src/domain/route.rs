//! Routes to collect.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Crs, Hhmm};

/// Time-of-day filter applied to departures from the route origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: Hhmm,
    pub to: Hhmm,
}

impl TimeWindow {
    /// The whole service day, used when a route has no explicit window.
    pub fn all_day() -> Self {
        Self {
            from: Hhmm::MIDNIGHT,
            to: Hhmm::LAST_MINUTE,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.from <= self.to
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// An origin/destination pair collected as one unit of progress.
///
/// The `name` is the key used in the progress ledger and in persisted
/// records, so it must be unique within a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    pub origin: Crs,
    pub destination: Crs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
}

impl Route {
    pub fn new(name: impl Into<String>, origin: Crs, destination: Crs) -> Self {
        Self {
            name: name.into(),
            origin,
            destination,
            time_window: None,
        }
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    /// The effective time window sent upstream.
    pub fn effective_time_window(&self) -> TimeWindow {
        self.time_window.unwrap_or_else(TimeWindow::all_day)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}→{})", self.name, self.origin, self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crs(s: &str) -> Crs {
        Crs::parse(s).unwrap()
    }

    #[test]
    fn default_window_is_all_day() {
        let route = Route::new("BTN-VIC", crs("BTN"), crs("VIC"));
        assert_eq!(route.effective_time_window().to_string(), "0000-2359");
    }

    #[test]
    fn explicit_window_used() {
        let window = TimeWindow {
            from: Hhmm::parse("0700").unwrap(),
            to: Hhmm::parse("1000").unwrap(),
        };
        let route = Route::new("BTN-VIC", crs("BTN"), crs("VIC")).with_time_window(window);
        assert_eq!(route.effective_time_window(), window);
        assert!(window.is_valid());
    }

    #[test]
    fn deserializes_from_config_shape() {
        let route: Route = serde_json::from_str(
            r#"{"name":"am-peak","origin":"btn","destination":"VIC",
                "time_window":{"from":"0700","to":"0930"}}"#,
        )
        .unwrap();
        assert_eq!(route.origin, crs("BTN"));
        assert_eq!(route.time_window.unwrap().to.to_string(), "0930");
    }
}
