//! Backend-pushed events. The set is closed and versioned together with the
//! backend; payload shape is fixed by the event name.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Compile-time binding between an event name and its payload type.
pub trait Event: Send + 'static {
    const NAME: &'static str;
    type Payload: DeserializeOwned + Send + 'static;
}

/// Marker for `config:changed`.
#[derive(Clone, Copy, Debug)]
pub struct ConfigChanged;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingChange {
    pub key: String,
    pub value: String,
}

impl Event for ConfigChanged {
    const NAME: &'static str = "config:changed";
    type Payload = SettingChange;
}

/// Every event the backend may emit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum AppEvent {
    #[serde(rename = "config:changed")]
    ConfigChanged(SettingChange),
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::ConfigChanged(_) => ConfigChanged::NAME,
        }
    }

    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            AppEvent::ConfigChanged(change) => serde_json::to_value(change),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_form_matches_event_name() {
        let event = AppEvent::ConfigChanged(SettingChange {
            key: "theme_mode".into(),
            value: "dark".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["payload"], event.payload().unwrap());
    }
}
