/// Appointment status normalization.
///
/// Stored statuses are free-form; older records use values such as
/// `confirmed` or `completed`. Reads map them onto the closed set below and
/// keep anything unrecognized as-is.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Scheduled,
    Cancelled,
    Done,
    /// Unrecognized value, lowercased and trimmed.
    Other(String),
}

impl Status {
    /// Normalize a raw status string. Empty input counts as `scheduled`.
    pub fn from_string(value: &str) -> Self {
        let v = value.trim().to_lowercase();
        match v.as_str() {
            "cancelled" | "canceled" => Status::Cancelled,
            "done" | "completed" | "complete" | "finished" => Status::Done,
            "scheduled" | "confirmed" | "pending" | "" => Status::Scheduled,
            _ => Status::Other(v),
        }
    }

    /// Storage and style key.
    pub fn key(&self) -> &str {
        match self {
            Status::Scheduled => "scheduled",
            Status::Cancelled => "cancelled",
            Status::Done => "done",
            Status::Other(raw) => raw,
        }
    }

    /// Display label; unrecognized values render as themselves.
    pub fn label(&self) -> &str {
        match self {
            Status::Scheduled => "Scheduled",
            Status::Cancelled => "Cancelled",
            Status::Done => "Done",
            Status::Other(raw) => raw,
        }
    }

    /// Style class attached to calendar events.
    pub fn class_name(&self) -> String {
        format!("ev--{}", self.key())
    }
}

/// Normalize an optional raw status as read from a document.
pub fn normalize_status(raw: Option<&str>) -> Status {
    Status::from_string(raw.unwrap_or(""))
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(normalize_status(raw.as_deref()))
    }
}
