/// Data models for the appointment scheduling core.
///
/// This module defines the records the core reads and writes:
/// - Appointment: a booked time range owned by a clinic
/// - AppointmentDraft: fields for a new appointment
/// - AppointmentPatch: a partial update
/// - Client: the owner of the animals being seen

use crate::identity::UserId;
use crate::status::{normalize_status, Status};
use crate::store::{Document, Fields, CREATED_AT, UPDATED_AT};
use crate::time::{timestamp_value, value_to_instant, Instant};
use chrono::Duration;
use serde_json::Value;

pub const APPOINTMENTS: &str = "appointments";
pub const CLIENTS: &str = "clients";

/// Represents an appointment as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub clinic_id: String,
    pub vet_id: String,
    pub client_id: Option<String>,
    pub pet_id: Option<String>,
    /// `None` when the stored value is missing or unparseable.
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub reason: String,
    pub status: Status,
    pub notes: String,
    pub created_at: Option<Instant>,
    pub updated_at: Option<Instant>,
}

fn string_field(doc: &Document, field: &str) -> String {
    doc.str_field(field).unwrap_or_default().to_string()
}

fn optional_string(doc: &Document, field: &str) -> Option<String> {
    doc.str_field(field).map(str::to_string)
}

fn instant_field(doc: &Document, field: &str) -> Option<Instant> {
    doc.get(field).and_then(value_to_instant)
}

fn optional_value(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

impl Appointment {
    /// Decode a stored document, normalizing times and status.
    pub fn from_document(doc: &Document) -> Self {
        Appointment {
            id: doc.id.clone(),
            clinic_id: string_field(doc, "clinicId"),
            vet_id: string_field(doc, "vetId"),
            client_id: optional_string(doc, "clientId"),
            pet_id: optional_string(doc, "petId"),
            start_time: instant_field(doc, "startTime"),
            end_time: instant_field(doc, "endTime"),
            reason: string_field(doc, "reason"),
            status: normalize_status(doc.get("status").and_then(Value::as_str)),
            notes: string_field(doc, "notes"),
            created_at: instant_field(doc, CREATED_AT),
            updated_at: instant_field(doc, UPDATED_AT),
        }
    }

    /// Duration of the appointment, when both ends are known.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end_time? - self.start_time?)
    }

    /// Whether the end lies strictly after the start.
    pub fn is_well_formed(&self) -> bool {
        matches!((self.start_time, self.end_time), (Some(s), Some(e)) if e > s)
    }

    /// Check if this appointment's `[start, end)` range intersects another's.
    pub fn overlaps_with(&self, other: &Appointment) -> bool {
        match (self.start_time, self.end_time, other.start_time, other.end_time) {
            (Some(s1), Some(e1), Some(s2), Some(e2)) => s1 < e2 && e1 > s2,
            _ => false,
        }
    }

    /// The stored reason, or `default` when none was given.
    pub fn reason_or<'a>(&'a self, default: &'a str) -> &'a str {
        if self.reason.trim().is_empty() {
            default
        } else {
            &self.reason
        }
    }
}

/// Fields for a new appointment. Unset owner fields default to the acting
/// user when the draft is persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppointmentDraft {
    pub clinic_id: Option<String>,
    pub vet_id: Option<String>,
    pub client_id: Option<String>,
    pub pet_id: Option<String>,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub reason: String,
    pub status: Option<Status>,
    pub notes: String,
}

impl AppointmentDraft {
    pub fn new(client_id: impl Into<String>, start_time: Instant, end_time: Instant) -> Self {
        AppointmentDraft {
            client_id: Some(client_id.into()),
            start_time: Some(start_time),
            end_time: Some(end_time),
            ..Self::default()
        }
    }

    pub fn with_vet(mut self, vet_id: impl Into<String>) -> Self {
        self.vet_id = Some(vet_id.into());
        self
    }

    pub fn with_pet(mut self, pet_id: impl Into<String>) -> Self {
        self.pet_id = Some(pet_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Document fields for this draft, owned by `user` unless the draft
    /// names its own clinic or vet. Empty ids count as unset.
    pub fn into_fields(self, user: &UserId) -> Fields {
        let owner = |id: Option<String>| {
            id.filter(|id| !id.is_empty())
                .unwrap_or_else(|| user.to_string())
        };
        let mut fields = Fields::new();
        fields.insert("clinicId".into(), Value::String(owner(self.clinic_id)));
        fields.insert("vetId".into(), Value::String(owner(self.vet_id)));
        fields.insert("clientId".into(), optional_value(self.client_id));
        fields.insert("petId".into(), optional_value(self.pet_id));
        fields.insert(
            "startTime".into(),
            self.start_time.map(timestamp_value).unwrap_or(Value::Null),
        );
        fields.insert(
            "endTime".into(),
            self.end_time.map(timestamp_value).unwrap_or(Value::Null),
        );
        fields.insert("reason".into(), Value::String(self.reason));
        fields.insert(
            "status".into(),
            Value::String(self.status.unwrap_or_default().key().to_string()),
        );
        fields.insert("notes".into(), Value::String(self.notes));
        fields
    }
}

/// Partial update; only the fields that are `Some` are written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppointmentPatch {
    pub client_id: Option<String>,
    /// `Some(None)` detaches the pet.
    pub pet_id: Option<Option<String>>,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub reason: Option<String>,
    pub status: Option<Status>,
    pub notes: Option<String>,
}

impl AppointmentPatch {
    pub fn status(status: Status) -> Self {
        AppointmentPatch {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn reschedule(start_time: Instant, end_time: Instant) -> Self {
        AppointmentPatch {
            start_time: Some(start_time),
            end_time: Some(end_time),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        if let Some(client_id) = self.client_id {
            fields.insert("clientId".into(), Value::String(client_id));
        }
        if let Some(pet_id) = self.pet_id {
            fields.insert("petId".into(), optional_value(pet_id));
        }
        if let Some(start) = self.start_time {
            fields.insert("startTime".into(), timestamp_value(start));
        }
        if let Some(end) = self.end_time {
            fields.insert("endTime".into(), timestamp_value(end));
        }
        if let Some(reason) = self.reason {
            fields.insert("reason".into(), Value::String(reason));
        }
        if let Some(status) = self.status {
            fields.insert("status".into(), Value::String(status.key().to_string()));
        }
        if let Some(notes) = self.notes {
            fields.insert("notes".into(), Value::String(notes));
        }
        fields
    }
}

/// Represents a client of the clinic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub clinic_id: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub notes: String,
    pub active: bool,
}

impl Client {
    pub fn from_document(doc: &Document) -> Self {
        Client {
            id: doc.id.clone(),
            clinic_id: string_field(doc, "clinicId"),
            full_name: string_field(doc, "fullName"),
            phone: string_field(doc, "phone"),
            email: string_field(doc, "email"),
            address: string_field(doc, "address"),
            notes: string_field(doc, "notes"),
            // Only an explicit `false` disables a client.
            active: doc.get("active").and_then(Value::as_bool).unwrap_or(true),
        }
    }
}

/// Contact details for a new or edited client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientDraft {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub notes: String,
}

impl ClientDraft {
    pub fn named(full_name: impl Into<String>) -> Self {
        ClientDraft {
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("fullName".into(), Value::String(self.full_name));
        fields.insert("phone".into(), Value::String(self.phone));
        fields.insert("email".into(), Value::String(self.email));
        fields.insert("address".into(), Value::String(self.address));
        fields.insert("notes".into(), Value::String(self.notes));
        fields
    }
}

/// Keep the clients that may be offered in the appointment picker.
pub fn active_clients(clients: Vec<Client>) -> Vec<Client> {
    clients.into_iter().filter(|c| c.active).collect()
}
