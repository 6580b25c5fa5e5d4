//! Appointment calendar and daily agenda for veterinary clinics.
//!
//! The crate sits between a clinic's screens and a hosted document store:
//! `gateway` owns every appointment query, `calendar` and `agenda` build the
//! two read views, and `form` validates new bookings before they are written.

pub mod agenda;
pub mod calendar;
pub mod clients;
pub mod config;
pub mod error;
pub mod form;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod status;
pub mod store;
pub mod time;
pub mod view;

pub use agenda::{Agenda, AgendaBuilder, AgendaEntry, AgendaScreen};
pub use calendar::{AppointmentDetail, CalendarBuilder, CalendarEvent, CalendarScreen, CalendarView};
pub use clients::{ClientDirectory, StoreClientDirectory};
pub use config::SchedulerConfig;
pub use error::{AppointmentError, StoreError, StoreErrorKind, ValidationError};
pub use form::AppointmentForm;
pub use gateway::AppointmentGateway;
pub use identity::{IdentityProvider, SessionIdentity, UserId};
pub use models::{Appointment, AppointmentDraft, AppointmentPatch, Client, ClientDraft};
pub use status::{normalize_status, Status};
pub use store::{DocumentStore, MemoryStore};
pub use time::{Clock, FixedClock, Instant, SystemClock};
pub use view::Navigation;

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, carrying on with the inner value if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
