/// Presentation-facing state shared by the calendar and agenda screens.
///
/// `ViewCell` keeps the last rendered data of a screen and guards it against
/// late responses: every load takes a ticket, and only the newest ticket may
/// commit. Older responses are dropped.

use crate::error::AppointmentError;
use crate::time::Instant;
use chrono::SecondsFormat;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Where the user should be taken next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Creation form with the time range prefilled.
    NewAppointment { start: Instant, end: Instant },
    Client { id: String },
    EditAppointment { id: String },
    Calendar,
}

impl Navigation {
    pub fn path(&self) -> String {
        match self {
            Navigation::NewAppointment { start, end } => format!(
                "/appointments/new?start={}&end={}",
                start.to_rfc3339_opts(SecondsFormat::Millis, true),
                end.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            Navigation::Client { id } => format!("/clients/{}", id),
            Navigation::EditAppointment { id } => format!("/appointments/{}/edit", id),
            Navigation::Calendar => "/calendar".to_string(),
        }
    }
}

/// Handle for one load; only the most recent ticket may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot<T> {
    pub data: Option<T>,
    pub error: Option<AppointmentError>,
    pub loading: bool,
}

impl<T> Default for ViewSnapshot<T> {
    fn default() -> Self {
        ViewSnapshot {
            data: None,
            error: None,
            loading: false,
        }
    }
}

impl<T> ViewSnapshot<T> {
    /// Text to show for the current error, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(AppointmentError::user_message)
    }
}

struct Inner<T> {
    generation: u64,
    snapshot: ViewSnapshot<T>,
}

pub struct ViewCell<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Default for ViewCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ViewCell<T> {
    pub fn new() -> Self {
        ViewCell {
            inner: Mutex::new(Inner {
                generation: 0,
                snapshot: ViewSnapshot::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        crate::lock(&self.inner)
    }

    /// Start a load, superseding any load still in flight.
    pub fn begin(&self) -> LoadTicket {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.snapshot.loading = true;
        inner.snapshot.error = None;
        LoadTicket(inner.generation)
    }

    /// Apply the outcome of the load identified by `ticket`.
    ///
    /// Returns `false` when a newer load has started since, in which case
    /// nothing changes. A failed load keeps the previous data, except that
    /// losing the signed-in user clears it.
    pub fn commit(&self, ticket: LoadTicket, result: Result<T, AppointmentError>) -> bool {
        let mut inner = self.lock();
        if ticket.0 != inner.generation {
            warn!(
                ticket = ticket.0,
                current = inner.generation,
                "discarding stale response"
            );
            return false;
        }

        inner.snapshot.loading = false;
        match result {
            Ok(data) => {
                inner.snapshot.data = Some(data);
                inner.snapshot.error = None;
            }
            Err(AppointmentError::Unauthenticated) => {
                inner.snapshot.data = None;
                inner.snapshot.error = Some(AppointmentError::Unauthenticated);
            }
            Err(err) => {
                warn!(error = %err, "load failed");
                inner.snapshot.error = Some(err);
            }
        }
        true
    }

    /// Drop any load in flight, e.g. when the screen goes away.
    pub fn invalidate(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.snapshot.loading = false;
    }

    /// Record an error from an action (such as a delete) without touching
    /// the rendered data.
    pub fn set_error(&self, err: AppointmentError) {
        self.lock().snapshot.error = Some(err);
    }

    pub fn snapshot(&self) -> ViewSnapshot<T> {
        self.lock().snapshot.clone()
    }

    pub fn data(&self) -> Option<T> {
        self.lock().snapshot.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_stale_commit_is_discarded() {
        let cell: ViewCell<u32> = ViewCell::new();
        let first = cell.begin();
        let second = cell.begin();

        assert!(cell.commit(second, Ok(2)));
        assert!(!cell.commit(first, Ok(1)));
        assert_eq!(cell.data(), Some(2));
        assert!(!cell.snapshot().loading);
    }

    #[test]
    fn test_error_keeps_previous_data() {
        let cell: ViewCell<u32> = ViewCell::new();
        let ticket = cell.begin();
        cell.commit(ticket, Ok(7));

        let ticket = cell.begin();
        cell.commit(
            ticket,
            Err(AppointmentError::TransientIndexBuilding("building".into())),
        );
        let snapshot = cell.snapshot();
        assert_eq!(snapshot.data, Some(7));
        assert!(snapshot.error_message().unwrap().contains("retry"));
    }

    #[test]
    fn test_sign_out_clears_data() {
        let cell: ViewCell<u32> = ViewCell::new();
        let ticket = cell.begin();
        cell.commit(ticket, Ok(7));

        let ticket = cell.begin();
        cell.commit(ticket, Err(AppointmentError::Unauthenticated));
        assert_eq!(cell.data(), None);
    }

    #[test]
    fn test_invalidate_drops_in_flight_load() {
        let cell: ViewCell<u32> = ViewCell::new();
        let ticket = cell.begin();
        cell.invalidate();
        assert!(!cell.commit(ticket, Ok(1)));
        assert_eq!(cell.data(), None);
    }

    #[test]
    fn test_navigation_paths() {
        let start = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap();
        assert_eq!(
            Navigation::NewAppointment { start, end }.path(),
            "/appointments/new?start=2024-06-10T09:00:00.000Z&end=2024-06-10T09:30:00.000Z"
        );
        assert_eq!(
            Navigation::EditAppointment { id: "a1".into() }.path(),
            "/appointments/a1/edit"
        );
        assert_eq!(Navigation::Client { id: "c1".into() }.path(), "/clients/c1");
    }
}
