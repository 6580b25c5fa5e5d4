/// Calendar view for the appointment scheduling system.
///
/// This module provides the CalendarBuilder struct which turns a vet's
/// appointments into calendar events, counts them per local day, and maps
/// calendar gestures to the creation and detail flows.

use crate::clients::{resolve_client_names, ClientDirectory};
use crate::config::{CalendarConfig, ConfigError, SchedulerConfig};
use crate::error::{AppointmentError, Result};
use crate::gateway::AppointmentGateway;
use crate::identity::{IdentityProvider, UserId};
use crate::models::Appointment;
use crate::status::Status;
use crate::time::{format_day, format_range, local_date, local_date_key, Instant};
use crate::view::{Navigation, ViewCell, ViewSnapshot};
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Details carried by an event for the detail view.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMeta {
    pub reason: String,
    pub status: Status,
    pub notes: String,
    pub client_id: Option<String>,
    pub pet_id: Option<String>,
    pub client_name: String,
}

/// An appointment as placed on the calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: Instant,
    pub end: Option<Instant>,
    pub class_names: Vec<String>,
    pub meta: EventMeta,
}

impl CalendarEvent {
    /// `[start, end)`, collapsed to the start instant when there is no end
    /// or the end is not after the start.
    pub fn span(&self) -> (Instant, Instant) {
        let end = self.end.filter(|e| *e > self.start).unwrap_or(self.start);
        (self.start, end)
    }

    /// Check if this event's range intersects another's. Events starting at
    /// the same instant always overlap.
    pub fn overlaps_with(&self, other: &CalendarEvent) -> bool {
        let (s1, e1) = self.span();
        let (s2, e2) = other.span();
        s1 == s2 || (s1 < e2 && s2 < e1)
    }
}

/// Build events from appointments, dropping any without a usable start.
pub fn build_events(
    appointments: &[Appointment],
    client_names: &HashMap<String, String>,
    config: &SchedulerConfig,
) -> Vec<CalendarEvent> {
    appointments
        .iter()
        .filter_map(|appointment| {
            let start = appointment.start_time?;
            let client_name = appointment
                .client_id
                .as_ref()
                .and_then(|id| client_names.get(id))
                .cloned()
                .unwrap_or_else(|| config.client_fallback_label.clone());
            let status = appointment.status.clone();

            Some(CalendarEvent {
                id: appointment.id.clone(),
                title: client_name.clone(),
                start,
                end: appointment.end_time,
                class_names: vec![status.class_name()],
                meta: EventMeta {
                    reason: appointment.reason_or(&config.default_reason).to_string(),
                    status,
                    notes: appointment.notes.clone(),
                    client_id: appointment.client_id.clone(),
                    pet_id: appointment.pet_id.clone(),
                    client_name,
                },
            })
        })
        .collect()
}

/// Number of events per local day, keyed `YYYY-MM-DD`.
pub fn count_by_day(events: &[CalendarEvent]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(local_date_key(event.start)).or_insert(0) += 1;
    }
    counts
}

/// One row of a day column, `slot_duration_minutes` long.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRow {
    pub start: NaiveTime,
    /// Ids of the events that start within this row.
    pub event_ids: Vec<String>,
}

/// One day of the week grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DayColumn {
    pub date: NaiveDate,
    pub events: Vec<CalendarEvent>,
    pub rows: Vec<SlotRow>,
}

/// Row start times from `first` up to (not including) `last`.
fn slot_starts(first: NaiveTime, last: NaiveTime, step: Duration) -> Vec<NaiveTime> {
    let mut starts = Vec::new();
    let mut t = first;
    while t < last {
        starts.push(t);
        let (next, wrapped) = t.overflowing_add_signed(step);
        if wrapped != 0 || next <= t {
            break;
        }
        t = next;
    }
    starts
}

/// Everything the calendar screen renders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalendarView {
    pub events: Vec<CalendarEvent>,
    pub day_counts: BTreeMap<String, usize>,
}

impl CalendarView {
    pub fn from_events(events: Vec<CalendarEvent>) -> Self {
        let day_counts = count_by_day(&events);
        CalendarView { events, day_counts }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&CalendarEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Events starting on a local date, in start order.
    pub fn events_on(&self, date: NaiveDate) -> Vec<&CalendarEvent> {
        let mut events: Vec<&CalendarEvent> = self
            .events
            .iter()
            .filter(|e| local_date(e.start) == date)
            .collect();
        events.sort_by_key(|e| e.start);
        events
    }

    pub fn count_on(&self, date: NaiveDate) -> usize {
        let key = date.format("%Y-%m-%d").to_string();
        self.day_counts.get(&key).copied().unwrap_or(0)
    }

    /// Month cell badge, e.g. "3 appointments"; `None` for an empty day.
    pub fn month_badge(&self, date: NaiveDate) -> Option<String> {
        match self.count_on(date) {
            0 => None,
            1 => Some("1 appointment".to_string()),
            n => Some(format!("{} appointments", n)),
        }
    }

    /// Seven day columns starting at `week_start`, holding the events that
    /// fall within the visible hours, split into slot rows. An event that
    /// starts before the first row is placed in it.
    pub fn week_grid(
        &self,
        week_start: NaiveDate,
        calendar: &CalendarConfig,
    ) -> std::result::Result<Vec<DayColumn>, ConfigError> {
        let (first, last) = calendar.visible_hours()?;
        let step = Duration::try_minutes(calendar.slot_duration_minutes)
            .filter(|step| *step > Duration::zero())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "slot length of {} minutes",
                    calendar.slot_duration_minutes
                ))
            })?;
        let starts = slot_starts(first, last, step);

        let columns = (0..7)
            .filter_map(|offset| week_start.checked_add_signed(Duration::days(offset)))
            .map(|date| {
                let events: Vec<CalendarEvent> = self
                    .events_on(date)
                    .into_iter()
                    .filter(|event| {
                        let (start, end) = event.span();
                        let start_t = start.with_timezone(&Local).time();
                        let end_local = end.with_timezone(&Local);
                        let end_t = if end_local.date_naive() > date {
                            NaiveTime::MIN - Duration::nanoseconds(1)
                        } else {
                            end_local.time()
                        };
                        if start_t == end_t {
                            start_t >= first && start_t < last
                        } else {
                            start_t < last && end_t > first
                        }
                    })
                    .cloned()
                    .collect();

                let mut rows: Vec<SlotRow> = starts
                    .iter()
                    .map(|&start| SlotRow {
                        start,
                        event_ids: Vec::new(),
                    })
                    .collect();
                for event in &events {
                    let start_t = event.start.with_timezone(&Local).time();
                    let index = rows
                        .iter()
                        .rposition(|row| row.start <= start_t)
                        .unwrap_or(0);
                    if let Some(row) = rows.get_mut(index) {
                        row.event_ids.push(event.id.clone());
                    }
                }

                DayColumn { date, events, rows }
            })
            .collect();

        Ok(columns)
    }

    /// Pairs of event ids whose ranges intersect. Overlapping bookings are
    /// allowed; this only tells the renderer which events to stack.
    pub fn overlapping_pairs(&self) -> Vec<(String, String)> {
        let mut sorted: Vec<&CalendarEvent> = self.events.iter().collect();
        sorted.sort_by_key(|e| e.start);

        let mut pairs = Vec::new();
        for (i, a) in sorted.iter().enumerate() {
            for b in &sorted[i + 1..] {
                if b.start > a.start && b.start >= a.span().1 {
                    break;
                }
                if a.overlaps_with(b) {
                    pairs.push((a.id.clone(), b.id.clone()));
                }
            }
        }
        pairs
    }
}

/// What the detail view offers for a clicked event.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentDetail {
    pub id: String,
    pub start: Instant,
    pub end: Option<Instant>,
    pub client_name: String,
    pub reason: String,
    pub status: Status,
    pub notes: String,
    pub client_id: Option<String>,
    pub pet_id: Option<String>,
}

impl AppointmentDetail {
    pub fn from_event(event: &CalendarEvent) -> Self {
        AppointmentDetail {
            id: event.id.clone(),
            start: event.start,
            end: event.end,
            client_name: event.meta.client_name.clone(),
            reason: event.meta.reason.clone(),
            status: event.meta.status.clone(),
            notes: event.meta.notes.clone(),
            client_id: event.meta.client_id.clone(),
            pet_id: event.meta.pet_id.clone(),
        }
    }

    /// Heading line, e.g. `Monday, 10 Jun 2024 · 09:00–09:30`.
    pub fn subtitle(&self, locale: chrono::Locale) -> String {
        format!(
            "{} \u{00b7} {}",
            format_day(Some(self.start), locale),
            format_range(Some(self.start), self.end, locale)
        )
    }

    /// Available actions: open the client (when there is one) and edit.
    pub fn actions(&self) -> Vec<Navigation> {
        let mut actions = Vec::new();
        if let Some(id) = &self.client_id {
            actions.push(Navigation::Client { id: id.clone() });
        }
        actions.push(Navigation::EditAppointment {
            id: self.id.clone(),
        });
        actions
    }
}

/// Loads calendar data for the signed-in vet.
#[derive(Clone)]
pub struct CalendarBuilder {
    gateway: AppointmentGateway,
    directory: Arc<dyn ClientDirectory>,
    identity: Arc<dyn IdentityProvider>,
    config: SchedulerConfig,
}

impl CalendarBuilder {
    pub fn new(
        gateway: AppointmentGateway,
        directory: Arc<dyn ClientDirectory>,
        identity: Arc<dyn IdentityProvider>,
        config: SchedulerConfig,
    ) -> Self {
        CalendarBuilder {
            gateway,
            directory,
            identity,
            config,
        }
    }

    /// Fetch the vet's whole history and build the view.
    pub async fn load(&self) -> Result<CalendarView> {
        let vet = self
            .identity
            .current_user()
            .ok_or(AppointmentError::Unauthenticated)?;
        debug!(vet = %vet, "loading calendar");

        let appointments = self.gateway.list_for_vet(vet.as_str()).await?;
        let names = resolve_client_names(
            self.directory.as_ref(),
            &appointments,
            &self.config.client_fallback_label,
        )
        .await;

        let events = build_events(&appointments, &names, &self.config);
        info!(
            vet = %vet,
            appointments = appointments.len(),
            events = events.len(),
            "calendar loaded"
        );
        Ok(CalendarView::from_events(events))
    }

    /// Clicking a free slot drafts a default-length appointment there.
    /// A slot length that cannot be added yields an empty draft.
    pub fn slot_click(&self, at: Instant) -> Navigation {
        let end = Duration::try_minutes(self.config.default_slot_minutes)
            .and_then(|length| at.checked_add_signed(length))
            .unwrap_or(at);
        Navigation::NewAppointment { start: at, end }
    }

    /// Dragging across a span drafts exactly that span.
    pub fn select(&self, start: Instant, end: Instant) -> Navigation {
        Navigation::NewAppointment { start, end }
    }

    pub fn event_click(&self, event: &CalendarEvent) -> AppointmentDetail {
        AppointmentDetail::from_event(event)
    }
}

/// Calendar screen state: the builder plus the last rendered view.
pub struct CalendarScreen {
    builder: CalendarBuilder,
    state: ViewCell<CalendarView>,
}

impl CalendarScreen {
    pub fn new(builder: CalendarBuilder) -> Self {
        CalendarScreen {
            builder,
            state: ViewCell::new(),
        }
    }

    pub fn builder(&self) -> &CalendarBuilder {
        &self.builder
    }

    /// Load (or retry). Returns `false` if a newer load superseded this one.
    pub async fn reload(&self) -> bool {
        let ticket = self.state.begin();
        let result = self.builder.load().await;
        self.state.commit(ticket, result)
    }

    pub fn snapshot(&self) -> ViewSnapshot<CalendarView> {
        self.state.snapshot()
    }

    /// Stop applying the result of any load still in flight.
    pub fn close(&self) {
        self.state.invalidate();
    }

    /// Reload every time the signed-in user changes, until the identity
    /// provider goes away.
    pub async fn follow_identity(&self, mut changes: watch::Receiver<Option<UserId>>) {
        while changes.changed().await.is_ok() {
            self.reload().await;
        }
    }
}
