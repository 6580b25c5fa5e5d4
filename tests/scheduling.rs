use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use vetcal::agenda::{AgendaBuilder, AgendaScreen};
use vetcal::calendar::{count_by_day, CalendarBuilder, CalendarScreen};
use vetcal::clients::StoreClientDirectory;
use vetcal::config::SchedulerConfig;
use vetcal::error::{AppointmentError, StoreError, StoreErrorKind, ValidationError};
use vetcal::form::AppointmentForm;
use vetcal::gateway::AppointmentGateway;
use vetcal::identity::{IdentityProvider, SessionIdentity, UserId};
use vetcal::models::{AppointmentDraft, ClientDraft};
use vetcal::status::Status;
use vetcal::store::{Document, DocumentStore, Fields, MemoryStore, Query};
use vetcal::time::{local_to_instant, timestamp_value, FixedClock, Instant};

const VET: &str = "clinic-1";

fn local(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn at(day: u32, hour: u32, minute: u32) -> Instant {
    local_to_instant(local(day, hour, minute)).unwrap()
}

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

struct Clinic {
    store: Arc<MemoryStore>,
    identity: Arc<SessionIdentity>,
    directory: Arc<StoreClientDirectory>,
    gateway: AppointmentGateway,
    calendar: CalendarScreen,
    agenda: AgendaScreen,
}

impl Clinic {
    fn open() -> Self {
        let clock = Arc::new(FixedClock::at_local(local(10, 12, 0)));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let identity = Arc::new(SessionIdentity::signed_in(UserId::new(VET)));
        let directory = Arc::new(StoreClientDirectory::new(store.clone(), identity.clone()));
        let gateway = AppointmentGateway::new(store.clone(), identity.clone());
        let config = SchedulerConfig::default();

        let calendar = CalendarScreen::new(CalendarBuilder::new(
            gateway.clone(),
            directory.clone(),
            identity.clone(),
            config.clone(),
        ));
        let agenda = AgendaScreen::new(AgendaBuilder::new(
            gateway.clone(),
            directory.clone(),
            identity.clone(),
            clock,
            config,
        ));

        Clinic {
            store,
            identity,
            directory,
            gateway,
            calendar,
            agenda,
        }
    }

    /// Write an appointment the way another client of the database would,
    /// with a raw status string.
    async fn add_raw(&self, client: &str, start: Instant, end: Instant, status: &str) -> String {
        self.store
            .add(
                "appointments",
                fields(json!({
                    "clinicId": VET,
                    "vetId": VET,
                    "clientId": client,
                    "petId": null,
                    "startTime": timestamp_value(start),
                    "endTime": timestamp_value(end),
                    "reason": "Checkup",
                    "status": status,
                    "notes": "",
                })),
            )
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn agenda_for_the_day_resolves_names_and_normalizes_status() {
    let clinic = Clinic::open();
    let a = clinic
        .directory
        .create_client(ClientDraft::named("Alice Moreau"))
        .await
        .unwrap();
    let b = clinic
        .directory
        .create_client(ClientDraft::named("Bruno Silva"))
        .await
        .unwrap();

    // Inserted out of order on purpose.
    clinic
        .add_raw(&b, at(10, 9, 15), at(10, 9, 45), "confirmed")
        .await;
    clinic
        .add_raw(&a, at(10, 9, 0), at(10, 9, 30), "scheduled")
        .await;

    assert!(clinic.agenda.reload().await);
    let agenda = clinic.agenda.snapshot().data.unwrap();

    let names: Vec<_> = agenda.entries.iter().map(|e| e.client_name.as_str()).collect();
    assert_eq!(names, vec!["Alice Moreau", "Bruno Silva"]);
    assert!(agenda.entries.iter().all(|e| e.status == Status::Scheduled));
    assert_eq!(agenda.entries[0].start, at(10, 9, 0));
    assert_eq!(agenda.entries[1].start, at(10, 9, 15));

    // The calendar shows the same pair as overlapping events.
    clinic.calendar.reload().await;
    let view = clinic.calendar.snapshot().data.unwrap();
    assert_eq!(view.len(), 2);
    assert_eq!(view.overlapping_pairs().len(), 1);
    let day = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
    assert_eq!(view.month_badge(day).as_deref(), Some("2 appointments"));
}

#[tokio::test]
async fn overlapping_bookings_are_both_accepted() {
    let clinic = Clinic::open();

    let first = clinic
        .gateway
        .create(AppointmentDraft::new("c1", at(10, 9, 0), at(10, 10, 0)))
        .await;
    let second = clinic
        .gateway
        .create(AppointmentDraft::new("c2", at(10, 9, 30), at(10, 10, 30)))
        .await;

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(clinic.gateway.list_for_vet(VET).await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_and_inverted_ranges_are_stored_as_given() {
    let clinic = Clinic::open();

    let empty = clinic
        .gateway
        .create(AppointmentDraft::new("c", at(10, 9, 0), at(10, 9, 0)))
        .await
        .unwrap();
    let inverted = clinic
        .gateway
        .create(AppointmentDraft::new("c", at(10, 11, 0), at(10, 10, 0)))
        .await
        .unwrap();

    let empty = clinic.gateway.get_by_id(&empty).await.unwrap().unwrap();
    assert_eq!(empty.duration(), Some(Duration::zero()));
    let inverted = clinic.gateway.get_by_id(&inverted).await.unwrap().unwrap();
    assert!(!inverted.is_well_formed());
}

#[tokio::test]
async fn unusable_start_times_never_render() {
    let clinic = Clinic::open();
    let good = clinic
        .gateway
        .create(AppointmentDraft::new("c", at(10, 9, 0), at(10, 9, 30)))
        .await
        .unwrap();

    for (id, start) in [("no-start", Value::Null), ("bad-start", json!("not a date"))] {
        clinic.store.insert_raw(
            "appointments",
            id,
            fields(json!({
                "clinicId": VET,
                "vetId": VET,
                "clientId": "c",
                "startTime": start,
                "endTime": timestamp_value(at(10, 10, 0)),
                "status": "scheduled",
            })),
        );
    }

    clinic.calendar.reload().await;
    let view = clinic.calendar.snapshot().data.unwrap();
    let ids: Vec<_> = view.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![good.as_str()]);

    clinic.agenda.reload().await;
    let agenda = clinic.agenda.snapshot().data.unwrap();
    assert_eq!(agenda.entries.len(), 1);
    assert_eq!(agenda.entries[0].id, good);
}

#[tokio::test]
async fn day_range_is_half_open() {
    let clinic = Clinic::open();
    let day = at(10, 0, 0);
    let next = at(11, 0, 0);

    let on_start = clinic
        .gateway
        .create(AppointmentDraft::new("c", day, day + Duration::minutes(30)))
        .await
        .unwrap();
    clinic
        .gateway
        .create(AppointmentDraft::new("c", next, next + Duration::minutes(30)))
        .await
        .unwrap();

    let found = clinic
        .gateway
        .list_for_vet_in_range(VET, day, next)
        .await
        .unwrap();
    let ids: Vec<_> = found.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec![on_start.as_str()]);
}

#[tokio::test]
async fn day_counts_follow_local_dates() {
    let clinic = Clinic::open();
    let may = |day: u32, hour: u32| {
        local_to_instant(
            NaiveDate::from_ymd_opt(2024, 5, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
        .unwrap()
    };
    for (day, hour) in [(1, 9), (1, 14), (2, 10)] {
        clinic
            .gateway
            .create(AppointmentDraft::new(
                "c",
                may(day, hour),
                may(day, hour) + Duration::minutes(30),
            ))
            .await
            .unwrap();
    }

    clinic.calendar.reload().await;
    let view = clinic.calendar.snapshot().data.unwrap();
    let counts = count_by_day(&view.events);
    assert_eq!(counts.len(), 2);
    assert_eq!(counts["2024-05-01"], 2);
    assert_eq!(counts["2024-05-02"], 1);
}

#[tokio::test]
async fn form_without_client_does_not_write() {
    let clinic = Clinic::open();
    clinic
        .directory
        .create_client(ClientDraft::named("Alice Moreau"))
        .await
        .unwrap();

    let nav = clinic.calendar.builder().slot_click(at(10, 9, 0));
    let mut form = AppointmentForm::from_navigation(&nav, SchedulerConfig::default()).unwrap();
    form.load_clients(clinic.directory.as_ref()).await.unwrap();
    assert!(form.picker_enabled());
    form.select_client(None);

    let err = form
        .submit(&clinic.gateway, clinic.identity.as_ref())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AppointmentError::ValidationFailed(ValidationError::ClientNotSelected)
    );
    assert!(clinic.store.is_empty("appointments"));
}

#[tokio::test]
async fn deleting_a_missing_id_is_quiet() {
    let clinic = Clinic::open();
    let id = clinic
        .gateway
        .create(AppointmentDraft::new("c", at(10, 9, 0), at(10, 9, 30)))
        .await
        .unwrap();

    clinic.gateway.delete("does-not-exist").await.unwrap();

    clinic.agenda.reload().await;
    clinic.agenda.delete(&id).await.unwrap();
    let snapshot = clinic.agenda.snapshot();
    assert!(snapshot.error.is_none());
    assert!(snapshot.data.unwrap().is_empty());
}

#[tokio::test]
async fn calendar_errors_keep_previous_data_until_retry() {
    let clinic = Clinic::open();
    clinic
        .gateway
        .create(AppointmentDraft::new("c", at(10, 9, 0), at(10, 9, 30)))
        .await
        .unwrap();
    clinic.calendar.reload().await;

    let failures = [
        (
            StoreErrorKind::IndexBuilding,
            "The calendar index is still being built. Wait a moment and retry.",
        ),
        (
            StoreErrorKind::MissingIndex,
            "A database index for the calendar is missing.",
        ),
        (StoreErrorKind::Failed, "permission denied"),
    ];
    for (kind, message) in failures {
        clinic
            .store
            .fail_next(StoreError::new(kind, "permission denied"));
        clinic.calendar.reload().await;

        let snapshot = clinic.calendar.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error_message().as_deref(), Some(message));
        assert!(snapshot.error.as_ref().unwrap().is_retryable());
        assert_eq!(snapshot.data.unwrap().len(), 1);
    }

    clinic.calendar.reload().await;
    let snapshot = clinic.calendar.snapshot();
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.data.unwrap().len(), 1);
}

#[tokio::test]
async fn signing_out_clears_views() {
    let clinic = Clinic::open();
    clinic
        .gateway
        .create(AppointmentDraft::new("c", at(10, 9, 0), at(10, 9, 30)))
        .await
        .unwrap();
    clinic.calendar.reload().await;
    clinic.agenda.reload().await;

    clinic.identity.sign_out();
    clinic.calendar.reload().await;
    clinic.agenda.reload().await;

    for snapshot in [clinic.calendar.snapshot().error, clinic.agenda.snapshot().error] {
        assert_eq!(snapshot, Some(AppointmentError::Unauthenticated));
    }
    assert!(clinic.calendar.snapshot().data.is_none());
    assert!(clinic.agenda.snapshot().data.is_none());

    // Another clinic sees none of the first clinic's bookings.
    clinic.identity.sign_in(UserId::new("clinic-2"));
    clinic.calendar.reload().await;
    assert!(clinic.calendar.snapshot().data.unwrap().is_empty());
}

/// Store whose first query waits until released.
struct HeldStore {
    inner: Arc<MemoryStore>,
    queries: AtomicUsize,
    release: Notify,
}

#[async_trait]
impl DocumentStore for HeldStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        self.inner.add(collection, fields).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        if self.queries.fetch_add(1, Ordering::SeqCst) == 0 {
            self.release.notified().await;
        }
        self.inner.query(collection, query).await
    }
}

#[tokio::test]
async fn response_for_previous_user_is_discarded() {
    let memory = Arc::new(MemoryStore::new());
    let held = Arc::new(HeldStore {
        inner: memory.clone(),
        queries: AtomicUsize::new(0),
        release: Notify::new(),
    });
    let identity = Arc::new(SessionIdentity::signed_in(UserId::new("clinic-1")));
    let gateway = AppointmentGateway::new(held.clone(), identity.clone());
    let directory = Arc::new(StoreClientDirectory::new(memory, identity.clone()));

    gateway
        .create(AppointmentDraft::new("c", at(10, 9, 0), at(10, 9, 30)))
        .await
        .unwrap();

    let screen = CalendarScreen::new(CalendarBuilder::new(
        gateway,
        directory,
        identity.clone(),
        SchedulerConfig::default(),
    ));

    let (first, second) = tokio::join!(screen.reload(), async {
        identity.sign_in(UserId::new("clinic-2"));
        let applied = screen.reload().await;
        held.release.notify_one();
        applied
    });

    assert!(!first);
    assert!(second);
    // The view reflects clinic-2, which has no bookings.
    assert!(screen.snapshot().data.unwrap().is_empty());
}

#[tokio::test]
async fn calendar_follows_sign_out() {
    let clinic = Clinic::open();
    clinic
        .gateway
        .create(AppointmentDraft::new("c", at(10, 9, 0), at(10, 9, 30)))
        .await
        .unwrap();
    clinic.calendar.reload().await;
    assert_eq!(clinic.calendar.snapshot().data.unwrap().len(), 1);

    let changes = clinic.identity.subscribe();
    let cleared = tokio::select! {
        _ = clinic.calendar.follow_identity(changes) => false,
        cleared = async {
            clinic.identity.sign_out();
            for _ in 0..100 {
                tokio::task::yield_now().await;
                if clinic.calendar.snapshot().error == Some(AppointmentError::Unauthenticated) {
                    return true;
                }
            }
            false
        } => cleared,
    };

    assert!(cleared);
    assert!(clinic.calendar.snapshot().data.is_none());
}
