/// New-appointment form.
///
/// The form is opened with the start and end carried by the creation route,
/// lets the user pick an active client, and submits through the gateway once
/// every check passes.

use crate::clients::ClientDirectory;
use crate::config::SchedulerConfig;
use crate::error::{AppointmentError, Result, ValidationError};
use crate::gateway::AppointmentGateway;
use crate::identity::IdentityProvider;
use crate::models::{active_clients, AppointmentDraft, Client};
use crate::status::Status;
use crate::time::{format_day, format_time, parse_instant, Instant};
use crate::view::Navigation;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AppointmentForm {
    start_raw: Option<String>,
    end_raw: Option<String>,
    start: Option<Instant>,
    end: Option<Instant>,
    clients: Vec<Client>,
    client_id: Option<String>,
    reason: String,
    notes: String,
    config: SchedulerConfig,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl AppointmentForm {
    /// Form for the raw `start`/`end` strings of the creation route.
    pub fn from_query(start: Option<&str>, end: Option<&str>, config: SchedulerConfig) -> Self {
        let start_raw = non_empty(start);
        let end_raw = non_empty(end);
        AppointmentForm {
            start: start_raw.as_deref().and_then(parse_instant),
            end: end_raw.as_deref().and_then(parse_instant),
            start_raw,
            end_raw,
            clients: Vec::new(),
            client_id: None,
            reason: config.default_reason.clone(),
            notes: String::new(),
            config,
        }
    }

    /// Form prefilled from a calendar gesture.
    pub fn from_navigation(navigation: &Navigation, config: SchedulerConfig) -> Option<Self> {
        match navigation {
            Navigation::NewAppointment { start, end } => Some(Self::from_query(
                Some(&start.to_rfc3339()),
                Some(&end.to_rfc3339()),
                config,
            )),
            _ => None,
        }
    }

    /// Fill the picker with active clients and preselect the first one.
    pub async fn load_clients(&mut self, directory: &dyn ClientDirectory) -> Result<()> {
        let clients = match directory.list_clients().await {
            Ok(clients) => clients,
            Err(err) => {
                warn!(error = %err, "could not load clients for the picker");
                self.clients.clear();
                self.client_id = None;
                return Err(err);
            }
        };

        self.clients = active_clients(clients);
        self.client_id = self.clients.first().map(|c| c.id.clone());
        Ok(())
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    /// Whether the picker has anything to offer.
    pub fn picker_enabled(&self) -> bool {
        !self.clients.is_empty()
    }

    pub fn selected_client(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn select_client(&mut self, id: Option<&str>) {
        self.client_id = non_empty(id);
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into();
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    /// Header day label, `-` when the start is unusable.
    pub fn day_label(&self) -> String {
        match self.start {
            Some(start) => format_day(Some(start), self.config.locale()),
            None => "-".to_string(),
        }
    }

    /// Header time label, e.g. `09:00 – 09:30`.
    pub fn time_label(&self) -> String {
        let locale = self.config.locale();
        let label = |t: Option<Instant>| match t {
            Some(_) => format_time(t, locale),
            None => "-".to_string(),
        };
        format!("{} \u{2013} {}", label(self.start), label(self.end))
    }

    /// Run the checks in order; the first failure wins.
    pub fn validate(&self, identity: &dyn IdentityProvider) -> Result<AppointmentDraft> {
        let user = identity
            .current_user()
            .ok_or(AppointmentError::Unauthenticated)?;

        if self.start_raw.is_none() || self.end_raw.is_none() {
            return Err(ValidationError::MissingTimes.into());
        }

        let client_id = self
            .client_id
            .as_ref()
            .filter(|id| self.clients.iter().any(|c| &c.id == *id))
            .ok_or(ValidationError::ClientNotSelected)?;

        let (Some(start), Some(end)) = (self.start, self.end) else {
            return Err(ValidationError::InvalidDate.into());
        };

        Ok(AppointmentDraft::new(client_id.clone(), start, end)
            .with_vet(user.to_string())
            .with_reason(self.reason.clone())
            .with_notes(self.notes.clone())
            .with_status(Status::Scheduled))
    }

    /// Validate and create the appointment, then head back to the calendar.
    ///
    /// New appointments are never attached to a pet.
    pub async fn submit(
        &self,
        gateway: &AppointmentGateway,
        identity: &dyn IdentityProvider,
    ) -> Result<Navigation> {
        let draft = self.validate(identity)?;
        let id = gateway.create(draft).await?;
        info!(appointment = %id, "appointment booked from form");
        Ok(Navigation::Calendar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::StoreClientDirectory;
    use crate::identity::{SessionIdentity, UserId};
    use crate::models::ClientDraft;
    use crate::store::{DocumentStore, MemoryStore, Query};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        identity: Arc<SessionIdentity>,
        directory: StoreClientDirectory,
        gateway: AppointmentGateway,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(SessionIdentity::signed_in(UserId::new("vet-1")));
        Fixture {
            directory: StoreClientDirectory::new(store.clone(), identity.clone()),
            gateway: AppointmentGateway::new(store.clone(), identity.clone()),
            store,
            identity,
        }
    }

    fn form(start: Option<&str>, end: Option<&str>) -> AppointmentForm {
        AppointmentForm::from_query(start, end, SchedulerConfig::default())
    }

    const START: &str = "2024-06-10T09:00:00.000Z";
    const END: &str = "2024-06-10T09:30:00.000Z";

    #[tokio::test]
    async fn test_submit_creates_scheduled_without_pet() {
        let f = fixture();
        let active = f.directory.create_client(ClientDraft::named("Ana")).await.unwrap();

        let mut form = form(Some(START), Some(END));
        form.load_clients(&f.directory).await.unwrap();
        assert_eq!(form.selected_client(), Some(active.as_str()));
        assert_eq!(form.reason(), "Consultation");
        form.set_notes("first visit");

        let next = form.submit(&f.gateway, f.identity.as_ref()).await.unwrap();
        assert_eq!(next, Navigation::Calendar);

        let stored = f.gateway.list_for_vet("vet-1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, Status::Scheduled);
        assert_eq!(stored[0].pet_id, None);
        assert_eq!(stored[0].client_id.as_deref(), Some(active.as_str()));
        assert_eq!(stored[0].notes, "first visit");
    }

    #[tokio::test]
    async fn test_no_client_selected_never_reaches_store() {
        let f = fixture();
        f.directory.create_client(ClientDraft::named("Ana")).await.unwrap();

        let mut form = form(Some(START), Some(END));
        form.load_clients(&f.directory).await.unwrap();
        form.select_client(None);

        let err = form.submit(&f.gateway, f.identity.as_ref()).await.unwrap_err();
        assert_eq!(
            err,
            AppointmentError::ValidationFailed(ValidationError::ClientNotSelected)
        );
        let docs = f.store.query("appointments", &Query::new()).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_clients_are_not_offered() {
        let f = fixture();
        let gone = f.directory.create_client(ClientDraft::named("Old")).await.unwrap();
        f.directory.disable_client(&gone).await.unwrap();

        let mut form = form(Some(START), Some(END));
        form.load_clients(&f.directory).await.unwrap();
        assert!(!form.picker_enabled());

        form.select_client(Some(&gone));
        let err = form.validate(f.identity.as_ref()).unwrap_err();
        assert_eq!(err, ValidationError::ClientNotSelected.into());
    }

    #[tokio::test]
    async fn test_check_order() {
        let f = fixture();
        f.directory.create_client(ClientDraft::named("Ana")).await.unwrap();

        let mut missing = form(Some(START), None);
        missing.load_clients(&f.directory).await.unwrap();
        assert_eq!(
            missing.validate(f.identity.as_ref()).unwrap_err(),
            ValidationError::MissingTimes.into()
        );

        let mut bad = form(Some("yesterday-ish"), Some(END));
        bad.load_clients(&f.directory).await.unwrap();
        assert_eq!(
            bad.validate(f.identity.as_ref()).unwrap_err(),
            ValidationError::InvalidDate.into()
        );
        assert_eq!(bad.day_label(), "-");

        // Client selection is checked before date parsing.
        let bad_no_client = form(Some("garbage"), Some(END));
        assert_eq!(
            bad_no_client.validate(f.identity.as_ref()).unwrap_err(),
            ValidationError::ClientNotSelected.into()
        );

        f.identity.sign_out();
        assert_eq!(
            bad.validate(f.identity.as_ref()).unwrap_err(),
            AppointmentError::Unauthenticated
        );
    }

    #[test]
    fn test_from_navigation_prefills() {
        let start = parse_instant(START).unwrap();
        let end = parse_instant(END).unwrap();
        let nav = Navigation::NewAppointment { start, end };

        let form = AppointmentForm::from_navigation(&nav, SchedulerConfig::default()).unwrap();
        assert_eq!(form.start, Some(start));
        assert_eq!(form.end, Some(end));
        assert!(AppointmentForm::from_navigation(&Navigation::Calendar, SchedulerConfig::default())
            .is_none());
    }
}
