/// Today's agenda.
///
/// A compact list of the signed-in vet's appointments for the current local
/// day, in the order the range query returns them.

use crate::clients::{resolve_client_names, ClientDirectory};
use crate::config::SchedulerConfig;
use crate::error::{AppointmentError, Result};
use crate::gateway::AppointmentGateway;
use crate::identity::IdentityProvider;
use crate::status::Status;
use crate::time::{day_bounds, format_day, format_range, Clock, Instant};
use crate::view::{ViewCell, ViewSnapshot};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct AgendaEntry {
    pub id: String,
    pub start: Instant,
    pub end: Option<Instant>,
    pub client_id: Option<String>,
    pub client_name: String,
    pub reason: String,
    pub status: Status,
    pub notes: String,
}

impl AgendaEntry {
    pub fn time_label(&self, locale: chrono::Locale) -> String {
        format_range(Some(self.start), self.end, locale)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agenda {
    pub day: NaiveDate,
    pub start: Instant,
    pub end: Instant,
    pub entries: Vec<AgendaEntry>,
}

impl Agenda {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone)]
pub struct AgendaBuilder {
    gateway: AppointmentGateway,
    directory: Arc<dyn ClientDirectory>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl AgendaBuilder {
    pub fn new(
        gateway: AppointmentGateway,
        directory: Arc<dyn ClientDirectory>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        AgendaBuilder {
            gateway,
            directory,
            identity,
            clock,
            config,
        }
    }

    pub fn gateway(&self) -> &AppointmentGateway {
        &self.gateway
    }

    /// Long label of the current local day.
    pub fn today_label(&self) -> String {
        format_day(Some(self.clock.now_utc()), self.config.locale())
    }

    /// Appointments of the signed-in vet starting today, local time.
    pub async fn load(&self) -> Result<Agenda> {
        let vet = self
            .identity
            .current_user()
            .ok_or(AppointmentError::Unauthenticated)?;

        let now = self.clock.now();
        let (start, end) = day_bounds(now);
        debug!(vet = %vet, %start, %end, "loading agenda");

        let appointments = self
            .gateway
            .list_for_vet_in_range(vet.as_str(), start, end)
            .await?;
        let names = resolve_client_names(
            self.directory.as_ref(),
            &appointments,
            &self.config.client_fallback_label,
        )
        .await;

        let entries: Vec<AgendaEntry> = appointments
            .iter()
            .filter_map(|a| {
                let start = a.start_time?;
                let client_name = a
                    .client_id
                    .as_ref()
                    .and_then(|id| names.get(id))
                    .cloned()
                    .unwrap_or_else(|| self.config.client_fallback_label.clone());
                Some(AgendaEntry {
                    id: a.id.clone(),
                    start,
                    end: a.end_time,
                    client_id: a.client_id.clone(),
                    client_name,
                    reason: a.reason_or(&self.config.default_reason).to_string(),
                    status: a.status.clone(),
                    notes: a.notes.clone(),
                })
            })
            .collect();

        info!(vet = %vet, entries = entries.len(), "agenda loaded");
        Ok(Agenda {
            day: now.date_naive(),
            start,
            end,
            entries,
        })
    }
}

/// Agenda screen state, usable on its own or inside an overview.
pub struct AgendaScreen {
    builder: AgendaBuilder,
    state: ViewCell<Agenda>,
}

impl AgendaScreen {
    pub fn new(builder: AgendaBuilder) -> Self {
        AgendaScreen {
            builder,
            state: ViewCell::new(),
        }
    }

    pub fn builder(&self) -> &AgendaBuilder {
        &self.builder
    }

    pub async fn reload(&self) -> bool {
        let ticket = self.state.begin();
        let result = self.builder.load().await;
        self.state.commit(ticket, result)
    }

    /// Delete an entry, then reload the whole day.
    ///
    /// On failure the entry stays listed and the error is recorded on the
    /// screen.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if let Err(err) = self.builder.gateway().delete(id).await {
            self.state.set_error(err.clone());
            return Err(err);
        }
        self.reload().await;
        Ok(())
    }

    pub fn snapshot(&self) -> ViewSnapshot<Agenda> {
        self.state.snapshot()
    }

    pub fn close(&self) {
        self.state.invalidate();
    }
}
