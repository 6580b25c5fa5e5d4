/// Appointment store gateway.
///
/// This module provides the AppointmentGateway struct, the only code that
/// reads or writes the "appointments" collection. Every list query is scoped
/// to the signed-in clinic.

use crate::error::{AppointmentError, Result};
use crate::identity::{IdentityProvider, UserId};
use crate::models::{Appointment, AppointmentDraft, AppointmentPatch, APPOINTMENTS};
use crate::store::{Direction, DocumentStore, Query};
use crate::time::{timestamp_value, Instant};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AppointmentGateway {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl AppointmentGateway {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        AppointmentGateway { store, identity }
    }

    fn require_user(&self) -> Result<UserId> {
        self.identity
            .current_user()
            .ok_or(AppointmentError::Unauthenticated)
    }

    /// Persist a new appointment and return its id.
    ///
    /// The end time is not checked against the start time, and overlapping
    /// bookings are accepted.
    pub async fn create(&self, draft: AppointmentDraft) -> Result<String> {
        let user = self.require_user()?;
        let fields = draft.into_fields(&user);

        let id = self.store.add(APPOINTMENTS, fields).await?;
        info!(appointment = %id, clinic = %user, "appointment created");
        Ok(id)
    }

    /// Fetch a single appointment.
    ///
    /// No ownership check is applied here; see DESIGN.md.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Appointment>> {
        let doc = self.store.get(APPOINTMENTS, id).await?;
        Ok(doc.as_ref().map(Appointment::from_document))
    }

    /// Merge `patch` into an existing appointment.
    pub async fn update(&self, id: &str, patch: AppointmentPatch) -> Result<()> {
        self.store
            .update(APPOINTMENTS, id, patch.into_fields())
            .await
            .map_err(|e| AppointmentError::from_store(e, "appointment", id))?;
        info!(appointment = %id, "appointment updated");
        Ok(())
    }

    /// Hard delete. Deleting an unknown id succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(APPOINTMENTS, id).await?;
        info!(appointment = %id, "appointment deleted");
        Ok(())
    }

    /// Every appointment of `vet_id`, earliest first.
    pub async fn list_for_vet(&self, vet_id: &str) -> Result<Vec<Appointment>> {
        let user = self.require_user()?;
        let query = Query::new()
            .where_eq("clinicId", user.as_str())
            .where_eq("vetId", vet_id)
            .order_by("startTime", Direction::Asc);
        self.run(query).await
    }

    /// Appointments of `vet_id` starting in `[start, end)`, earliest first.
    pub async fn list_for_vet_in_range(
        &self,
        vet_id: &str,
        start: Instant,
        end: Instant,
    ) -> Result<Vec<Appointment>> {
        let user = self.require_user()?;
        let query = Query::new()
            .where_eq("clinicId", user.as_str())
            .where_eq("vetId", vet_id)
            .where_gte("startTime", timestamp_value(start))
            .where_lt("startTime", timestamp_value(end))
            .order_by("startTime", Direction::Asc);
        self.run(query).await
    }

    /// Every appointment of a client, most recent first.
    pub async fn list_for_client(&self, client_id: &str) -> Result<Vec<Appointment>> {
        let user = self.require_user()?;
        let query = Query::new()
            .where_eq("clinicId", user.as_str())
            .where_eq("clientId", client_id)
            .order_by("startTime", Direction::Desc);
        self.run(query).await
    }

    /// Appointments of a client starting in `[start, end)`, earliest first.
    pub async fn list_for_client_in_range(
        &self,
        client_id: &str,
        start: Instant,
        end: Instant,
    ) -> Result<Vec<Appointment>> {
        let user = self.require_user()?;
        let query = Query::new()
            .where_eq("clinicId", user.as_str())
            .where_eq("clientId", client_id)
            .where_gte("startTime", timestamp_value(start))
            .where_lt("startTime", timestamp_value(end))
            .order_by("startTime", Direction::Asc);
        self.run(query).await
    }

    async fn run(&self, query: Query) -> Result<Vec<Appointment>> {
        debug!(?query, "listing appointments");
        let docs = self.store.query(APPOINTMENTS, &query).await?;
        Ok(docs.iter().map(Appointment::from_document).collect())
    }
}
