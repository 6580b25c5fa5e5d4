/// Client directory.
///
/// The scheduling core only needs two things from client records: the
/// active clients for the booking picker, and a display name per id.
/// `StoreClientDirectory` serves both from the "clients" collection and
/// keeps each clinic's clients private to it.

use crate::error::{AppointmentError, Result};
use crate::identity::IdentityProvider;
use crate::models::{Appointment, Client, ClientDraft, CLIENTS};
use crate::store::{Direction, DocumentStore, Query, CREATED_AT};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Clients of the signed-in clinic, newest first.
    async fn list_clients(&self) -> Result<Vec<Client>>;

    /// A client of the signed-in clinic, or `None` if it does not exist or
    /// belongs to someone else.
    async fn get_client_by_id(&self, id: &str) -> Result<Option<Client>>;
}

pub struct StoreClientDirectory {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl StoreClientDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        StoreClientDirectory { store, identity }
    }

    pub async fn create_client(&self, draft: ClientDraft) -> Result<String> {
        let user = self
            .identity
            .current_user()
            .ok_or(AppointmentError::Unauthenticated)?;

        let mut fields = draft.into_fields();
        fields.insert("clinicId".into(), Value::String(user.to_string()));
        fields.insert("active".into(), Value::Bool(true));

        let id = self.store.add(CLIENTS, fields).await?;
        info!(client = %id, "client created");
        Ok(id)
    }

    /// Overwrite contact details. Ownership and creation time are never
    /// rewritten.
    pub async fn update_client(&self, id: &str, draft: ClientDraft) -> Result<()> {
        if self.identity.current_user().is_none() {
            return Err(AppointmentError::Unauthenticated);
        }

        let mut fields = draft.into_fields();
        fields.remove("clinicId");
        fields.remove(CREATED_AT);

        self.store
            .update(CLIENTS, id, fields)
            .await
            .map_err(|e| AppointmentError::from_store(e, "client", id))
    }

    /// Hide a client from the booking picker without deleting it.
    pub async fn disable_client(&self, id: &str) -> Result<()> {
        if self.identity.current_user().is_none() {
            return Err(AppointmentError::Unauthenticated);
        }

        let mut fields = serde_json::Map::new();
        fields.insert("active".into(), Value::Bool(false));
        self.store
            .update(CLIENTS, id, fields)
            .await
            .map_err(|e| AppointmentError::from_store(e, "client", id))?;
        info!(client = %id, "client disabled");
        Ok(())
    }
}

#[async_trait]
impl ClientDirectory for StoreClientDirectory {
    async fn list_clients(&self) -> Result<Vec<Client>> {
        let Some(user) = self.identity.current_user() else {
            return Ok(Vec::new());
        };

        let query = Query::new()
            .where_eq("clinicId", user.as_str())
            .order_by(CREATED_AT, Direction::Desc);
        let docs = self.store.query(CLIENTS, &query).await?;
        Ok(docs.iter().map(Client::from_document).collect())
    }

    async fn get_client_by_id(&self, id: &str) -> Result<Option<Client>> {
        let user = self
            .identity
            .current_user()
            .ok_or(AppointmentError::Unauthenticated)?;

        let client = self
            .store
            .get(CLIENTS, id)
            .await?
            .map(|doc| Client::from_document(&doc))
            .filter(|client| client.clinic_id == user.as_str());
        Ok(client)
    }
}

/// Display names for the clients referenced by `appointments`.
///
/// One lookup runs per distinct client id, all concurrently. A lookup that
/// fails, or finds no named client, yields `fallback` instead of failing the
/// batch.
pub async fn resolve_client_names(
    directory: &dyn ClientDirectory,
    appointments: &[Appointment],
    fallback: &str,
) -> HashMap<String, String> {
    let ids: BTreeSet<&str> = appointments
        .iter()
        .filter_map(|a| a.client_id.as_deref())
        .collect();

    let lookups = ids.into_iter().map(|id| async move {
        let name = match directory.get_client_by_id(id).await {
            Ok(Some(client)) if !client.full_name.trim().is_empty() => client.full_name,
            Ok(_) => fallback.to_string(),
            Err(err) => {
                warn!(client = %id, error = %err, "client name lookup failed");
                fallback.to_string()
            }
        };
        (id.to_string(), name)
    });

    join_all(lookups).await.into_iter().collect()
}
