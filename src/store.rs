/// Document store abstraction.
///
/// The scheduling core never talks to a concrete backend. It depends on the
/// `DocumentStore` trait, which models a hosted document database: keyed
/// records grouped in collections, server-stamped creation and update times,
/// and filtered, ordered queries. `MemoryStore` is the in-process
/// implementation used by the binary and the tests.

use crate::error::{StoreError, StoreErrorKind};
use crate::lock;
use crate::time::{timestamp_value, value_to_instant, Clock, SystemClock};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

pub type Fields = Map<String, Value>;

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// A stored record and its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String field, treating null and empty strings as absent.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Conjunction of filters plus an optional ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter(mut self, field: &str, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value,
        });
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value.into())
    }

    pub fn where_gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Gte, value.into())
    }

    pub fn where_lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Lt, value.into())
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    /// Whether a document satisfies every filter.
    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|filter| {
            let Some(actual) = fields.get(&filter.field) else {
                return false;
            };
            match filter.op {
                FilterOp::Eq => {
                    actual == &filter.value
                        || compare_values(actual, &filter.value) == Some(Ordering::Equal)
                }
                FilterOp::Gte => matches!(
                    compare_values(actual, &filter.value),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                FilterOp::Lt => compare_values(actual, &filter.value) == Some(Ordering::Less),
            }
        })
    }
}

fn is_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .map(|m| m.contains_key("seconds"))
        .unwrap_or(false)
}

/// Compare two values of the same kind; `None` when the kinds differ.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ if is_timestamp(a) && is_timestamp(b) => {
            Some(value_to_instant(a)?.cmp(&value_to_instant(b)?))
        }
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        _ if is_timestamp(value) => 3,
        Value::String(_) => 4,
        _ => 5,
    }
}

fn order_values(a: &Value, b: &Value) -> Ordering {
    compare_values(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document, stamping `createdAt` and `updatedAt`.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Merge fields into an existing document and refresh `updatedAt`.
    /// Fails with `NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Remove a document. Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Run a query. With an ordering, documents lacking the ordered field
    /// are left out.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// In-process document store.
pub struct MemoryStore {
    collections: Mutex<Collections>,
    failures: Mutex<VecDeque<StoreError>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store whose server timestamps come from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            collections: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    /// Make the next operation fail with `error`. Queued failures are
    /// consumed in order, one per operation.
    pub fn fail_next(&self, error: StoreError) {
        lock(&self.failures).push_back(error);
    }

    /// Insert a document verbatim under a chosen id, without stamping.
    pub fn insert_raw(&self, collection: &str, id: &str, fields: Fields) {
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub fn len(&self, collection: &str) -> usize {
        lock(&self.collections)
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn injected_failure(&self) -> Result<(), StoreError> {
        match lock(&self.failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn server_timestamp(&self) -> Value {
        timestamp_value(self.clock.now_utc())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add(&self, collection: &str, mut fields: Fields) -> Result<String, StoreError> {
        self.injected_failure()?;

        let stamp = self.server_timestamp();
        fields.insert(CREATED_AT.to_string(), stamp.clone());
        fields.insert(UPDATED_AT.to_string(), stamp);

        let id = Uuid::new_v4().simple().to_string();
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);

        debug!(collection, id = %id, "document added");
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.injected_failure()?;

        let collections = lock(&self.collections);
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.injected_failure()?;

        let stamp = self.server_timestamp();
        let mut collections = lock(&self.collections);
        let existing = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| {
                StoreError::new(
                    StoreErrorKind::NotFound,
                    format!("no document to update: {}/{}", collection, id),
                )
            })?;

        for (key, value) in fields {
            existing.insert(key, value);
        }
        existing.insert(UPDATED_AT.to_string(), stamp);

        debug!(collection, id, "document updated");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.injected_failure()?;

        let removed = lock(&self.collections)
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();

        debug!(collection, id, removed, "document deleted");
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.injected_failure()?;

        let collections = lock(&self.collections);
        let mut docs: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| query.matches(fields))
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        if let Some((field, direction)) = &query.order_by {
            docs.retain(|doc| doc.fields.contains_key(field));
            docs.sort_by(|a, b| {
                let ordering = match (a.fields.get(field), b.fields.get(field)) {
                    (Some(x), Some(y)) => order_values(x, y),
                    _ => Ordering::Equal,
                }
                .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        debug!(
            collection,
            filters = query.filters.len(),
            results = docs.len(),
            "query executed"
        );
        Ok(docs)
    }
}
