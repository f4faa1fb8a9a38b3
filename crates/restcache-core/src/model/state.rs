// ── State tree ──
//
// CrudState maps model names to ModelStore slices. Every level sits
// behind an `Arc`, so a new snapshot shares everything it did not touch
// with the snapshot it was derived from.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::{ActionStatus, CollectionEntry, RecordEntry, RecordId};

/// Record entries of one model, keyed by id.
pub type ById = BTreeMap<RecordId, RecordEntry>;

/// Everything cached for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStore {
    pub by_id: Arc<ById>,
    pub collections: Arc<Vec<CollectionEntry>>,
    pub action_status: Arc<ActionStatus>,
}

/// Top-level cache state: model name -> model slice.
///
/// Models are materialized lazily, the first time an event touches them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CrudState {
    models: BTreeMap<String, Arc<ModelStore>>,
}

impl CrudState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self, name: &str) -> Option<&Arc<ModelStore>> {
        self.models.get(name)
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &Arc<ModelStore>)> {
        self.models.iter().map(|(name, store)| (name.as_str(), store))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Copy of this state with one model slot replaced. Other slots are
    /// shared by pointer.
    #[must_use]
    pub fn with_model(&self, name: &str, store: Arc<ModelStore>) -> Self {
        let mut models = self.models.clone();
        models.insert(name.to_owned(), store);
        Self { models }
    }

    /// Record entry lookup.
    pub fn record(&self, model: &str, id: &RecordId) -> Option<&RecordEntry> {
        self.model(model)?.by_id.get(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn with_model_shares_untouched_slots() {
        let books = Arc::new(ModelStore::default());
        let state = CrudState::new().with_model("books", Arc::clone(&books));
        let next = state.with_model("authors", Arc::new(ModelStore::default()));

        assert_eq!(next.len(), 2);
        assert!(Arc::ptr_eq(next.model("books").unwrap(), &books));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn default_model_serializes_to_documented_shape() {
        let state = CrudState::new().with_model("books", Arc::default());
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({
                "books": {
                    "byId": {},
                    "collections": [],
                    "actionStatus": { "create": {}, "update": {}, "delete": {} }
                }
            })
        );
    }
}
