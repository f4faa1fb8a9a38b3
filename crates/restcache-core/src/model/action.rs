// ── Action status ──
//
// Latest create/update/delete attempt per model. Each verb has a single
// slot that every new attempt overwrites.

use serde::{Serialize, Serializer};
use serde_json::Value;

use super::{RecordId, RequestFailure};

/// Mutating verbs tracked per model.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    Create,
    Update,
    Delete,
}

/// What a settled attempt left behind: the server record or the failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionPayload {
    Record(Value),
    Failure(RequestFailure),
}

/// Outcome of a settled attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub is_success: bool,
    pub payload: Option<ActionPayload>,
}

/// One verb's latest attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSlot {
    pub pending: bool,
    pub id: Option<RecordId>,
    #[serde(flatten)]
    pub outcome: Option<ActionOutcome>,
}

impl ActionSlot {
    pub fn pending(id: Option<RecordId>) -> Self {
        Self {
            pending: true,
            id,
            outcome: None,
        }
    }

    pub fn settled(id: Option<RecordId>, is_success: bool, payload: Option<ActionPayload>) -> Self {
        Self {
            pending: false,
            id,
            outcome: Some(ActionOutcome {
                is_success,
                payload,
            }),
        }
    }

    pub fn is_success(&self) -> Option<bool> {
        self.outcome.as_ref().map(|o| o.is_success)
    }

    pub fn payload(&self) -> Option<&ActionPayload> {
        self.outcome.as_ref().and_then(|o| o.payload.as_ref())
    }
}

/// Per-model action status. An empty slot serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionStatus {
    #[serde(serialize_with = "slot_or_empty")]
    pub create: Option<ActionSlot>,
    #[serde(serialize_with = "slot_or_empty")]
    pub update: Option<ActionSlot>,
    #[serde(serialize_with = "slot_or_empty")]
    pub delete: Option<ActionSlot>,
}

impl ActionStatus {
    pub fn slot(&self, verb: Verb) -> Option<&ActionSlot> {
        match verb {
            Verb::Create => self.create.as_ref(),
            Verb::Update => self.update.as_ref(),
            Verb::Delete => self.delete.as_ref(),
        }
    }

    /// Copy with one verb's slot replaced.
    #[must_use]
    pub fn with_slot(&self, verb: Verb, slot: Option<ActionSlot>) -> Self {
        let mut next = self.clone();
        match verb {
            Verb::Create => next.create = slot,
            Verb::Update => next.update = slot,
            Verb::Delete => next.delete = slot,
        }
        next
    }
}

#[allow(clippy::ref_option)]
fn slot_or_empty<S: Serializer>(slot: &Option<ActionSlot>, s: S) -> Result<S::Ok, S::Error> {
    match slot {
        Some(slot) => slot.serialize(s),
        None => serde_json::Map::new().serialize(s),
    }
}
