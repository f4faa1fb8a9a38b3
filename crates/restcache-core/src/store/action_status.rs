// ── ActionStatusTracker reducer ──

use std::sync::Arc;

use crate::event::CrudEvent;
use crate::model::{ActionPayload, ActionSlot, ActionStatus, Verb};

/// Apply `event` to a model's action status.
///
/// Each create/update/delete attempt overwrites its verb's slot.
pub fn reduce_action_status(status: &Arc<ActionStatus>, event: &CrudEvent) -> Arc<ActionStatus> {
    let (verb, slot) = match event {
        CrudEvent::ClearActionStatus { verb, .. } => {
            if status.slot(*verb).is_none() {
                return Arc::clone(status);
            }
            (*verb, None)
        }
        CrudEvent::CreateStarted { .. } => (Verb::Create, Some(ActionSlot::pending(None))),
        CrudEvent::UpdateStarted { id, .. } => {
            (Verb::Update, Some(ActionSlot::pending(Some(id.clone()))))
        }
        CrudEvent::DeleteStarted { id, .. } => {
            (Verb::Delete, Some(ActionSlot::pending(Some(id.clone()))))
        }
        CrudEvent::CreateSucceeded { id, record, .. } => (
            Verb::Create,
            Some(ActionSlot::settled(
                Some(id.clone()),
                true,
                Some(ActionPayload::Record(record.clone())),
            )),
        ),
        CrudEvent::UpdateSucceeded { id, record, .. } => (
            Verb::Update,
            Some(ActionSlot::settled(
                Some(id.clone()),
                true,
                Some(ActionPayload::Record(record.clone())),
            )),
        ),
        CrudEvent::DeleteSucceeded { id, payload, .. } => (
            Verb::Delete,
            Some(ActionSlot::settled(
                Some(id.clone()),
                true,
                payload.clone().map(ActionPayload::Record),
            )),
        ),
        // A failed create has no server id to report.
        CrudEvent::CreateFailed { error, .. } => (
            Verb::Create,
            Some(ActionSlot::settled(
                None,
                false,
                Some(ActionPayload::Failure(error.clone())),
            )),
        ),
        CrudEvent::UpdateFailed { id, error, .. } => (
            Verb::Update,
            Some(ActionSlot::settled(
                Some(id.clone()),
                false,
                Some(ActionPayload::Failure(error.clone())),
            )),
        ),
        CrudEvent::DeleteFailed { id, error, .. } => (
            Verb::Delete,
            Some(ActionSlot::settled(
                Some(id.clone()),
                false,
                Some(ActionPayload::Failure(error.clone())),
            )),
        ),
        _ => return Arc::clone(status),
    };
    Arc::new(status.with_slot(verb, slot))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{RecordId, RequestFailure};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn books() -> String {
        "books".into()
    }

    #[test]
    fn create_lifecycle() {
        let pending = reduce_action_status(&Arc::default(), &CrudEvent::CreateStarted { model: books() });
        assert_eq!(pending.create, Some(ActionSlot::pending(None)));

        let done = reduce_action_status(
            &pending,
            &CrudEvent::CreateSucceeded {
                model: books(),
                id: RecordId::Int(7),
                record: json!({ "id": 7, "title": "C" }),
                fetch_time: 10,
            },
        );
        assert_eq!(
            serde_json::to_value(&*done).unwrap(),
            json!({
                "create": { "pending": false, "id": 7, "isSuccess": true, "payload": { "id": 7, "title": "C" } },
                "update": {},
                "delete": {}
            })
        );
    }

    #[test]
    fn failed_update_keeps_target_id() {
        let status = reduce_action_status(
            &Arc::default(),
            &CrudEvent::UpdateFailed {
                model: books(),
                id: RecordId::Int(3),
                error: RequestFailure::new("conflict").with_status(409),
                fetch_time: 10,
            },
        );
        let slot = status.update.as_ref().unwrap();
        assert!(!slot.pending);
        assert_eq!(slot.id, Some(RecordId::Int(3)));
        assert_eq!(slot.is_success(), Some(false));
        assert!(matches!(slot.payload(), Some(ActionPayload::Failure(f)) if f.status == Some(409)));
    }

    #[test]
    fn newer_attempt_overwrites_slot() {
        let first = reduce_action_status(
            &Arc::default(),
            &CrudEvent::DeleteStarted {
                model: books(),
                id: RecordId::Int(1),
            },
        );
        let second = reduce_action_status(
            &first,
            &CrudEvent::DeleteStarted {
                model: books(),
                id: RecordId::Int(2),
            },
        );
        assert_eq!(second.delete, Some(ActionSlot::pending(Some(RecordId::Int(2)))));
    }

    #[test]
    fn clear_resets_only_the_named_verb() {
        let status = [
            CrudEvent::CreateStarted { model: books() },
            CrudEvent::UpdateStarted {
                model: books(),
                id: RecordId::Int(1),
            },
        ]
        .iter()
        .fold(Arc::default(), |acc, e| reduce_action_status(&acc, e));

        let cleared = reduce_action_status(
            &status,
            &CrudEvent::ClearActionStatus {
                model: books(),
                verb: Verb::Create,
            },
        );
        assert_eq!(cleared.create, None);
        assert!(cleared.update.is_some());

        let again = reduce_action_status(
            &cleared,
            &CrudEvent::ClearActionStatus {
                model: books(),
                verb: Verb::Create,
            },
        );
        assert!(Arc::ptr_eq(&cleared, &again));
    }
}
