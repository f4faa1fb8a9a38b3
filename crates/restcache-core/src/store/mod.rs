// ── Reducers ──
//
// Pure state transitions. Each sub-reducer owns one slice of a
// ModelStore; `crud` routes events to them.

mod action_status;
mod by_id;
mod collection;
mod crud;

pub use action_status::reduce_action_status;
pub use by_id::reduce_by_id;
pub use collection::{find_collection, reduce_collection, reduce_collections};
pub use crud::{Slice, reduce, update_in};
