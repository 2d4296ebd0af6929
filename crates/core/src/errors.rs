use thiserror::Error;

use crate::domain::group::GroupId;

/// Failures the Conversation Store can report. Both are caller errors: the
/// store itself never ends up in an invalid state because of them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown tone `{value}` (expected friendly|professional|enthusiastic|analytical)")]
    InvalidTone { value: String },
    #[error("no tracked group with id `{group_id}`")]
    GroupNotFound { group_id: GroupId },
}
