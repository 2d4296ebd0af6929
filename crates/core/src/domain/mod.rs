pub mod group;
pub mod message;
pub mod persona;
pub mod status;

use serde::Serialize;

use crate::domain::group::Group;
use crate::domain::message::Message;
use crate::domain::persona::Persona;
use crate::domain::status::Status;

/// Consistent point-in-time snapshot of every entity kind the store owns.
///
/// Groups keep insertion order, messages keep creation order. The snapshot is
/// what the dashboard polls and what the reply policy reads from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentState {
    pub persona: Persona,
    pub groups: Vec<Group>,
    pub messages: Vec<Message>,
    pub status: Status,
}
