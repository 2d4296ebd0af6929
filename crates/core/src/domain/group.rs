use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A WhatsApp group the agent is a member of. `joined_at` is the instant of
/// first registration and survives re-registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// Input to [`crate::store::StateHandle::add_group`]. When `name` is absent
/// the group id doubles as its display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRegistration {
    pub id: GroupId,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl GroupRegistration {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: GroupId(id.into()), name: None, description: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
