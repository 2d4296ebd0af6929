use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Voice the agent writes in. Closed set; anything else is rejected at the
/// store boundary before the persona is touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Friendly,
    Professional,
    Enthusiastic,
    Analytical,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friendly => "friendly",
            Self::Professional => "professional",
            Self::Enthusiastic => "enthusiastic",
            Self::Analytical => "analytical",
        }
    }
}

impl std::str::FromStr for Tone {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "friendly" => Ok(Self::Friendly),
            "professional" => Ok(Self::Professional),
            "enthusiastic" => Ok(Self::Enthusiastic),
            "analytical" => Ok(Self::Analytical),
            other => Err(StoreError::InvalidTone { value: other.to_owned() }),
        }
    }
}

/// The singleton persona the agent presents in groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub bio: String,
    pub tone: Tone,
    pub objective: String,
    pub greeting: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Nova".to_owned(),
            bio: "Community teammate who keeps group chats warm and on topic.".to_owned(),
            tone: Tone::Friendly,
            objective: "Be helpful and keep the conversation moving.".to_owned(),
            greeting: "Hey everyone! Nova here.".to_owned(),
        }
    }
}

impl Persona {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

/// Partial persona update. Fields left out (or blank) keep their prior value.
///
/// `tone` arrives as raw text so the store can reject unknown tones with a
/// typed error instead of a deserialization failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PersonaUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub tone: Option<String>,
    pub objective: Option<String>,
    pub greeting: Option<String>,
}

impl PersonaUpdate {
    /// Validates the update, then merges the non-empty fields into `persona`.
    /// On error nothing is mutated.
    pub fn apply(self, persona: &mut Persona) -> Result<(), StoreError> {
        let tone = match &self.tone {
            Some(raw) if !raw.trim().is_empty() => Some(raw.parse::<Tone>()?),
            _ => None,
        };

        if let Some(name) = non_empty(self.name) {
            persona.name = name;
        }
        if let Some(bio) = non_empty(self.bio) {
            persona.bio = bio;
        }
        if let Some(tone) = tone {
            persona.tone = tone;
        }
        if let Some(objective) = non_empty(self.objective) {
            persona.objective = objective;
        }
        if let Some(greeting) = non_empty(self.greeting) {
            persona.greeting = greeting;
        }

        Ok(())
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}
