use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Delivery payload as the platform posts it: a batch of entries, each with
/// a list of field changes. Only `messages` changes carry conversation
/// traffic; everything else (status receipts, template updates) is noise to
/// this system.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookEntry {
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookChange {
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<RawInboundMessage>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookContact {
    pub wa_id: String,
    pub profile: Option<ContactProfile>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ContactProfile {
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawInboundMessage {
    pub from: Option<String>,
    pub group_id: Option<String>,
    pub id: Option<String>,
    /// Unix seconds, delivered as a string on the wire.
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<TextBody>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// An inbound message reduced to what the runtime cares about. `timestamp`
/// is the platform's delivery time when it parsed; the store stamps its own
/// clock either way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundText {
    pub group_id: String,
    pub sender: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Flattens a delivery payload into inbound texts. Non-text messages,
/// messages without a group reference, and changes for other fields are
/// dropped here; the caller only ever sees events it can act on.
pub fn normalize(payload: &WebhookPayload) -> Vec<InboundText> {
    let mut inbound = Vec::new();

    for entry in &payload.entry {
        for change in &entry.changes {
            if change.field.as_deref() != Some("messages") {
                continue;
            }

            for message in &change.value.messages {
                if message.kind.as_deref() != Some("text") {
                    continue;
                }
                let (Some(group_id), Some(from), Some(text)) =
                    (&message.group_id, &message.from, &message.text)
                else {
                    continue;
                };
                if text.body.trim().is_empty() {
                    continue;
                }

                inbound.push(InboundText {
                    group_id: group_id.clone(),
                    sender: display_name(&change.value.contacts, from),
                    text: text.body.clone(),
                    timestamp: parse_unix_seconds(message.timestamp.as_deref()),
                });
            }
        }
    }

    inbound
}

/// Resolves a sender id to the profile name the contacts block carries, if
/// any. Falls back to the raw id.
fn display_name(contacts: &[WebhookContact], wa_id: &str) -> String {
    contacts
        .iter()
        .find(|contact| contact.wa_id == wa_id)
        .and_then(|contact| contact.profile.as_ref())
        .and_then(|profile| profile.name.clone())
        .unwrap_or_else(|| wa_id.to_owned())
}

fn parse_unix_seconds(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Subscription handshake: the platform probes the webhook with a mode, the
/// shared verify token, and a challenge to echo. Anything but an exact token
/// match on a `subscribe` probe is rejected; an unconfigured secret rejects
/// everything.
pub fn verify_handshake(mode: Option<&str>, token: Option<&str>, configured: Option<&str>) -> bool {
    let Some(expected) = configured.filter(|value| !value.is_empty()) else {
        return false;
    };

    mode == Some("subscribe") && token == Some(expected)
}
