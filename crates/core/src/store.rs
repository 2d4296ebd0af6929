use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::domain::group::{Group, GroupId, GroupRegistration};
use crate::domain::message::{Message, MessageId};
use crate::domain::persona::{Persona, PersonaUpdate};
use crate::domain::status::Status;
use crate::domain::AgentState;
use crate::errors::StoreError;

/// Cheaply cloneable handle to the shared conversation state.
///
/// Every method takes the single store lock for its whole duration and does
/// no I/O while holding it, so mutations never observably interleave and a
/// snapshot always reflects one logical instant. External calls (Graph API
/// sends, joins) happen strictly outside these critical sections.
#[derive(Clone, Default)]
pub struct StateHandle {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    persona: Persona,
    groups: Vec<Group>,
    messages: Vec<Message>,
    status: Status,
    next_message_id: u64,
    clock_watermark: Option<DateTime<Utc>>,
}

impl StoreInner {
    /// Wall clock clamped to never run backwards within this process, so
    /// message timestamps are monotonic even across clock adjustments.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = self.clock_watermark.map_or(now, |watermark| watermark.max(now));
        self.clock_watermark = Some(at);
        at
    }

    fn group_position(&self, id: &GroupId) -> Option<usize> {
        self.groups.iter().position(|group| &group.id == id)
    }
}

impl StateHandle {
    pub fn new(persona: Persona) -> Self {
        let handle = Self::default();
        handle.lock().persona = persona;
        handle
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        // A poisoned lock means a panic mid-mutation elsewhere; the data is
        // still structurally valid (mutators only assign whole values), so
        // recover rather than cascade the panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent snapshot of all four entity kinds.
    pub fn snapshot(&self) -> AgentState {
        let inner = self.lock();
        AgentState {
            persona: inner.persona.clone(),
            groups: inner.groups.clone(),
            messages: inner.messages.clone(),
            status: inner.status.clone(),
        }
    }

    /// Merges the non-empty fields of `update` into the persona singleton.
    /// An unknown tone rejects the whole update without mutating anything.
    pub fn update_persona(&self, update: PersonaUpdate) -> Result<Persona, StoreError> {
        let mut inner = self.lock();
        update.apply(&mut inner.persona)?;
        Ok(inner.persona.clone())
    }

    /// Registers a group, idempotently by id. First registration stamps
    /// `joined_at` and defaults the name to the id; later registrations keep
    /// both and apply supplied name/description last-write-wins.
    pub fn add_group(&self, registration: GroupRegistration) -> Group {
        let mut inner = self.lock();

        if let Some(position) = inner.group_position(&registration.id) {
            let group = &mut inner.groups[position];
            if let Some(name) = registration.name {
                group.name = name;
            }
            if let Some(description) = registration.description {
                group.description = Some(description);
            }
            return group.clone();
        }

        let joined_at = inner.tick();
        let group = Group {
            name: registration.name.unwrap_or_else(|| registration.id.0.clone()),
            id: registration.id,
            description: registration.description,
            joined_at,
        };
        inner.groups.push(group.clone());
        group
    }

    /// Appends a message to the log and advances the matching status
    /// watermark. Fails without any mutation when the group is untracked.
    pub fn log_message(
        &self,
        group_id: &GroupId,
        sender: impl Into<String>,
        content: impl Into<String>,
        from_agent: bool,
    ) -> Result<Message, StoreError> {
        let mut inner = self.lock();

        if inner.group_position(group_id).is_none() {
            return Err(StoreError::GroupNotFound { group_id: group_id.clone() });
        }

        let timestamp = inner.tick();
        let id = MessageId(inner.next_message_id);
        inner.next_message_id += 1;

        let message = Message {
            id,
            group_id: group_id.clone(),
            sender: sender.into(),
            content: content.into(),
            timestamp,
            from_agent,
        };
        inner.messages.push(message.clone());

        if from_agent {
            inner.status.record_outbound(timestamp);
        } else {
            inner.status.record_inbound(timestamp);
        }

        Ok(message)
    }

    /// Records the outcome of the messaging client's latest call.
    pub fn set_connected(&self, connected: bool) {
        self.lock().status.connected = connected;
    }

    pub fn persona(&self) -> Persona {
        self.lock().persona.clone()
    }

    pub fn is_tracked(&self, group_id: &GroupId) -> bool {
        self.lock().group_position(group_id).is_some()
    }

    /// Tail of one group's log, oldest first. This is the context window the
    /// reply policy sees.
    pub fn recent_messages(&self, group_id: &GroupId, limit: usize) -> Vec<Message> {
        let inner = self.lock();
        let matching = inner
            .messages
            .iter()
            .filter(|message| &message.group_id == group_id)
            .cloned()
            .collect::<Vec<_>>();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::StateHandle;
    use crate::domain::group::{GroupId, GroupRegistration};
    use crate::domain::persona::{Persona, PersonaUpdate, Tone};
    use crate::errors::StoreError;

    fn store_with_group(id: &str) -> StateHandle {
        let store = StateHandle::default();
        store.add_group(GroupRegistration::new(id));
        store
    }

    #[test]
    fn add_group_stamps_joined_at_once_and_defaults_name_to_id() {
        let store = StateHandle::default();

        let first = store.add_group(GroupRegistration::new("abc123"));
        assert_eq!(first.name, "abc123");

        let second = store
            .add_group(GroupRegistration::new("abc123").with_name("Release Crew"));
        assert_eq!(second.joined_at, first.joined_at);
        assert_eq!(second.name, "Release Crew");
        assert_eq!(store.snapshot().groups.len(), 1);
    }

    #[test]
    fn reregistration_without_fields_keeps_prior_name_and_description() {
        let store = StateHandle::default();
        store.add_group(
            GroupRegistration::new("abc123").with_name("Release Crew").with_description("launch"),
        );

        let group = store.add_group(GroupRegistration::new("abc123"));
        assert_eq!(group.name, "Release Crew");
        assert_eq!(group.description.as_deref(), Some("launch"));
    }

    #[test]
    fn groups_keep_insertion_order() {
        let store = StateHandle::default();
        for id in ["g1", "g2", "g3"] {
            store.add_group(GroupRegistration::new(id));
        }

        let ids = store.snapshot().groups.into_iter().map(|group| group.id.0).collect::<Vec<_>>();
        assert_eq!(ids, vec!["g1", "g2", "g3"]);
    }

    #[test]
    fn log_message_assigns_increasing_ids_and_monotonic_timestamps() {
        let store = store_with_group("abc123");
        let group_id = GroupId("abc123".to_owned());

        let first = store.log_message(&group_id, "pat", "hello", false).expect("first");
        let second = store.log_message(&group_id, "sam", "hi", false).expect("second");

        assert!(second.id > first.id);
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn log_message_updates_the_matching_status_watermark() {
        let store = store_with_group("abc123");
        let group_id = GroupId("abc123".to_owned());

        store.log_message(&group_id, "pat", "hello", false).expect("inbound");
        let status = store.snapshot().status;
        assert!(status.last_inbound.is_some());
        assert!(status.last_outbound.is_none());

        store.log_message(&group_id, "Nova", "hi pat", true).expect("outbound");
        let status = store.snapshot().status;
        assert!(status.last_outbound.is_some());
    }

    #[test]
    fn log_message_against_unknown_group_mutates_nothing() {
        let store = store_with_group("abc123");
        let before = store.snapshot();

        let error = store
            .log_message(&GroupId("ghost".to_owned()), "pat", "hello", false)
            .expect_err("ghost group");

        assert!(matches!(error, StoreError::GroupNotFound { .. }));
        let after = store.snapshot();
        assert_eq!(after.messages.len(), before.messages.len());
        assert_eq!(after.status, before.status);
    }

    #[test]
    fn update_persona_rejects_unknown_tone_and_keeps_persona() {
        let store = StateHandle::default();

        let error = store
            .update_persona(PersonaUpdate { tone: Some("sarcastic".to_owned()), ..Default::default() })
            .expect_err("sarcastic tone");

        assert!(matches!(error, StoreError::InvalidTone { .. }));
        assert_eq!(store.snapshot().persona, Persona::default());
    }

    #[test]
    fn update_persona_merges_partial_fields() {
        let store = StateHandle::new(Persona::named("Scout"));

        let persona = store
            .update_persona(PersonaUpdate {
                bio: Some("x".to_owned()),
                tone: Some("analytical".to_owned()),
                ..Default::default()
            })
            .expect("valid update");

        assert_eq!(persona.name, "Scout");
        assert_eq!(persona.bio, "x");
        assert_eq!(persona.tone, Tone::Analytical);
    }

    #[test]
    fn recent_messages_returns_the_group_tail_in_order() {
        let store = store_with_group("abc123");
        store.add_group(GroupRegistration::new("other"));
        let group_id = GroupId("abc123".to_owned());

        for index in 0..5 {
            store.log_message(&group_id, "pat", format!("m{index}"), false).expect("log");
        }
        store
            .log_message(&GroupId("other".to_owned()), "sam", "elsewhere", false)
            .expect("other group");

        let tail = store.recent_messages(&group_id, 3);
        let contents = tail.iter().map(|message| message.content.as_str()).collect::<Vec<_>>();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn concurrent_writers_never_tear_a_message() {
        let store = store_with_group("abc123");
        let group_id = GroupId("abc123".to_owned());

        let writers = (0..8)
            .map(|writer| {
                let store = store.clone();
                let group_id = group_id.clone();
                std::thread::spawn(move || {
                    for index in 0..25 {
                        store
                            .log_message(
                                &group_id,
                                format!("writer-{writer}"),
                                format!("m{index}"),
                                writer % 2 == 0,
                            )
                            .expect("tracked group");
                    }
                })
            })
            .collect::<Vec<_>>();

        for writer in writers {
            writer.join().expect("writer thread");
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.messages.len(), 200);

        let mut ids = snapshot.messages.iter().map(|message| message.id).collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 200, "message ids must stay unique under contention");
    }
}
