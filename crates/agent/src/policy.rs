use async_trait::async_trait;

use nova_core::{Message, Persona};

/// Decision capability that turns persona configuration plus recent group
/// context into an optional reply. Injected; the runtime treats it as
/// opaque and swappable.
#[async_trait]
pub trait ReplyPolicy: Send + Sync {
    async fn decide(&self, persona: &Persona, recent: &[Message]) -> Option<String>;
}

/// Default policy: observe only, never reply. Embedders inject anything
/// smarter (a generation service, a rules engine) behind the same trait.
#[derive(Default)]
pub struct NoReplyPolicy;

#[async_trait]
impl ReplyPolicy for NoReplyPolicy {
    async fn decide(&self, _persona: &Persona, _recent: &[Message]) -> Option<String> {
        None
    }
}
