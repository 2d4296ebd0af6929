use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use nova_core::{Group, GroupId, GroupRegistration, Message, StateHandle, StoreError};
use nova_whatsapp::client::{ApiError, JoinGroupRequest, MessagingClient};
use nova_whatsapp::webhook::{normalize, InboundText, WebhookPayload};

use crate::policy::ReplyPolicy;

/// Failures a manual (dashboard-triggered) operation can surface. Inbound
/// webhook handling never returns these: the upstream source must always get
/// its acknowledgment, so failures on that path are logged and swallowed.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// How a group enters the tracked set. Exactly one external-call behavior
/// per variant, dispatched exhaustively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinRequest {
    /// Register a draft group locally; the platform is never contacted.
    DryRun { id: String, name: Option<String>, description: Option<String> },
    /// Resolve an invite through the platform, then register the resolved id.
    Invite { invite_code: String, name: Option<String>, description: Option<String> },
    /// Track a group joined out-of-band; no external call.
    Direct { group_id: String, name: Option<String>, description: Option<String> },
}

/// Orchestrates every trigger source - webhook deliveries, dashboard sends,
/// join requests - over one shared [`StateHandle`]. Store mutations happen
/// in the handle's critical sections; messaging calls happen strictly
/// outside them.
pub struct AgentRuntime {
    state: StateHandle,
    client: Arc<dyn MessagingClient>,
    policy: Arc<dyn ReplyPolicy>,
    agent_name: String,
    reply_context_depth: usize,
}

impl AgentRuntime {
    pub fn new(
        state: StateHandle,
        client: Arc<dyn MessagingClient>,
        policy: Arc<dyn ReplyPolicy>,
        agent_name: impl Into<String>,
        reply_context_depth: usize,
    ) -> Self {
        Self { state, client, policy, agent_name: agent_name.into(), reply_context_depth }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Ingests one webhook delivery. Infallible by contract: whatever
    /// happens downstream, the webhook caller gets to acknowledge receipt.
    pub async fn handle_webhook(&self, payload: &WebhookPayload) {
        let inbound = normalize(payload);
        if inbound.is_empty() {
            debug!(
                event_name = "ingress.webhook.ignored",
                "webhook delivery carried no actionable messages"
            );
            return;
        }

        for message in inbound {
            self.handle_inbound(message).await;
        }
    }

    async fn handle_inbound(&self, inbound: InboundText) {
        let group_id = GroupId(inbound.group_id);

        // The runtime only speaks in groups it was told about; auto-joining
        // on unsolicited traffic would let any sender enroll the agent.
        if !self.state.is_tracked(&group_id) {
            debug!(
                event_name = "ingress.webhook.untracked_group",
                group_id = %group_id,
                "ignoring inbound message for untracked group"
            );
            return;
        }

        let logged =
            self.state.log_message(&group_id, inbound.sender.clone(), inbound.text.clone(), false);
        let message = match logged {
            Ok(message) => message,
            Err(error) => {
                // Unlogged events are not retried; the source redelivers.
                warn!(
                    event_name = "ingress.webhook.dropped",
                    group_id = %group_id,
                    error = %error,
                    "dropping inbound message the store refused"
                );
                return;
            }
        };
        info!(
            event_name = "ingress.webhook.message_logged",
            group_id = %group_id,
            message_id = %message.id,
            sender = %inbound.sender,
            "inbound message logged"
        );

        let persona = self.state.persona();
        let recent = self.state.recent_messages(&group_id, self.reply_context_depth);
        let Some(reply) = self.policy.decide(&persona, &recent).await else {
            return;
        };

        match self.client.send_message(&group_id.0, &reply).await {
            Ok(receipt) => {
                self.state.set_connected(true);
                match self.state.log_message(&group_id, persona.name, reply, true) {
                    Ok(message) => info!(
                        event_name = "egress.reply.sent",
                        group_id = %group_id,
                        message_id = %message.id,
                        wire_message_id = %receipt.message_id,
                        "auto-reply dispatched"
                    ),
                    Err(error) => warn!(
                        event_name = "egress.reply.unlogged",
                        group_id = %group_id,
                        error = %error,
                        "auto-reply sent but could not be logged"
                    ),
                }
            }
            Err(error) => {
                // Surfaced to observability only; the webhook must still ack.
                self.state.set_connected(false);
                warn!(
                    event_name = "egress.reply.send_failed",
                    group_id = %group_id,
                    error = %error,
                    "auto-reply send failed"
                );
            }
        }
    }

    /// Dashboard-triggered send. Bypasses the reply policy but funnels
    /// through the same client-then-store sequence the auto-reply path uses.
    pub async fn handle_manual_send(
        &self,
        group_id: &str,
        content: &str,
    ) -> Result<Message, RuntimeError> {
        let group_id = GroupId(group_id.to_owned());
        if !self.state.is_tracked(&group_id) {
            return Err(StoreError::GroupNotFound { group_id }.into());
        }

        let receipt = match self.client.send_message(&group_id.0, content).await {
            Ok(receipt) => receipt,
            Err(error) => {
                self.state.set_connected(false);
                warn!(
                    event_name = "egress.manual.send_failed",
                    group_id = %group_id,
                    error = %error,
                    "manual send failed"
                );
                return Err(error.into());
            }
        };

        self.state.set_connected(true);
        let persona_name = self.state.persona().name;
        let message = self.state.log_message(&group_id, persona_name, content, true)?;
        info!(
            event_name = "egress.manual.sent",
            group_id = %group_id,
            message_id = %message.id,
            wire_message_id = %receipt.message_id,
            "manual send dispatched"
        );
        Ok(message)
    }

    /// Logs an agent-authored message without touching the messaging client.
    /// The configured agent display name is the sender.
    pub fn simulate_send(&self, group_id: &str, content: &str) -> Result<Message, RuntimeError> {
        let group_id = GroupId(group_id.to_owned());
        let message =
            self.state.log_message(&group_id, self.agent_name.clone(), content, true)?;
        info!(
            event_name = "egress.manual.simulated",
            group_id = %group_id,
            message_id = %message.id,
            "simulated send logged"
        );
        Ok(message)
    }

    /// Registers a group per the request variant. Only `Invite` contacts the
    /// platform; its failure registers nothing. Re-joining a tracked group
    /// re-attempts the external call and reconciles by id afterward.
    pub async fn handle_join(&self, request: JoinRequest) -> Result<Group, RuntimeError> {
        match request {
            JoinRequest::DryRun { id, name, description } => {
                let registration = GroupRegistration {
                    id: GroupId(id),
                    name: Some(name.unwrap_or_else(|| "Draft Group".to_owned())),
                    description,
                };
                let group = self.state.add_group(registration);
                info!(
                    event_name = "runtime.join.dry_run",
                    group_id = %group.id,
                    "draft group registered"
                );
                Ok(group)
            }
            JoinRequest::Direct { group_id, name, description } => {
                let group = self.state.add_group(GroupRegistration {
                    id: GroupId(group_id),
                    name,
                    description,
                });
                info!(
                    event_name = "runtime.join.direct",
                    group_id = %group.id,
                    "out-of-band group registered"
                );
                Ok(group)
            }
            JoinRequest::Invite { invite_code, name, description } => {
                let handle = match self
                    .client
                    .join_group(JoinGroupRequest {
                        invite_code,
                        name: name.clone(),
                        description: description.clone(),
                    })
                    .await
                {
                    Ok(handle) => handle,
                    Err(error) => {
                        self.state.set_connected(false);
                        warn!(
                            event_name = "runtime.join.failed",
                            error = %error,
                            "group join rejected by the platform"
                        );
                        return Err(error.into());
                    }
                };

                self.state.set_connected(true);
                let group = self.state.add_group(GroupRegistration {
                    id: GroupId(handle.group_id),
                    name: name.or(handle.name),
                    description,
                });
                info!(
                    event_name = "runtime.join.completed",
                    group_id = %group.id,
                    "group joined and registered"
                );
                Ok(group)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    use nova_core::{GroupId, GroupRegistration, Message, Persona, StateHandle, StoreError};
    use nova_whatsapp::client::{
        ApiError, GroupHandle, JoinGroupRequest, MessagingClient, SendReceipt,
    };
    use nova_whatsapp::webhook::WebhookPayload;

    use crate::policy::{NoReplyPolicy, ReplyPolicy};

    use super::{AgentRuntime, JoinRequest, RuntimeError};

    #[derive(Default)]
    struct ScriptedClient {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        join_results: VecDeque<Result<GroupHandle, ApiError>>,
        send_results: VecDeque<Result<SendReceipt, ApiError>>,
        joins: Vec<String>,
        sends: Vec<(String, String)>,
    }

    impl ScriptedClient {
        fn with_sends(send_results: Vec<Result<SendReceipt, ApiError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    send_results: send_results.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        fn with_joins(join_results: Vec<Result<GroupHandle, ApiError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    join_results: join_results.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn sends(&self) -> Vec<(String, String)> {
            self.state.lock().await.sends.clone()
        }

        async fn joins(&self) -> Vec<String> {
            self.state.lock().await.joins.clone()
        }
    }

    fn receipt(id: &str) -> SendReceipt {
        SendReceipt { message_id: id.to_owned(), timestamp: Utc::now() }
    }

    #[async_trait]
    impl MessagingClient for ScriptedClient {
        async fn join_group(&self, request: JoinGroupRequest) -> Result<GroupHandle, ApiError> {
            let mut state = self.state.lock().await;
            state.joins.push(request.invite_code.clone());
            state.join_results.pop_front().unwrap_or(Ok(GroupHandle {
                group_id: format!("resolved-{}", request.invite_code),
                name: None,
            }))
        }

        async fn send_message(
            &self,
            group_id: &str,
            content: &str,
        ) -> Result<SendReceipt, ApiError> {
            let mut state = self.state.lock().await;
            state.sends.push((group_id.to_owned(), content.to_owned()));
            state.send_results.pop_front().unwrap_or(Ok(receipt("wamid.fallback")))
        }
    }

    struct StaticPolicy(Option<&'static str>);

    #[async_trait]
    impl ReplyPolicy for StaticPolicy {
        async fn decide(&self, _persona: &Persona, _recent: &[Message]) -> Option<String> {
            self.0.map(str::to_owned)
        }
    }

    fn runtime(
        client: Arc<ScriptedClient>,
        policy: impl ReplyPolicy + 'static,
    ) -> AgentRuntime {
        AgentRuntime::new(StateHandle::default(), client, Arc::new(policy), "Nova", 20)
    }

    fn tracked(runtime: &AgentRuntime, id: &str) {
        runtime.state().add_group(GroupRegistration::new(id));
    }

    fn delivery(group_id: &str, from: &str, body: &str) -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{"field": "messages", "value": {"messages": [{
                "from": from,
                "group_id": group_id,
                "type": "text",
                "text": {"body": body},
                "timestamp": "1738000000"
            }]}}]}]
        }))
        .expect("delivery payload decodes")
    }

    #[tokio::test]
    async fn inbound_for_tracked_group_logs_and_replies() {
        let client = Arc::new(ScriptedClient::with_sends(vec![Ok(receipt("wamid.r1"))]));
        let runtime = runtime(client.clone(), StaticPolicy(Some("welcome aboard!")));
        tracked(&runtime, "abc123");

        runtime.handle_webhook(&delivery("abc123", "15550001111", "anyone around?")).await;

        let snapshot = runtime.state().snapshot();
        assert_eq!(snapshot.messages.len(), 2);
        assert!(!snapshot.messages[0].from_agent);
        assert!(snapshot.messages[1].from_agent);
        assert_eq!(snapshot.messages[1].sender, snapshot.persona.name);
        assert_eq!(snapshot.messages[1].content, "welcome aboard!");
        assert!(snapshot.status.connected);
        assert_eq!(client.sends().await, vec![("abc123".to_owned(), "welcome aboard!".to_owned())]);
    }

    #[tokio::test]
    async fn inbound_for_untracked_group_changes_nothing() {
        let client = Arc::new(ScriptedClient::default());
        let runtime = runtime(client.clone(), StaticPolicy(Some("should never send")));
        tracked(&runtime, "abc123");
        let before = runtime.state().snapshot();

        runtime.handle_webhook(&delivery("ghost-group", "15550001111", "hello?")).await;

        let after = runtime.state().snapshot();
        assert_eq!(after.messages.len(), before.messages.len());
        assert_eq!(after.status, before.status);
        assert!(client.sends().await.is_empty());
    }

    #[tokio::test]
    async fn failed_reply_send_marks_disconnected_but_keeps_inbound() {
        let client = Arc::new(ScriptedClient::with_sends(vec![Err(ApiError::Timeout { secs: 10 })]));
        let runtime = runtime(client, StaticPolicy(Some("doomed reply")));
        tracked(&runtime, "abc123");

        runtime.handle_webhook(&delivery("abc123", "15550001111", "ping")).await;

        let snapshot = runtime.state().snapshot();
        assert_eq!(snapshot.messages.len(), 1, "only the inbound message should be logged");
        assert!(!snapshot.messages[0].from_agent);
        assert!(!snapshot.status.connected);
        assert!(snapshot.status.last_outbound.is_none());
    }

    #[tokio::test]
    async fn silent_policy_means_no_outbound_traffic() {
        let client = Arc::new(ScriptedClient::default());
        let runtime = runtime(client.clone(), NoReplyPolicy);
        tracked(&runtime, "abc123");

        runtime.handle_webhook(&delivery("abc123", "15550001111", "just chatting")).await;

        assert_eq!(runtime.state().snapshot().messages.len(), 1);
        assert!(client.sends().await.is_empty());
    }

    #[tokio::test]
    async fn unsupported_payloads_are_ignored_without_error() {
        let client = Arc::new(ScriptedClient::default());
        let runtime = runtime(client, StaticPolicy(Some("unreachable")));
        tracked(&runtime, "abc123");

        let payload: WebhookPayload =
            serde_json::from_value(serde_json::json!({"object": "page", "entry": []}))
                .expect("payload decodes");
        runtime.handle_webhook(&payload).await;

        assert!(runtime.state().snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn manual_send_logs_agent_message_under_persona_name() {
        let client = Arc::new(ScriptedClient::with_sends(vec![Ok(receipt("wamid.m1"))]));
        let runtime = runtime(client, NoReplyPolicy);
        tracked(&runtime, "abc123");

        let message =
            runtime.handle_manual_send("abc123", "shipping at noon").await.expect("send works");

        assert!(message.from_agent);
        assert_eq!(message.sender, "Nova");
        let snapshot = runtime.state().snapshot();
        assert!(snapshot.status.connected);
        assert!(snapshot.status.last_outbound.is_some());
    }

    #[tokio::test]
    async fn manual_send_timeout_leaves_no_agent_message() {
        let client = Arc::new(ScriptedClient::with_sends(vec![Err(ApiError::Timeout { secs: 10 })]));
        let runtime = runtime(client, NoReplyPolicy);
        tracked(&runtime, "abc123");
        runtime
            .state()
            .log_message(&GroupId("abc123".to_owned()), "pat", "earlier inbound", false)
            .expect("seed inbound");

        let error = runtime.handle_manual_send("abc123", "never lands").await.expect_err("timeout");

        assert!(matches!(error, RuntimeError::Api(ApiError::Timeout { .. })));
        let snapshot = runtime.state().snapshot();
        assert!(!snapshot.status.connected);
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].content, "earlier inbound");
    }

    #[tokio::test]
    async fn manual_send_to_unknown_group_skips_the_client() {
        let client = Arc::new(ScriptedClient::default());
        let runtime = runtime(client.clone(), NoReplyPolicy);

        let error = runtime.handle_manual_send("ghost", "hi").await.expect_err("unknown group");

        assert!(matches!(error, RuntimeError::Store(StoreError::GroupNotFound { .. })));
        assert!(client.sends().await.is_empty());
    }

    #[tokio::test]
    async fn simulated_send_uses_configured_agent_name_and_no_client() {
        let client = Arc::new(ScriptedClient::default());
        let runtime = runtime(client.clone(), NoReplyPolicy);
        tracked(&runtime, "abc123");

        let message = runtime.simulate_send("abc123", "dry-run hello").expect("simulation works");

        assert!(message.from_agent);
        assert_eq!(message.sender, "Nova");
        assert!(client.sends().await.is_empty());
        assert!(runtime.state().snapshot().status.last_outbound.is_some());
    }

    #[tokio::test]
    async fn dry_run_join_defaults_to_draft_group_name() {
        let client = Arc::new(ScriptedClient::default());
        let runtime = runtime(client.clone(), NoReplyPolicy);

        let group = runtime
            .handle_join(JoinRequest::DryRun {
                id: "abc123".to_owned(),
                name: None,
                description: None,
            })
            .await
            .expect("dry-run join");

        assert_eq!(group.id, GroupId("abc123".to_owned()));
        assert_eq!(group.name, "Draft Group");
        assert!(client.joins().await.is_empty());
        assert!(runtime
            .state()
            .snapshot()
            .groups
            .iter()
            .any(|group| group.id == GroupId("abc123".to_owned())));
    }

    #[tokio::test]
    async fn invite_join_registers_the_resolved_group_id() {
        let client = Arc::new(ScriptedClient::with_joins(vec![Ok(GroupHandle {
            group_id: "wa-77".to_owned(),
            name: Some("Platform Name".to_owned()),
        })]));
        let runtime = runtime(client.clone(), NoReplyPolicy);

        let group = runtime
            .handle_join(JoinRequest::Invite {
                invite_code: "inv-9".to_owned(),
                name: Some("Our Name".to_owned()),
                description: None,
            })
            .await
            .expect("invite join");

        assert_eq!(group.id, GroupId("wa-77".to_owned()));
        assert_eq!(group.name, "Our Name", "caller-supplied name wins over the handle's");
        assert!(runtime.state().snapshot().status.connected);
        assert_eq!(client.joins().await, vec!["inv-9".to_owned()]);
    }

    #[tokio::test]
    async fn invite_join_failure_registers_nothing() {
        let client = Arc::new(ScriptedClient::with_joins(vec![Err(ApiError::Rejected {
            code: 400,
            message: "invite expired".to_owned(),
        })]));
        let runtime = runtime(client, NoReplyPolicy);

        let error = runtime
            .handle_join(JoinRequest::Invite {
                invite_code: "inv-stale".to_owned(),
                name: None,
                description: None,
            })
            .await
            .expect_err("stale invite");

        assert!(matches!(error, RuntimeError::Api(ApiError::Rejected { code: 400, .. })));
        let snapshot = runtime.state().snapshot();
        assert!(snapshot.groups.is_empty());
        assert!(!snapshot.status.connected);
    }

    #[tokio::test]
    async fn rejoining_a_tracked_group_reattempts_the_external_call() {
        let client = Arc::new(ScriptedClient::with_joins(vec![
            Ok(GroupHandle { group_id: "wa-77".to_owned(), name: None }),
            Ok(GroupHandle { group_id: "wa-77".to_owned(), name: None }),
        ]));
        let runtime = runtime(client.clone(), NoReplyPolicy);

        let request = JoinRequest::Invite {
            invite_code: "inv-9".to_owned(),
            name: None,
            description: None,
        };
        let first = runtime.handle_join(request.clone()).await.expect("first join");
        let second = runtime.handle_join(request).await.expect("second join");

        assert_eq!(client.joins().await.len(), 2);
        assert_eq!(first.joined_at, second.joined_at, "re-registration keeps joined_at");
        assert_eq!(runtime.state().snapshot().groups.len(), 1);
    }

    #[tokio::test]
    async fn direct_join_registers_without_external_call() {
        let client = Arc::new(ScriptedClient::default());
        let runtime = runtime(client.clone(), NoReplyPolicy);

        let group = runtime
            .handle_join(JoinRequest::Direct {
                group_id: "wa-known".to_owned(),
                name: None,
                description: None,
            })
            .await
            .expect("direct join");

        assert_eq!(group.name, "wa-known", "name defaults to the id");
        assert!(client.joins().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_webhook_and_manual_send_commit_whole_messages() {
        let client = Arc::new(ScriptedClient::default());
        let runtime = Arc::new(AgentRuntime::new(
            StateHandle::default(),
            client,
            Arc::new(StaticPolicy(Some("auto"))),
            "Nova",
            20,
        ));
        tracked(&runtime, "abc123");

        let webhook = {
            let runtime = runtime.clone();
            tokio::spawn(async move {
                for index in 0..10 {
                    runtime
                        .handle_webhook(&delivery("abc123", "15550001111", &format!("in-{index}")))
                        .await;
                }
            })
        };
        let manual = {
            let runtime = runtime.clone();
            tokio::spawn(async move {
                for index in 0..10 {
                    runtime
                        .handle_manual_send("abc123", &format!("out-{index}"))
                        .await
                        .expect("manual send");
                }
            })
        };

        webhook.await.expect("webhook task");
        manual.await.expect("manual task");

        let snapshot = runtime.state().snapshot();
        // 10 inbound + 10 auto-replies + 10 manual sends, each a whole message.
        assert_eq!(snapshot.messages.len(), 30);
        let mut ids = snapshot.messages.iter().map(|message| message.id).collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 30);
    }
}
