//! Agent Runtime - webhook ingestion and outbound orchestration
//!
//! This crate is the "brain" wiring of the system: it consumes decoded
//! webhook deliveries, reconciles them against the Conversation Store,
//! consults the reply policy, and drives the messaging client for outbound
//! sends. Manual dashboard actions (sends, joins) enter through the same
//! runtime so every trigger source sees one consistent view of state.
//!
//! # Architecture
//!
//! ```text
//! Webhook delivery → AgentRuntime → Conversation Store
//!                         ↓                ↑
//!                   ReplyPolicy      Messaging Client
//! ```
//!
//! # Key Types
//!
//! - `AgentRuntime` - the orchestrator (see `runtime` module)
//! - `JoinRequest` - tagged dry-run / invite / direct group registration
//! - `ReplyPolicy` - injected decision capability; the runtime never assumes
//!   how replies are produced
//!
//! # Safety Principle
//!
//! The store's critical sections are never held across an external call, so
//! a slow or failing Graph API request cannot block unrelated operations.

pub mod policy;
pub mod runtime;

pub use policy::{NoReplyPolicy, ReplyPolicy};
pub use runtime::{AgentRuntime, JoinRequest, RuntimeError};
