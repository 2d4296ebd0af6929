//! Conversation Store - authoritative in-process state for the agent
//!
//! This crate owns the four entity kinds the rest of the system reads and
//! writes: the persona singleton, joined groups, the append-only message log,
//! and connectivity status. Mutations go through [`store::StateHandle`], whose
//! methods each run inside a single critical section so readers never observe
//! a half-applied update.
//!
//! It also hosts application configuration ([`config::AppConfig`]) so every
//! crate shares one layered config story.

pub mod config;
pub mod domain;
pub mod errors;
pub mod store;

pub use domain::group::{Group, GroupId, GroupRegistration};
pub use domain::message::{Message, MessageId};
pub use domain::persona::{Persona, PersonaUpdate, Tone};
pub use domain::status::Status;
pub use domain::AgentState;
pub use errors::StoreError;
pub use store::StateHandle;
