//! WhatsApp Integration - Graph API client and webhook decoding
//!
//! This crate is the only place that knows the WhatsApp wire formats:
//! - **Client** (`client`) - the [`client::MessagingClient`] seam the runtime
//!   sends through, its [`client::ApiError`] taxonomy, and the
//!   [`client::GraphApiClient`] adapter over the Graph API
//! - **Webhook** (`webhook`) - delivery payload types, normalization into
//!   plain inbound texts, and the `GET` subscription handshake check
//!
//! # Getting Started
//!
//! 1. Create a Meta app with the WhatsApp product attached
//! 2. Point the webhook at `/api/webhook` and pick a verify token
//! 3. Set `NOVA_WHATSAPP_ACCESS_TOKEN`, `NOVA_WHATSAPP_PHONE_NUMBER_ID`,
//!    `NOVA_WHATSAPP_VERIFY_TOKEN`
//!
//! The client owns timeout bounding and error translation; it never retries.
//! Duplicate calls may duplicate delivery, so callers decide retry policy.

pub mod client;
pub mod webhook;
