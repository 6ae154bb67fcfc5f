// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API integration for despacho.
//!
//! This crate owns everything that knows the provider's wire formats: the
//! read-only template catalog, phone number cleaning, the outbound HTTP
//! client with transient-error retry, the inbound webhook payload model with
//! its signature check, and the platform alert notifier.

pub mod alert;
pub mod client;
pub mod phone;
pub mod templates;
pub mod types;
pub mod webhook;

pub use alert::AlertNotifier;
pub use client::{CloudApiClient, WhatsAppClient};
pub use phone::clean_phone;
pub use templates::TemplateDefinition;
pub use types::TemplateMessage;
pub use webhook::{WebhookPayload, WebhookSink, get_message_text, verify_signature};
