// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for despacho.
//!
//! Public routes serve health, metrics and the WhatsApp webhook; `/v1`
//! routes sit behind bearer auth and expose inventory reads and the
//! `inventory-events` SSE stream.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod sse;
pub mod webhook;

pub use auth::AuthConfig;
pub use server::{GatewayState, HealthState, ServerConfig, build_router, start_server};
pub use webhook::WebhookConfig;
