// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for despacho integration tests.
//!
//! Provides recording fakes for every outbound seam and a temp-file SQLite
//! fixture, so tests run without a provider, broker, or vault.
//!
//! # Components
//!
//! - [`MockWhatsAppClient`] - captures template messages, with injectable failures
//! - [`RecordingSyncPublisher`], [`RecordingInventoryEvents`],
//!   [`RecordingConversationEvents`] - capture published events
//! - [`StaticCredentials`] - in-memory credential store
//! - [`FailingMessageLogs`] - message log store with injectable status failures
//! - [`TestStorage`] - migrated SQLite database in a temp directory

pub mod failing_logs;
pub mod fixtures;
pub mod mock_whatsapp;
pub mod recording;

pub use failing_logs::FailingMessageLogs;
pub use fixtures::{StaticCredentials, TestStorage};
pub use mock_whatsapp::MockWhatsAppClient;
pub use recording::{RecordingConversationEvents, RecordingInventoryEvents, RecordingSyncPublisher};
