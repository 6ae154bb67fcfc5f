// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Order confirmation conversations over WhatsApp.
//!
//! [`state_machine`] is the pure transition table, [`MessageSender`] sends
//! catalog templates and logs them, and [`ConversationEngine`] applies
//! webhook payloads to stored conversations.

pub mod engine;
pub mod sender;
pub mod state_machine;
pub mod sweeper;

pub use engine::{ConversationEngine, Handled, MessageOutcome};
pub use sender::{MessageSender, SendReceipt};
pub use state_machine::{BusinessEvent, Transition};
pub use sweeper::{ConversationSweeper, SweepReport};
