// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per aggregate.

pub mod catalog;
pub mod conversations;
pub mod ledger;
pub mod messages;
