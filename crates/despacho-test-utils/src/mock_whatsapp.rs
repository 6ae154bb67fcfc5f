// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock WhatsApp client for deterministic testing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use despacho_core::{DespachoError, WhatsAppCredentials};
use despacho_whatsapp::{TemplateMessage, WhatsAppClient};

/// A WhatsApp client that records every message instead of sending it.
///
/// Message ids are `wamid.mock.<n>`. Errors queued with
/// [`fail_next`](Self::fail_next) are returned by the next sends, in order,
/// and those messages are not recorded.
pub struct MockWhatsAppClient {
    sent: Arc<Mutex<Vec<(String, TemplateMessage)>>>,
    failures: Arc<Mutex<VecDeque<DespachoError>>>,
    counter: AtomicU64,
}

impl MockWhatsAppClient {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            counter: AtomicU64::new(0),
        }
    }

    /// Make the next send fail with `error`.
    pub async fn fail_next(&self, error: DespachoError) {
        self.failures.lock().await.push_back(error);
    }

    /// Messages sent so far, oldest first.
    pub async fn sent(&self) -> Vec<TemplateMessage> {
        self.sent.lock().await.iter().map(|(_, m)| m.clone()).collect()
    }

    /// Phone number ids the messages were sent from.
    pub async fn senders(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(id, _)| id.clone()).collect()
    }
}

impl Default for MockWhatsAppClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WhatsAppClient for MockWhatsAppClient {
    async fn send_template(
        &self,
        credentials: &WhatsAppCredentials,
        message: &TemplateMessage,
    ) -> Result<String, DespachoError> {
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent
            .lock()
            .await
            .push((credentials.phone_number_id.clone(), message.clone()));
        Ok(format!("wamid.mock.{n}"))
    }
}
