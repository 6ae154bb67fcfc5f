// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message log persistence and delivery status tracking.

use chrono::{DateTime, Utc};
use despacho_core::DespachoError;
use despacho_core::conversation::{MessageLog, MessageStatus};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::database::{Database, TxError};
use crate::models::{MESSAGE_LOG_COLUMNS, message_log_from_row, ts};

/// Insert a log. Returns `false` if the provider message id is already stored.
pub async fn insert(db: &Database, log: &MessageLog) -> Result<bool, DespachoError> {
    let log = log.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO message_logs (id, conversation_id, direction, message_id,
                     template_name, content, status, delivered_at, read_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    log.id.to_string(),
                    log.conversation_id.to_string(),
                    log.direction.to_string(),
                    log.message_id,
                    log.template_name,
                    log.content,
                    log.status.to_string(),
                    log.delivered_at.map(ts),
                    log.read_at.map(ts),
                    ts(log.created_at),
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move a log forward to `status`, stamping the matching timestamps.
///
/// Returns `false` for unknown ids and for regressions.
pub async fn update_status(
    db: &Database,
    message_id: &str,
    status: MessageStatus,
    at: DateTime<Utc>,
) -> Result<bool, DespachoError> {
    let message_id = message_id.to_string();
    db.write_tx(move |tx| {
        let current: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT status, delivered_at FROM message_logs WHERE message_id = ?1",
                params![message_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((current, delivered_at)) = current else {
            return Ok(false);
        };
        let current: MessageStatus = current
            .parse()
            .map_err(|e| DespachoError::Storage { source: Box::new(e) })?;
        if !current.can_advance_to(status) {
            return Ok(false);
        }

        let at = ts(at);
        let (delivered_at, read_at) = match status {
            MessageStatus::Delivered => (Some(at.clone()), None),
            MessageStatus::Read => (delivered_at.or_else(|| Some(at.clone())), Some(at)),
            MessageStatus::Sent | MessageStatus::Failed => (delivered_at, None),
        };
        tx.execute(
            "UPDATE message_logs
             SET status = ?1, delivered_at = ?2, read_at = COALESCE(?3, read_at)
             WHERE message_id = ?4",
            params![status.to_string(), delivered_at, read_at, message_id],
        )?;
        Ok::<_, TxError>(true)
    })
    .await
}

pub async fn get_by_message_id(
    db: &Database,
    message_id: &str,
) -> Result<Option<MessageLog>, DespachoError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_LOG_COLUMNS} FROM message_logs WHERE message_id = ?1"),
                params![message_id],
                message_log_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Logs of one conversation, oldest first.
pub async fn list_for_conversation(
    db: &Database,
    conversation_id: Uuid,
) -> Result<Vec<MessageLog>, DespachoError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_LOG_COLUMNS} FROM message_logs
                 WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![conversation_id], message_log_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
