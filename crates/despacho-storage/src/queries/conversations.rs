// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation persistence with optimistic state updates.

use chrono::{DateTime, Duration, Utc};
use despacho_core::DespachoError;
use despacho_core::conversation::{Conversation, StateUpdate};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::database::{Database, TxError};
use crate::models::{CONVERSATION_COLUMNS, conversation_from_row, truncate_millis, ts};

/// SQL predicate for states that still accept replies.
const NON_TERMINAL: &str = "current_state NOT IN ('COMPLETED', 'HANDOFF_TO_HUMAN')";

fn select_by_id(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
        params![id],
        conversation_from_row,
    )
    .optional()
}

/// Insert a conversation or revive the existing row for its phone and order.
///
/// Other active conversations of the same phone are expired in the same
/// transaction, so a phone has at most one active conversation.
pub async fn upsert(db: &Database, conversation: &Conversation) -> Result<Conversation, DespachoError> {
    let conv = conversation.clone();
    let metadata = serde_json::to_string(&conv.metadata).map_err(DespachoError::storage)?;
    db.write_tx(move |tx| {
        let now = ts(conv.updated_at);
        let expired = tx.execute(
            &format!(
                "UPDATE conversations SET expires_at = ?1
                 WHERE phone_number = ?2 AND order_number <> ?3
                   AND expires_at > ?1 AND {NON_TERMINAL}"
            ),
            params![now, conv.phone_number, conv.order_number],
        )?;
        if expired > 0 {
            tracing::debug!(
                phone = %conv.phone_number,
                expired,
                "expired superseded conversations"
            );
        }

        tx.execute(
            "INSERT INTO conversations (id, phone_number, order_number, business_id,
                 current_state, last_message_id, last_template_id, metadata,
                 created_at, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (phone_number, order_number) DO UPDATE SET
                 business_id = excluded.business_id,
                 current_state = excluded.current_state,
                 metadata = excluded.metadata,
                 updated_at = excluded.updated_at,
                 expires_at = excluded.expires_at",
            params![
                conv.id.to_string(),
                conv.phone_number,
                conv.order_number,
                conv.business_id,
                conv.current_state.to_string(),
                conv.last_message_id,
                conv.last_template_id,
                metadata,
                ts(conv.created_at),
                now,
                ts(conv.expires_at),
            ],
        )?;

        let stored = tx.query_row(
            &format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE phone_number = ?1 AND order_number = ?2"
            ),
            params![conv.phone_number, conv.order_number],
            conversation_from_row,
        )?;
        Ok::<_, TxError>(stored)
    })
    .await
}

/// Get a conversation by id.
pub async fn get(db: &Database, id: Uuid) -> Result<Option<Conversation>, DespachoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_by_id(conn, &id))
        .await
        .map_err(crate::database::map_tr_err)
}

/// The active conversation for a phone and order.
pub async fn find_active(
    db: &Database,
    phone_number: &str,
    order_number: &str,
    now: DateTime<Utc>,
) -> Result<Option<Conversation>, DespachoError> {
    let phone = phone_number.to_string();
    let order = order_number.to_string();
    let now = ts(now);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE phone_number = ?1 AND order_number = ?2
                       AND expires_at > ?3 AND {NON_TERMINAL}"
                ),
                params![phone, order, now],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recently updated non-terminal conversation of a phone, expired or not.
pub async fn find_open_by_phone(
    db: &Database,
    phone_number: &str,
) -> Result<Option<Conversation>, DespachoError> {
    let phone = phone_number.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE phone_number = ?1 AND {NON_TERMINAL}
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![phone],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a state change guarded by `expected_updated_at`.
///
/// The stored `updated_at` always moves forward, even when the clock has
/// not, so a second writer holding the old value always loses.
pub async fn update_state(db: &Database, update: &StateUpdate) -> Result<Conversation, DespachoError> {
    let id = update.conversation_id;
    let expected = truncate_millis(update.expected_updated_at);
    let mut updated_at = truncate_millis(update.updated_at);
    if updated_at <= expected {
        updated_at = expected + Duration::milliseconds(1);
    }
    let next_state = update.next_state.to_string();
    let expires_at = ts(update.expires_at);

    db.write_tx(move |tx| {
        let id_text = id.to_string();
        let changed = tx.execute(
            "UPDATE conversations SET current_state = ?1, updated_at = ?2, expires_at = ?3
             WHERE id = ?4 AND updated_at = ?5",
            params![next_state, ts(updated_at), expires_at, id_text, ts(expected)],
        )?;
        if changed == 0 {
            let exists = select_by_id(tx, &id_text)?.is_some();
            return Err(if exists {
                DespachoError::StaleConversation(id).into()
            } else {
                DespachoError::ConversationNotFound(id).into()
            });
        }
        select_by_id(tx, &id_text)?
            .ok_or_else(|| DespachoError::ConversationNotFound(id).into())
    })
    .await
}

/// Record the last outbound message. Does not touch `updated_at`.
pub async fn record_outbound(
    db: &Database,
    id: Uuid,
    message_id: &str,
    template_name: &str,
) -> Result<(), DespachoError> {
    let id_text = id.to_string();
    let message_id = message_id.to_string();
    let template = template_name.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET last_message_id = ?1, last_template_id = ?2 WHERE id = ?3",
                params![message_id, template, id_text],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(DespachoError::ConversationNotFound(id));
    }
    Ok(())
}

pub async fn count_active(db: &Database, now: DateTime<Utc>) -> Result<i64, DespachoError> {
    let now = ts(now);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM conversations WHERE expires_at > ?1 AND {NON_TERMINAL}"
                ),
                params![now],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Non-terminal conversations whose expiry fell in `(since, until]`.
pub async fn count_expired_between(
    db: &Database,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<i64, DespachoError> {
    let since = ts(since);
    let until = ts(until);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM conversations
                     WHERE expires_at > ?1 AND expires_at <= ?2 AND {NON_TERMINAL}"
                ),
                params![since, until],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use despacho_core::conversation::ConversationState;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn now() -> DateTime<Utc> {
        truncate_millis(Utc::now())
    }

    fn make_conversation(phone: &str, order: &str, at: DateTime<Utc>) -> Conversation {
        let mut conv = Conversation::new(
            phone,
            order,
            1,
            ConversationState::AwaitingConfirmation,
            at,
            Duration::hours(24),
        );
        conv.metadata
            .insert("numero_orden".into(), serde_json::json!(order));
        conv
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrips() {
        let (db, _dir) = setup_db().await;
        let conv = make_conversation("573001234567", "ORD-1", now());

        let stored = upsert(&db, &conv).await.unwrap();
        assert_eq!(stored, conv);

        let fetched = get(&db, conv.id).await.unwrap().unwrap();
        assert_eq!(fetched.metadata["numero_orden"], "ORD-1");
        assert!(get(&db, Uuid::new_v4()).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_same_order_revives_existing_row() {
        let (db, _dir) = setup_db().await;
        let t0 = now();
        let first = upsert(&db, &make_conversation("573001234567", "ORD-1", t0))
            .await
            .unwrap();

        let mut again = make_conversation("573001234567", "ORD-1", t0 + Duration::minutes(5));
        again.current_state = ConversationState::Start;
        let stored = upsert(&db, &again).await.unwrap();

        assert_eq!(stored.id, first.id);
        assert_eq!(stored.current_state, ConversationState::Start);
        assert_eq!(stored.updated_at, again.updated_at);
        assert_eq!(stored.created_at, first.created_at);
    }

    #[tokio::test]
    async fn upsert_expires_other_active_conversations_of_phone() {
        let (db, _dir) = setup_db().await;
        let t0 = now();
        let older = upsert(&db, &make_conversation("573001234567", "ORD-1", t0))
            .await
            .unwrap();
        let other_phone = upsert(&db, &make_conversation("573009999999", "ORD-9", t0))
            .await
            .unwrap();

        let t1 = t0 + Duration::seconds(1);
        upsert(&db, &make_conversation("573001234567", "ORD-2", t1))
            .await
            .unwrap();

        assert!(find_active(&db, "573001234567", "ORD-1", t1).await.unwrap().is_none());
        assert!(find_active(&db, "573001234567", "ORD-2", t1).await.unwrap().is_some());
        assert!(find_active(&db, "573009999999", "ORD-9", t1).await.unwrap().is_some());

        let older = get(&db, older.id).await.unwrap().unwrap();
        assert_eq!(older.expires_at, t1);
        assert_eq!(count_active(&db, t1).await.unwrap(), 2);
        assert_eq!(get(&db, other_phone.id).await.unwrap().unwrap().expires_at, other_phone.expires_at);
    }

    #[tokio::test]
    async fn find_open_by_phone_prefers_latest_and_includes_expired() {
        let (db, _dir) = setup_db().await;
        let t0 = now();
        let mut conv = make_conversation("573001234567", "ORD-1", t0);
        conv.expires_at = t0 + Duration::seconds(1);
        upsert(&db, &conv).await.unwrap();

        let open = find_open_by_phone(&db, "573001234567").await.unwrap().unwrap();
        assert_eq!(open.id, conv.id);
        assert!(open.is_expired(t0 + Duration::seconds(2)));
        assert!(find_open_by_phone(&db, "570000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_state_applies_once_then_reports_stale() {
        let (db, _dir) = setup_db().await;
        let t0 = now();
        let conv = upsert(&db, &make_conversation("573001234567", "ORD-1", t0))
            .await
            .unwrap();

        let update = StateUpdate {
            conversation_id: conv.id,
            expected_updated_at: conv.updated_at,
            next_state: ConversationState::Completed,
            // Same instant as the stored value: the write must still move forward.
            updated_at: conv.updated_at,
            expires_at: conv.expires_at,
        };
        let updated = update_state(&db, &update).await.unwrap();
        assert_eq!(updated.current_state, ConversationState::Completed);
        assert!(updated.updated_at > conv.updated_at);

        let loser = StateUpdate {
            next_state: ConversationState::AwaitingMenuSelection,
            ..update
        };
        let err = update_state(&db, &loser).await.unwrap_err();
        assert_eq!(err.code(), "STALE_CONVERSATION");

        let missing = StateUpdate {
            conversation_id: Uuid::new_v4(),
            ..loser
        };
        let err = update_state(&db, &missing).await.unwrap_err();
        assert_eq!(err.code(), "CONVERSATION_NOT_FOUND");
    }

    #[tokio::test]
    async fn concurrent_updates_have_exactly_one_winner() {
        let (db, _dir) = setup_db().await;
        let conv = upsert(&db, &make_conversation("573001234567", "ORD-1", now()))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for state in [ConversationState::Completed, ConversationState::AwaitingMenuSelection] {
            let db = db.clone();
            let update = StateUpdate {
                conversation_id: conv.id,
                expected_updated_at: conv.updated_at,
                next_state: state,
                updated_at: Utc::now(),
                expires_at: conv.expires_at,
            };
            handles.push(tokio::spawn(async move { update_state(&db, &update).await }));
        }
        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => assert_eq!(e.code(), "STALE_CONVERSATION"),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn record_outbound_keeps_updated_at() {
        let (db, _dir) = setup_db().await;
        let conv = upsert(&db, &make_conversation("573001234567", "ORD-1", now()))
            .await
            .unwrap();
        record_outbound(&db, conv.id, "wamid.1", "confirmacion_pedido")
            .await
            .unwrap();

        let stored = get(&db, conv.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message_id.as_deref(), Some("wamid.1"));
        assert_eq!(stored.last_template_id.as_deref(), Some("confirmacion_pedido"));
        assert_eq!(stored.updated_at, conv.updated_at);

        let err = record_outbound(&db, Uuid::new_v4(), "wamid.2", "x").await.unwrap_err();
        assert_eq!(err.code(), "CONVERSATION_NOT_FOUND");
    }

    #[tokio::test]
    async fn counts_expired_in_window() {
        let (db, _dir) = setup_db().await;
        let t0 = now();
        let mut conv = make_conversation("573001234567", "ORD-1", t0);
        conv.expires_at = t0 + Duration::seconds(30);
        upsert(&db, &conv).await.unwrap();

        assert_eq!(count_expired_between(&db, t0, t0 + Duration::minutes(1)).await.unwrap(), 1);
        assert_eq!(
            count_expired_between(&db, t0 + Duration::minutes(1), t0 + Duration::minutes(2))
                .await
                .unwrap(),
            0
        );
        assert_eq!(count_active(&db, t0 + Duration::minutes(1)).await.unwrap(), 0);
    }
}
