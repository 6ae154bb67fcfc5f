// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events stream of the `inventory-events` channel.
//!
//! ```text
//! event: inventory.reserved
//! data: {"event_type":"inventory.reserved","order_id":"ORD-1",...}
//! ```

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub business_id: Option<i64>,
}

/// GET /v1/events/inventory?business_id=
pub async fn inventory_events(
    State(state): State<GatewayState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::debug!(business_id = ?query.business_id, "inventory event subscriber connected");
    let subscription = state.bus.subscribe(query.business_id);

    let events = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        let sse = Event::default()
            .event(event.event_type.clone())
            .json_data(&*event);
        Some((sse, subscription))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
