// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests across gateway, conversation engine, order consumer and
//! inventory ledger.
//!
//! Each test builds an isolated Harness over a temp SQLite database with a
//! mock WhatsApp client and recording publishers. Webhooks go through the
//! real router with a signed body; order events go through the same
//! delivery handler the AMQP consumer uses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use despacho_bus::EventBus;
use despacho_conversation::{ConversationEngine, MessageSender};
use despacho_core::conversation::{Conversation, ConversationState};
use despacho_core::inventory::{INSUFFICIENT_EVENT, Product, TransferRequest};
use despacho_core::{
    Adapter, ConversationStore, Delivery, DeliveryHandler, InventoryCache, MessageLogStore,
    StockLedger,
};
use despacho_gateway::{AuthConfig, GatewayState, HealthState, WebhookConfig, build_router};
use despacho_inventory::{
    CachedLedger, InventoryOrchestrator, InventoryReader, MemoryInventoryCache, OrderEventHandler,
};
use despacho_test_utils::{
    MockWhatsAppClient, RecordingConversationEvents, RecordingSyncPublisher, StaticCredentials,
    TestStorage,
};
use despacho_whatsapp::webhook::sign;
use despacho_whatsapp::{WebhookPayload, WebhookSink, clean_phone, templates};
use tokio::sync::Notify;
use tower::ServiceExt;

const BIZ: i64 = 1;
const APP_SECRET: &str = "e2e-app-secret";

/// Forwards to the engine and signals once a payload has been fully handled.
struct ObservedSink {
    engine: Arc<ConversationEngine>,
    processed: Arc<Notify>,
}

#[async_trait]
impl WebhookSink for ObservedSink {
    async fn process(&self, payload: WebhookPayload) {
        self.engine.process(payload).await;
        self.processed.notify_one();
    }
}

struct Harness {
    fixture: TestStorage,
    client: Arc<MockWhatsAppClient>,
    conversation_events: Arc<RecordingConversationEvents>,
    bus: Arc<EventBus>,
    orchestrator: Arc<InventoryOrchestrator>,
    orders: OrderEventHandler,
    processed: Arc<Notify>,
    router: axum::Router,
    warehouse: i64,
}

impl Harness {
    async fn new() -> Self {
        let fixture = TestStorage::new().await;
        let warehouse = fixture.warehouse(BIZ, "Principal", true).await.id;
        let credentials = Arc::new(
            StaticCredentials::for_business(BIZ).with_default_warehouse(BIZ, warehouse),
        );
        let client = Arc::new(MockWhatsAppClient::new());
        let conversation_events = Arc::new(RecordingConversationEvents::default());
        let bus = Arc::new(EventBus::default());

        let cache: Arc<dyn InventoryCache> = Arc::new(MemoryInventoryCache::default());
        let ledger = Arc::new(CachedLedger::new(fixture.storage.clone(), Some(cache.clone())));
        let orchestrator = Arc::new(
            InventoryOrchestrator::new(
                ledger.clone(),
                fixture.storage.clone(),
                credentials.clone(),
                Arc::new(RecordingSyncPublisher::default()),
                bus.clone(),
            )
            .with_sync_source("e2e"),
        );

        let ttl = chrono::Duration::hours(24);
        let sender = Arc::new(MessageSender::new(
            client.clone(),
            fixture.storage.clone(),
            fixture.storage.clone(),
            credentials,
            ttl,
        ));
        let engine = Arc::new(ConversationEngine::new(
            fixture.storage.clone(),
            fixture.storage.clone(),
            sender,
            conversation_events.clone(),
            ttl,
        ));
        let processed = Arc::new(Notify::new());

        let state = GatewayState {
            webhook: WebhookConfig {
                verify_token: Some("verify".into()),
                app_secret: Some(APP_SECRET.into()),
            },
            sink: Arc::new(ObservedSink {
                engine,
                processed: processed.clone(),
            }),
            reader: InventoryReader::new(ledger, Some(cache)),
            bus: bus.clone(),
            auth: AuthConfig {
                bearer_token: Some("api-token".into()),
            },
            health: HealthState {
                start_time: std::time::Instant::now(),
                prometheus_render: None,
                adapters: Arc::new(vec![fixture.storage.clone() as Arc<dyn Adapter>]),
            },
        };

        Self {
            orders: OrderEventHandler::new(orchestrator.clone()),
            router: build_router(state),
            fixture,
            client,
            conversation_events,
            bus,
            orchestrator,
            processed,
            warehouse,
        }
    }

    async fn conversation(
        &self,
        order: &str,
        state: ConversationState,
        started: chrono::DateTime<Utc>,
    ) -> Conversation {
        let phone = clean_phone("+573001234567").unwrap();
        let conversation =
            Conversation::new(phone, order, BIZ, state, started, chrono::Duration::hours(24));
        self.fixture.storage.upsert(&conversation).await.unwrap()
    }

    /// POST a signed webhook with one inbound message and wait for the
    /// detached processing to finish.
    async fn inbound(&self, message: serde_json::Value) -> StatusCode {
        let payload = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA-1",
                "changes": [{
                    "field": "messages",
                    "value": {"messaging_product": "whatsapp", "messages": [message]}
                }]
            }]
        });
        let body = serde_json::to_vec(&payload).unwrap();
        let signature = sign(APP_SECRET.as_bytes(), &body).unwrap();
        let request = Request::post("/webhooks/whatsapp")
            .header("content-type", "application/json")
            .header("X-Hub-Signature-256", signature)
            .body(Body::from(body))
            .unwrap();

        let status = self.router.clone().oneshot(request).await.unwrap().status();
        if status == StatusCode::OK {
            tokio::time::timeout(Duration::from_secs(5), self.processed.notified())
                .await
                .expect("webhook payload processed");
        }
        status
    }

    async fn order_event(
        &self,
        event_type: &str,
        order_id: &str,
        items: &[(&Product, i64)],
    ) -> Delivery {
        let payload = serde_json::json!({
            "event_type": event_type,
            "order_id": order_id,
            "business_id": BIZ,
            "items": items
                .iter()
                .map(|(p, q)| serde_json::json!({"product_id": p.id, "sku": p.sku, "quantity": q}))
                .collect::<Vec<_>>(),
        });
        self.orders
            .handle(event_type, &serde_json::to_vec(&payload).unwrap())
            .await
    }

    async fn counters(&self, product: &Product, warehouse: i64) -> (i64, i64, i64) {
        let level = self
            .fixture
            .storage
            .level(product.id, warehouse)
            .await
            .unwrap()
            .unwrap();
        (level.quantity, level.reserved_qty, level.available_qty)
    }
}

fn button(id: &str, label: &str) -> serde_json::Value {
    serde_json::json!({
        "from": "573001234567", "id": id, "type": "button",
        "button": {"text": label, "payload": label}
    })
}

fn text(id: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "from": "573001234567", "id": id, "type": "text", "text": {"body": body}
    })
}

// ---- Test 1: Confirm path ----

#[tokio::test]
async fn test_confirm_button_completes_conversation() {
    let h = Harness::new().await;
    let conversation = h
        .conversation("ORD-555", ConversationState::AwaitingConfirmation, Utc::now())
        .await;

    let status = h.inbound(button("wamid.E2E1", "Confirmar pedido")).await;
    assert_eq!(status, StatusCode::OK);

    let stored = h.fixture.storage.get(conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.current_state, ConversationState::Completed);

    let sent = h.client.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template.name, templates::PEDIDO_CONFIRMADO);
    assert_eq!(sent[0].to, "573001234567");

    let events = h.conversation_events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "confirmed");
    assert_eq!(events[0].order_number, "ORD-555");

    // Inbound and outbound are both logged against the conversation.
    let logs = h
        .fixture
        .storage
        .list_for_conversation(conversation.id)
        .await
        .unwrap();
    assert!(logs.len() >= 2);
}

// ---- Test 2: Partial reserve ----

#[tokio::test]
async fn test_order_created_reserves_partially() {
    let h = Harness::new().await;
    let product = h.fixture.product(BIZ, "Camiseta", "CAM-1").await;
    h.fixture.stock(&product, h.warehouse, 10).await;
    h.fixture.reserve(&product, h.warehouse, 8).await;
    assert_eq!(h.counters(&product, h.warehouse).await, (10, 8, 2));

    let mut subscription = h.bus.subscribe(Some(BIZ));
    let delivery = h.order_event("order.created", "ORD-1", &[(&product, 5)]).await;
    assert_eq!(delivery, Delivery::Ack);

    assert_eq!(h.counters(&product, h.warehouse).await, (10, 10, 0));

    let reserved = subscription.recv().await.unwrap();
    assert_eq!(reserved.event_type, "inventory.reserved");
    let item = &reserved.data.result.items[0];
    assert_eq!(item.processed, 2);
    assert!(!item.sufficient);
    assert!(!reserved.data.result.all_sufficient);

    let insufficient = subscription.recv().await.unwrap();
    assert_eq!(insufficient.event_type, INSUFFICIENT_EVENT);
    assert_eq!(insufficient.order_id, "ORD-1");
}

// ---- Test 3: Cancel with reason ----

#[tokio::test]
async fn test_cancel_reason_completes_conversation() {
    let h = Harness::new().await;
    let conversation = h
        .conversation("ORD-777", ConversationState::AwaitingCancelReason, Utc::now())
        .await;

    let status = h.inbound(text("wamid.E2E3", "No me llegó a tiempo")).await;
    assert_eq!(status, StatusCode::OK);

    let stored = h.fixture.storage.get(conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.current_state, ConversationState::Completed);

    let sent = h.client.sent().await;
    assert_eq!(sent[0].template.name, templates::PEDIDO_CANCELADO);

    let events = h.conversation_events.events().await;
    assert_eq!(events[0].event_type, "cancelled");
    assert_eq!(events[0].metadata["cancellation_reason"], "No me llegó a tiempo");
}

// ---- Test 4: Concurrent opposing transfers ----

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_preserve_total() {
    let h = Harness::new().await;
    let other = h.fixture.warehouse(BIZ, "Bodega Norte", false).await.id;
    let product = h.fixture.product(BIZ, "Gorra", "GOR-1").await;
    h.fixture.stock(&product, h.warehouse, 50).await;
    h.fixture.stock(&product, other, 50).await;

    let mut handles = Vec::new();
    for round in 0..10 {
        for (from, to) in [(h.warehouse, other), (other, h.warehouse)] {
            let orchestrator = h.orchestrator.clone();
            let request = TransferRequest {
                product_id: product.id,
                business_id: BIZ,
                from_warehouse_id: from,
                to_warehouse_id: to,
                quantity: 1 + round % 3,
                reason: Some("rebalance".into()),
            };
            handles.push(tokio::spawn(async move {
                orchestrator.transfer_stock(&request).await
            }));
        }
    }

    let all = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(handles))
        .await
        .expect("transfers must not deadlock");
    for result in all {
        result.unwrap().unwrap();
    }

    let (qa, ra, aa) = h.counters(&product, h.warehouse).await;
    let (qb, rb, ab) = h.counters(&product, other).await;
    assert_eq!(qa + qb, 100);
    assert_eq!((ra, rb), (0, 0));
    assert_eq!((aa, ab), (qa, qb));
}

// ---- Test 5: Confirm after partial reserve ----

#[tokio::test]
async fn test_paid_after_partial_reserve_clears_reservation() {
    let h = Harness::new().await;
    let product = h.fixture.product(BIZ, "Bolso", "BOL-1").await;
    h.fixture.stock(&product, h.warehouse, 10).await;
    h.fixture.reserve(&product, h.warehouse, 8).await;

    h.order_event("order.created", "ORD-5", &[(&product, 5)]).await;
    assert_eq!(h.counters(&product, h.warehouse).await, (10, 10, 0));

    // The earlier order is cancelled, leaving only our 2 reserved units.
    let delivery = h
        .order_event("order.cancelled", "ORD-EARLIER", &[(&product, 8)])
        .await;
    assert_eq!(delivery, Delivery::Ack);
    assert_eq!(h.counters(&product, h.warehouse).await, (10, 2, 8));

    let delivery = h.order_event("order.paid", "ORD-5", &[(&product, 5)]).await;
    assert_eq!(delivery, Delivery::Ack);

    // quantity -= 5, reserved = max(2 - 5, 0), available = quantity
    assert_eq!(h.counters(&product, h.warehouse).await, (5, 0, 5));
}

// ---- Test 6: Expired conversation ----

#[tokio::test]
async fn test_expired_conversation_is_not_advanced() {
    let h = Harness::new().await;
    let conversation = h
        .conversation(
            "ORD-999",
            ConversationState::AwaitingConfirmation,
            Utc::now() - chrono::Duration::hours(25),
        )
        .await;

    let status = h.inbound(button("wamid.E2E6", "Confirmar pedido")).await;
    assert_eq!(status, StatusCode::OK);

    let stored = h.fixture.storage.get(conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.current_state, ConversationState::AwaitingConfirmation);
    assert!(h.client.sent().await.is_empty());
    assert!(h.conversation_events.events().await.is_empty());
    assert!(
        h.fixture
            .storage
            .list_for_conversation(conversation.id)
            .await
            .unwrap()
            .is_empty()
    );
}

// ---- Test 7: Inventory read API through the cache ----

#[tokio::test]
async fn test_inventory_api_reflects_reservations() {
    let h = Harness::new().await;
    let product = h.fixture.product(BIZ, "Camiseta", "CAM-2").await;
    h.fixture.stock(&product, h.warehouse, 10).await;

    let read = |router: axum::Router, product_id: i64| async move {
        let request = Request::get(format!(
            "/v1/inventory/products/{product_id}?business_id={BIZ}"
        ))
        .header("authorization", "Bearer api-token")
        .body(Body::empty())
        .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice::<serde_json::Value>(&bytes).unwrap()
    };

    let before = read(h.router.clone(), product.id).await;
    assert_eq!(before["available_qty"], 10);
    // Let the read-through fill land before the next write.
    tokio::task::yield_now().await;

    h.order_event("order.created", "ORD-7", &[(&product, 4)]).await;

    // The committed reserve invalidated the cached levels.
    let after = read(h.router.clone(), product.id).await;
    assert_eq!(after["reserved_qty"], 4);
    assert_eq!(after["available_qty"], 6);
}
