// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade, so calls are no-ops until a recorder is
//! installed.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all despacho metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "despacho_template_sends_total",
        "WhatsApp template sends by template and outcome"
    );
    describe_histogram!(
        "despacho_template_send_seconds",
        "WhatsApp send latency in seconds, retries included"
    );
    describe_counter!(
        "despacho_webhook_messages_total",
        "Webhook items processed by kind"
    );
    describe_counter!(
        "despacho_ledger_operations_total",
        "Stock ledger operations by operation and outcome"
    );
    describe_counter!(
        "despacho_broker_deliveries_total",
        "Broker deliveries by consumer and disposition"
    );
    describe_gauge!(
        "despacho_active_conversations",
        "Conversations neither expired nor terminal"
    );
    describe_counter!(
        "despacho_expired_conversations_total",
        "Conversations that expired before reaching a terminal state"
    );
}

/// Record one template send. `outcome` is `sent` or `error`.
pub fn record_template_send(template: &str, outcome: &str) {
    metrics::counter!(
        "despacho_template_sends_total",
        "template" => template.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_send_latency(seconds: f64) {
    metrics::histogram!("despacho_template_send_seconds").record(seconds);
}

/// Count a webhook event by kind: payload outcomes (`received`, `rejected`,
/// `malformed`) and processed items (`message`, `status`, `ignored`).
pub fn record_webhook_message(kind: &str) {
    metrics::counter!("despacho_webhook_messages_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_ledger_operation(operation: &str, outcome: &str) {
    metrics::counter!(
        "despacho_ledger_operations_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record how a consumer settled a delivery: `ack`, `requeue`, or `reject`.
pub fn record_broker_delivery(consumer: &str, outcome: &str) {
    metrics::counter!(
        "despacho_broker_deliveries_total",
        "consumer" => consumer.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn set_active_conversations(count: f64) {
    metrics::gauge!("despacho_active_conversations").set(count);
}

pub fn record_expired_conversations(count: u64) {
    metrics::counter!("despacho_expired_conversations_total").increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn helpers_render_with_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            record_template_send("pedido_confirmado", "sent");
            record_template_send("pedido_confirmado", "sent");
            record_ledger_operation("reserve", "ok");
            record_broker_delivery("orders", "requeue");
            set_active_conversations(4.0);
            record_expired_conversations(3);
        });

        let text = handle.render();
        assert!(text.contains(
            r#"despacho_template_sends_total{template="pedido_confirmado",outcome="sent"} 2"#
        ));
        assert!(text.contains(r#"despacho_ledger_operations_total{operation="reserve",outcome="ok"} 1"#));
        assert!(text.contains(r#"despacho_broker_deliveries_total{consumer="orders",outcome="requeue"} 1"#));
        assert!(text.contains("despacho_active_conversations 4"));
        assert!(text.contains("despacho_expired_conversations_total 3"));
    }

    #[test]
    fn helpers_without_recorder_are_noops() {
        record_webhook_message("status");
        record_send_latency(0.25);
    }
}
