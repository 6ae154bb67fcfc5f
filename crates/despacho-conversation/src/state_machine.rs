// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure transition function of the order conversation.
//!
//! Button replies are matched by exact, case-sensitive equality against the
//! template's button label. The only free-text state is
//! `AWAITING_CANCEL_REASON`, where any non-empty text is the reason.

use despacho_core::DespachoError;
use despacho_core::conversation::ConversationState;
use despacho_whatsapp::templates::{self, TemplateDefinition};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use ConversationState::*;

/// Business event raised by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BusinessEvent {
    Confirmed,
    Cancelled,
    Novelty,
    Handoff,
}

/// The outcome of applying a user reply to a state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next_state: ConversationState,
    pub template_name: &'static str,
    /// Variable names of the template, in positional order.
    pub variables: &'static [&'static str],
    pub event_type: Option<BusinessEvent>,
    pub event_metadata: Map<String, Value>,
}

impl Transition {
    pub fn publish_event(&self) -> bool {
        self.event_type.is_some()
    }
}

/// One button edge of the table.
struct Edge {
    from: ConversationState,
    label: &'static str,
    to: ConversationState,
    template: &'static str,
    event: Option<(BusinessEvent, &'static str, &'static str)>,
}

const EDGES: &[Edge] = &[
    Edge {
        from: AwaitingConfirmation,
        label: "Confirmar pedido",
        to: Completed,
        template: templates::PEDIDO_CONFIRMADO,
        event: Some((BusinessEvent::Confirmed, "", "")),
    },
    Edge {
        from: AwaitingConfirmation,
        label: "No confirmar",
        to: AwaitingMenuSelection,
        template: templates::MENU_NO_CONFIRMACION,
        event: None,
    },
    Edge {
        from: AwaitingMenuSelection,
        label: "Presentar novedad",
        to: AwaitingNoveltyType,
        template: templates::TIPO_NOVEDAD,
        event: None,
    },
    Edge {
        from: AwaitingMenuSelection,
        label: "Cancelar pedido",
        to: AwaitingCancelConfirm,
        template: templates::CONFIRMAR_CANCELACION,
        event: None,
    },
    Edge {
        from: AwaitingMenuSelection,
        label: "Asesor",
        to: HandoffToHuman,
        template: templates::HANDOFF_ASESOR,
        event: Some((BusinessEvent::Handoff, "", "")),
    },
    Edge {
        from: AwaitingNoveltyType,
        label: "Cambio de dirección",
        to: Completed,
        template: templates::NOVEDAD_DIRECCION,
        event: Some((BusinessEvent::Novelty, "novelty_type", "change_address")),
    },
    Edge {
        from: AwaitingNoveltyType,
        label: "Cambio de productos",
        to: Completed,
        template: templates::NOVEDAD_PRODUCTOS,
        event: Some((BusinessEvent::Novelty, "novelty_type", "change_products")),
    },
    Edge {
        from: AwaitingNoveltyType,
        label: "Cambio medio de pago",
        to: Completed,
        template: templates::NOVEDAD_MEDIO_PAGO,
        event: Some((BusinessEvent::Novelty, "novelty_type", "change_payment")),
    },
    Edge {
        from: AwaitingCancelConfirm,
        label: "Sí, cancelar",
        to: AwaitingCancelReason,
        template: templates::MOTIVO_CANCELACION,
        event: None,
    },
    Edge {
        from: AwaitingCancelConfirm,
        label: "No, volver",
        to: AwaitingMenuSelection,
        template: templates::MENU_NO_CONFIRMACION,
        event: None,
    },
];

pub fn initial_state() -> ConversationState {
    AwaitingConfirmation
}

pub fn is_terminal(state: ConversationState) -> bool {
    state.is_terminal()
}

fn definition(name: &str) -> Result<&'static TemplateDefinition, DespachoError> {
    templates::get(name)
}

fn invalid(state: ConversationState, input: &str) -> DespachoError {
    DespachoError::InvalidTransition {
        state,
        input: input.to_string(),
    }
}

/// Compute the next step for `user_response` received in `state`.
pub fn transition(
    state: ConversationState,
    user_response: &str,
) -> Result<Transition, DespachoError> {
    if state == AwaitingCancelReason {
        if user_response.trim().is_empty() {
            return Err(invalid(state, user_response));
        }
        let mut metadata = Map::new();
        metadata.insert(
            "cancellation_reason".to_string(),
            Value::String(user_response.to_string()),
        );
        return Ok(Transition {
            next_state: Completed,
            template_name: templates::PEDIDO_CANCELADO,
            variables: definition(templates::PEDIDO_CANCELADO)?.variables,
            event_type: Some(BusinessEvent::Cancelled),
            event_metadata: metadata,
        });
    }

    let edge = EDGES
        .iter()
        .find(|e| e.from == state && e.label == user_response)
        .ok_or_else(|| invalid(state, user_response))?;

    let mut event_metadata = Map::new();
    let event_type = edge.event.map(|(event, key, value)| {
        if !key.is_empty() {
            event_metadata.insert(key.to_string(), Value::String(value.to_string()));
        }
        event
    });

    Ok(Transition {
        next_state: edge.to,
        template_name: edge.template,
        variables: definition(edge.template)?.variables,
        event_type,
        event_metadata,
    })
}

/// Whether `from -> to` is an edge of the conversation graph.
pub fn validate_transition(from: ConversationState, to: ConversationState) -> bool {
    (from == Start && to == AwaitingConfirmation)
        || (from == AwaitingCancelReason && to == Completed)
        || EDGES.iter().any(|e| e.from == from && e.to == to)
}
