// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every despacho crate.
//!
//! Each variant belongs to exactly one [`ErrorKind`], and carries a stable
//! machine-readable [`code`](DespachoError::code) so HTTP handlers, broker
//! consumers and tests can branch on it without matching message text.

use strum::Display;
use thiserror::Error;
use uuid::Uuid;

use crate::conversation::ConversationState;

/// Broad grouping of [`DespachoError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    Input,
    State,
    NotFound,
    Resource,
    External,
    Signature,
    Transport,
    Config,
    Internal,
}

/// An error reported by the WhatsApp Cloud API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsAppApiError {
    /// Provider error code (`error.code`), when the body carried one.
    pub code: Option<i64>,
    /// Provider error subcode (`error.error_subcode`).
    pub subcode: Option<i64>,
    /// HTTP status of the failed response.
    pub http_status: u16,
    /// Human-readable message in Spanish, mapped from the known-code table.
    pub message: String,
    /// Raw provider message, kept for logs.
    pub provider_message: String,
}

/// The primary error type used across despacho.
#[derive(Debug, Error)]
pub enum DespachoError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("origin and destination warehouse are the same ({0})")]
    SameWarehouse(i64),

    #[error("template {template} is missing variable {position}")]
    MissingVariable { template: String, position: String },

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("no transition from {state} for input {input:?}")]
    InvalidTransition {
        state: ConversationState,
        input: String,
    },

    #[error("conversation {0} has expired")]
    ConversationExpired(Uuid),

    /// Another writer changed the conversation since it was read.
    #[error("conversation {0} was updated concurrently")]
    StaleConversation(Uuid),

    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("product not found: {0}")]
    ProductNotFound(i64),

    #[error("warehouse not found: {0}")]
    WarehouseNotFound(i64),

    #[error("movement type not found: {0}")]
    MovementTypeNotFound(String),

    #[error("business {0} has no default warehouse")]
    NoDefaultWarehouse(i64),

    #[error("product {0} does not track inventory")]
    ProductNoTracking(i64),

    #[error("no whatsapp credentials for business {0}")]
    CredentialsNotFound(i64),

    #[error(
        "insufficient stock for product {product_id} in warehouse {warehouse_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: i64,
        warehouse_id: i64,
        available: i64,
        requested: i64,
    },

    /// A transition would leave the ledger in a state its invariants forbid.
    #[error("ledger inconsistent for product {product_id} in warehouse {warehouse_id}: {detail}")]
    LedgerInconsistent {
        product_id: i64,
        warehouse_id: i64,
        detail: String,
    },

    #[error("whatsapp api error (http {}): {}", .0.http_status, .0.message)]
    WhatsApp(WhatsAppApiError),

    #[error("missing or malformed X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("webhook signature does not match")]
    InvalidSignature,

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Message broker errors (connection, channel, publish, consume).
    #[error("broker error: {message}")]
    Broker {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("cache error: {0}")]
    Cache(String),

    /// Outbound HTTP transport errors (connect, TLS, body decoding).
    #[error("http error: {message}")]
    Http {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    #[error("vault error: {0}")]
    Vault(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DespachoError {
    /// The group this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use DespachoError::*;
        match self {
            InvalidPhone(_)
            | InvalidQuantity(_)
            | SameWarehouse(_)
            | MissingVariable { .. }
            | TemplateNotFound(_) => ErrorKind::Input,
            InvalidTransition { .. } | ConversationExpired(_) | StaleConversation(_) => {
                ErrorKind::State
            }
            ConversationNotFound(_)
            | ProductNotFound(_)
            | WarehouseNotFound(_)
            | MovementTypeNotFound(_)
            | NoDefaultWarehouse(_)
            | ProductNoTracking(_)
            | CredentialsNotFound(_) => ErrorKind::NotFound,
            InsufficientStock { .. } | LedgerInconsistent { .. } => ErrorKind::Resource,
            WhatsApp(_) => ErrorKind::External,
            MissingSignature | InvalidSignature => ErrorKind::Signature,
            Storage { .. } | Broker { .. } | Cache(_) | Http { .. } | Timeout { .. } => {
                ErrorKind::Transport
            }
            Config(_) | Vault(_) => ErrorKind::Config,
            Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable upper-snake-case code for this error.
    pub fn code(&self) -> &'static str {
        use DespachoError::*;
        match self {
            Config(_) => "CONFIG",
            InvalidPhone(_) => "INVALID_PHONE",
            InvalidQuantity(_) => "INVALID_QUANTITY",
            SameWarehouse(_) => "SAME_WAREHOUSE",
            MissingVariable { .. } => "MISSING_VARIABLE",
            TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            InvalidTransition { .. } => "INVALID_TRANSITION",
            ConversationExpired(_) => "CONVERSATION_EXPIRED",
            StaleConversation(_) => "STALE_CONVERSATION",
            ConversationNotFound(_) => "CONVERSATION_NOT_FOUND",
            ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            WarehouseNotFound(_) => "WAREHOUSE_NOT_FOUND",
            MovementTypeNotFound(_) => "MOVEMENT_TYPE_NOT_FOUND",
            NoDefaultWarehouse(_) => "NO_DEFAULT_WAREHOUSE",
            ProductNoTracking(_) => "PRODUCT_NO_TRACKING",
            CredentialsNotFound(_) => "CREDENTIALS_NOT_FOUND",
            InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            LedgerInconsistent { .. } => "LEDGER_INCONSISTENT",
            WhatsApp(_) => "WHATSAPP_API",
            MissingSignature => "MISSING_SIGNATURE",
            InvalidSignature => "INVALID_SIGNATURE",
            Storage { .. } => "STORAGE",
            Broker { .. } => "BROKER",
            Cache(_) => "CACHE",
            Http { .. } => "HTTP",
            Timeout { .. } => "TIMEOUT",
            Vault(_) => "VAULT",
            Internal(_) => "INTERNAL",
        }
    }

    /// True for failures of infrastructure rather than of the request itself.
    ///
    /// Broker consumers requeue on transport errors and ack everything else.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        DespachoError::Storage {
            source: Box::new(e),
        }
    }

    pub fn broker(message: impl Into<String>) -> Self {
        DespachoError::Broker {
            message: message.into(),
            source: None,
        }
    }
}
