use std::{fmt::Display, str::FromStr};

use bpg_common::Money;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

//--------------------------------------      OrderStatus      -------------------------------------------------------
/// The lifecycle state of an order. Orders are created `Pending` by the checkout-initiation flow and are only ever
/// advanced by gateway events; transitions are additive writes and records are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created at checkout initiation; no gateway outcome yet.
    Pending,
    /// The payment completed and the order's items are settled.
    Paid,
    /// The checkout session expired before payment.
    Cancelled,
    /// The payment attempt failed.
    Failed,
    /// The customer opened a chargeback dispute against the payment.
    Disputed,
    /// The payment was refunded.
    Refunded,
    /// Delivery completed (set by the fulfilment flow, outside this core).
    Completed,
}

impl OrderStatus {
    /// The legal state machine. Redelivered or out-of-order gateway events must never move an order along an edge
    /// that is not listed here; in particular no terminal state ever regresses.
    pub fn can_transition_to(self, new_status: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Pending => matches!(new_status, Paid | Cancelled | Failed),
            Paid => matches!(new_status, Disputed | Refunded | Completed),
            Disputed => matches!(new_status, Refunded),
            Cancelled | Failed | Refunded | Completed => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Failed | OrderStatus::Refunded | OrderStatus::Completed)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Paid => "Paid",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Failed => "Failed",
            OrderStatus::Disputed => "Disputed",
            OrderStatus::Refunded => "Refunded",
            OrderStatus::Completed => "Completed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Cancelled" => Ok(Self::Cancelled),
            "Failed" => Ok(Self::Failed),
            "Disputed" => Ok(Self::Disputed),
            "Refunded" => Ok(Self::Refunded),
            "Completed" => Ok(Self::Completed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatus::Pending
        })
    }
}

//--------------------------------------      LicenseType      -------------------------------------------------------
/// The usage-rights tier purchased for a beat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LicenseType {
    /// The base lease.
    #[default]
    Basic,
    /// Stems-included lease.
    Premium,
    /// Unlimited lease.
    Unlimited,
}

impl LicenseType {
    /// The usage rights granted by this tier. These are denormalised onto the order at payment time so that the
    /// rights a customer bought are frozen even if the tier definitions change later.
    pub fn usage_rights(self) -> Vec<String> {
        let rights: &[&str] = match self {
            LicenseType::Basic => &["mp3_download", "streams_100k", "non_profit_performances"],
            LicenseType::Premium => &["mp3_download", "wav_download", "track_stems", "streams_500k", "paid_performances"],
            LicenseType::Unlimited => &[
                "mp3_download",
                "wav_download",
                "track_stems",
                "unlimited_streams",
                "paid_performances",
                "radio_broadcasting",
            ],
        };
        rights.iter().map(|s| s.to_string()).collect()
    }
}

impl Display for LicenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LicenseType::Basic => write!(f, "Basic"),
            LicenseType::Premium => write!(f, "Premium"),
            LicenseType::Unlimited => write!(f, "Unlimited"),
        }
    }
}

impl FromStr for LicenseType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "unlimited" => Ok(Self::Unlimited),
            s => Err(ConversionError(format!("Invalid license type: {s}"))),
        }
    }
}

impl From<String> for LicenseType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid license type: {value}. But this conversion cannot fail. Defaulting to Basic");
            LicenseType::Basic
        })
    }
}

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------         Order         -------------------------------------------------------
/// A single-item order: one beat, one license tier.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub total_amount: Money,
    pub currency: String,
    pub payment_method: Option<String>,
    /// The gateway's checkout session reference.
    pub payment_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub license_type: LicenseType,
    pub usage_rights: Json<Vec<String>>,
    pub beat_id: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub dispute_id: Option<String>,
    pub dispute_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<Money>,
}

//--------------------------------------     MultiItemOrder    -------------------------------------------------------
/// A cart purchase covering several beats. The item collection lives in its own table and is always replaced as a
/// whole during reconciliation, never appended to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MultiItemOrder {
    pub id: OrderId,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub total_amount: Money,
    pub currency: String,
    pub payment_method: Option<String>,
    /// The gateway's checkout session reference.
    pub session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub status: OrderStatus,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_code: Option<String>,
    pub failure_reason: Option<String>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub dispute_id: Option<String>,
    pub dispute_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<Money>,
}

impl MultiItemOrder {
    /// The invariant the reconciler maintains: the stored total always equals the sum over surviving items.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|i| i.total_price).sum()
    }
}

//--------------------------------------       OrderItem       -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub beat_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub license_type: LicenseType,
}

/// A not-yet-persisted order item produced by the line-item reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub beat_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub license_type: LicenseType,
}

//--------------------------------------         Beat          -------------------------------------------------------
/// Read-only catalog reference. Owned by the catalog collaborator; this core never mutates it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Beat {
    pub id: String,
    pub title: String,
    pub price_basic: Money,
    pub price_premium: Money,
    pub price_unlimited: Money,
}

impl Beat {
    pub fn price_for(&self, license: LicenseType) -> Money {
        match license {
            LicenseType::Basic => self.price_basic,
            LicenseType::Premium => self.price_premium,
            LicenseType::Unlimited => self.price_unlimited,
        }
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------
/// Payload for synthesizing a brand-new order directly from a gateway session snapshot. Used as the safety net when
/// a completion event arrives for which no pending record can be found.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub total_amount: Money,
    pub currency: String,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub license_type: LicenseType,
    pub beat_id: String,
    pub status: OrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pending_orders_can_fail_cancel_or_pay() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Pending.can_transition_to(Disputed));
    }

    #[test]
    fn paid_orders_can_be_disputed_refunded_or_completed() {
        use OrderStatus::*;
        assert!(Paid.can_transition_to(Disputed));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Paid.can_transition_to(Completed));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Paid.can_transition_to(Cancelled));
    }

    #[test]
    fn disputed_orders_only_advance_to_refunded() {
        use OrderStatus::*;
        assert!(Disputed.can_transition_to(Refunded));
        // Dispute-won (Disputed -> Paid) is deliberately not a legal edge.
        assert!(!Disputed.can_transition_to(Paid));
        assert!(!Disputed.can_transition_to(Completed));
    }

    #[test]
    fn terminal_states_never_regress() {
        use OrderStatus::*;
        for terminal in [Cancelled, Failed, Refunded, Completed] {
            assert!(terminal.is_terminal());
            for target in [Pending, Paid, Cancelled, Failed, Disputed, Refunded, Completed] {
                assert!(!terminal.can_transition_to(target), "{terminal} -> {target} must be illegal");
            }
        }
    }

    #[test]
    fn license_parsing_is_case_insensitive_with_basic_fallback() {
        assert_eq!("premium".parse::<LicenseType>().unwrap(), LicenseType::Premium);
        assert_eq!("UNLIMITED".parse::<LicenseType>().unwrap(), LicenseType::Unlimited);
        assert!("gold".parse::<LicenseType>().is_err());
        assert_eq!(LicenseType::from("gold".to_string()), LicenseType::Basic);
    }

    #[test]
    fn premium_rights_include_stems() {
        assert!(LicenseType::Premium.usage_rights().contains(&"track_stems".to_string()));
        assert!(!LicenseType::Basic.usage_rights().contains(&"track_stems".to_string()));
    }
}
