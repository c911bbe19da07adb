pub mod order;
pub mod payment;

use std::fmt;

/// Payment status for database operations.
///
/// `Pending` is the only non-terminal state; every other status is
/// terminal and sticky. See [`PaymentStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "lowercase", type_name = "payment_status")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        self != PaymentStatus::Pending
    }

    /// The monotonic transition table: `pending` may move to any terminal
    /// status, terminal statuses may move nowhere. Self-transitions are
    /// not legal either; idempotent re-application is handled above the
    /// table, not inside it.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        self == PaymentStatus::Pending && next != PaymentStatus::Pending
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Payment method tag. Only Bakong KHQR is integrated today; the column
/// exists so further methods can be added without a schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "lowercase", type_name = "payment_method")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Bakong,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Bakong => f.write_str("bakong"),
        }
    }
}

/// Settlement currencies supported by the Bakong switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "UPPERCASE", type_name = "currency_code")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Khr,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => f.write_str("USD"),
            Currency::Khr => f.write_str("KHR"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "KHR" => Ok(Currency::Khr),
            _ => Err(UnknownCurrency(s.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown currency code: {0}")]
pub struct UnknownCurrency(pub String);

/// Logistics status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "lowercase", type_name = "order_status")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Completed,
}

/// Payment summary on the order row. Moves `unpaid -> paid -> refunded`
/// only; `paid` is set exactly once, by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "lowercase", type_name = "order_payment_status")]
#[serde(rename_all = "lowercase")]
pub enum OrderPaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_reaches_every_terminal_status() {
        for next in [
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Expired,
        ] {
            assert!(PaymentStatus::Pending.can_transition_to(next));
        }
    }

    #[test]
    fn terminal_statuses_are_sticky() {
        let terminals = [
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Expired,
        ];
        for from in terminals {
            assert!(from.is_terminal());
            for to in [
                PaymentStatus::Pending,
                PaymentStatus::Paid,
                PaymentStatus::Failed,
                PaymentStatus::Cancelled,
                PaymentStatus::Expired,
            ] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn pending_cannot_transition_to_itself() {
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn currency_round_trips_through_str() {
        assert_eq!("usd".parse::<Currency>().ok(), Some(Currency::Usd));
        assert_eq!("KHR".parse::<Currency>().ok(), Some(Currency::Khr));
        assert!("EUR".parse::<Currency>().is_err());
        assert_eq!(Currency::Usd.to_string(), "USD");
    }
}
