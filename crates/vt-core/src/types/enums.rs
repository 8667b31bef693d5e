//! Enumerations shared by the aggregation, ledger and matching layers.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Instrument kinds
// ---------------------------------------------------------------------------

/// Instrument category. Decides whether gains are scaled by a contract
/// multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    #[default]
    Spot,
    Future,
    Option,
}

impl InstrumentKind {
    /// Derivatives settle through a contract multiplier, spot does not.
    pub fn is_derivative(self) -> bool {
        matches!(self, Self::Future | Self::Option)
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Future => write!(f, "future"),
            Self::Option => write!(f, "option"),
        }
    }
}

// ---------------------------------------------------------------------------
// Order / trading enums
// ---------------------------------------------------------------------------

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// `+1.0` for buy, `-1.0` for sell.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    /// Everything except market orders rests in the pending map.
    pub fn is_resting(self) -> bool {
        !matches!(self, Self::Market)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::Stop => write!(f, "STOP"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Order status.
///
/// Moves forward only: `Pending → (Partitioned →)* Filled` or
/// `Pending → Canceled`. `None` is the state of a request that has not been
/// accepted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    None,
    Pending,
    Partitioned,
    Filled,
    Canceled,
}

impl OrderStatus {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (None, Pending)
                | (None, Filled)
                | (Pending, Partitioned)
                | (Pending, Filled)
                | (Pending, Canceled)
                | (Partitioned, Partitioned)
                | (Partitioned, Filled)
        )
    }
}

/// Distinguishes how a leg of a submission is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Instruction {
    /// A plain executable leg.
    #[default]
    Side,
    /// A bracket leg (stop-loss / take-profit) tied to its parent's descriptor.
    Brace,
    /// A container whose children are executed as independent legs.
    Group,
}

/// Gateway connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    /// A tick source failed; the engine state is intact but the feed stopped.
    Faulted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_moves_forward_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Filled));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Partitioned));
        assert!(OrderStatus::Partitioned.can_transition_to(OrderStatus::Filled));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Filled.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Filled));
        assert!(!OrderStatus::Partitioned.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn side_sign_and_opposite() {
        assert_eq!(Side::Buy.sign(), 1.0);
        assert_eq!(Side::Sell.sign(), -1.0);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn order_type_serde_names() {
        let t: OrderType = serde_json::from_str("\"stop-limit\"").unwrap();
        assert_eq!(t, OrderType::StopLimit);
        assert!(t.is_resting());
        assert!(!OrderType::Market.is_resting());
    }
}
