//! Status and role enums.
//!
//! Both are stored as TEXT columns guarded by CHECK constraints, so they
//! round-trip through [`as_str`](OrderStatus::as_str) and [`FromStr`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
///
/// ```text
/// pending / paid  ──accept──▶  accepted  ──dispatch──▶  out_for_delivery  ──complete──▶  delivered
///                              assigned  ───────────────────────┘
/// ```
///
/// Transitions only move forward. The single exception is the compensation
/// step of the accept protocol, which returns an `accepted` order to the
/// claimable status it came from when the assignment row cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted by the customer, not yet paid.
    Pending,
    /// Paid and waiting for a courier.
    Paid,
    /// Assigned to a courier by an operator.
    Assigned,
    /// Claimed by a courier through the portal.
    Accepted,
    /// Picked up and on the road.
    OutForDelivery,
    /// Handed over to the customer.
    Delivered,
}

impl OrderStatus {
    /// Statuses an agent may claim with an accept action.
    pub const CLAIMABLE: [Self; 2] = [Self::Pending, Self::Paid];

    /// Statuses that count as in-progress work for the assigned agent.
    pub const ACTIVE: [Self; 3] = [Self::Assigned, Self::Accepted, Self::OutForDelivery];

    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Paid,
        Self::Assigned,
        Self::Accepted,
        Self::OutForDelivery,
        Self::Delivered,
    ];

    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
        }
    }

    /// Whether a new accept action may claim an order in this status.
    #[must_use]
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }

    /// Whether the order is being worked on by its assigned agent.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Assigned | Self::Accepted | Self::OutForDelivery)
    }

    /// Position along the delivery chain.
    const fn stage(self) -> u8 {
        match self {
            Self::Pending | Self::Paid => 0,
            Self::Assigned | Self::Accepted => 1,
            Self::OutForDelivery => 2,
            Self::Delivered => 3,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    ///
    /// Compensation rollbacks bypass this check on purpose; they are not
    /// business transitions.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        next.stage() > self.stage()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Role of a generic user account.
///
/// User rows are shared with the other applications on the same database;
/// only [`UserRole::DeliveryAgent`] may enter the courier portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Shop customer.
    Customer,
    /// Pharmacy staff preparing orders.
    Pharmacist,
    /// Back-office operator.
    Admin,
    /// Courier; the only role admitted to this portal.
    DeliveryAgent,
}

impl UserRole {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Pharmacist => "pharmacist",
            Self::Admin => "admin",
            Self::DeliveryAgent => "delivery_agent",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "pharmacist" => Ok(Self::Pharmacist),
            "admin" => Ok(Self::Admin),
            "delivery_agent" => Ok(Self::DeliveryAgent),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("ACCEPTED_FOR_DELIVERY".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_claimable_and_active_sets_are_disjoint() {
        for status in OrderStatus::ALL {
            assert!(!(status.is_claimable() && status.is_active()), "{status}");
        }
        assert!(OrderStatus::CLAIMABLE.iter().all(|s| s.is_claimable()));
        assert!(OrderStatus::ACTIVE.iter().all(|s| s.is_active()));
        assert!(!OrderStatus::Delivered.is_claimable());
        assert!(!OrderStatus::Delivered.is_active());
    }

    #[test]
    fn test_transitions_only_move_forward() {
        assert!(OrderStatus::Paid.can_advance_to(OrderStatus::Accepted));
        assert!(OrderStatus::Accepted.can_advance_to(OrderStatus::OutForDelivery));
        assert!(OrderStatus::Accepted.can_advance_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Accepted.can_advance_to(OrderStatus::Paid));
        assert!(!OrderStatus::Accepted.can_advance_to(OrderStatus::Assigned));
        assert!(!OrderStatus::Delivered.can_advance_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
    }

    #[test]
    fn test_role_round_trip() {
        for role in [
            UserRole::Customer,
            UserRole::Pharmacist,
            UserRole::Admin,
            UserRole::DeliveryAgent,
        ] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("courier".parse::<UserRole>().is_err());
    }
}
