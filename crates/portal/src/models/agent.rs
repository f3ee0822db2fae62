//! Delivery agent profiles.

use chrono::{DateTime, Utc};
use serde::Serialize;

use courier_portal_core::{AgentId, Email, IdentityId, UserId};

/// A courier's local profile.
///
/// Agents are never deleted; `is_active = false` soft-disables them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agent {
    pub id: AgentId,
    /// Backing generic user row, when one exists.
    #[serde(skip_serializing)]
    pub user_id: Option<UserId>,
    /// Linked identity-provider account. Unique across agents.
    #[serde(skip_serializing)]
    pub identity_id: Option<IdentityId>,
    /// Unique across agents.
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub age: Option<i32>,
    pub address: Option<String>,
    pub vehicle_number: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Whether the agent is linked to exactly this identity.
    #[must_use]
    pub fn is_linked_to(&self, identity_id: &IdentityId) -> bool {
        self.identity_id.as_ref() == Some(identity_id)
    }

    /// Whether the agent is linked to some identity other than `identity_id`.
    #[must_use]
    pub fn is_claimed_by_other(&self, identity_id: &IdentityId) -> bool {
        self.identity_id
            .as_ref()
            .is_some_and(|linked| linked != identity_id)
    }
}

/// Values for inserting an agent row.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub user_id: Option<UserId>,
    pub identity_id: Option<IdentityId>,
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
}

/// A validated profile edit.
///
/// For the optional fields the outer `Option` says whether the field is
/// touched at all and the inner one whether it is set or cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<Option<String>>,
    pub age: Option<Option<i32>>,
    pub address: Option<Option<String>>,
    pub vehicle_number: Option<Option<String>>,
}

impl ProfileUpdate {
    /// True when the edit would not change anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.age.is_none()
            && self.address.is_none()
            && self.vehicle_number.is_none()
    }

    /// Apply the edit to an in-memory agent.
    pub fn apply_to(&self, agent: &mut Agent) {
        if let Some(name) = &self.name {
            agent.name.clone_from(name);
        }
        if let Some(phone) = &self.phone {
            agent.phone.clone_from(phone);
        }
        if let Some(age) = self.age {
            agent.age = age;
        }
        if let Some(address) = &self.address {
            agent.address.clone_from(address);
        }
        if let Some(vehicle) = &self.vehicle_number {
            agent.vehicle_number.clone_from(vehicle);
        }
    }
}

/// Per-agent delivery counters shown on the profile page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    /// Every order ever assigned to the agent.
    pub total_accepted: i64,
    /// Assigned orders now delivered.
    pub total_delivered: i64,
    /// Assigned orders in an active status.
    pub active_deliveries: i64,
    /// Orders the agent has dismissed.
    pub ignored_count: i64,
}
