//! Identity reconciliation.
//!
//! Maps an authenticated identity onto exactly one delivery agent, coping
//! with rows created through other paths: administrator pre-provisioning,
//! an earlier generic-user signup, or an earlier agent-only signup.
//!
//! Lookups run in a fixed order and the first match decides the branch:
//!
//! | # | Match                          | Action                                   |
//! |---|--------------------------------|------------------------------------------|
//! | 1 | agent linked to the identity   | role check, return unchanged             |
//! | 2 | user linked to the identity    | role check, find/link/create the agent   |
//! | 3 | user with the identity's email | role check, link user, then as in 2      |
//! | 4 | agent with the identity's email| link agent, best-effort user backfill    |
//! | 5 | nothing                        | create user, then find or create agent   |
//!
//! A returning identity (branch 1) performs reads only.
//!
//! Two first sign-ins for the same identity can race through branch 5. The
//! loser sees a uniqueness conflict; when the lookups now find rows linked
//! to this identity the run is repeated instead of reporting a conflict.

mod error;

pub use error::ReconcileError;

use courier_portal_core::UserRole;

use crate::db::{RepositoryError, Store};
use crate::models::{Agent, Identity, NewAgent, NewUser, User};

/// Runs allowed when a concurrent sign-in for the same identity interferes.
const MAX_ATTEMPTS: u32 = 3;

/// What a reconciliation run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// The identity was already linked; nothing was written.
    Returning,
    /// Existing rows were linked to the identity.
    Linked,
    /// A brand-new account was created.
    Created,
}

impl SyncKind {
    /// Message returned by the sync endpoint.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Returning => "User already synced",
            Self::Linked => "Account linked successfully",
            Self::Created => "Account created successfully",
        }
    }
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub agent: Agent,
    pub kind: SyncKind,
}

/// First matching row for an identity, in precedence order.
#[derive(Debug)]
enum Precedence {
    LinkedAgent(Agent),
    LinkedUser(User),
    UserByEmail(User),
    AgentByEmail(Agent),
    Unknown,
}

/// Identity reconciliation service.
pub struct IdentityReconciler<'a> {
    store: &'a dyn Store,
}

impl<'a> IdentityReconciler<'a> {
    /// Create a new reconciler over `store`.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Resolve (creating or linking as needed) the agent for `identity`.
    ///
    /// Idempotent: once an identity has been reconciled, later calls only
    /// read.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::RoleMismatch` if a linked or same-email user
    /// has a non-agent role.
    /// Returns `ReconcileError::EmailConflict` if the email is bound to a
    /// different identity.
    /// Returns `ReconcileError::Repository` for store failures.
    pub async fn reconcile(&self, identity: &Identity) -> Result<ReconcileOutcome, ReconcileError> {
        let mut attempt = 1;
        let outcome = loop {
            match self.reconcile_once(identity).await {
                Err(ReconcileError::EmailConflict) if attempt < MAX_ATTEMPTS => {
                    if !self.linked_meanwhile(identity).await? {
                        return Err(ReconcileError::EmailConflict);
                    }
                    tracing::debug!(
                        identity_id = %identity.id,
                        attempt,
                        "Concurrent sign-in linked this identity, retrying"
                    );
                    attempt += 1;
                }
                result => break result?,
            }
        };

        tracing::info!(
            identity_id = %identity.id,
            agent_id = %outcome.agent.id,
            kind = ?outcome.kind,
            "Identity reconciled"
        );

        Ok(outcome)
    }

    async fn reconcile_once(&self, identity: &Identity) -> Result<ReconcileOutcome, ReconcileError> {
        let outcome = match self.locate(identity).await? {
            Precedence::LinkedAgent(agent) => {
                self.check_linked_user(&agent).await?;
                ReconcileOutcome {
                    agent,
                    kind: SyncKind::Returning,
                }
            }
            Precedence::LinkedUser(user) => {
                ensure_agent_role(&user)?;
                ReconcileOutcome {
                    agent: self.attach_agent(&user, identity).await?,
                    kind: SyncKind::Linked,
                }
            }
            Precedence::UserByEmail(user) => {
                ensure_agent_role(&user)?;
                if user.identity_id.is_some() {
                    return Err(ReconcileError::EmailConflict);
                }
                let user = self
                    .store
                    .link_user_identity(user.id, &identity.id)
                    .await
                    .map_err(conflict_as_email)?;
                ReconcileOutcome {
                    agent: self.attach_agent(&user, identity).await?,
                    kind: SyncKind::Linked,
                }
            }
            Precedence::AgentByEmail(agent) => {
                if agent.is_claimed_by_other(&identity.id) {
                    return Err(ReconcileError::EmailConflict);
                }
                self.check_linked_user(&agent).await?;
                let agent = self
                    .store
                    .link_agent(agent.id, &identity.id, None)
                    .await
                    .map_err(conflict_as_email)?;
                ReconcileOutcome {
                    agent: self.backfill_user(agent, identity).await?,
                    kind: SyncKind::Linked,
                }
            }
            Precedence::Unknown => ReconcileOutcome {
                agent: self.create_account(identity).await?,
                kind: SyncKind::Created,
            },
        };

        Ok(outcome)
    }

    /// Whether rows linked to this identity exist now.
    async fn linked_meanwhile(&self, identity: &Identity) -> Result<bool, RepositoryError> {
        Ok(matches!(
            self.locate(identity).await?,
            Precedence::LinkedAgent(_) | Precedence::LinkedUser(_)
        ))
    }

    /// Resolve the agent for an already reconciled identity without writing.
    ///
    /// Used on every portal request.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::AgentNotFound` if no agent is linked,
    /// `ReconcileError::RoleMismatch` if the backing user has the wrong role
    /// and `ReconcileError::AgentInactive` for soft-disabled agents.
    pub async fn resolve_existing(&self, identity: &Identity) -> Result<Agent, ReconcileError> {
        let agent = self
            .store
            .agent_by_identity(&identity.id)
            .await?
            .ok_or(ReconcileError::AgentNotFound)?;

        self.check_linked_user(&agent).await?;

        if !agent.is_active {
            return Err(ReconcileError::AgentInactive);
        }

        Ok(agent)
    }

    async fn locate(&self, identity: &Identity) -> Result<Precedence, RepositoryError> {
        if let Some(agent) = self.store.agent_by_identity(&identity.id).await? {
            return Ok(Precedence::LinkedAgent(agent));
        }
        if let Some(user) = self.store.user_by_identity(&identity.id).await? {
            return Ok(Precedence::LinkedUser(user));
        }
        if let Some(user) = self.store.user_by_email(&identity.email).await? {
            return Ok(Precedence::UserByEmail(user));
        }
        if let Some(agent) = self.store.agent_by_email(&identity.email).await? {
            return Ok(Precedence::AgentByEmail(agent));
        }
        Ok(Precedence::Unknown)
    }

    /// Role check for the user row behind an agent, if there is one.
    async fn check_linked_user(&self, agent: &Agent) -> Result<(), ReconcileError> {
        let Some(user_id) = agent.user_id else {
            return Ok(());
        };
        match self.store.user_by_id(user_id).await? {
            Some(user) => ensure_agent_role(&user),
            None => Ok(()),
        }
    }

    /// Find, link or create the agent row for a delivery-agent user.
    async fn attach_agent(&self, user: &User, identity: &Identity) -> Result<Agent, ReconcileError> {
        if let Some(agent) = self.store.agent_by_user(user.id).await? {
            if agent.is_claimed_by_other(&identity.id) {
                return Err(ReconcileError::EmailConflict);
            }
            if agent.is_linked_to(&identity.id) {
                return Ok(agent);
            }
            return Ok(self.store.link_agent(agent.id, &identity.id, None).await?);
        }

        if let Some(agent) = self.store.agent_by_email(&identity.email).await? {
            let other_user = agent.user_id.is_some_and(|id| id != user.id);
            if agent.is_claimed_by_other(&identity.id) || other_user {
                return Err(ReconcileError::EmailConflict);
            }
            return Ok(self
                .store
                .link_agent(agent.id, &identity.id, Some(user.id))
                .await?);
        }

        let agent = self
            .store
            .insert_agent(&NewAgent {
                user_id: Some(user.id),
                identity_id: Some(identity.id.clone()),
                email: identity.email.clone(),
                name: user.name.clone().unwrap_or_else(|| identity.display_name()),
                phone: None,
            })
            .await
            .map_err(conflict_as_email)?;

        Ok(agent)
    }

    /// Create the user row missing behind a pre-provisioned agent.
    ///
    /// The agent is already usable, so every failure here is logged and
    /// swallowed.
    async fn backfill_user(&self, agent: Agent, identity: &Identity) -> Result<Agent, ReconcileError> {
        if agent.user_id.is_some() {
            return Ok(agent);
        }

        let new_user = NewUser {
            email: agent.email.clone(),
            name: Some(agent.name.clone()),
            role: UserRole::DeliveryAgent,
            identity_id: Some(identity.id.clone()),
            is_verified: true,
        };

        match self.store.insert_user(&new_user).await {
            Ok(user) => Ok(self
                .store
                .link_agent(agent.id, &identity.id, Some(user.id))
                .await?),
            Err(RepositoryError::Conflict(reason)) => {
                tracing::warn!(
                    agent_id = %agent.id,
                    reason = %reason,
                    "User row for pre-provisioned agent already exists"
                );
                Ok(agent)
            }
            Err(err) => {
                tracing::error!(
                    agent_id = %agent.id,
                    error = %err,
                    "Failed to create user row for pre-provisioned agent"
                );
                Ok(agent)
            }
        }
    }

    /// Brand-new identity: create the user, then pick up the agent the
    /// provisioning trigger made, or create it.
    async fn create_account(&self, identity: &Identity) -> Result<Agent, ReconcileError> {
        let name = identity.display_name();
        let user = self
            .store
            .insert_user(&NewUser {
                email: identity.email.clone(),
                name: Some(name.clone()),
                role: UserRole::DeliveryAgent,
                identity_id: Some(identity.id.clone()),
                is_verified: true,
            })
            .await
            .map_err(conflict_as_email)?;

        if let Some(agent) = self.store.agent_by_user(user.id).await? {
            if agent.is_linked_to(&identity.id) {
                return Ok(agent);
            }
            return Ok(self.store.link_agent(agent.id, &identity.id, None).await?);
        }

        let agent = self
            .store
            .insert_agent(&NewAgent {
                user_id: Some(user.id),
                identity_id: Some(identity.id.clone()),
                email: identity.email.clone(),
                name,
                phone: None,
            })
            .await
            .map_err(conflict_as_email)?;

        Ok(agent)
    }
}

fn ensure_agent_role(user: &User) -> Result<(), ReconcileError> {
    if user.is_delivery_agent() {
        Ok(())
    } else {
        Err(ReconcileError::RoleMismatch { role: user.role })
    }
}

/// Unique violations while linking mean another identity got there first.
fn conflict_as_email(err: RepositoryError) -> ReconcileError {
    match err {
        RepositoryError::Conflict(_) => ReconcileError::EmailConflict,
        other => ReconcileError::Repository(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use courier_portal_core::{Email, IdentityId};

    use super::*;
    use crate::db::InMemoryStore;

    fn identity(id: &str, email: &str) -> Identity {
        Identity {
            id: IdentityId::new(id),
            email: Email::parse(email).unwrap(),
            given_name: Some("Sam".to_owned()),
            family_name: Some("Rider".to_owned()),
            picture: None,
        }
    }

    #[tokio::test]
    async fn test_user_linked_to_other_identity_is_conflict() {
        let store = InMemoryStore::new();
        store
            .seed_user(&NewUser {
                email: Email::parse("sam@example.com").unwrap(),
                name: None,
                role: UserRole::DeliveryAgent,
                identity_id: Some(IdentityId::new("kp_other")),
                is_verified: true,
            })
            .unwrap();

        let err = IdentityReconciler::new(&store)
            .reconcile(&identity("kp_sam", "sam@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::EmailConflict));
    }

    #[tokio::test]
    async fn test_linked_user_gets_agent_created() {
        let store = InMemoryStore::new();
        let user = store
            .seed_user(&NewUser {
                email: Email::parse("sam@example.com").unwrap(),
                name: Some("Samira".to_owned()),
                role: UserRole::DeliveryAgent,
                identity_id: Some(IdentityId::new("kp_sam")),
                is_verified: true,
            })
            .unwrap();

        let outcome = IdentityReconciler::new(&store)
            .reconcile(&identity("kp_sam", "sam@example.com"))
            .await
            .unwrap();

        assert_eq!(outcome.kind, SyncKind::Linked);
        assert_eq!(outcome.agent.user_id, Some(user.id));
        assert_eq!(outcome.agent.name, "Samira");
        assert!(outcome.agent.is_linked_to(&IdentityId::new("kp_sam")));
    }

    #[tokio::test]
    async fn test_resolve_existing_rejects_unknown_and_inactive() {
        let store = InMemoryStore::new();
        let sam = identity("kp_sam", "sam@example.com");
        let reconciler = IdentityReconciler::new(&store);

        assert!(matches!(
            reconciler.resolve_existing(&sam).await,
            Err(ReconcileError::AgentNotFound)
        ));

        reconciler.reconcile(&sam).await.unwrap();
        assert!(reconciler.resolve_existing(&sam).await.is_ok());

        store.set_agent_active(&sam.email, false).await.unwrap();
        assert!(matches!(
            reconciler.resolve_existing(&sam).await,
            Err(ReconcileError::AgentInactive)
        ));
    }

    #[test]
    fn test_sync_messages() {
        assert_eq!(SyncKind::Returning.message(), "User already synced");
        assert_eq!(SyncKind::Linked.message(), "Account linked successfully");
        assert_eq!(SyncKind::Created.message(), "Account created successfully");
    }
}
