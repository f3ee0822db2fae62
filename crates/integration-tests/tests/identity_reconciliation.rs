//! Identity reconciliation tests: first sign-in, linking to pre-existing
//! rows, idempotency and the role and email guards.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use courier_portal::db::{InMemoryStore, Store};
use courier_portal::models::{NewAgent, NewUser, User};
use courier_portal::services::{IdentityReconciler, ReconcileError, SyncKind};
use courier_portal_core::{Email, IdentityId, UserRole};
use courier_portal_integration_tests::identity;

fn user(store: &InMemoryStore, email: &str, role: UserRole, identity_id: Option<&str>) -> User {
    store
        .seed_user(&NewUser {
            email: Email::parse(email).unwrap(),
            name: Some("Existing Account".to_owned()),
            role,
            identity_id: identity_id.map(IdentityId::new),
            is_verified: true,
        })
        .unwrap()
}

async fn agent_exists(store: &InMemoryStore, email: &str) -> bool {
    store
        .agent_by_email(&Email::parse(email).unwrap())
        .await
        .unwrap()
        .is_some()
}

#[tokio::test]
async fn test_new_identity_creates_user_and_agent() {
    for store in [InMemoryStore::new(), InMemoryStore::with_agent_provisioning()] {
        let me = identity("idp|new", "new.rider@example.com");

        let outcome = IdentityReconciler::new(&store).reconcile(&me).await.unwrap();
        assert_eq!(outcome.kind, SyncKind::Created);
        assert_eq!(outcome.agent.identity_id, Some(me.id.clone()));
        assert_eq!(outcome.agent.name, "Test Rider");
        assert!(outcome.agent.is_active);

        let user = store.user_by_identity(&me.id).await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::DeliveryAgent);
        assert_eq!(outcome.agent.user_id, Some(user.id));
        assert!(agent_exists(&store, "new.rider@example.com").await);
    }
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let store = InMemoryStore::with_agent_provisioning();
    let me = identity("idp|repeat", "repeat@example.com");
    let reconciler = IdentityReconciler::new(&store);

    let first = reconciler.reconcile(&me).await.unwrap();
    let writes = store.write_count();

    let second = reconciler.reconcile(&me).await.unwrap();
    assert_eq!(second.kind, SyncKind::Returning);
    assert_eq!(second.agent.id, first.agent.id);
    assert_eq!(store.write_count(), writes);

    let resolved = reconciler.resolve_existing(&me).await.unwrap();
    assert_eq!(resolved.id, first.agent.id);
    assert_eq!(store.write_count(), writes);
}

#[tokio::test]
async fn test_pre_provisioned_agent_is_linked() {
    for store in [InMemoryStore::new(), InMemoryStore::with_agent_provisioning()] {
        let provisioned = store
            .insert_agent(&NewAgent {
                user_id: None,
                identity_id: None,
                email: Email::parse("hired@example.com").unwrap(),
                name: "Hired Rider".to_owned(),
                phone: Some("+44 20 7946 0000".to_owned()),
            })
            .await
            .unwrap();
        let me = identity("idp|hired", "hired@example.com");

        let outcome = IdentityReconciler::new(&store).reconcile(&me).await.unwrap();
        assert_eq!(outcome.kind, SyncKind::Linked);
        assert_eq!(outcome.agent.id, provisioned.id);
        assert_eq!(outcome.agent.identity_id, Some(me.id.clone()));
        assert_eq!(outcome.agent.phone.as_deref(), Some("+44 20 7946 0000"));

        let user = store.user_by_identity(&me.id).await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::DeliveryAgent);
        assert_eq!(outcome.agent.user_id, Some(user.id));
    }
}

#[tokio::test]
async fn test_existing_agent_user_gets_linked() {
    let store = InMemoryStore::new();
    let existing = user(&store, "staff@example.com", UserRole::DeliveryAgent, None);
    let me = identity("idp|staff", "staff@example.com");

    let outcome = IdentityReconciler::new(&store).reconcile(&me).await.unwrap();
    assert_eq!(outcome.kind, SyncKind::Linked);
    assert_eq!(outcome.agent.user_id, Some(existing.id));
    assert_eq!(outcome.agent.name, "Existing Account");

    let linked = store.user_by_id(existing.id).await.unwrap().unwrap();
    assert_eq!(linked.identity_id, Some(me.id));
}

#[tokio::test]
async fn test_wrong_role_is_rejected_in_every_branch() {
    let me = identity("idp|role", "role@example.com");

    // Agent already linked, backed by a pharmacist user.
    let store = InMemoryStore::new();
    let pharmacist = user(&store, "pharm@example.com", UserRole::Pharmacist, None);
    store
        .insert_agent(&NewAgent {
            user_id: Some(pharmacist.id),
            identity_id: Some(me.id.clone()),
            email: me.email.clone(),
            name: "Linked".to_owned(),
            phone: None,
        })
        .await
        .unwrap();
    let err = IdentityReconciler::new(&store).reconcile(&me).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::RoleMismatch {
            role: UserRole::Pharmacist
        }
    ));

    // User linked to the identity.
    let store = InMemoryStore::new();
    user(&store, "customer@example.com", UserRole::Customer, Some("idp|role"));
    let err = IdentityReconciler::new(&store).reconcile(&me).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::RoleMismatch {
            role: UserRole::Customer
        }
    ));

    // User found by email.
    let store = InMemoryStore::new();
    user(&store, "role@example.com", UserRole::Admin, None);
    let writes = store.write_count();
    let err = IdentityReconciler::new(&store).reconcile(&me).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::RoleMismatch {
            role: UserRole::Admin
        }
    ));
    assert_eq!(store.write_count(), writes);

    // Agent found by email, backed by a customer user.
    let store = InMemoryStore::new();
    let customer = user(&store, "elsewhere@example.com", UserRole::Customer, None);
    store
        .insert_agent(&NewAgent {
            user_id: Some(customer.id),
            identity_id: None,
            email: me.email.clone(),
            name: "By Email".to_owned(),
            phone: None,
        })
        .await
        .unwrap();
    let err = IdentityReconciler::new(&store).reconcile(&me).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::RoleMismatch {
            role: UserRole::Customer
        }
    ));
}

#[tokio::test]
async fn test_email_bound_to_other_identity_conflicts() {
    let me = identity("idp|me", "shared@example.com");

    let store = InMemoryStore::new();
    user(&store, "shared@example.com", UserRole::DeliveryAgent, Some("idp|other"));
    let err = IdentityReconciler::new(&store).reconcile(&me).await.unwrap_err();
    assert!(matches!(err, ReconcileError::EmailConflict));

    let store = InMemoryStore::new();
    store
        .insert_agent(&NewAgent {
            user_id: None,
            identity_id: Some(IdentityId::new("idp|other")),
            email: me.email.clone(),
            name: "Someone Else".to_owned(),
            phone: None,
        })
        .await
        .unwrap();
    let err = IdentityReconciler::new(&store).reconcile(&me).await.unwrap_err();
    assert!(matches!(err, ReconcileError::EmailConflict));
}

#[tokio::test]
async fn test_resolve_existing_requires_sync_and_active_agent() {
    let store = InMemoryStore::new();
    let me = identity("idp|resolve", "resolve@example.com");
    let reconciler = IdentityReconciler::new(&store);

    let err = reconciler.resolve_existing(&me).await.unwrap_err();
    assert!(matches!(err, ReconcileError::AgentNotFound));

    reconciler.reconcile(&me).await.unwrap();
    store.set_agent_active(&me.email, false).await.unwrap();

    let err = reconciler.resolve_existing(&me).await.unwrap_err();
    assert!(matches!(err, ReconcileError::AgentInactive));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_sign_ins_share_one_agent() {
    for provisioning in [false, true] {
        let store = Arc::new(if provisioning {
            InMemoryStore::with_agent_provisioning()
        } else {
            InMemoryStore::new()
        });

        for round in 0..100 {
            let me = identity(&format!("idp|race-{round}"), &format!("race{round}@example.com"));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let me = me.clone();
                    tokio::spawn(async move {
                        IdentityReconciler::new(store.as_ref())
                            .reconcile(&me)
                            .await
                            .map(|outcome| outcome.agent.id)
                    })
                })
                .collect();

            let mut agent_ids = Vec::new();
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(id) => agent_ids.push(id),
                    Err(err) => panic!("round {round} (provisioning: {provisioning}): {err}"),
                }
            }

            assert_eq!(agent_ids[0], agent_ids[1]);
            let user = store.user_by_identity(&me.id).await.unwrap().unwrap();
            let agent = store.agent_by_user(user.id).await.unwrap().unwrap();
            assert_eq!(agent.id, agent_ids[0]);
        }
    }
}
