//! Reconciler Integration Tests
//!
//! Drives `ManagedReconciler<Deck>` against the in-memory store and dealer,
//! one attempt at a time, checking conditions and external state after each.

mod common;

use common::{
    deck, orphaned_deck, scripted_reconciler, ConflictingStore, Harness, Operation, Script,
    ScriptedConnector, POLL_INTERVAL,
};
use kube::ResourceExt;
use provider_cards::cards::ordered_deck;
use provider_cards::crd::{ConditionStatus, ConditionType, Deck, DeckCard};
use provider_cards::managed::{
    has_finalizer, ManagedReconciler, ManagedResource, ReconcileError, RequeueDecision,
    EXTERNAL_NAME_ANNOTATION,
};
use provider_cards::store::ResourceStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn condition_status(mg: &Deck, condition_type: ConditionType) -> Option<String> {
    mg.condition(condition_type).map(|c| c.status.clone())
}

fn condition_reason(mg: &Deck, condition_type: ConditionType) -> Option<String> {
    mg.condition(condition_type).and_then(|c| c.reason.clone())
}

fn is_true(mg: &Deck, condition_type: ConditionType) -> bool {
    mg.condition(condition_type)
        .is_some_and(|c| c.is_status(ConditionStatus::True))
}

/// Reconcile until the resource settles into polling
async fn converge(harness: &Harness, name: &str) -> Deck {
    let reconciler = harness.reconciler();
    for _ in 0..5 {
        let decision = reconciler.reconcile(name).await.expect("reconcile should succeed");
        if decision == RequeueDecision::After(POLL_INTERVAL) {
            return harness.get(name).await;
        }
    }
    panic!("{name} did not converge");
}

#[tokio::test]
async fn test_new_deck_converges_to_ready() {
    let harness = Harness::new();
    harness
        .store
        .create(deck("poker-night", None))
        .expect("create should succeed");
    let reconciler = harness.reconciler();

    let first = reconciler.reconcile("poker-night").await.expect("create pass");
    assert_eq!(first, RequeueDecision::Immediate);
    let created = harness.get("poker-night").await;
    assert!(has_finalizer(&created));
    assert_eq!(
        created.annotations().get(EXTERNAL_NAME_ANNOTATION).map(String::as_str),
        Some("poker-night")
    );
    assert_eq!(condition_reason(&created, ConditionType::Ready).as_deref(), Some("Creating"));
    assert!(is_true(&created, ConditionType::Synced));
    assert_eq!(created.cards().len(), 52);

    let second = reconciler.reconcile("poker-night").await.expect("observe pass");
    assert_eq!(second, RequeueDecision::After(POLL_INTERVAL));
    let ready = harness.get("poker-night").await;
    assert!(is_true(&ready, ConditionType::Ready));
    assert!(is_true(&ready, ConditionType::Synced));
    assert_eq!(ready.cards(), created.cards());
    assert_eq!(harness.dealer.len(), 1);
}

#[tokio::test]
async fn test_up_to_date_deck_is_polled_without_external_writes() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");
    let ready = converge(&harness, "poker-night").await;
    let dealt = harness.dealer.get("poker-night").expect("dealer up");

    let again = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect("observe pass");

    assert_eq!(again, RequeueDecision::After(POLL_INTERVAL));
    assert_eq!(harness.dealer.get("poker-night").expect("dealer up"), dealt);
    assert_eq!(harness.get("poker-night").await.cards(), ready.cards());
}

#[tokio::test]
async fn test_ordered_and_empty_decks() {
    let harness = Harness::new();
    harness.store.create(deck("sorted", Some("Ordered"))).expect("create");
    harness.store.create(deck("discards", Some("Empty"))).expect("create");

    let sorted = converge(&harness, "sorted").await;
    let discards = converge(&harness, "discards").await;

    let cards = sorted.cards();
    assert_eq!(cards, ordered_deck().as_slice());
    assert_eq!(
        cards.first(),
        Some(&DeckCard {
            suit: "♠".to_string(),
            rank: "2".to_string(),
        })
    );
    assert!(discards.cards().is_empty());
    assert!(is_true(&discards, ConditionType::Ready));
}

#[tokio::test]
async fn test_changed_deck_type_is_redealt() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", Some("Ordered"))).expect("create");
    converge(&harness, "poker-night").await;

    let mut edited = harness.get("poker-night").await;
    edited.spec.for_provider.deck_type = Some("Empty".to_string());
    harness.store.replace_spec(edited).expect("edit");

    let decision = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect("update pass");
    assert_eq!(decision, RequeueDecision::Immediate);
    let updated = harness.get("poker-night").await;
    assert!(updated.cards().is_empty());

    let settled = converge(&harness, "poker-night").await;
    assert!(is_true(&settled, ConditionType::Ready));
}

#[tokio::test]
async fn test_stored_status_is_not_desired_state() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", Some("Ordered"))).expect("create");
    let ready = converge(&harness, "poker-night").await;

    let mut tampered = ready.clone();
    if let Some(status) = tampered.status.as_mut() {
        status.at_provider.cards.clear();
    }
    harness.store.update_status(&tampered).await.expect("status write");

    let decision = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect("observe pass");

    assert_eq!(decision, RequeueDecision::After(POLL_INTERVAL));
    assert_eq!(harness.get("poker-night").await.cards(), ready.cards());
}

#[tokio::test]
async fn test_deleted_deck_is_discarded_and_released() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");
    converge(&harness, "poker-night").await;
    assert_eq!(harness.store.usages_for("default").len(), 1);

    harness.store.delete("poker-night").expect("delete");
    assert!(harness.store.contains("poker-night"), "finalizer holds the object");

    let decision = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect("delete pass");

    assert_eq!(decision, RequeueDecision::None);
    assert!(!harness.store.contains("poker-night"));
    assert!(harness.dealer.is_empty());
    assert!(harness.store.usages_for("default").is_empty());
    harness
        .store
        .delete_provider_config("default")
        .expect("config should be unused after the deck is gone");
}

#[tokio::test]
async fn test_orphan_policy_keeps_the_dealt_deck() {
    let harness = Harness::new();
    harness.store.create(orphaned_deck("keepsake")).expect("create");
    converge(&harness, "keepsake").await;

    harness.store.delete("keepsake").expect("delete");
    let decision = harness
        .reconciler()
        .reconcile("keepsake")
        .await
        .expect("delete pass");

    assert_eq!(decision, RequeueDecision::None);
    assert!(!harness.store.contains("keepsake"));
    assert_eq!(harness.dealer.len(), 1);
}

#[tokio::test]
async fn test_delete_of_already_discarded_deck_releases_finalizer() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");
    converge(&harness, "poker-night").await;

    assert!(harness.dealer.discard("poker-night").expect("dealer up"));
    harness.store.delete("poker-night").expect("delete");

    let decision = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect("delete pass");

    assert_eq!(decision, RequeueDecision::None);
    assert!(!harness.store.contains("poker-night"));
}

#[tokio::test]
async fn test_failed_observe_during_delete_keeps_finalizer() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");
    converge(&harness, "poker-night").await;
    harness.store.delete("poker-night").expect("delete");
    harness.dealer.set_available(false);

    let err = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect_err("observe should fail while the dealer is down");
    assert!(matches!(err, ReconcileError::Observe(_)));
    let pending = harness.get("poker-night").await;
    assert!(has_finalizer(&pending));

    harness.dealer.set_available(true);
    let decision = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect("delete pass");
    assert_eq!(decision, RequeueDecision::None);
    assert!(!harness.store.contains("poker-night"));
    assert!(harness.dealer.is_empty());
}

/// A reconciler whose dealer client rejects `operation`
fn failing_reconciler(harness: &Harness, operation: Operation) -> ManagedReconciler<Deck> {
    let connector = Arc::new(ScriptedConnector::new(
        Arc::clone(&harness.dealer),
        Script::FailOn(operation),
    ));
    scripted_reconciler(&harness.store, &connector)
}

#[tokio::test]
async fn test_failed_create_marks_ready_creating() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");

    let err = failing_reconciler(&harness, Operation::Create)
        .reconcile("poker-night")
        .await
        .expect_err("create should fail");

    assert!(matches!(err, ReconcileError::Create(_)));
    assert_eq!(err.reason(), "ServiceUnavailable");
    let failed = harness.get("poker-night").await;
    assert_eq!(
        condition_status(&failed, ConditionType::Synced).as_deref(),
        Some("False")
    );
    assert_eq!(
        condition_reason(&failed, ConditionType::Synced).as_deref(),
        Some("ServiceUnavailable")
    );
    assert_eq!(
        condition_status(&failed, ConditionType::Ready).as_deref(),
        Some("False")
    );
    assert_eq!(
        condition_reason(&failed, ConditionType::Ready).as_deref(),
        Some("Creating")
    );
    assert!(has_finalizer(&failed));
    assert!(harness.dealer.is_empty());

    let recovered = converge(&harness, "poker-night").await;
    assert!(is_true(&recovered, ConditionType::Ready));
}

#[tokio::test]
async fn test_failed_update_marks_ready_unavailable() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", Some("Ordered"))).expect("create");
    let mut edited = converge(&harness, "poker-night").await;
    edited.spec.for_provider.deck_type = Some("Empty".to_string());
    harness.store.replace_spec(edited).expect("edit");

    let err = failing_reconciler(&harness, Operation::Update)
        .reconcile("poker-night")
        .await
        .expect_err("update should fail");

    assert!(matches!(err, ReconcileError::Update(_)));
    let failed = harness.get("poker-night").await;
    assert_eq!(
        condition_reason(&failed, ConditionType::Synced).as_deref(),
        Some("ServiceUnavailable")
    );
    assert_eq!(
        condition_status(&failed, ConditionType::Ready).as_deref(),
        Some("False")
    );
    assert_eq!(
        condition_reason(&failed, ConditionType::Ready).as_deref(),
        Some("Unavailable")
    );
    assert_eq!(harness.dealer.len(), 1);

    converge(&harness, "poker-night").await;
    assert!(harness.get("poker-night").await.cards().is_empty());
}

#[tokio::test]
async fn test_failed_delete_marks_ready_deleting_and_keeps_finalizer() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");
    converge(&harness, "poker-night").await;
    harness.store.delete("poker-night").expect("delete");

    let err = failing_reconciler(&harness, Operation::Delete)
        .reconcile("poker-night")
        .await
        .expect_err("delete should fail");

    assert!(matches!(err, ReconcileError::Delete(_)));
    let pending = harness.get("poker-night").await;
    assert!(has_finalizer(&pending));
    assert_eq!(
        condition_reason(&pending, ConditionType::Synced).as_deref(),
        Some("ServiceUnavailable")
    );
    assert_eq!(
        condition_status(&pending, ConditionType::Ready).as_deref(),
        Some("False")
    );
    assert_eq!(
        condition_reason(&pending, ConditionType::Ready).as_deref(),
        Some("Deleting")
    );
    assert_eq!(harness.dealer.len(), 1);

    let decision = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect("delete pass");
    assert_eq!(decision, RequeueDecision::None);
    assert!(!harness.store.contains("poker-night"));
    assert!(harness.dealer.is_empty());
}

#[tokio::test]
async fn test_deck_edited_to_unknown_type_can_still_be_deleted() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", Some("Ordered"))).expect("create");
    let mut edited = converge(&harness, "poker-night").await;
    edited.spec.for_provider.deck_type = Some("Tarot".to_string());
    harness.store.replace_spec(edited).expect("edit");
    harness.store.delete("poker-night").expect("delete");

    let decision = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect("delete pass");

    assert_eq!(decision, RequeueDecision::None);
    assert!(!harness.store.contains("poker-night"));
    assert!(harness.dealer.is_empty());
}

#[tokio::test]
async fn test_missing_provider_config_is_reported_on_synced() {
    let harness = Harness::new();
    harness
        .store
        .delete_provider_config("default")
        .expect("nothing uses the config yet");
    harness.store.create(deck("poker-night", None)).expect("create");

    let err = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect_err("connect should fail");

    assert_eq!(err.reason(), "ConfigurationNotFound");
    let failed = harness.get("poker-night").await;
    assert_eq!(
        condition_status(&failed, ConditionType::Synced).as_deref(),
        Some("False")
    );
    assert_eq!(
        condition_reason(&failed, ConditionType::Synced).as_deref(),
        Some("ConfigurationNotFound")
    );
    assert_eq!(
        condition_status(&failed, ConditionType::Ready).as_deref(),
        Some("Unknown")
    );
    assert!(harness.dealer.is_empty());

    harness.store.put_provider_config(common::default_provider_config());
    let recovered = converge(&harness, "poker-night").await;
    assert!(is_true(&recovered, ConditionType::Synced));
    assert!(is_true(&recovered, ConditionType::Ready));
}

#[tokio::test]
async fn test_dealer_outage_marks_synced_false_and_keeps_ready() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");
    converge(&harness, "poker-night").await;
    harness.dealer.set_available(false);

    let err = harness
        .reconciler()
        .reconcile("poker-night")
        .await
        .expect_err("observe should fail");

    assert_eq!(err.reason(), "ServiceUnavailable");
    let failed = harness.get("poker-night").await;
    assert_eq!(
        condition_reason(&failed, ConditionType::Synced).as_deref(),
        Some("ServiceUnavailable")
    );
    assert!(is_true(&failed, ConditionType::Ready));
}

#[tokio::test]
async fn test_unknown_deck_type_is_an_invalid_request() {
    let harness = Harness::new();
    harness.store.create(deck("tarot", Some("Tarot"))).expect("create");

    let err = harness
        .reconciler()
        .reconcile("tarot")
        .await
        .expect_err("unknown type should fail");

    assert_eq!(err.reason(), "InvalidRequest");
    assert!(harness.dealer.is_empty());
    assert_eq!(
        condition_reason(&harness.get("tarot").await, ConditionType::Synced).as_deref(),
        Some("InvalidRequest")
    );
}

#[tokio::test]
async fn test_status_conflict_is_retried_against_latest_version() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");
    let store = Arc::new(ConflictingStore::new(Arc::clone(&harness.store), 2));
    let reconciler = harness.reconciler_over(Arc::clone(&store) as Arc<dyn ResourceStore<Deck>>);

    let decision = reconciler.reconcile("poker-night").await.expect("create pass");

    assert_eq!(decision, RequeueDecision::Immediate);
    assert_eq!(store.status_writes.load(Ordering::SeqCst), 3);
    let created = harness.get("poker-night").await;
    assert_eq!(created.cards().len(), 52);
    assert!(is_true(&created, ConditionType::Synced));
}

#[tokio::test]
async fn test_persistent_status_conflicts_surface_as_errors() {
    let harness = Harness::new();
    harness.store.create(deck("poker-night", None)).expect("create");
    let store = Arc::new(ConflictingStore::new(Arc::clone(&harness.store), 100));
    let reconciler = harness.reconciler_over(Arc::clone(&store) as Arc<dyn ResourceStore<Deck>>);

    let err = reconciler
        .reconcile("poker-night")
        .await
        .expect_err("conflicts should exhaust retries");

    assert!(matches!(err, ReconcileError::Store(ref e) if e.is_conflict()));
    assert_eq!(err.reason(), "Conflict");
    assert_eq!(store.status_writes.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_vanished_object_needs_no_work() {
    let harness = Harness::new();

    let decision = harness
        .reconciler()
        .reconcile("never-created")
        .await
        .expect("absent object is not an error");

    assert_eq!(decision, RequeueDecision::None);
    assert!(harness.dealer.is_empty());
}

#[tokio::test]
async fn test_external_name_annotation_picks_the_dealt_deck() {
    let harness = Harness::new();
    let mut named = deck("poker-night", None);
    named
        .annotations_mut()
        .insert(EXTERNAL_NAME_ANNOTATION.to_string(), "table-7".to_string());
    harness.store.create(named).expect("create");

    converge(&harness, "poker-night").await;

    assert!(harness.dealer.get("table-7").expect("dealer up").is_some());
    assert!(harness.dealer.get("poker-night").expect("dealer up").is_none());
}
