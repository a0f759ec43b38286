//! Label counter fallback behavior

mod common;

use common::{label_count, sqlite_store, ScriptedStore};
use olab_common::models::{LabelKind, NewLabel};
use olab_core::counter::{adjust_counter, CounterOutcome, LabelChange};
use olab_core::labels::persist_label;
use olab_core::store::SentenceStore;

fn new_label(sentence_id: i64) -> NewLabel {
    NewLabel {
        sentence_id,
        user_id: "u1".to_string(),
        property_id: 1,
        kind: LabelKind::None,
        subject: None,
        object: None,
    }
}

#[tokio::test]
async fn test_atomic_path_used_when_available() {
    let store = ScriptedStore::with_sentences(1);
    let outcome = adjust_counter(&store, 1, LabelChange::Created, 0).await;
    assert!(matches!(outcome, CounterOutcome::Atomic));
    assert_eq!(store.count_of(1), 1);
    assert_eq!(store.calls(), vec!["rpc 1 Increment"]);
}

#[tokio::test]
async fn test_edit_does_not_touch_counter() {
    let store = ScriptedStore::with_sentences(1);
    let outcome = adjust_counter(&store, 1, LabelChange::Edited, 4).await;
    assert!(matches!(outcome, CounterOutcome::Unchanged));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_fallback_reads_then_writes() {
    let store = ScriptedStore::with_sentences(1);
    store.sentences.lock().unwrap()[0].label_count = 3;
    store.fail(|f| f.atomic = true);

    let outcome = adjust_counter(&store, 1, LabelChange::Created, 0).await;
    assert!(matches!(outcome, CounterOutcome::Fallback { written: 4 }));
    assert_eq!(store.calls(), vec!["rpc 1 Increment", "read 1", "write 1 4"]);
}

#[tokio::test]
async fn test_fallback_uses_cached_count_when_read_fails() {
    let store = ScriptedStore::with_sentences(1);
    store.fail(|f| {
        f.atomic = true;
        f.read_count = true;
    });

    let outcome = adjust_counter(&store, 1, LabelChange::Created, 7).await;
    assert!(matches!(outcome, CounterOutcome::Fallback { written: 8 }));
    assert_eq!(store.count_of(1), 8);
}

#[tokio::test]
async fn test_decrement_fallback_clamps_at_zero() {
    let store = ScriptedStore::with_sentences(1);
    store.fail(|f| f.atomic = true);

    let outcome = adjust_counter(&store, 1, LabelChange::Removed, 0).await;
    assert!(matches!(outcome, CounterOutcome::Fallback { written: 0 }));
    assert_eq!(store.count_of(1), 0);
}

#[tokio::test]
async fn test_both_paths_failing_keeps_label() {
    let store = ScriptedStore::with_sentences(1);
    store.fail(|f| {
        f.atomic = true;
        f.write_count = true;
    });

    let outcome = persist_label(&store, &new_label(1), LabelChange::Created, 0)
        .await
        .unwrap();
    assert!(outcome.counter.is_failed());
    assert_eq!(outcome.delta(), 0);
    assert_eq!(store.count_of(1), 0);
    assert_eq!(
        store.fetch_label(1, "u1").await.unwrap().map(|l| l.kind),
        Some(LabelKind::None)
    );
}

#[tokio::test]
async fn test_sqlite_counter_never_negative() {
    let store = sqlite_store(&["Ada Lovelace was born in London"]).await;
    let outcome = adjust_counter(&store, 1, LabelChange::Removed, 0).await;
    assert!(matches!(outcome, CounterOutcome::Atomic));
    assert_eq!(label_count(&store, 1).await, 0);

    persist_label(&store, &new_label(1), LabelChange::Created, 0)
        .await
        .unwrap();
    assert_eq!(label_count(&store, 1).await, 1);
}
