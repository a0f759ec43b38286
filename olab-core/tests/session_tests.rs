//! Annotation session scenarios against SQLite and a scripted store

mod common;

use common::{label_count, sqlite_store, ScriptedStore};
use olab_common::models::{LabelKind, Span, SpanRole};
use olab_core::counter::{CounterOutcome, LabelChange};
use olab_core::editor::LabelState;
use olab_core::error::{SessionError, ValidationError};
use olab_core::scan::ScanResult;
use olab_core::session::{AnnotationSession, SessionStatus, EXHAUSTED_NOTICE};
use olab_core::store::{SentenceFilter, SentenceOrder, SentenceStore, TraversalMode};
use olab_core::traversal::TraversalIndex;
use std::collections::HashSet;

const TEXTS: [&str; 3] = [
    "Ada Lovelace was born in London",
    "Alan Turing was born in Maida Vale",
    "Grace Hopper was born in New York City",
];

#[tokio::test]
async fn test_index_length_matches_count_for_every_mode() {
    let store = sqlite_store(&TEXTS).await;
    for mode in [TraversalMode::Unlabeled, TraversalMode::LeastLabeled, TraversalMode::All] {
        let index = TraversalIndex::build(&store, 1, mode).await.unwrap();
        assert_eq!(index.ids.len() as i64, index.count, "mode {}", mode);
    }
}

#[tokio::test]
async fn test_save_none_on_first_sentence() {
    let store = sqlite_store(&TEXTS).await;
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::Unlabeled).await.unwrap();

    let index = session.index().unwrap();
    assert_eq!(index.count, 3);
    assert_eq!(index.ids, vec![1, 2, 3]);
    assert_eq!(session.current_sentence().unwrap().id, 1);

    session.editor_mut().unwrap().toggle_kind(LabelKind::None);
    let outcome = session.save(&store).await.unwrap();

    assert_eq!(outcome.change, LabelChange::Created);
    assert!(matches!(outcome.counter, CounterOutcome::Atomic));
    assert_eq!(label_count(&store, 1).await, 1);
    assert_eq!(session.labeled_ids(), &HashSet::from([1]));
    assert_eq!(session.position(), 1);
    assert_eq!(session.current_sentence().unwrap().id, 2);
}

#[tokio::test]
async fn test_resaving_identical_label_keeps_count() {
    let store = sqlite_store(&TEXTS).await;
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();

    session.editor_mut().unwrap().toggle_kind(LabelKind::None);
    session.save(&store).await.unwrap();
    assert_eq!(label_count(&store, 1).await, 1);

    session.prev(&store).await.unwrap();
    assert_eq!(session.current_label().map(|l| l.kind), Some(LabelKind::None));
    assert_eq!(session.editor().unwrap().state(), LabelState::Saved);

    let outcome = session.save(&store).await.unwrap();
    assert_eq!(outcome.change, LabelChange::Edited);
    assert!(matches!(outcome.counter, CounterOutcome::Unchanged));
    assert_eq!(label_count(&store, 1).await, 1);
}

#[tokio::test]
async fn test_saved_label_round_trips() {
    let store = sqlite_store(&TEXTS).await;
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();

    let editor = session.editor_mut().unwrap();
    editor.toggle_kind(LabelKind::FullAlignment);
    editor.arm(SpanRole::Subject);
    editor.click_token(0).unwrap();
    editor.click_token(1).unwrap();
    editor.arm(SpanRole::Object);
    editor.click_token(5).unwrap();
    editor.click_token(5).unwrap();
    session.save(&store).await.unwrap();

    let label = store.fetch_label(1, "u1").await.unwrap().unwrap();
    assert_eq!(label.kind, LabelKind::FullAlignment);
    assert_eq!(label.subject, Some(Span { start: 0, end: 1 }));
    assert_eq!(label.object, Some(Span::single(5)));
}

#[tokio::test]
async fn test_rejected_label_writes_nothing() {
    let store = ScriptedStore::with_sentences(3);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::Unlabeled).await.unwrap();

    let editor = session.editor_mut().unwrap();
    editor.toggle_kind(LabelKind::DomainOnly);
    editor.arm(SpanRole::Subject);
    editor.click_token(0).unwrap();
    editor.click_token(0).unwrap();
    editor.arm(SpanRole::Object);
    editor.click_token(2).unwrap();
    editor.click_token(2).unwrap();

    let err = session.save(&store).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(ValidationError::ObjectNotAllowed)));
    assert!(err.to_string().contains("Clear object span"));
    assert!(!store.calls().iter().any(|c| c.starts_with("upsert")));
    assert_eq!(session.position(), 0);
    assert_eq!(session.editor().unwrap().state(), LabelState::Editing);
}

#[tokio::test]
async fn test_upsert_failure_does_not_advance() {
    let store = ScriptedStore::with_sentences(3);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::Unlabeled).await.unwrap();
    store.fail(|f| f.upsert = true);

    session.editor_mut().unwrap().toggle_kind(LabelKind::None);
    let err = session.save(&store).await.unwrap_err();

    assert!(matches!(err, SessionError::Write(_)));
    assert_eq!(session.position(), 0);
    assert!(session.labeled_ids().is_empty());
    assert_eq!(store.count_of(1), 0);
    assert!(!store.calls().iter().any(|c| c.starts_with("rpc")));
}

#[tokio::test]
async fn test_atomic_failure_takes_fallback() {
    let store = ScriptedStore::with_sentences(3);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();
    store.fail(|f| f.atomic = true);

    session.editor_mut().unwrap().toggle_kind(LabelKind::None);
    let outcome = session.save(&store).await.unwrap();

    assert!(matches!(outcome.counter, CounterOutcome::Fallback { written: 1 }));
    assert_eq!(store.count_of(1), 1);
    assert!(store.calls().contains(&"write 1 1".to_string()));
}

#[tokio::test]
async fn test_counter_double_failure_keeps_label() {
    let store = ScriptedStore::with_sentences(3);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();
    store.fail(|f| {
        f.atomic = true;
        f.write_count = true;
    });

    session.editor_mut().unwrap().toggle_kind(LabelKind::None);
    let outcome = session.save(&store).await.unwrap();

    assert!(outcome.counter.is_failed());
    assert_eq!(outcome.delta(), 0);
    assert!(store.labels.lock().unwrap().contains_key(&(1, "u1".to_string())));
    assert_eq!(session.position(), 1);
}

/// Label sentence 1 as `p` through a first session
async fn label_first_sentence(store: &ScriptedStore) {
    let mut session = AnnotationSession::new("u1", 10);
    session.open(store, 1, TraversalMode::All).await.unwrap();
    session.editor_mut().unwrap().toggle_kind(LabelKind::PropertyOnly);
    session.save(store).await.unwrap();
    assert_eq!(store.count_of(1), 1);
}

#[tokio::test]
async fn test_resave_without_labeled_ids_keeps_count() {
    let store = ScriptedStore::with_sentences(3);
    label_first_sentence(&store).await;
    store.fail(|f| f.labeled_ids = true);

    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();
    assert_eq!(session.current_label().map(|l| l.kind), Some(LabelKind::PropertyOnly));
    assert!(session.labeled_ids().contains(&1));

    session.editor_mut().unwrap().toggle_kind(LabelKind::None);
    let outcome = session.save(&store).await.unwrap();

    assert_eq!(outcome.change, LabelChange::Edited);
    assert!(matches!(outcome.counter, CounterOutcome::Unchanged));
    assert_eq!(store.count_of(1), 1);
}

#[tokio::test]
async fn test_save_refused_while_prior_label_unknown() {
    let store = ScriptedStore::with_sentences(3);
    label_first_sentence(&store).await;
    store.fail(|f| {
        f.labeled_ids = true;
        f.label = true;
    });

    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();
    assert!(session.current_label().is_none());

    session.editor_mut().unwrap().toggle_kind(LabelKind::None);
    let err = session.save(&store).await.unwrap_err();
    assert!(matches!(err, SessionError::Load(_)));
    assert_eq!(session.position(), 0);
    assert_eq!(store.count_of(1), 1);
    assert_eq!(store.calls().iter().filter(|c| c.starts_with("upsert")).count(), 1);

    store.fail(|f| f.label = false);
    let outcome = session.save(&store).await.unwrap();
    assert_eq!(outcome.change, LabelChange::Edited);
    assert_eq!(store.count_of(1), 1);
    assert_eq!(session.position(), 1);
}

#[tokio::test]
async fn test_initial_load_failure_sets_error_state() {
    let store = ScriptedStore::with_sentences(3);
    store.fail(|f| f.count = true);
    let mut session = AnnotationSession::new("u1", 10);

    let err = session.open(&store, 1, TraversalMode::Unlabeled).await.unwrap_err();
    assert!(matches!(err, SessionError::Load(_)));
    assert!(matches!(session.status(), SessionStatus::Failed { .. }));
    assert!(session.current_sentence().is_none());
}

#[tokio::test]
async fn test_window_fetch_on_demand() {
    let store = ScriptedStore::with_sentences(25);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();
    assert_eq!(store.calls().iter().filter(|c| c.starts_with("batch")).count(), 1);

    session.go_to(&store, 12).await.unwrap();
    let batches: Vec<String> = store
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("batch"))
        .collect();
    assert_eq!(batches, vec!["batch 0+10", "batch 10+10"]);
    assert_eq!(session.current_sentence().unwrap().id, 13);
    assert!(session.buffer().contains(19));
    assert!(!session.buffer().contains(20));
}

#[tokio::test]
async fn test_failed_batch_retried_on_next_access() {
    let store = ScriptedStore::with_sentences(15);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();

    store.fail(|f| f.batch = true);
    session.go_to(&store, 11).await.unwrap();
    assert!(session.current_sentence().is_none());
    assert!(session.editor().is_none());

    store.fail(|f| f.batch = false);
    assert!(session.ensure_current(&store).await);
    assert_eq!(session.current_sentence().unwrap().id, 12);
}

#[tokio::test]
async fn test_navigation_wraps() {
    let store = ScriptedStore::with_sentences(3);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();

    session.prev(&store).await.unwrap();
    assert_eq!(session.position(), 2);
    session.next(&store).await.unwrap();
    assert_eq!(session.position(), 0);
}

#[tokio::test]
async fn test_next_unlabeled_reports_exhaustion() {
    let store = ScriptedStore::with_sentences(4);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();

    for _ in 0..4 {
        session.editor_mut().unwrap().toggle_kind(LabelKind::None);
        session.save(&store).await.unwrap();
    }
    // The fourth save wrapped the pointer back to the start
    assert_eq!(session.position(), 0);
    assert_eq!(session.labeled_ids().len(), 4);

    assert_eq!(session.next_unlabeled(&store).await.unwrap(), ScanResult::Exhausted);
    assert_eq!(session.view().notice.as_deref(), Some(EXHAUSTED_NOTICE));
    assert_eq!(session.position(), 0);

    session.next(&store).await.unwrap();
    assert_eq!(session.view().notice, None);
}

#[tokio::test]
async fn test_forward_scan_from_last_wraps_to_first() {
    let store = ScriptedStore::with_sentences(4);
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::All).await.unwrap();

    session.go_to(&store, 1).await.unwrap();
    for _ in 0..3 {
        session.editor_mut().unwrap().toggle_kind(LabelKind::None);
        session.save(&store).await.unwrap();
    }
    // Saving the last position wrapped the pointer to 0; go back to the end
    session.go_to(&store, 3).await.unwrap();
    assert_eq!(session.next_unlabeled(&store).await.unwrap(), ScanResult::Found(0));
    assert_eq!(session.position(), 0);
}

#[tokio::test]
async fn test_switching_mode_resets_pointer() {
    let store = ScriptedStore::with_sentences(5);
    let mut session = AnnotationSession::new("u1", 2);
    session.open(&store, 1, TraversalMode::All).await.unwrap();
    session.go_to(&store, 4).await.unwrap();
    let generation = session.buffer().generation();

    session.open(&store, 1, TraversalMode::LeastLabeled).await.unwrap();
    assert_eq!(session.position(), 0);
    assert_eq!(session.buffer().generation(), generation + 1);
    assert_eq!(session.buffer().loaded_count(), 2);
}

#[tokio::test]
async fn test_unlabeled_mode_excludes_labeled_sentences_after_reload() {
    let store = sqlite_store(&TEXTS).await;
    let mut session = AnnotationSession::new("u1", 10);
    session.open(&store, 1, TraversalMode::Unlabeled).await.unwrap();
    session.editor_mut().unwrap().toggle_kind(LabelKind::None);
    session.save(&store).await.unwrap();

    session.open(&store, 1, TraversalMode::Unlabeled).await.unwrap();
    assert_eq!(session.index().unwrap().ids, vec![2, 3]);

    let ids = store
        .list_sentence_ids(1, SentenceFilter::Any, SentenceOrder::LeastLabeledFirst)
        .await
        .unwrap();
    assert_eq!(ids, vec![2, 3, 1]);
}
