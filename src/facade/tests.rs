use std::sync::Arc;

use super::*;
use crate::config::EngineConfig;
use crate::learners::{LearnerDb, LearnerDbError, LearnerError};
use crate::lock::LocalLocks;
use crate::store::MemoryModelStore;
use crate::vectorizer::TextSpan;

fn engine() -> Engine {
    Engine::in_memory(EngineConfig::default()).unwrap()
}

fn engine_with_store(store: &Arc<MemoryModelStore>) -> Engine {
    Engine::with_parts(
        EngineConfig::default(),
        LearnerDb::open_in_memory().unwrap(),
        Box::new(Arc::clone(store)),
        Box::new(LocalLocks::new(None)),
    )
    .unwrap()
}

fn span(text: &str) -> TextSpan {
    TextSpan::new(text)
}

fn online<'e>(engine: &'e Engine, tag: &str, user: &str) -> LearnerFacade<'e> {
    LearnerFacade::get_or_create(engine, tag, Some(user), GetOptions::default()).unwrap()
}

fn stored_model(engine: &Engine, facade: &LearnerFacade<'_>) -> Vec<u8> {
    let pointer = &facade.online_record().unwrap().model_pointer;
    engine.store().get(pointer).unwrap()
}

fn offline_corpus() -> (Vec<TextSpan>, Vec<bool>) {
    (
        vec![
            span("company shall indemnify the customer"),
            span("supplier shall indemnify and hold harmless"),
            span("this agreement is governed by english law"),
            span("notices must be given in writing"),
        ],
        vec![true, true, false, false],
    )
}

#[test]
fn liability_feedback_flips_with_relabel() {
    let engine = engine();
    let mut facade = online(&engine, "LIABILITY", "alice");
    let clause = span("Company shall indemnify.");

    engine
        .locked("LIABILITY", Some("alice"), |_| {
            facade.train(std::slice::from_ref(&clause), &[true], &[])
        })
        .unwrap();
    let predicted = facade.predict(std::slice::from_ref(&clause), false).unwrap();
    assert_eq!(predicted, vec![Prediction::Label(true)]);

    engine
        .locked("LIABILITY", Some("alice"), |_| {
            facade.train(std::slice::from_ref(&clause), &[false], &[])
        })
        .unwrap();
    let record = facade.online_record().unwrap();
    assert_eq!(record.samples().len(), 1);
    assert_eq!(record.samples()[0].label, Some(false));
    assert!(!facade.predict(&[clause], false).unwrap()[0].label());
}

#[test]
fn repeated_feedback_is_idempotent() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    let clause = span("Liability is capped at fees paid.");

    facade.train(std::slice::from_ref(&clause), &[true], &[]).unwrap();
    let before = stored_model(&engine, &facade);
    let scores = facade.decision_function(std::slice::from_ref(&clause)).unwrap();

    facade.train(std::slice::from_ref(&clause), &[true], &[]).unwrap();
    assert_eq!(facade.sample_count(), 1);
    assert_eq!(stored_model(&engine, &facade), before);
    assert_eq!(facade.decision_function(&[clause]).unwrap(), scores);
}

#[test]
fn later_label_in_one_batch_wins() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    let clause = span("Either party may terminate.");
    facade
        .train(&[clause.clone(), clause.clone()], &[true, false], &[])
        .unwrap();
    let record = facade.online_record().unwrap();
    assert_eq!(record.samples().len(), 1);
    assert_eq!(record.samples()[0].label, Some(false));
    assert_eq!(record.positive_sample_count(), 0);
}

#[test]
fn inferred_negatives_skip_known_text() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    let tagged = span("Company shall indemnify.");
    let neighbour = span("Definitions follow.");
    facade
        .train(
            std::slice::from_ref(&tagged),
            &[true],
            &[tagged.clone(), neighbour.clone(), neighbour.clone()],
        )
        .unwrap();
    let samples = facade.online_record().unwrap().samples();
    assert_eq!(samples.len(), 2);
    assert!(samples[0].is_positive() && !samples[0].inferred);
    assert_eq!(samples[1].text, neighbour.text);
    assert_eq!(samples[1].label, Some(false));
    assert!(samples[1].inferred);
}

#[test]
fn explicit_label_confirms_an_inferred_negative() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    let neighbour = span("Definitions follow.");
    facade
        .train(&[span("Company shall indemnify.")], &[true], std::slice::from_ref(&neighbour))
        .unwrap();
    facade.train(std::slice::from_ref(&neighbour), &[false], &[]).unwrap();

    let reloaded = online(&engine, "X", "alice");
    let samples = reloaded.online_record().unwrap().samples();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].text, neighbour.text);
    assert_eq!(samples[1].label, Some(false));
    assert!(!samples[1].inferred);
}

#[test]
fn mismatched_label_count_is_rejected() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    let err = facade.train(&[span("a clause")], &[], &[]).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(facade.sample_count(), 0);
}

#[test]
fn maturity_follows_positive_count() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    let threshold = engine.config().maturity_threshold;
    let spans: Vec<TextSpan> = (0..threshold)
        .map(|idx| span(&format!("positive clause number {idx}")))
        .collect();
    facade
        .train(&spans[..threshold - 1], &vec![true; threshold - 1], &[])
        .unwrap();
    assert!(!facade.is_mature());
    facade.train(&spans[threshold - 1..], &[true], &[]).unwrap();
    assert!(facade.is_mature());
    assert_eq!(facade.positive_sample_count(), threshold);
}

#[test]
fn recycling_reuses_the_deleted_row() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    facade.train(&[span("old clause")], &[true], &[]).unwrap();
    let id = facade.id().clone();
    facade.delete().unwrap();

    let first = online(&engine, "X", "alice");
    let second = online(&engine, "X", "alice");
    assert_eq!(first.id(), &id);
    assert_eq!(second.id(), &id);
    assert_eq!(first.sample_count(), 0);
    assert!(!first.online_record().unwrap().is_deleted());

    let rows = engine
        .db()
        .list_online(&crate::learners::OnlineQuery {
            include_deleted: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn include_deleted_returns_the_deleted_row_untouched() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    facade.train(&[span("old clause")], &[true], &[]).unwrap();
    facade.delete().unwrap();

    let found = LearnerFacade::get_or_create(
        &engine,
        "X",
        Some("alice"),
        GetOptions::default().include_deleted(),
    )
    .unwrap();
    assert!(found.online_record().unwrap().is_deleted());
    assert_eq!(found.sample_count(), 1);
}

#[test]
fn remove_sample_without_positive_match_changes_nothing() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    facade
        .train(&[span("kept clause"), span("other clause")], &[true, false], &[])
        .unwrap();
    let before = stored_model(&engine, &facade);
    let params = facade.tag_learner().online_params();

    assert!(!facade.remove_sample(&span("never labeled")).unwrap());
    assert!(!facade.remove_sample(&span("other clause")).unwrap());

    assert_eq!(stored_model(&engine, &facade), before);
    assert_eq!(facade.tag_learner().online_params(), params);
}

#[test]
fn remove_sample_relabels_and_retrains() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    let clause = span("Company shall indemnify.");
    facade.train(std::slice::from_ref(&clause), &[true], &[]).unwrap();

    assert!(facade.remove_sample(&clause).unwrap());
    let record = facade.online_record().unwrap();
    assert_eq!(record.samples().len(), 1);
    assert_eq!(record.positive_sample_count(), 0);
    assert!(!facade.predict(&[clause], false).unwrap()[0].label());
}

#[test]
fn failed_model_write_leaves_state_consistent() {
    let store = Arc::new(MemoryModelStore::new());
    let engine = engine_with_store(&store);
    let mut facade = online(&engine, "X", "alice");
    facade.train(&[span("first clause")], &[true], &[]).unwrap();
    let queries = [span("second clause"), span("first clause")];
    let scores = facade.decision_function(&queries).unwrap();

    store.set_fail_writes(true);
    let err = facade.train(&[span("second clause")], &[false], &[]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Learner(LearnerError::Store(_))
    ));
    assert_eq!(facade.sample_count(), 1);
    assert_eq!(facade.decision_function(&queries).unwrap(), scores);
    let stored = engine.db().find_online("X", "alice").unwrap().unwrap();
    assert_eq!(stored.samples().len(), 1);

    store.set_fail_writes(false);
    facade.train(&[span("second clause")], &[false], &[]).unwrap();
    assert_eq!(facade.sample_count(), 2);
}

#[test]
fn failed_row_update_puts_the_previous_model_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learners.db");
    let store = Arc::new(MemoryModelStore::new());
    let engine = Engine::with_parts(
        EngineConfig::default(),
        LearnerDb::open(&path).unwrap(),
        Box::new(Arc::clone(&store)),
        Box::new(LocalLocks::new(None)),
    )
    .unwrap();
    let mut facade = online(&engine, "X", "alice");
    facade.train(&[span("first clause")], &[true], &[]).unwrap();
    let before = stored_model(&engine, &facade);

    let other = rusqlite::Connection::open(&path).unwrap();
    other
        .execute("DELETE FROM online_learners WHERE id = ?1", [facade.id().as_str()])
        .unwrap();
    let err = facade.train(&[span("second clause")], &[false], &[]).unwrap_err();
    assert!(matches!(err, EngineError::Db(LearnerDbError::Unexpected)));
    assert_eq!(facade.sample_count(), 1);
    assert_eq!(stored_model(&engine, &facade), before);
}

#[test]
fn params_without_labelled_samples_are_ignored_on_load() {
    let engine = engine();
    let mut alice = online(&engine, "X", "alice");
    alice.train(&[span("first clause")], &[true], &[]).unwrap();
    let bob = online(&engine, "X", "bob");
    let pointer = bob.online_record().unwrap().model_pointer.clone();
    engine
        .store()
        .put(&pointer, &stored_model(&engine, &alice))
        .unwrap();

    let mut bob = online(&engine, "X", "bob");
    assert!(!bob.tag_learner().has_online_model());
    assert!(!bob.predict(&[span("first clause")], false).unwrap()[0].label());
}

#[test]
fn seed_samples_train_and_persist_on_creation() {
    let engine = engine();
    let clause = span("Company shall indemnify.");
    let facade = LearnerFacade::get_or_create(
        &engine,
        "X",
        Some("alice"),
        GetOptions::default().with_samples(vec![Sample::labeled(&clause, true)]),
    )
    .unwrap();
    assert!(facade.tag_learner().has_online_model());
    assert!(stored_model(&engine, &facade).len() > 2);

    let mut reopened = online(&engine, "X", "alice");
    assert_eq!(reopened.positive_sample_count(), 1);
    assert!(reopened.predict(&[clause], false).unwrap()[0].label());
}

#[test]
fn reset_forgets_samples_and_model() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    let clause = span("Company shall indemnify.");
    facade.train(std::slice::from_ref(&clause), &[true], &[]).unwrap();
    facade.reset().unwrap();

    assert_eq!(facade.sample_count(), 0);
    assert_eq!(facade.decision_function(std::slice::from_ref(&clause)).unwrap(), vec![0.0]);
    let mut reopened = online(&engine, "X", "alice");
    assert!(!reopened.tag_learner().has_online_model());
    assert!(!reopened.predict(&[clause], false).unwrap()[0].label());
}

#[test]
fn metadata_only_access_skips_model_loading() {
    let engine = engine();
    let mut facade = online(&engine, "X", "alice");
    facade.train(&[span("a clause")], &[true], &[]).unwrap();

    let mut light = LearnerFacade::get_or_create(
        &engine,
        "X",
        Some("alice"),
        GetOptions::default().metadata_only(),
    )
    .unwrap();
    assert!(!light.tag_learner().has_online_model());
    assert_eq!(light.sample_count(), 1);
    assert_eq!(light.lock_name(), "OL_X_alice");
    assert!(light.predict(&[span("a clause")], false).unwrap()[0].label());
}

#[test]
fn pretrained_learners_reject_online_training() {
    let engine = engine();
    let mut global = LearnerFacade::get_or_create(&engine, "X", None, GetOptions::default()).unwrap();
    let err = global.train(&[span("a clause")], &[true], &[]).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(global.is_mature());
    assert_eq!(global.owner(), None);
    assert_eq!(global.lock_name(), "OL_X_global");
}

#[test]
fn online_learners_fall_back_to_the_shared_model() {
    let engine = engine();
    let (corpus, labels) = offline_corpus();
    let mut global = LearnerFacade::get_or_create(&engine, "LIABILITY", None, GetOptions::default()).unwrap();
    engine
        .locked("LIABILITY", None, |_| global.prefit(&corpus, &labels))
        .unwrap();

    let mut bob = online(&engine, "LIABILITY", "bob");
    assert!(bob.online_record().unwrap().pretrained);
    assert!(bob.is_mature());
    let shared = global.decision_function(&corpus).unwrap();
    let inherited = bob.decision_function(&corpus).unwrap();
    for (a, b) in shared.iter().zip(&inherited) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn mismatched_shared_vocabulary_degrades_to_online_only() {
    let engine = engine();
    let (corpus, labels) = offline_corpus();
    let mut global = LearnerFacade::get_or_create(&engine, "LIABILITY", None, GetOptions::default()).unwrap();
    global.prefit(&corpus, &labels).unwrap();
    let vocabulary_key = global.pretrained_record().unwrap().vectorizer_pointer.clone();
    let stale_vocabulary = engine.store().get(&vocabulary_key).unwrap();

    let mut wider = corpus.clone();
    wider.push(span("payment is due within thirty days of invoice"));
    let mut wider_labels = labels.clone();
    wider_labels.push(false);
    global.prefit(&wider, &wider_labels).unwrap();
    engine.store().put(&vocabulary_key, &stale_vocabulary).unwrap();

    let mut alice = online(&engine, "LIABILITY", "alice");
    assert!(!alice.tag_learner().has_offline_model());
    let clause = span("Company shall indemnify.");
    alice.train(std::slice::from_ref(&clause), &[true], &[]).unwrap();
    assert!(alice.predict(&[clause], false).unwrap()[0].label());
}

#[test]
fn exclusive_pretrained_models_are_private() {
    let engine = engine();
    let (corpus, labels) = offline_corpus();
    let mut global = LearnerFacade::get_or_create(
        &engine,
        "X",
        None,
        GetOptions::default().exclusive_to("alice"),
    )
    .unwrap();
    global.prefit(&corpus, &labels).unwrap();

    let alice = online(&engine, "X", "alice");
    let bob = online(&engine, "X", "bob");
    assert!(alice.online_record().unwrap().pretrained);
    assert!(alice.tag_learner().has_offline_model());
    assert!(!bob.online_record().unwrap().pretrained);
    assert!(!bob.tag_learner().has_offline_model());

    global.set_exclusivity(None).unwrap();
    assert_eq!(global.pretrained_record().unwrap().exclusivity, None);
    let bob = LearnerFacade::get_by_id(&engine, bob.id(), true).unwrap();
    assert!(bob.online_record().unwrap().pretrained);
    assert!(bob.is_mature());
    assert!(bob.tag_learner().has_offline_model());
}

#[test]
fn exclusivity_is_only_set_on_pretrained_learners() {
    let engine = engine();
    let mut alice = online(&engine, "X", "alice");
    assert!(matches!(
        alice.set_exclusivity(Some("alice")),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn pretrained_learners_are_listed_by_tag() {
    let engine = engine();
    for tag in ["TERM", "LIABILITY"] {
        LearnerFacade::get_or_create(&engine, tag, None, GetOptions::default()).unwrap();
    }
    online(&engine, "PAYMENT", "alice");
    let tags: Vec<String> = LearnerFacade::get_all_pretrained(&engine, false)
        .unwrap()
        .map(|facade| facade.unwrap().tag().to_string())
        .collect();
    assert_eq!(tags, vec!["LIABILITY", "TERM"]);
}

#[test]
fn unknown_learner_id_is_not_found() {
    let engine = engine();
    assert!(matches!(
        LearnerFacade::get_by_id(&engine, &LearnerId::new(), true),
        Err(EngineError::NotFound(_))
    ));
}

#[test]
fn predictions_can_carry_attributes() {
    let engine = engine();
    let (corpus, labels) = offline_corpus();
    let mut global = LearnerFacade::get_or_create(&engine, "X", None, GetOptions::default()).unwrap();
    global.prefit(&corpus, &labels).unwrap();
    global
        .add_attribute("party", vec!["customer".into(), "supplier".into()])
        .unwrap();
    global
        .add_attribute("untrained", vec!["a".into(), "b".into()])
        .unwrap();
    global
        .train_attribute(
            "party",
            &corpus,
            &[
                "customer".into(),
                "supplier".into(),
                "customer".into(),
                "supplier".into(),
            ],
        )
        .unwrap();

    let mut alice = online(&engine, "X", "alice");
    assert_eq!(alice.attributes().unwrap().len(), 2);
    let predictions = alice.predict(&corpus[..1], true).unwrap();
    assert_eq!(predictions.len(), 1);
    let attrs = predictions[0].attrs();
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs[0].name, "party");
    assert!(["customer", "supplier"].contains(&attrs[0].label.as_str()));
}

#[test]
fn attribute_outputs_must_be_distinct() {
    let engine = engine();
    let mut global = LearnerFacade::get_or_create(&engine, "X", None, GetOptions::default()).unwrap();
    for range in [vec!["only".to_string()], vec!["a".into(), "a".into()]] {
        assert!(matches!(
            global.add_attribute("bad", range),
            Err(EngineError::Validation(_))
        ));
    }
    let mut alice = online(&engine, "X", "alice");
    assert!(matches!(
        alice.add_attribute("party", vec!["a".into(), "b".into()]),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn get_all_filters_and_orders_by_tag() {
    let engine = engine();
    let threshold = engine.config().maturity_threshold;
    let mut mature = online(&engine, "B_TAG", "alice");
    let spans: Vec<TextSpan> = (0..threshold)
        .map(|idx| span(&format!("clause {idx}")))
        .collect();
    mature.train(&spans, &vec![true; threshold], &[]).unwrap();
    let mut inactive = online(&engine, "A_TAG", "alice");
    inactive.set_active(false).unwrap();
    let mut deleted = online(&engine, "C_TAG", "alice");
    deleted.delete().unwrap();
    online(&engine, "A_TAG", "bob");

    let tags = |options: GetAllOptions| -> Vec<String> {
        LearnerFacade::get_all(&engine, options)
            .unwrap()
            .map(|facade| {
                let facade = facade.unwrap();
                format!("{}/{}", facade.tag(), facade.owner().unwrap_or_default())
            })
            .collect()
    };

    assert_eq!(
        tags(GetAllOptions::default()),
        vec!["A_TAG/alice", "A_TAG/bob", "B_TAG/alice"]
    );
    assert_eq!(
        tags(GetAllOptions {
            user: Some("alice".into()),
            active_only: true,
            ..Default::default()
        }),
        vec!["B_TAG/alice"]
    );
    assert_eq!(
        tags(GetAllOptions {
            mature_only: true,
            ..Default::default()
        }),
        vec!["B_TAG/alice"]
    );
    assert_eq!(
        tags(GetAllOptions {
            user: Some("alice".into()),
            include_deleted: true,
            preload: false,
            ..Default::default()
        }),
        vec!["A_TAG/alice", "B_TAG/alice", "C_TAG/alice"]
    );
}

#[test]
fn blank_names_are_rejected() {
    let engine = engine();
    assert!(matches!(
        LearnerFacade::get_or_create(&engine, " ", Some("alice"), GetOptions::default()),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        LearnerFacade::get_or_create(&engine, "X", Some(""), GetOptions::default()),
        Err(EngineError::Validation(_))
    ));
}
