//! Engine-level properties: uniqueness, batch atomicity, failure atomicity,
//! and agreement with a reference model over random operation sequences.

use bicycle_codec::{Record, Value};
use bicycle_core::{Config, CoreError, Engine, ErrorKind, IndexQuery, Request, Response};
use bicycle_storage::{InMemoryBackend, StorageError};
use bicycle_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.get("id").and_then(Value::as_integer).unwrap())
        .collect()
}

#[test]
fn example_scenario() {
    with_example_engine(|engine| {
        engine.put(EXAMPLE, example_record(1, "a@x.com")).unwrap();

        let err = engine
            .put(EXAMPLE, example_record(2, "a@x.com"))
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let found = engine
            .get_by_index(EXAMPLE, &IndexQuery::new().eq("id", 1))
            .unwrap();
        assert_eq!(found, vec![example_record(1, "a@x.com")]);

        let deleted = engine
            .delete_by_index(EXAMPLE, &IndexQuery::new().eq("email", "a@x.com"))
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(engine
            .get_by_index(EXAMPLE, &IndexQuery::new().eq("id", 1))
            .unwrap()
            .is_empty());
    });
}

#[test]
fn unique_violation_keeps_the_first_record() {
    with_example_engine(|engine| {
        engine.put(EXAMPLE, example_record(10, "same@x.com")).unwrap();
        assert!(engine
            .put(EXAMPLE, example_record(11, "same@x.com"))
            .unwrap_err()
            .is_unique_violation());

        let all = engine.get_by_index(EXAMPLE, &IndexQuery::new()).unwrap();
        assert_eq!(all, vec![example_record(10, "same@x.com")]);
        assert!(engine.verify().unwrap().is_consistent());
    });
}

#[test]
fn batch_with_a_conflict_in_the_middle_writes_nothing() {
    with_example_engine(|engine| {
        engine.put(EXAMPLE, example_record(0, "taken@x.com")).unwrap();

        let n = 10;
        let batch: Vec<Record> = (1..=n)
            .map(|id| {
                if id == n / 2 {
                    example_record(id, "taken@x.com")
                } else {
                    example_record(id, &format!("b{id}@x.com"))
                }
            })
            .collect();
        let err = engine.batch_put(EXAMPLE, batch).unwrap_err();
        assert!(err.is_unique_violation());

        assert_eq!(engine.count(EXAMPLE).unwrap(), 1);
        for id in 1..=n {
            let found = engine
                .get_by_index(EXAMPLE, &IndexQuery::new().eq("email", format!("b{id}@x.com")))
                .unwrap();
            assert!(found.is_empty(), "record {id} leaked");
        }
        assert!(engine.verify().unwrap().is_consistent());
    });
}

#[test]
fn conflicts_inside_one_batch_abort_it() {
    with_example_engine(|engine| {
        let err = engine
            .batch_put(
                EXAMPLE,
                vec![
                    example_record(1, "dup@x.com"),
                    example_record(2, "dup@x.com"),
                ],
            )
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(engine.count(EXAMPLE).unwrap(), 0);
    });
}

#[test]
fn batch_outcome_ignores_record_order() {
    for order in [[0, 1], [1, 0]] {
        with_example_engine(|engine| {
            engine
                .batch_put(
                    EXAMPLE,
                    vec![example_record(1, "a@x.com"), example_record(2, "b@x.com")],
                )
                .unwrap();

            let swap = [example_record(1, "b@x.com"), example_record(2, "a@x.com")];
            engine
                .batch_put(EXAMPLE, order.iter().map(|&i| swap[i].clone()).collect())
                .unwrap();

            let found = engine
                .get_by_index(EXAMPLE, &IndexQuery::new().eq("email", "a@x.com"))
                .unwrap();
            assert_eq!(ids(&found), [2]);
            assert!(engine.verify().unwrap().is_consistent());
        });
    }
}

#[test]
fn concurrent_puts_of_one_unique_value_commit_once() {
    let test = TestEngine::file().with_example();
    let result = stress_unique_contention(&test, 6, "race@x.com");
    assert_eq!(result.successful_ops, 1);
    assert_eq!(result.anomalies, 0);

    let test = test.reopen();
    assert_eq!(test.count(EXAMPLE).unwrap(), 1);
    assert!(test.verify().unwrap().is_consistent());
}

#[test]
fn put_then_get_by_primary_key_returns_the_record() {
    with_example_engine(|engine| {
        for id in [-5, 0, 7, i64::MAX] {
            let record = example_record(id, &format!("p{id}@x.com"));
            engine.put(EXAMPLE, record.clone()).unwrap();
            let found = engine
                .get_by_index(EXAMPLE, &IndexQuery::new().eq("id", id))
                .unwrap();
            assert_eq!(found, vec![record]);
        }
    });
}

#[test]
fn failed_commit_leaves_storage_untouched() {
    let medium = InMemoryBackend::new();
    let (backend, switch) = FailingBackend::new(Box::new(medium.clone()));
    let engine = Engine::open_with_backend(Box::new(backend), Config::new()).unwrap();
    engine.register(example_model()).unwrap();
    engine.put(EXAMPLE, example_record(1, "a@x.com")).unwrap();
    let before = medium.data();

    switch.fail_appends(true);
    let err = engine
        .batch_put(
            EXAMPLE,
            vec![example_record(2, "b@x.com"), example_record(3, "c@x.com")],
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Storage(StorageError::IoFailure(_))));
    assert_eq!(err.kind(), ErrorKind::StorageIo);
    switch.reset();

    assert_eq!(medium.data(), before);
    assert_eq!(ids(&engine.get_by_index(EXAMPLE, &IndexQuery::new()).unwrap()), [1]);
    assert!(engine
        .get_by_index(EXAMPLE, &IndexQuery::new().eq("email", "b@x.com"))
        .unwrap()
        .is_empty());

    // The engine keeps working after the failure.
    engine.put(EXAMPLE, example_record(2, "b@x.com")).unwrap();
    assert_eq!(engine.count(EXAMPLE).unwrap(), 2);
}

#[test]
fn torn_append_is_rolled_back_and_recovery_agrees() {
    let medium = InMemoryBackend::new();
    let (backend, switch) = FailingBackend::new(Box::new(medium.clone()));
    let engine = Engine::open_with_backend(Box::new(backend), Config::new()).unwrap();
    engine.register(example_model()).unwrap();
    engine.put(EXAMPLE, example_record(1, "a@x.com")).unwrap();

    switch.tear_after(8);
    assert!(engine.put(EXAMPLE, example_record(2, "b@x.com")).is_err());
    drop(engine);

    let reopened = Engine::open_with_backend(Box::new(medium), Config::new()).unwrap();
    assert_eq!(
        ids(&reopened.get_by_index(EXAMPLE, &IndexQuery::new()).unwrap()),
        [1]
    );
    assert!(reopened.verify().unwrap().is_consistent());
}

#[test]
fn closed_engine_refuses_everything() {
    let test = TestEngine::memory().with_example();
    test.put(EXAMPLE, example_record(1, "a@x.com")).unwrap();
    test.close().unwrap();

    assert!(test.put(EXAMPLE, example_record(2, "b@x.com")).unwrap_err().is_closed());
    assert!(test
        .get_by_index(EXAMPLE, &IndexQuery::new())
        .unwrap_err()
        .is_closed());
    assert!(test
        .delete_by_index(EXAMPLE, &IndexQuery::new())
        .unwrap_err()
        .is_closed());
    assert_eq!(
        test.dispatch(Request::GetByIndex {
            model: EXAMPLE.into(),
            query: IndexQuery::new(),
        })
        .error_kind(),
        Some(ErrorKind::StorageClosed)
    );
}

#[test]
fn file_engine_persists_records_and_indexes() {
    let test = TestEngine::file().with_example();
    test.batch_put(
        EXAMPLE,
        (0..20)
            .map(|id| example_record(id, &format!("f{id}@x.com")))
            .collect(),
    )
    .unwrap();
    test.delete_by_index(EXAMPLE, &IndexQuery::new().lt("id", 5))
        .unwrap();

    let test = test.reopen();
    assert_eq!(test.count(EXAMPLE).unwrap(), 15);
    let found = test
        .get_by_index(EXAMPLE, &IndexQuery::new().eq("email", "f12@x.com"))
        .unwrap();
    assert_eq!(ids(&found), [12]);
    assert!(test.verify().unwrap().is_consistent());
}

#[test]
fn contract_requests_round_trip_through_json() {
    with_example_engine(|engine| {
        let request: Request = serde_json::from_str(
            r#"{"op": "batch_put", "model": "Example",
                "records": [{"id": 1, "email": "a"}, {"id": 2, "email": "b"}]}"#,
        )
        .unwrap();
        assert_eq!(engine.dispatch(request), Response::Ok);
        assert_eq!(engine.count(EXAMPLE).unwrap(), 2);
    });
}

/// Applies `op` to the reference state. Returns false if the engine should
/// reject it with a unique violation.
fn apply(state: &mut BTreeMap<i64, String>, op: &ExampleOp) -> bool {
    fn put_all(state: &mut BTreeMap<i64, String>, records: &[(i64, String)]) -> bool {
        let mut next = state.clone();
        for (id, email) in records {
            next.insert(*id, email.clone());
        }
        let mut emails: Vec<&String> = next.values().collect();
        emails.sort();
        emails.dedup();
        let unique = emails.len() == next.len();
        if unique {
            *state = next;
        }
        unique
    }

    match op {
        ExampleOp::Put { id, email } => put_all(state, &[(*id, email.clone())]),
        ExampleOp::BatchPut { records } => put_all(state, records),
        ExampleOp::DeleteId { id } => {
            state.remove(id);
            true
        }
        ExampleOp::DeleteEmail { email } => {
            state.retain(|_, e| e != email);
            true
        }
    }
}

fn run(engine: &Engine, op: &ExampleOp) -> Result<(), CoreError> {
    match op {
        ExampleOp::Put { .. } => engine.put(EXAMPLE, op.records().remove(0)),
        ExampleOp::BatchPut { .. } => engine.batch_put(EXAMPLE, op.records()),
        ExampleOp::DeleteId { id } => engine
            .delete_by_index(EXAMPLE, &IndexQuery::new().eq("id", *id))
            .map(|_| ()),
        ExampleOp::DeleteEmail { email } => engine
            .delete_by_index(EXAMPLE, &IndexQuery::new().eq("email", email.as_str()))
            .map(|_| ()),
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn engine_agrees_with_reference_model(ops in example_ops_strategy(1, 40)) {
        let test = TestEngine::memory().with_example();
        let mut state = BTreeMap::new();

        for op in &ops {
            let accepted = apply(&mut state, op);
            match run(&test, op) {
                Ok(()) => prop_assert!(accepted, "engine accepted {:?}", op),
                Err(e) => {
                    prop_assert!(!accepted, "engine rejected {:?}: {}", op, e);
                    prop_assert!(e.is_unique_violation());
                }
            }
        }

        let expected: Vec<Record> = state
            .iter()
            .map(|(id, email)| example_record(*id, email))
            .collect();
        prop_assert_eq!(test.get_by_index(EXAMPLE, &IndexQuery::new()).unwrap(), expected);

        for (id, email) in &state {
            let found = test
                .get_by_index(EXAMPLE, &IndexQuery::new().eq("email", email.as_str()))
                .unwrap();
            prop_assert_eq!(ids(&found), vec![*id]);
        }
        prop_assert!(test.verify().unwrap().is_consistent());
    }
}
