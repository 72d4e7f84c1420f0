#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_docs_in_private_items)]

//! Property-based tests for entity store convergence.
//!
//! Uses proptest to verify:
//! 1. Repeating any store operation immediately does not change the outcome.
//! 2. The store matches a simple ordered-list model for any operation
//!    sequence, so the final state is decided by the last effective call.
//! 3. An optimistic insert that is rolled back restores the list exactly,
//!    whatever operations ran on other entities in between.
//! 4. A `created` echo that races the create confirmation never leaves a
//!    duplicate entry.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use taskdeck::store::{EntityStore, Placement};
use taskdeck::sync::PendingMutation;
use taskdeck_proto::model::{EntityId, Task, TaskPriority, TaskStatus, UserRef};

fn task(id: &str, title: &str) -> Task {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    Task {
        id: EntityId::remote(id),
        title: title.to_string(),
        description: String::new(),
        status: TaskStatus::Todo,
        priority: TaskPriority::Medium,
        assignee: None,
        creator: UserRef {
            id: "u-1".into(),
            name: "Ana".into(),
            email: None,
        },
        created_at: at,
        updated_at: at,
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert(String, String),
    Replace(String, String),
    Remove(String),
}

/// Strategy for generating ids from a small pool so operations collide.
fn arb_id() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["t-1", "t-2", "t-3", "t-4"]).prop_map(str::to_string)
}

/// Strategy for generating store operations.
fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_id(), "[a-z]{1,6}").prop_map(|(id, title)| Op::Insert(id, title)),
        (arb_id(), "[a-z]{1,6}").prop_map(|(id, title)| Op::Replace(id, title)),
        arb_id().prop_map(Op::Remove),
    ]
}

fn apply(store: &mut EntityStore<Task>, op: &Op) {
    match op {
        Op::Insert(id, title) => {
            store.insert_one(task(id, title));
        }
        Op::Replace(id, title) => {
            store.replace_one(task(id, title));
        }
        Op::Remove(id) => {
            store.remove_one(&EntityId::remote(id.as_str()));
        }
    }
}

/// Reference model: newest first, keyed by id.
fn apply_model(model: &mut Vec<(String, String)>, op: &Op) {
    match op {
        Op::Insert(id, title) => match model.iter_mut().find(|(i, _)| i == id) {
            Some(entry) => entry.1.clone_from(title),
            None => model.insert(0, (id.clone(), title.clone())),
        },
        Op::Replace(id, title) => {
            if let Some(entry) = model.iter_mut().find(|(i, _)| i == id) {
                entry.1.clone_from(title);
            }
        }
        Op::Remove(id) => model.retain(|(i, _)| i != id),
    }
}

fn snapshot(store: &EntityStore<Task>) -> Vec<(String, String)> {
    store
        .iter()
        .map(|t| (t.id.to_string(), t.title.clone()))
        .collect()
}

proptest! {
    #[test]
    fn repeating_an_operation_is_idempotent(
        prefix in prop::collection::vec(arb_op(), 0..12),
        op in arb_op(),
    ) {
        let mut store = EntityStore::new(Placement::Front);
        for p in &prefix {
            apply(&mut store, p);
        }
        apply(&mut store, &op);
        let once = snapshot(&store);
        apply(&mut store, &op);
        prop_assert_eq!(snapshot(&store), once);
    }

    #[test]
    fn store_matches_list_model(ops in prop::collection::vec(arb_op(), 0..32)) {
        let mut store = EntityStore::new(Placement::Front);
        let mut model = Vec::new();
        for op in &ops {
            apply(&mut store, op);
            apply_model(&mut model, op);
        }
        prop_assert_eq!(snapshot(&store), model);
        prop_assert_eq!(store.len(), store.iter().count());
    }

    #[test]
    fn rolled_back_insert_restores_the_list(
        initial in prop::collection::vec(arb_id(), 0..4),
        title in "[a-z]{1,8}",
    ) {
        let mut store = EntityStore::new(Placement::Front);
        store.set_all(initial.iter().map(|id| task(id, id)));
        let before = snapshot(&store);

        let mut optimistic = task("unused", &title);
        optimistic.id = EntityId::local();
        let pending = PendingMutation::insert(&mut store, optimistic);
        prop_assert_eq!(store.len(), before.len() + 1);

        let _ = pending.roll_back(&mut store);
        prop_assert_eq!(snapshot(&store), before);
    }

    #[test]
    fn rollback_keeps_remote_changes_to_other_tasks(
        initial in prop::collection::vec(arb_id(), 1..4),
        remote_ops in prop::collection::vec(arb_op(), 0..8),
    ) {
        let mut store = EntityStore::new(Placement::Front);
        store.set_all(initial.iter().map(|id| task(id, id)));

        let mut optimistic = task("unused", "draft");
        optimistic.id = EntityId::local();
        let pending = PendingMutation::insert(&mut store, optimistic);

        let mut expected = EntityStore::new(Placement::Front);
        expected.set_all(initial.iter().map(|id| task(id, id)));
        for op in &remote_ops {
            apply(&mut store, op);
            apply(&mut expected, op);
        }

        let _ = pending.roll_back(&mut store);
        prop_assert_eq!(snapshot(&store), snapshot(&expected));
    }

    #[test]
    fn create_echo_and_confirmation_converge(echo_first in any::<bool>()) {
        let mut store = EntityStore::new(Placement::Front);
        store.set_all([task("t-1", "old")]);

        let mut optimistic = task("unused", "new");
        optimistic.id = EntityId::local();
        let pending = PendingMutation::insert(&mut store, optimistic);
        let confirmed = task("t-9", "new");

        if echo_first {
            store.insert_one(confirmed.clone());
            let _ = pending.confirm(&mut store, Some(confirmed.clone()));
        } else {
            let _ = pending.confirm(&mut store, Some(confirmed.clone()));
            store.insert_one(confirmed.clone());
        }

        prop_assert_eq!(store.len(), 2);
        prop_assert!(store.iter().all(|t| !t.id.is_local()));
        prop_assert_eq!(store.get(&EntityId::remote("t-9")), Some(&confirmed));
    }
}
