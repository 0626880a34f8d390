//! Concurrency properties: the last slot is never granted twice.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::Harness;
use std::sync::Arc;
use turnstile_engine::{PaymentMethod, RegistrationOutcome};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn n_racers_for_c_slots_yield_exactly_c_grants() {
    const CAPACITY: u32 = 5;
    const RACERS: usize = 24;

    let harness = Harness::new();
    let engine = Arc::clone(&harness.engine);

    // Sub-minimum deposit: every grant confirms immediately, so the count
    // of confirmed outcomes is the count of slot grants.
    let event_id = engine.publish(harness.event(CAPACITY, 80)).await.unwrap();

    let users: Vec<_> = (0..RACERS)
        .map(|i| harness.user(&format!("Racer {i}"), 90))
        .collect();

    let mut tasks = Vec::new();
    for user in users {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.register(event_id, user, PaymentMethod::Pix).await
        }));
    }

    let mut confirmed = 0_usize;
    let mut waitlisted = 0_usize;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            RegistrationOutcome::Confirmed(_) => confirmed += 1,
            RegistrationOutcome::Waitlisted { position } => {
                assert!(position >= 1);
                waitlisted += 1;
            },
            RegistrationOutcome::PendingPayment(_) => panic!("exempt price cannot go pending"),
        }
    }

    assert_eq!(confirmed, CAPACITY as usize);
    assert_eq!(waitlisted, RACERS - CAPACITY as usize);
    assert_eq!(engine.available(event_id).await.unwrap(), 0);
    assert_eq!(engine.confirmed_count(event_id).await.unwrap(), CAPACITY);

    let status = harness
        .engine
        .waitlist_status(event_id, turnstile_engine::UserId::new())
        .await
        .unwrap();
    assert_eq!(status.queued, RACERS - CAPACITY as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn events_do_not_contend_with_each_other() {
    let harness = Harness::new();
    let engine = Arc::clone(&harness.engine);

    let event_a = engine.publish(harness.event(10, 80)).await.unwrap();
    let event_b = engine.publish(harness.event(10, 80)).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let user_a = harness.user(&format!("A{i}"), 90);
        let user_b = harness.user(&format!("B{i}"), 90);
        let engine_a = Arc::clone(&engine);
        let engine_b = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine_a.register(event_a, user_a, PaymentMethod::Pix).await
        }));
        tasks.push(tokio::spawn(async move {
            engine_b.register(event_b, user_b, PaymentMethod::Pix).await
        }));
    }

    for task in tasks {
        assert!(matches!(
            task.await.unwrap().unwrap(),
            RegistrationOutcome::Confirmed(_)
        ));
    }

    assert_eq!(engine.available(event_a).await.unwrap(), 0);
    assert_eq!(engine.available(event_b).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_cancellations_promote_each_waiter_once() {
    const CAPACITY: u32 = 4;

    let harness = Harness::new();
    let engine = Arc::clone(&harness.engine);
    let event_id = engine.publish(harness.event(CAPACITY, 80)).await.unwrap();

    let mut holders = Vec::new();
    for i in 0..CAPACITY {
        let user = harness.user(&format!("Holder {i}"), 90);
        match engine.register(event_id, user, PaymentMethod::Pix).await.unwrap() {
            RegistrationOutcome::Confirmed(reg) => holders.push(reg),
            other => panic!("expected confirmed, got {other:?}"),
        }
    }

    let waiters: Vec<_> = (0..CAPACITY)
        .map(|i| harness.user(&format!("Waiter {i}"), 90))
        .collect();
    for waiter in &waiters {
        engine
            .join_waitlist(event_id, *waiter, PaymentMethod::Pix)
            .await
            .unwrap();
    }

    // All holders cancel at once; every waiter gets exactly one slot.
    let mut tasks = Vec::new();
    for holder in holders {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine
                .cancel(
                    event_id,
                    holder.id,
                    turnstile_engine::CancellationReason::Attendee,
                )
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.available(event_id).await.unwrap(), 0);
    assert_eq!(engine.confirmed_count(event_id).await.unwrap(), CAPACITY);
    for waiter in &waiters {
        let status = engine.waitlist_status(event_id, *waiter).await.unwrap();
        assert_eq!(status.position, None, "waiter should have been promoted");
    }
}
