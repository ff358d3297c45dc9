//! Concurrent access tests
//!
//! These tests verify that counters and status changes stay exact when many
//! requests race on one account or one payment. Every state change is a
//! single conditional statement, so no update may be lost or doubled.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use tokio::task::JoinSet;
use uuid::Uuid;

use remit_core::config::Config;
use remit_core::ports::{Clock, ManualClock, Repository, StoredUser};
use remit_core::services::{
    CreatePaymentRequest, LoginRequest, RegisterRequest, StatusChange, UpdateProfileRequest,
};
use remit_core::{Error, PaymentStatus, RemitContext, Role};

/// Concurrent requests per test
const TASK_COUNT: u32 = 12;

const PASSWORD: &str = "Str0ng!Passw0rd#";

fn registration(username: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: PASSWORD.to_string(),
        full_name: None,
        id_number: None,
        account_number: None,
    }
}

fn login(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        login: username.to_string(),
        password: password.to_string(),
        account_number: None,
    }
}

fn open(dir: &TempDir, config: Config) -> (Arc<RemitContext>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let ctx = RemitContext::open(dir.path(), config, clock.clone()).expect("Failed to open context");
    (Arc::new(ctx), clock)
}

/// N simultaneous failed logins below the threshold increment by exactly N
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_counted_exactly() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::for_tests();
    config.lockout_threshold = 100;
    let (ctx, _clock) = open(&dir, config);
    let id = ctx.auth.register(&registration("sipho")).await.unwrap().id;

    let mut tasks = JoinSet::new();
    for _ in 0..TASK_COUNT {
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move { ctx.auth.login(&login("sipho", "Wr0ng!Passw0rd#")).await });
    }
    while let Some(joined) = tasks.join_next().await {
        assert!(joined.unwrap().is_err());
    }

    let stored = ctx.repository.find_user_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.login_attempts, TASK_COUNT);
    assert!(stored.lock_until.is_none());
}

/// Racing past the threshold locks exactly once and never over-counts
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_crossing_threshold() {
    let dir = TempDir::new().unwrap();
    let (ctx, _clock) = open(&dir, Config::for_tests());
    let id = ctx.auth.register(&registration("sipho")).await.unwrap().id;

    let mut tasks = JoinSet::new();
    for _ in 0..TASK_COUNT {
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move { ctx.auth.login(&login("sipho", "Wr0ng!Passw0rd#")).await });
    }
    let mut locked_responses = 0;
    while let Some(joined) = tasks.join_next().await {
        if let Err(Error::AccountLocked) = joined.unwrap() {
            locked_responses += 1;
        }
    }

    let stored = ctx.repository.find_user_by_id(id).await.unwrap().unwrap();
    assert!(stored.lock_until.is_some());
    // Failures after the lock was written are not counted
    assert_eq!(stored.login_attempts, 0);
    assert!(locked_responses <= TASK_COUNT - 5);
}

/// Repository-level race: the conditional update is the only writer
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repository_counter_race() {
    let dir = TempDir::new().unwrap();
    let (ctx, clock) = open(&dir, Config::for_tests());
    let repo = Arc::clone(&ctx.repository);
    let now = clock.now();
    let id = Uuid::new_v4();
    repo.insert_user(&StoredUser {
        id,
        username: "lerato".to_string(),
        email: "lerato@example.com".to_string(),
        password_hash: "$2b$04$placeholder".to_string(),
        role: "customer".to_string(),
        login_attempts: 0,
        lock_until: None,
        full_name_enc: None,
        id_number_enc: None,
        account_number_enc: None,
        last_login_at: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
    .await
    .unwrap();

    let threshold = 10;
    let mut tasks = JoinSet::new();
    for _ in 0..(threshold * 2) {
        let repo = Arc::clone(&repo);
        tasks.spawn(async move {
            repo.record_failed_login(id, threshold, now + Duration::minutes(30), now)
                .await
                .unwrap()
        });
    }
    let mut locks = 0;
    let mut counted = 0;
    let mut rejected = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Some(update) if update.lock_until.is_some() => locks += 1,
            Some(_) => counted += 1,
            None => rejected += 1,
        }
    }
    assert_eq!(locks, 1);
    assert_eq!(counted, threshold - 1);
    assert_eq!(rejected, threshold);
}

/// Two admins moving the same payment: exactly one wins
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_status_updates_single_winner() {
    let dir = TempDir::new().unwrap();
    let (ctx, _clock) = open(&dir, Config::for_tests());
    ctx.auth.register(&registration("thandi")).await.unwrap();
    ctx.auth
        .register_as(&registration("ops.admin"), Role::Admin)
        .await
        .unwrap();
    let customer = ctx.auth.login(&login("thandi", PASSWORD)).await.unwrap().claims;
    let admin = ctx.auth.login(&login("ops.admin", PASSWORD)).await.unwrap().claims;

    let request = CreatePaymentRequest {
        amount: "42.00".to_string(),
        currency: "ZAR".to_string(),
        beneficiary_name: "Naledi Mokoena".to_string(),
        beneficiary_account: "1234567890".to_string(),
        swift_code: "SBZAZAJJ".to_string(),
        beneficiary_country: "ZA".to_string(),
        reference: None,
    };
    let id = ctx.payments.submit(&customer, &request).await.unwrap().id;

    let mut tasks = JoinSet::new();
    for target in [PaymentStatus::Processing, PaymentStatus::OnHold] {
        for _ in 0..(TASK_COUNT / 2) {
            let ctx = Arc::clone(&ctx);
            let admin = admin.clone();
            tasks.spawn(async move {
                ctx.payments
                    .update_status(&admin, id, StatusChange::to(target))
                    .await
            });
        }
    }

    let mut winners = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(payment) => winners.push(payment.status),
            Err(Error::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    // on_hold -> processing is a legal follow-up, so at most one of each
    let count = |s: PaymentStatus| winners.iter().filter(|w| **w == s).count();
    assert!(count(PaymentStatus::Processing) <= 1);
    assert!(count(PaymentStatus::OnHold) <= 1);
    assert!(!winners.is_empty());

    let final_status = ctx.payments.get(&admin, id).await.unwrap().status;
    if count(PaymentStatus::Processing) == 1 {
        assert_eq!(final_status, PaymentStatus::Processing);
    } else {
        assert_eq!(final_status, PaymentStatus::OnHold);
    }
}

/// Five registrations of one username: one account exists afterwards
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_registration() {
    let dir = TempDir::new().unwrap();
    let (ctx, _clock) = open(&dir, Config::for_tests());

    let mut tasks = JoinSet::new();
    for _ in 0..5 {
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move { ctx.auth.register(&registration("naledi")).await });
    }
    let mut created = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert!(matches!(e, Error::Conflict(_))),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(ctx.repository.list_users().await.unwrap().len(), 1);
}

/// A key rotation sweep racing profile edits never reverts an edit
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rotation_sweep_keeps_concurrent_profile_edits() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let usernames: Vec<String> = (0..TASK_COUNT).map(|i| format!("user{:02}", i)).collect();
    {
        let ctx = RemitContext::open(dir.path(), Config::for_tests(), clock.clone()).unwrap();
        for name in &usernames {
            let mut req = registration(name);
            req.full_name = Some("Original Name".to_string());
            ctx.auth.register(&req).await.unwrap();
        }
        ctx.auth
            .register_as(&registration("ops.admin"), Role::Admin)
            .await
            .unwrap();
    }

    let mut rotated = Config::for_tests();
    rotated.encryption_key_id = "k2".to_string();
    rotated.encryption_secret = "rotated-encryption-secret-0123456789abcdef".to_string();
    rotated.retired_keys = vec![("k1".to_string(), Config::for_tests().encryption_secret)];
    let ctx = Arc::new(RemitContext::open(dir.path(), rotated, clock.clone()).unwrap());

    let admin = ctx.auth.login(&login("ops.admin", PASSWORD)).await.unwrap().claims;
    let mut sessions = Vec::new();
    for name in &usernames {
        sessions.push(ctx.auth.login(&login(name, PASSWORD)).await.unwrap().claims);
    }

    let mut tasks = JoinSet::new();
    {
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move {
            ctx.auth.rotate_keys(&admin).await.map(|_| ())
        });
    }
    for claims in sessions {
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move {
            let req = UpdateProfileRequest {
                full_name: Some("Edited Name".to_string()),
                ..UpdateProfileRequest::default()
            };
            ctx.auth.update_profile(&claims, &req).await.map(|_| ())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    for name in &usernames {
        let stored = ctx.repository.find_user_by_login(name).await.unwrap().unwrap();
        assert!(stored.full_name_enc.as_deref().unwrap().starts_with("k2:"));
        let claims = ctx.auth.login(&login(name, PASSWORD)).await.unwrap().claims;
        let profile = ctx.auth.current_user(&claims).await.unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Edited Name"), "edit lost for {}", name);
    }
}
