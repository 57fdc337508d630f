mod common;

use common::{FakeAdapter, KvMode, limits, stack};
use recipe_search_server::data::kv::FaultInjection;
use recipe_search_server::domain::quota::{QuotaReason, RequestClass, Tier};
use recipe_search_server::domain::search::SearchSource;

fn quota_stack(mode: KvMode, free_ai: u64, global_ai: u64) -> common::Stack {
    stack(
        mode,
        limits(20, free_ai, 5000, global_ai),
        FakeAdapter::empty(SearchSource::Local),
        FakeAdapter::empty(SearchSource::Tianxing),
        FakeAdapter::empty(SearchSource::Ai),
    )
}

#[tokio::test]
async fn free_user_gets_exactly_the_tier_limit() {
    let s = quota_stack(KvMode::Ready, 2, 1000);

    let first = s.quota.consume("u1", Tier::Free, RequestClass::Ai).await;
    let second = s.quota.consume("u1", Tier::Free, RequestClass::Ai).await;
    let third = s.quota.consume("u1", Tier::Free, RequestClass::Ai).await;

    assert!(first.allowed && second.allowed);
    assert!(!third.allowed);
    assert_eq!(third.reason, Some(QuotaReason::User));
    assert!(third.retry_after_secs.is_some_and(|s| s > 0 && s <= 86_400));
    assert_eq!(first.backend, "kv");
}

#[tokio::test]
async fn global_limit_is_shared_across_users() {
    let s = quota_stack(KvMode::Ready, 5, 1);

    let a = s.quota.consume("alice", Tier::Free, RequestClass::Ai).await;
    let b = s.quota.consume("bob", Tier::Free, RequestClass::Ai).await;

    assert!(a.allowed);
    assert!(!b.allowed);
    assert_eq!(b.reason, Some(QuotaReason::Global));
}

#[tokio::test]
async fn denied_consume_does_not_count() {
    let s = quota_stack(KvMode::Ready, 5, 1);

    s.quota.consume("alice", Tier::Free, RequestClass::Ai).await;
    s.quota.consume("bob", Tier::Free, RequestClass::Ai).await;

    let status = s.quota.status("bob", Tier::Free).await;
    assert_eq!(status.user.ai.used, 0);
    assert_eq!(status.global.ai.used, 1);
    assert_eq!(status.global.ai.remaining, 0);
}

#[tokio::test]
async fn classes_are_counted_separately() {
    let s = quota_stack(KvMode::Ready, 1, 1000);

    assert!(s.quota.consume("u", Tier::Free, RequestClass::Ai).await.allowed);
    assert!(s.quota.consume("u", Tier::Free, RequestClass::Web).await.allowed);

    let status = s.quota.status("u", Tier::Free).await;
    assert_eq!(status.user.ai.used, 1);
    assert_eq!(status.user.web.used, 1);
    assert_eq!(status.user.web.limit, 20);
}

#[tokio::test]
async fn fault_injected_kv_falls_back_to_memory() {
    let s = quota_stack(KvMode::Faulted(FaultInjection::all()), 2, 1000);

    let first = s.quota.consume("u1", Tier::Free, RequestClass::Ai).await;
    let second = s.quota.consume("u1", Tier::Free, RequestClass::Ai).await;
    let third = s.quota.consume("u1", Tier::Free, RequestClass::Ai).await;

    assert!(first.allowed && second.allowed);
    assert!(!third.allowed);
    assert_eq!(first.backend, "memory");
    assert!(!s.kv.is_ready());
}

#[tokio::test]
async fn disabled_kv_enforces_limits_in_process() {
    let s = quota_stack(KvMode::Disabled, 1, 1000);

    assert!(s.quota.consume("u", Tier::Free, RequestClass::Ai).await.allowed);
    let denied = s.quota.consume("u", Tier::Free, RequestClass::Ai).await;
    assert!(!denied.allowed);
    assert_eq!(denied.backend, "memory");
}

#[tokio::test]
async fn tiers_have_independent_limits() {
    let s = quota_stack(KvMode::Ready, 1, 1000);

    assert!(s.quota.consume("u", Tier::Free, RequestClass::Ai).await.allowed);
    assert!(!s.quota.consume("u", Tier::Free, RequestClass::Ai).await.allowed);
    // Same user upgraded mid-day: pro limit (50) applies to the same counter
    assert!(s.quota.consume("u", Tier::Pro, RequestClass::Ai).await.allowed);
}

async fn parallel_consumes_allow_exactly_the_limit(mode: KvMode) {
    let s = quota_stack(mode, 5, 1000);

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let quota = s.quota.clone();
            tokio::spawn(async move {
                quota.consume("u1", Tier::Free, RequestClass::Ai).await.allowed
            })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);

    let status = s.quota.status("u1", Tier::Free).await;
    assert_eq!(status.user.ai.used, 5);
}

async fn parallel_users_share_the_global_limit(mode: KvMode) {
    let s = quota_stack(mode, 5, 7);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let quota = s.quota.clone();
            tokio::spawn(async move {
                let user = format!("user{}", i);
                quota.consume(&user, Tier::Free, RequestClass::Ai).await.allowed
            })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumes_respect_user_limit_on_kv() {
    parallel_consumes_allow_exactly_the_limit(KvMode::Ready).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumes_respect_user_limit_in_process() {
    parallel_consumes_allow_exactly_the_limit(KvMode::Faulted(FaultInjection::all())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_users_respect_global_limit_on_kv() {
    parallel_users_share_the_global_limit(KvMode::Ready).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_users_respect_global_limit_in_process() {
    parallel_users_share_the_global_limit(KvMode::Faulted(FaultInjection::all())).await;
}
