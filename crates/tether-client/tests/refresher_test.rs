//! Credential refresher tests.
//!
//! Covers single-flight deduplication, the pre-network refresh token expiry
//! check, and failure mapping.

use std::{sync::Arc, time::Duration};

use tether_client::{CredentialRefresher, CredentialStore, MemoryStore};
use tether_core::{CredentialPair, Environment, RefreshError, SupervisorError, TokenClaims};
use tether_harness::{CountingExchange, SimEnv, mint_token};

type Refresher = CredentialRefresher<MemoryStore, CountingExchange, SimEnv>;

fn refresher(access_offset: i64, refresh_offset: i64) -> (Arc<Refresher>, CountingExchange, SimEnv) {
    let env = SimEnv::new();
    let now = env.unix_time();
    let pair = CredentialPair::new(
        mint_token(now.saturating_add_signed(access_offset), "access-0"),
        mint_token(now.saturating_add_signed(refresh_offset), "refresh-0"),
    );
    let exchange = CountingExchange::new(env.clone()).with_delay(Duration::from_millis(200));
    let store = CredentialStore::new(MemoryStore::with_pair(&pair), env.clone());
    (Arc::new(CredentialRefresher::new(store, exchange.clone())), exchange, env)
}

fn subject(token: &str) -> String {
    TokenClaims::decode(token).unwrap().sub.unwrap()
}

#[tokio::test(start_paused = true)]
async fn valid_access_token_is_returned_without_refresh() {
    let (refresher, exchange, _) = refresher(3600, 86_400);

    let token = refresher.ensure_fresh(false).await.unwrap();

    assert_eq!(subject(&token), "access-0");
    assert_eq!(exchange.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_ignores_validity() {
    let (refresher, exchange, _) = refresher(3600, 86_400);

    let token = refresher.ensure_fresh(true).await.unwrap();

    assert_eq!(subject(&token), "access-1");
    assert_eq!(exchange.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_share_one_exchange() {
    let (refresher, exchange, _) = refresher(-10, 86_400);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let refresher = Arc::clone(&refresher);
            tokio::spawn(async move { refresher.ensure_fresh(false).await })
        })
        .collect();

    let mut tokens = Vec::new();
    for task in tasks {
        tokens.push(task.await.unwrap().unwrap());
    }

    assert_eq!(exchange.calls(), 1);
    assert!(tokens.iter().all(|token| subject(token) == "access-1"));

    let stored = refresher.store().read().await.unwrap();
    assert_eq!(subject(&stored.refresh_token), "refresh-1");
}

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_share_one_exchange_without_rotation() {
    let env = SimEnv::new();
    let now = env.unix_time();
    let refresh_token = mint_token(now + 86_400, "refresh-0");
    let pair = CredentialPair::new(mint_token(now - 10, "access-0"), refresh_token.clone());
    let exchange = CountingExchange::new(env.clone())
        .with_delay(Duration::from_millis(200))
        .keeping_refresh_token();
    let store = CredentialStore::new(MemoryStore::with_pair(&pair), env);
    let refresher = Arc::new(CredentialRefresher::new(store, exchange.clone()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let refresher = Arc::clone(&refresher);
            tokio::spawn(async move { refresher.ensure_fresh(false).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(subject(&task.await.unwrap().unwrap()), "access-1");
    }

    assert_eq!(exchange.calls(), 1);
    let stored = refresher.store().read().await.unwrap();
    assert_eq!(stored.refresh_token, refresh_token);
}

#[tokio::test(start_paused = true)]
async fn concurrent_forced_refreshes_share_one_exchange() {
    let (refresher, exchange, _) = refresher(3600, 86_400);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let refresher = Arc::clone(&refresher);
            tokio::spawn(async move { refresher.ensure_fresh(true).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(subject(&task.await.unwrap().unwrap()), "access-1");
    }
    assert_eq!(exchange.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn sequential_refreshes_rotate_tokens() {
    let (refresher, exchange, _) = refresher(3600, 86_400);

    refresher.refresh().await.unwrap();
    let second = refresher.refresh().await.unwrap();

    assert_eq!(exchange.calls(), 2);
    assert_eq!(subject(&second.access_token), "access-2");
    assert_eq!(subject(&exchange.presented()[1]), "refresh-1");
}

#[tokio::test(start_paused = true)]
async fn expired_refresh_token_fails_before_exchange() {
    let (refresher, exchange, _) = refresher(-10, -1);

    let error = refresher.ensure_fresh(false).await.unwrap_err();

    assert_eq!(error, SupervisorError::RefreshTokenExpired);
    assert_eq!(exchange.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_token_ages_with_the_clock() {
    let (refresher, exchange, env) = refresher(-10, 30);
    env.shift_wall_clock(31);

    assert_eq!(refresher.refresh().await.unwrap_err(), SupervisorError::RefreshTokenExpired);
    assert_eq!(exchange.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_exchange_keeps_stored_pair() {
    let (refresher, exchange, _) = refresher(-10, 86_400);
    exchange.fail_next(RefreshError::Rejected);

    let error = refresher.ensure_fresh(false).await.unwrap_err();

    assert_eq!(error, SupervisorError::RefreshFailed(RefreshError::Rejected));
    let stored = refresher.store().read().await.unwrap();
    assert_eq!(subject(&stored.access_token), "access-0");
}

#[tokio::test(start_paused = true)]
async fn missing_credential_is_reported() {
    let env = SimEnv::new();
    let exchange = CountingExchange::new(env.clone());
    let refresher =
        CredentialRefresher::new(CredentialStore::new(MemoryStore::new(), env), exchange.clone());

    assert_eq!(refresher.ensure_fresh(false).await.unwrap_err(), SupervisorError::NoCredential);
    assert_eq!(refresher.refresh().await.unwrap_err(), SupervisorError::NoCredential);
    assert_eq!(exchange.calls(), 0);
}
