//! Token exchange that counts calls and mints fresh pairs.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_core::{CredentialPair, Environment, RefreshError, TokenExchange};

use crate::{sim_env::SimEnv, tokens::mint_token};

/// Lifetime of minted access tokens.
pub const ACCESS_LIFETIME: Duration = Duration::from_secs(3600);

/// Lifetime of minted refresh tokens.
pub const REFRESH_LIFETIME: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Debug)]
struct ExchangeState {
    calls: AtomicUsize,
    presented: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<RefreshError>>,
    delay: Mutex<Option<Duration>>,
    keep_refresh: AtomicBool,
}

/// [`TokenExchange`] double.
///
/// Call `n` (1-based) succeeds with the pair `access-n`/`refresh-n`, valid
/// from the environment's current wall time, unless a failure was queued with
/// [`fail_next`](Self::fail_next). Clones share state.
#[derive(Debug, Clone)]
pub struct CountingExchange {
    env: SimEnv,
    state: Arc<ExchangeState>,
}

impl CountingExchange {
    /// Exchange minting tokens against `env`'s wall clock.
    pub fn new(env: SimEnv) -> Self {
        Self {
            env,
            state: Arc::new(ExchangeState {
                calls: AtomicUsize::new(0),
                presented: Mutex::new(Vec::new()),
                failures: Mutex::new(VecDeque::new()),
                delay: Mutex::new(None),
                keep_refresh: AtomicBool::new(false),
            }),
        }
    }

    /// Hold every exchange for `delay` before answering.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.state.delay.lock() = Some(delay);
        self
    }

    /// Answer with a new access token but hand back the presented refresh
    /// token unchanged, like backends that do not rotate refresh tokens.
    #[must_use]
    pub fn keeping_refresh_token(self) -> Self {
        self.state.keep_refresh.store(true, Ordering::SeqCst);
        self
    }

    /// Fail the next exchange with `error`. Queued failures are consumed in
    /// order.
    pub fn fail_next(&self, error: RefreshError) {
        self.state.failures.lock().push_back(error);
    }

    /// Exchanges performed so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented, in call order.
    pub fn presented(&self) -> Vec<String> {
        self.state.presented.lock().clone()
    }

    /// Pair a successful call `n` returns, minted at the current wall time.
    pub fn pair_for_call(&self, n: usize) -> CredentialPair {
        let now = self.env.unix_time();
        CredentialPair::new(
            mint_token(now + ACCESS_LIFETIME.as_secs(), &format!("access-{n}")),
            mint_token(now + REFRESH_LIFETIME.as_secs(), &format!("refresh-{n}")),
        )
    }
}

#[async_trait]
impl TokenExchange for CountingExchange {
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialPair, RefreshError> {
        let n = self.state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.presented.lock().push(refresh_token.to_string());
        tracing::debug!(call = n, "token exchange");

        let delay = *self.state.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.state.failures.lock().pop_front();
        match failure {
            Some(error) => Err(error),
            None if self.state.keep_refresh.load(Ordering::SeqCst) => {
                let minted = self.pair_for_call(n);
                Ok(CredentialPair::new(minted.access_token, refresh_token))
            },
            None => Ok(self.pair_for_call(n)),
        }
    }
}
