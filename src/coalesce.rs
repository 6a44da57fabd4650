//! In-flight call coalescing.
//!
//! Maps a request fingerprint to the pending upstream call for it, so
//! concurrent identical requests share one upstream call instead of each
//! issuing their own. The first caller registers and drives the call;
//! later callers clone the shared future and await the same settlement.
//! The entry is removed unconditionally once the call settles, success or
//! failure, so at most one upstream call per fingerprint is ever
//! outstanding.
//!
//! This is purely an in-process optimisation; it does not deduplicate
//! across separate process instances.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::cache::CachedReply;
use crate::error::ProxyError;

/// Outcome of a single-model dispatch attempt, shared between coalesced
/// callers. Both arms are `Clone`, which is what makes sharing possible.
pub type DispatchResult = Result<CachedReply, ProxyError>;

type SharedCall = Shared<BoxFuture<'static, DispatchResult>>;

/// Table of in-flight upstream calls, keyed by fingerprint.
#[derive(Default)]
pub struct InFlightTable {
    calls: Mutex<HashMap<u64, SharedCall>>,
}

impl InFlightTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `call` for `key`, coalescing onto an already registered call if
    /// one is outstanding.
    ///
    /// Returns the settled result and whether this caller joined an
    /// existing call (`true`) or registered and drove its own (`false`).
    /// A joined caller's `call` future is dropped unpolled.
    pub async fn run<F>(&self, key: u64, call: F) -> (DispatchResult, bool)
    where
        F: Future<Output = DispatchResult> + Send + 'static,
    {
        let (shared, joined) = {
            let mut calls = self.calls.lock().expect("in-flight lock poisoned");
            match calls.get(&key) {
                Some(existing) => (existing.clone(), true),
                None => {
                    let shared = call.boxed().shared();
                    calls.insert(key, shared.clone());
                    (shared, false)
                }
            }
        };

        let result = shared.await;

        // The registering caller deregisters after settlement, success or
        // failure alike. Joined callers must not: a new call for the same
        // key may already have been registered by then.
        if !joined {
            self.calls
                .lock()
                .expect("in-flight lock poisoned")
                .remove(&key);
        }

        (result, joined)
    }

    /// Number of currently outstanding calls.
    pub fn len(&self) -> usize {
        self.calls.lock().expect("in-flight lock poisoned").len()
    }

    /// Whether no calls are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ok_reply(text: &str) -> DispatchResult {
        Ok(CachedReply {
            body: serde_json::json!({ "text": text }),
            model: "m".to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_call() {
        let table = Arc::new(InFlightTable::new());
        let calls = Arc::new(AtomicU32::new(0));

        let make = |text: &'static str| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                ok_reply(text)
            }
        };

        let (first, second) =
            tokio::join!(table.run(9, make("first")), table.run(9, make("second")));

        assert_eq!(calls.load(Ordering::SeqCst), 1, "one upstream invocation");
        let (first, first_joined) = first;
        let (second, second_joined) = second;
        assert_eq!(first.unwrap().body, second.unwrap().body);
        // Exactly one of the two joined the other's call.
        assert_ne!(first_joined, second_joined);
        assert!(table.is_empty(), "entry removed after settlement");
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_shared_and_deregistered() {
        let table = Arc::new(InFlightTable::new());

        let failing = |details: &'static str| async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Err(ProxyError::Upstream {
                status: 503,
                details: details.to_string(),
            })
        };

        let (first, second) =
            tokio::join!(table.run(3, failing("boom")), table.run(3, failing("other")));

        let (first, _) = first;
        let (second, _) = second;
        let first = first.unwrap_err();
        let second = second.unwrap_err();
        match (&first, &second) {
            (
                ProxyError::Upstream { details: a, .. },
                ProxyError::Upstream { details: b, .. },
            ) => assert_eq!(a, b, "both observe the same eventual failure"),
            other => panic!("unexpected errors: {other:?}"),
        }
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_run_independently() {
        let table = Arc::new(InFlightTable::new());
        let calls = Arc::new(AtomicU32::new(0));

        let make = || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                ok_reply("x")
            }
        };

        let ((_, a_joined), (_, b_joined)) = tokio::join!(table.run(1, make()), table.run(2, make()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!a_joined);
        assert!(!b_joined);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_calls_do_not_coalesce() {
        let table = InFlightTable::new();
        let (_, joined) = table.run(5, async { ok_reply("a") }).await;
        assert!(!joined);
        let (_, joined) = table.run(5, async { ok_reply("b") }).await;
        assert!(!joined, "the first call settled before the second began");
    }
}
