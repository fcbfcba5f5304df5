// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client transaction matching.
//!
//! Each outbound request carries a fresh Via branch; the registry pairs
//! the eventual final response with the waiter that sent the request.
//! Cancelled or timed-out entries are simply removed — a late final
//! response then finds no waiter and is absorbed, which is exactly the
//! behaviour stopping an in-flight recording needs.

use std::time::Duration;

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::sync::oneshot;
use tracing::debug;

use siprec_core::{branch_from_via, cseq_of, top_via, Method, Response};

/// Terminal state of one client transaction.
#[derive(Debug)]
pub enum TransactionOutcome {
    /// A final (non-1xx) response arrived.
    Final(Response),
    /// No final response within the allowed time.
    TimedOut,
    /// The transaction was cancelled locally.
    Cancelled,
}

struct PendingEntry {
    method: Method,
    tx: oneshot::Sender<Response>,
}

/// Branch-keyed map of in-flight client transactions.
#[derive(Default)]
pub struct TransactionRegistry {
    pending: DashMap<SmolStr, PendingEntry>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transaction about to be sent with the given Via branch.
    pub fn register(&self, branch: SmolStr, method: Method) -> PendingTransaction {
        let (tx, rx) = oneshot::channel();
        self.pending
            .insert(branch.clone(), PendingEntry { method, tx });
        PendingTransaction { branch, rx }
    }

    /// Routes a response to its waiter. Provisional responses are ignored
    /// (the waiter only cares about finals). Returns false when the
    /// response matched no transaction and was absorbed.
    pub fn complete(&self, response: &Response) -> bool {
        if response.is_provisional() {
            return true;
        }
        let branch = match top_via(&response.headers).and_then(|via| branch_from_via(via)) {
            Some(branch) => SmolStr::new(branch.to_owned()),
            None => {
                debug!("response without Via branch absorbed");
                return false;
            }
        };
        let method = cseq_of(&response.headers).map(|(_, method)| method);

        let matched = match self.pending.get(&branch) {
            Some(entry) => Some(&entry.method) == method.as_ref(),
            None => false,
        };
        if !matched {
            debug!(%branch, "no waiter for response, absorbed");
            return false;
        }

        if let Some((_, entry)) = self.pending.remove(&branch) {
            let _ = entry.tx.send(response.clone());
        }
        true
    }

    /// Cancels the transaction with the given branch. The waiter resolves
    /// to [`TransactionOutcome::Cancelled`]; a late final response will be
    /// absorbed.
    pub fn cancel(&self, branch: &str) -> bool {
        self.pending.remove(branch).is_some()
    }

    /// Cancels every in-flight transaction.
    pub fn cancel_all(&self) {
        self.pending.clear();
    }

    /// Number of in-flight transactions.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Waiter side of one registered transaction.
pub struct PendingTransaction {
    branch: SmolStr,
    rx: oneshot::Receiver<Response>,
}

impl PendingTransaction {
    /// The Via branch identifying this transaction.
    pub fn branch(&self) -> &SmolStr {
        &self.branch
    }

    /// Waits for the final response, bounded by `timeout`.
    pub async fn wait(self, timeout: Duration) -> TransactionOutcome {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(response)) => TransactionOutcome::Final(response),
            Ok(Err(_)) => TransactionOutcome::Cancelled,
            Err(_) => TransactionOutcome::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use siprec_core::{Headers, StatusLine};

    fn response(branch: &str, cseq: &str, code: u16) -> Response {
        let mut headers = Headers::new();
        headers.push("Via", format!("SIP/2.0/UDP host;branch={}", branch));
        headers.push("CSeq", cseq);
        headers.push("Call-ID", "c1");
        Response::new(StatusLine::new(code, "OK"), headers, Bytes::new())
    }

    #[tokio::test]
    async fn final_response_reaches_waiter() {
        let registry = TransactionRegistry::new();
        let pending = registry.register(SmolStr::new("z9hG4bK1"), Method::Invite);

        assert!(registry.complete(&response("z9hG4bK1", "1 INVITE", 200)));
        match pending.wait(Duration::from_millis(100)).await {
            TransactionOutcome::Final(resp) => assert_eq!(resp.code(), 200),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn provisionals_do_not_consume_the_waiter() {
        let registry = TransactionRegistry::new();
        let pending = registry.register(SmolStr::new("z9hG4bK2"), Method::Invite);

        assert!(registry.complete(&response("z9hG4bK2", "1 INVITE", 100)));
        assert_eq!(registry.len(), 1);
        assert!(registry.complete(&response("z9hG4bK2", "1 INVITE", 200)));
        match pending.wait(Duration::from_millis(100)).await {
            TransactionOutcome::Final(resp) => assert_eq!(resp.code(), 200),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancelled_waiter_observes_cancellation() {
        let registry = TransactionRegistry::new();
        let pending = registry.register(SmolStr::new("z9hG4bK3"), Method::Invite);

        assert!(registry.cancel("z9hG4bK3"));
        match pending.wait(Duration::from_millis(100)).await {
            TransactionOutcome::Cancelled => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
        // The late final is absorbed.
        assert!(!registry.complete(&response("z9hG4bK3", "1 INVITE", 487)));
    }

    #[tokio::test]
    async fn waiter_times_out_without_response() {
        let registry = TransactionRegistry::new();
        let pending = registry.register(SmolStr::new("z9hG4bK4"), Method::Options);

        tokio::time::pause();
        let wait = tokio::spawn(pending.wait(Duration::from_millis(1000)));
        tokio::time::advance(Duration::from_millis(1001)).await;
        match wait.await.unwrap() {
            TransactionOutcome::TimedOut => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn method_mismatch_is_absorbed() {
        let registry = TransactionRegistry::new();
        let _pending = registry.register(SmolStr::new("z9hG4bK5"), Method::Invite);
        assert!(!registry.complete(&response("z9hG4bK5", "1 OPTIONS", 200)));
        assert_eq!(registry.len(), 1);
    }
}
