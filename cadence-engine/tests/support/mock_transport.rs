//! Transport double that records every send and fails on demand

use std::collections::HashSet;

use async_trait::async_trait;
use cadence_engine::{EmailTransport, OutboundEmail, SendOutcome};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: Mutex<HashSet<String>>,
    fail_all: Mutex<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every send to `address` until [`Self::recover`] is called
    pub fn fail_for(&self, address: &str) {
        self.failing.lock().insert(address.to_owned());
    }

    pub fn fail_everything(&self) {
        *self.fail_all.lock() = true;
    }

    pub fn recover(&self) {
        self.failing.lock().clear();
        *self.fail_all.lock() = false;
    }

    /// Every email handed over so far, failed ones included
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().clone()
    }

    pub fn subjects_for(&self, address: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|email| email.to == address)
            .map(|email| email.subject.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl EmailTransport for MockTransport {
    async fn send(&self, email: &OutboundEmail) -> SendOutcome {
        self.sent.lock().push(email.clone());

        if *self.fail_all.lock() || self.failing.lock().contains(&email.to) {
            return SendOutcome::failed(format!("mailbox unavailable: {}", email.to));
        }

        SendOutcome::Sent {
            message_id: Some(format!("msg-{}", self.count())),
        }
    }
}
