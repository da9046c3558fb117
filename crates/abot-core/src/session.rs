//! Per-user multi-step flows.
//!
//! Each staff member can be in the middle of at most one flow (e.g. "extend
//! subscription: alias given, waiting for the number of days"). The store is
//! owned by the router state and keyed by Telegram user id.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::domain::{Lookup, UserId};

/// Commands that need an applicant and can be entered step by step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Find,
    MarkPaymentDone,
    MarkPaymentPending,
    SetSubscription,
    ExtendSubscription,
    Archive,
    Restore,
}

/// What the bot is waiting for from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    AwaitingLookup(Action),
    AwaitingDate { lookup: Lookup },
    AwaitingDays { lookup: Lookup },
}

#[derive(Debug)]
struct FlowContext {
    flow: Flow,
    touched: Instant,
}

#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    inner: Mutex<HashMap<UserId, FlowContext>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or replace) the user's flow.
    pub async fn begin(&self, user: UserId, flow: Flow) {
        self.begin_at(user, flow, Instant::now()).await
    }

    pub async fn begin_at(&self, user: UserId, flow: Flow, now: Instant) {
        let mut map = self.inner.lock().await;
        map.retain(|_, ctx| now.saturating_duration_since(ctx.touched) < self.ttl);
        map.insert(
            user,
            FlowContext {
                flow,
                touched: now,
            },
        );
    }

    /// Remove and return the user's flow unless it has expired.
    pub async fn take(&self, user: UserId) -> Option<Flow> {
        self.take_at(user, Instant::now()).await
    }

    pub async fn take_at(&self, user: UserId, now: Instant) -> Option<Flow> {
        let ctx = self.inner.lock().await.remove(&user)?;
        if now.saturating_duration_since(ctx.touched) >= self.ttl {
            return None;
        }
        Some(ctx.flow)
    }

    /// Returns `true` if a live flow was cleared.
    pub async fn clear(&self, user: UserId) -> bool {
        self.take(user).await.is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
