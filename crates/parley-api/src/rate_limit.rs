use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::ApiError;

/// Operations under advisory backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateConversation,
    SendMessage,
    SubmitReport,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::CreateConversation => "conversation.create",
            Action::SendMessage => "message.send",
            Action::SubmitReport => "report.submit",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Quota {
    pub max_events: usize,
    pub window_secs: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct Quotas {
    pub create_conversation: Quota,
    pub send_message: Quota,
    pub submit_report: Quota,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            create_conversation: Quota { max_events: 20, window_secs: 3600 },
            send_message: Quota { max_events: 30, window_secs: 60 },
            submit_report: Quota { max_events: 10, window_secs: 3600 },
        }
    }
}

impl Quotas {
    fn for_action(&self, action: Action) -> Quota {
        match action {
            Action::CreateConversation => self.create_conversation,
            Action::SendMessage => self.send_message,
            Action::SubmitReport => self.submit_report,
        }
    }
}

/// In-process sliding-window counter keyed by (user, action).
///
/// Advisory backpressure, not a correctness mechanism: exceeding a window
/// yields a retryable 429, never a silent drop. A multi-instance deployment
/// would need these counters in a shared store.
pub struct RateLimiter {
    quotas: Quotas,
    windows: Mutex<HashMap<(Uuid, &'static str), VecDeque<DateTime<Utc>>>>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl RateLimiter {
    pub fn new(quotas: Quotas) -> Self {
        Self {
            quotas,
            windows: Mutex::new(HashMap::new()),
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn check(&self, user_id: Uuid, action: Action) -> Result<(), ApiError> {
        let quota = self.quotas.for_action(action);
        let now = (self.clock)();
        let cutoff = now - Duration::seconds(quota.window_secs);

        let mut windows = self
            .windows
            .lock()
            .map_err(|e| anyhow::anyhow!("rate limiter lock poisoned: {}", e))?;

        let events = windows.entry((user_id, action.as_str())).or_default();
        while events.front().is_some_and(|t| *t < cutoff) {
            events.pop_front();
        }

        if events.len() >= quota.max_events {
            return Err(ApiError::RateLimited);
        }

        events.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn limiter_with_clock(quotas: Quotas, offset: Arc<AtomicI64>) -> RateLimiter {
        let base = Utc::now();
        RateLimiter::new(quotas).with_clock(Arc::new(move || {
            base + Duration::seconds(offset.load(Ordering::SeqCst))
        }))
    }

    #[test]
    fn rejects_once_window_is_full_then_recovers() {
        let offset = Arc::new(AtomicI64::new(0));
        let quotas = Quotas {
            send_message: Quota { max_events: 2, window_secs: 60 },
            ..Quotas::default()
        };
        let limiter = limiter_with_clock(quotas, offset.clone());
        let user = Uuid::new_v4();

        assert!(limiter.check(user, Action::SendMessage).is_ok());
        assert!(limiter.check(user, Action::SendMessage).is_ok());
        assert!(matches!(
            limiter.check(user, Action::SendMessage),
            Err(ApiError::RateLimited)
        ));

        // The window slides: a minute later both events have expired.
        offset.store(61, Ordering::SeqCst);
        assert!(limiter.check(user, Action::SendMessage).is_ok());
    }

    #[test]
    fn counters_are_scoped_per_user_and_action() {
        let offset = Arc::new(AtomicI64::new(0));
        let quotas = Quotas {
            send_message: Quota { max_events: 1, window_secs: 60 },
            submit_report: Quota { max_events: 1, window_secs: 60 },
            ..Quotas::default()
        };
        let limiter = limiter_with_clock(quotas, offset);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(limiter.check(alice, Action::SendMessage).is_ok());
        assert!(limiter.check(alice, Action::SendMessage).is_err());

        // Different action and different user are unaffected.
        assert!(limiter.check(alice, Action::SubmitReport).is_ok());
        assert!(limiter.check(bob, Action::SendMessage).is_ok());
    }
}
