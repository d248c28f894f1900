//! Answer reconciliation: at most one answer per question.
//!
//! Several local triggers can race to submit an answer for the same
//! question (a selection held stable long enough, a time-pressure
//! shortcut, the forced time-up fallback). [`AnswerSlot`] is the single
//! gate between those triggers and the transport: the first accepted
//! proposal wins, later proposals are silently dropped, and a failed
//! send retries the *same* value with bounded exponential backoff.

use std::time::{Duration, Instant};

/// Which local trigger produced a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerTrigger {
    /// Selection held stable past the hover threshold.
    StableHover,
    /// Selection grabbed as the timer ran low.
    TimePressure,
    /// Forced fallback when the timer expired.
    TimeUp,
}

/// Retry policy for failed sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total send attempts, the initial send included.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following the `attempt`-th failed send
    /// (1-based): base, doubled per failure, capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay)
    }
}

/// Delivery state of the accepted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Handed to the transport; assumed delivered unless a failure
    /// comes back.
    Sent,
    /// A send failed; a retry of the same value is scheduled.
    AwaitingRetry,
    /// Retries exhausted; the answer never left this client.
    Unsent,
}

/// The single accepted answer for the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    pub value: String,
    pub trigger: AnswerTrigger,
    /// Send attempts made so far (the initial send counts).
    pub attempts: u32,
    pub state: SendState,
    retry_at: Option<Instant>,
}

/// Outcome of recording a send failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The same value will be offered again by `retry_due` at `at`.
    Scheduled { at: Instant },
    /// Attempt budget exhausted; the answer stays unsent.
    GaveUp,
}

/// Per-question answer gate. Reset on question change and on leaving
/// the room.
#[derive(Debug, Clone, Default)]
pub struct AnswerSlot {
    policy: RetryPolicy,
    pending: Option<PendingAnswer>,
}

impl AnswerSlot {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, pending: None }
    }

    /// Offer a candidate answer. Returns the value to hand to the
    /// transport if this is the first proposal for the question;
    /// `None` means an answer was already accepted (any trigger, any
    /// value) and this one is dropped.
    pub fn propose(&mut self, value: String, trigger: AnswerTrigger) -> Option<&str> {
        if self.pending.is_some() {
            return None;
        }
        self.pending = Some(PendingAnswer {
            value,
            trigger,
            attempts: 1,
            state: SendState::Sent,
            retry_at: None,
        });
        self.pending.as_ref().map(|p| p.value.as_str())
    }

    /// Record that the last send attempt failed. Schedules a retry of
    /// the same value, or gives up once the attempt budget is spent.
    /// Returns `None` if nothing was in flight (stale failure).
    pub fn mark_send_failed(&mut self, now: Instant) -> Option<RetryOutcome> {
        let pending = self.pending.as_mut()?;
        if pending.state != SendState::Sent {
            return None;
        }
        if pending.attempts >= self.policy.max_attempts {
            pending.state = SendState::Unsent;
            pending.retry_at = None;
            return Some(RetryOutcome::GaveUp);
        }
        let at = now + self.policy.delay_after(pending.attempts);
        pending.state = SendState::AwaitingRetry;
        pending.retry_at = Some(at);
        Some(RetryOutcome::Scheduled { at })
    }

    /// If a scheduled retry has come due, consume it: returns the value
    /// to resend and counts the attempt.
    pub fn retry_due(&mut self, now: Instant) -> Option<String> {
        let pending = self.pending.as_mut()?;
        if pending.state == SendState::AwaitingRetry
            && pending.retry_at.is_some_and(|at| at <= now)
        {
            pending.attempts += 1;
            pending.state = SendState::Sent;
            pending.retry_at = None;
            return Some(pending.value.clone());
        }
        None
    }

    /// Whether a proposal has been accepted for the current question.
    pub fn answered(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether retries were exhausted without a successful send.
    pub fn gave_up(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| p.state == SendState::Unsent)
    }

    pub fn pending(&self) -> Option<&PendingAnswer> {
        self.pending.as_ref()
    }

    /// New question (or left the room): forget everything.
    pub fn reset(&mut self) {
        self.pending = None;
    }
}
