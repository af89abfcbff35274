//! Delayed actions keyed by typed tokens, cancellable until they fire.
//!
//! The registry never runs anything itself. `poll` hands back the actions
//! whose deadline has passed and the owner executes them on its own context,
//! checking `is_canceled` right before each one so an action canceled by an
//! earlier action of the same batch is still suppressed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DebounceToken(u64);

impl DebounceToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct Pending<A> {
    token: DebounceToken,
    deadline: Instant,
    action: A,
}

#[derive(Debug)]
pub struct DebounceRegistry<A> {
    next_token: u64,
    pending: Vec<Pending<A>>,
    // token -> eviction deadline
    canceled: HashMap<DebounceToken, Instant>,
    grace: Duration,
}

impl<A> DebounceRegistry<A> {
    pub fn new(grace: Duration) -> Self {
        Self {
            next_token: 1,
            pending: Vec::new(),
            canceled: HashMap::new(),
            grace,
        }
    }

    /// Allocates a token without scheduling anything yet.
    pub fn issue(&mut self) -> DebounceToken {
        let t = DebounceToken(self.next_token);
        self.next_token += 1;
        t
    }

    pub fn schedule(&mut self, token: DebounceToken, now: Instant, delay: Duration, action: A) {
        self.pending.retain(|p| p.token != token);
        self.pending.push(Pending {
            token,
            deadline: now + delay,
            action,
        });
    }

    pub fn schedule_new(&mut self, now: Instant, delay: Duration, action: A) -> DebounceToken {
        let token = self.issue();
        self.schedule(token, now, delay, action);
        token
    }

    /// Invalidates `token`. Harmless when it already fired or was never scheduled.
    pub fn cancel(&mut self, token: DebounceToken, now: Instant) {
        self.pending.retain(|p| p.token != token);
        self.canceled.insert(token, now + self.grace);
    }

    pub fn is_canceled(&self, token: DebounceToken) -> bool {
        self.canceled.contains_key(&token)
    }

    pub fn is_pending(&self, token: DebounceToken) -> bool {
        self.pending.iter().any(|p| p.token == token)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn canceled_len(&self) -> usize {
        self.canceled.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.deadline).min()
    }

    /// Removes and returns every live action due at `now`, earliest first.
    pub fn poll(&mut self, now: Instant) -> Vec<(DebounceToken, A)> {
        let (mut due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.deadline <= now);
        self.pending = rest;
        due.sort_by(|a, b| a.deadline.cmp(&b.deadline).then(a.token.cmp(&b.token)));

        let fired = due
            .into_iter()
            .filter(|p| !self.canceled.contains_key(&p.token))
            .map(|p| (p.token, p.action))
            .collect();

        self.canceled.retain(|_, evict_at| *evict_at > now);
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(200);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn fires_once_after_delay() {
        let t0 = Instant::now();
        let mut reg = DebounceRegistry::new(GRACE);
        let tok = reg.schedule_new(t0, ms(500), "click");

        assert!(reg.poll(t0 + ms(499)).is_empty());
        assert_eq!(reg.poll(t0 + ms(500)), vec![(tok, "click")]);
        assert!(reg.poll(t0 + ms(2000)).is_empty());
        assert!(!reg.is_pending(tok));
    }

    #[test]
    fn cancel_before_deadline_suppresses() {
        let t0 = Instant::now();
        let mut reg = DebounceRegistry::new(GRACE);
        let tok = reg.schedule_new(t0, ms(500), ());
        reg.cancel(tok, t0 + ms(100));
        assert!(reg.is_canceled(tok));
        assert!(reg.poll(t0 + ms(600)).is_empty());
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let t0 = Instant::now();
        let mut reg = DebounceRegistry::new(GRACE);
        let tok = reg.schedule_new(t0, ms(10), 7);
        assert_eq!(reg.poll(t0 + ms(10)).len(), 1);
        reg.cancel(tok, t0 + ms(20));
        assert!(reg.poll(t0 + ms(30)).is_empty());
    }

    #[test]
    fn canceled_tokens_evict_after_grace() {
        let t0 = Instant::now();
        let mut reg: DebounceRegistry<()> = DebounceRegistry::new(GRACE);
        let tok = reg.issue();
        reg.cancel(tok, t0);
        reg.poll(t0 + ms(199));
        assert_eq!(reg.canceled_len(), 1);
        reg.poll(t0 + ms(200));
        assert_eq!(reg.canceled_len(), 0);
    }

    #[test]
    fn token_canceled_before_scheduling_never_fires() {
        let t0 = Instant::now();
        let mut reg = DebounceRegistry::new(GRACE);
        let tok = reg.issue();
        reg.cancel(tok, t0);
        reg.schedule(tok, t0, ms(50), "late");
        assert!(reg.poll(t0 + ms(60)).is_empty());
    }

    #[test]
    fn batch_is_ordered_by_deadline() {
        let t0 = Instant::now();
        let mut reg = DebounceRegistry::new(GRACE);
        let late = reg.schedule_new(t0, ms(300), "b");
        let early = reg.schedule_new(t0, ms(100), "a");
        assert_eq!(reg.next_deadline(), Some(t0 + ms(100)));
        assert_eq!(reg.poll(t0 + ms(400)), vec![(early, "a"), (late, "b")]);
    }
}
