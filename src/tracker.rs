//! Per-gesture-kind tracking records.

use std::time::{Duration, Instant};

use crate::geometry::{Point, Rect};
use crate::snap::SnapMode;

#[derive(Debug, Clone, Default)]
pub struct TrackingState {
    pub down_point: Option<Point>,
    pub down_time: Option<Instant>,
    pub up_point: Option<Point>,
    pub up_time: Option<Instant>,
    pub last_click_time: Option<Instant>,
    pub rect: Option<Rect>,
    pub fadeout_rect: Option<Rect>,
    pub fadeout_progress: f64,
    pub snap_mode: SnapMode,
    /// Times this kind was re-entered while already active.
    pub consecutive_count: u32,
    // internal
    pub(crate) generation: u64,
    pub(crate) end_signaled: bool,
    pub(crate) ended_at: Option<Instant>,
}

impl TrackingState {
    pub fn new(snap_mode: SnapMode) -> Self {
        Self {
            snap_mode,
            ..Self::default()
        }
    }

    /// Resets everything but the snap mode. The activation generation and the
    /// end flag survive: deferred work issued against an older activation stays
    /// stale, and a cleared kind never reports its end twice.
    pub fn clear(&mut self) {
        *self = Self {
            snap_mode: self.snap_mode,
            generation: self.generation,
            end_signaled: self.end_signaled,
            ..Self::default()
        };
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_fading(&self) -> bool {
        self.fadeout_rect.is_some() && self.ended_at.is_some() && self.fadeout_progress < 1.0
    }

    /// Marks a fresh activation: fade bookkeeping restarts and the end signal re-arms.
    pub(crate) fn activate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.end_signaled = false;
        self.ended_at = None;
        self.fadeout_rect = None;
        self.fadeout_progress = 0.0;
    }

    /// Linear fade over `duration`, quantised to `max_steps`. Never moves backwards.
    pub(crate) fn advance_fadeout(&mut self, now: Instant, duration: Duration, max_steps: u32) {
        if !self.is_fading() {
            return;
        }
        let Some(ended_at) = self.ended_at else {
            return;
        };
        let elapsed = now.saturating_duration_since(ended_at);
        let raw = if duration.is_zero() {
            1.0
        } else {
            elapsed.as_secs_f64() / duration.as_secs_f64()
        };
        let steps = f64::from(max_steps.max(1));
        let stepped = ((raw * steps).floor() / steps).clamp(0.0, 1.0);
        if stepped > self.fadeout_progress {
            self.fadeout_progress = stepped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn clear_keeps_snap_mode() {
        let mut s = TrackingState::new(SnapMode::Rounded);
        s.rect = Some(Rect::new(0.0, 0.0, 10.0, 10.0));
        s.down_point = Some(Point::new(5.0, 5.0));
        s.consecutive_count = 3;
        s.fadeout_progress = 0.5;
        s.clear();
        assert_eq!(s.snap_mode, SnapMode::Rounded);
        assert!(s.rect.is_none());
        assert!(s.down_point.is_none());
        assert_eq!(s.consecutive_count, 0);
        assert_eq!(s.fadeout_progress, 0.0);
    }

    #[test]
    fn clear_keeps_generation() {
        let mut s = TrackingState::new(SnapMode::Grid);
        s.activate();
        s.activate();
        s.end_signaled = true;
        s.clear();
        assert_eq!(s.generation(), 2);
        assert!(s.end_signaled);

        s.activate();
        assert!(!s.end_signaled);
    }

    #[test]
    fn fadeout_advances_in_steps_and_saturates() {
        let t0 = Instant::now();
        let mut s = TrackingState::new(SnapMode::Grid);
        s.fadeout_rect = Some(Rect::new(0.0, 0.0, 1.0, 1.0));
        s.ended_at = Some(t0);

        s.advance_fadeout(t0 + ms(150), ms(300), 4);
        assert_eq!(s.fadeout_progress, 0.5);

        // earlier timestamp must not rewind
        s.advance_fadeout(t0 + ms(10), ms(300), 4);
        assert_eq!(s.fadeout_progress, 0.5);

        s.advance_fadeout(t0 + ms(900), ms(300), 4);
        assert_eq!(s.fadeout_progress, 1.0);
        assert!(!s.is_fading());
    }

    #[test]
    fn fadeout_needs_a_snapshot() {
        let t0 = Instant::now();
        let mut s = TrackingState::new(SnapMode::Grid);
        s.ended_at = Some(t0);
        s.advance_fadeout(t0 + ms(300), ms(300), 25);
        assert_eq!(s.fadeout_progress, 0.0);
    }
}
