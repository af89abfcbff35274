//! Pointer gesture classification: hover, down, click, double click and drag.
//!
//! At most one [`GestureKind`] is active at a time. Switching kinds always
//! finalizes the previous one first, and a press that turned into a drag is
//! never reported as a click.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::debounce::{DebounceRegistry, DebounceToken};
use crate::geometry::{Point, Rect};
use crate::input::PointerInput;
use crate::observers::{GestureEvent, ObserverHub};
use crate::snap::{SnapMode, SnapProvider};
use crate::tracker::TrackingState;

/// How long before the double-click interval the trailing cancel fires.
pub const DOUBLE_CLICK_CANCEL_LEAD: Duration = Duration::from_millis(20);
/// How long a canceled token is remembered.
pub const CANCEL_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Primary,
    Secondary,
}

impl Button {
    pub const ALL: [Button; 2] = [Button::Primary, Button::Secondary];

    pub fn down_kind(self) -> GestureKind {
        match self {
            Button::Primary => GestureKind::PrimaryDown,
            Button::Secondary => GestureKind::SecondaryDown,
        }
    }

    pub fn click_kind(self) -> GestureKind {
        match self {
            Button::Primary => GestureKind::PrimaryClick,
            Button::Secondary => GestureKind::SecondaryClick,
        }
    }

    pub fn drag_kind(self) -> GestureKind {
        match self {
            Button::Primary => GestureKind::PrimaryDrag,
            Button::Secondary => GestureKind::SecondaryDrag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureFamily {
    Hover,
    Down,
    Click,
    Drag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Hover,
    PrimaryDown,
    SecondaryDown,
    PrimaryClick,
    SecondaryClick,
    PrimaryDrag,
    SecondaryDrag,
}

impl GestureKind {
    pub const ALL: [GestureKind; 7] = [
        GestureKind::Hover,
        GestureKind::PrimaryDown,
        GestureKind::SecondaryDown,
        GestureKind::PrimaryClick,
        GestureKind::SecondaryClick,
        GestureKind::PrimaryDrag,
        GestureKind::SecondaryDrag,
    ];

    pub fn family(self) -> GestureFamily {
        match self {
            GestureKind::Hover => GestureFamily::Hover,
            GestureKind::PrimaryDown | GestureKind::SecondaryDown => GestureFamily::Down,
            GestureKind::PrimaryClick | GestureKind::SecondaryClick => GestureFamily::Click,
            GestureKind::PrimaryDrag | GestureKind::SecondaryDrag => GestureFamily::Drag,
        }
    }

    pub fn is_drag(self) -> bool {
        self.family() == GestureFamily::Drag
    }

    pub fn is_click(self) -> bool {
        self.family() == GestureFamily::Click
    }

    pub fn button(self) -> Option<Button> {
        match self {
            GestureKind::Hover => None,
            GestureKind::PrimaryDown | GestureKind::PrimaryClick | GestureKind::PrimaryDrag => {
                Some(Button::Primary)
            }
            GestureKind::SecondaryDown
            | GestureKind::SecondaryClick
            | GestureKind::SecondaryDrag => Some(Button::Secondary),
        }
    }

    /// Presses and clicks snap to whole units, drags and hover to the grid.
    pub fn default_snap_mode(self) -> SnapMode {
        match self.family() {
            GestureFamily::Down | GestureFamily::Click => SnapMode::Rounded,
            GestureFamily::Drag | GestureFamily::Hover => SnapMode::Grid,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GestureKind::Hover => "hover",
            GestureKind::PrimaryDown => "primary_down",
            GestureKind::SecondaryDown => "secondary_down",
            GestureKind::PrimaryClick => "primary_click",
            GestureKind::SecondaryClick => "secondary_click",
            GestureKind::PrimaryDrag => "primary_drag",
            GestureKind::SecondaryDrag => "secondary_drag",
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of the active kind. `End` carries the fade completion value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Begin,
    Middle,
    End(f64),
}

impl Phase {
    pub fn is_end(&self) -> bool {
        matches!(self, Phase::End(_))
    }
}

/// The region pointer input is tracked against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostSurface {
    pub width: f64,
    pub height: f64,
}

impl HostSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn clamp(&self, p: Point) -> Point {
        Point::new(p.x.clamp(0.0, self.width), p.y.clamp(0.0, self.height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Deferred {
    Click { kind: GestureKind, rect: Rect },
    Cancel(DebounceToken),
    ClearDrag { kind: GestureKind, generation: u64 },
}

/// Read-only copy of the machine state for renderers.
#[derive(Debug, Clone)]
pub struct MachineSnapshot {
    pub active_kind: Option<GestureKind>,
    pub active_phase: Phase,
    pub states: Vec<(GestureKind, TrackingState)>,
}

impl MachineSnapshot {
    pub fn state(&self, kind: GestureKind) -> Option<&TrackingState> {
        self.states.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }
}

pub struct GestureMachine {
    th: Thresholds,
    enabled: bool,
    surface: Option<HostSurface>,
    snapper: Option<Box<dyn SnapProvider>>,
    active_kind: Option<GestureKind>,
    active_phase: Phase,
    tracking: HashMap<GestureKind, TrackingState>,
    debounce: DebounceRegistry<Deferred>,
    pending_click: HashMap<Button, DebounceToken>,
    observers: ObserverHub,
    now: Option<Instant>,
}

impl fmt::Debug for GestureMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GestureMachine")
            .field("enabled", &self.enabled)
            .field("surface", &self.surface)
            .field("active_kind", &self.active_kind)
            .field("active_phase", &self.active_phase)
            .field("pending", &self.debounce.pending_len())
            .finish()
    }
}

fn abs_diff(a: Instant, b: Instant) -> Duration {
    if a >= b { a - b } else { b - a }
}

impl GestureMachine {
    pub fn new(th: Thresholds) -> Self {
        Self {
            th,
            enabled: true,
            surface: None,
            snapper: None,
            active_kind: None,
            active_phase: Phase::Begin,
            tracking: HashMap::new(),
            debounce: DebounceRegistry::new(CANCEL_GRACE),
            pending_click: HashMap::new(),
            observers: ObserverHub::default(),
            now: None,
        }
    }

    pub fn with_snapper(mut self, snapper: Box<dyn SnapProvider>) -> Self {
        self.snapper = Some(snapper);
        self
    }

    pub fn with_observers(mut self, observers: ObserverHub) -> Self {
        self.observers = observers;
        self
    }

    pub fn observers(&self) -> &ObserverHub {
        &self.observers
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.th
    }

    pub fn bind_surface(&mut self, surface: HostSurface) {
        self.surface = Some(surface);
    }

    pub fn unbind_surface(&mut self) {
        self.surface = None;
    }

    pub fn surface(&self) -> Option<&HostSurface> {
        self.surface.as_ref()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            debug!("gesture machine {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn active_kind(&self) -> Option<GestureKind> {
        self.active_kind
    }

    pub fn active_phase(&self) -> Phase {
        self.active_phase
    }

    pub fn tracking(&self, kind: GestureKind) -> Option<&TrackingState> {
        self.tracking.get(&kind)
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            active_kind: self.active_kind,
            active_phase: self.active_phase,
            states: GestureKind::ALL
                .iter()
                .filter_map(|k| self.tracking.get(k).map(|s| (*k, s.clone())))
                .collect(),
        }
    }

    /// Earliest moment [`tick`](Self::tick) has deferred work to run.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.next_deadline()
    }

    pub fn handle(&mut self, input: PointerInput) {
        match input {
            PointerInput::Down {
                button,
                point,
                time,
            } => self.on_down(button, point, time),
            PointerInput::Dragged {
                button,
                point,
                time,
            } => self.on_dragged(button, point, time),
            PointerInput::Up {
                button,
                point,
                time,
                click_count,
            } => self.on_up(button, point, time, click_count),
            PointerInput::Moved { point } => self.on_hover_moved(point),
            PointerInput::Entered { point } => self.on_pointer_entered(point),
            PointerInput::Exited => self.on_pointer_exited(),
            PointerInput::FocusLost => self.cancel_active_drag(),
        }
    }

    // --- raw input ---------------------------------------------------------

    pub fn on_primary_down(&mut self, point: Point, time: Instant) {
        self.on_down(Button::Primary, point, time);
    }

    pub fn on_secondary_down(&mut self, point: Point, time: Instant) {
        self.on_down(Button::Secondary, point, time);
    }

    pub fn on_primary_dragged(&mut self, point: Point, time: Instant) {
        self.on_dragged(Button::Primary, point, time);
    }

    pub fn on_secondary_dragged(&mut self, point: Point, time: Instant) {
        self.on_dragged(Button::Secondary, point, time);
    }

    pub fn on_primary_up(&mut self, point: Point, time: Instant, click_count: u8) {
        self.on_up(Button::Primary, point, time, click_count);
    }

    pub fn on_secondary_up(&mut self, point: Point, time: Instant, click_count: u8) {
        self.on_up(Button::Secondary, point, time, click_count);
    }

    pub fn on_down(&mut self, button: Button, point: Point, time: Instant) {
        if !self.is_enabled_and_bound() {
            return;
        }
        self.now = Some(time);
        let radius = self.th.point_radius;

        for kind in [button.click_kind(), button.down_kind()] {
            let mode = self.state_mut(kind).snap_mode;
            let location = self.locate(point, mode);
            let rect = Rect::around(location, radius, radius);
            let st = self.state_mut(kind);
            st.rect = Some(rect);
            st.down_point = Some(rect.center());
            st.down_time = Some(time);
            debug!("{kind} down at {location:?} snap {mode:?}");
        }

        self.active_phase = Phase::Begin;
        self.set_active_kind(button.down_kind());
    }

    pub fn on_dragged(&mut self, button: Button, point: Point, time: Instant) {
        if !self.is_enabled_and_bound() {
            return;
        }
        let down_kind = button.down_kind();
        let drag_kind = button.drag_kind();

        let Some(down) = self.tracking.get(&down_kind) else {
            trace!("{drag_kind}: no press recorded, ignoring");
            return;
        };
        let Some(start) = down.down_point.or_else(|| down.rect.map(|r| r.center())) else {
            trace!("{drag_kind}: press was cleared, ignoring");
            return;
        };
        let down_mode = down.snap_mode;
        let down_point = down.down_point;
        let down_time = down.down_time;
        let start_time = down.down_time.or(down.last_click_time).unwrap_or(time);

        self.now = Some(time);
        let location = self.locate(point, down_mode);
        let distance = (start.distance(location) * 1000.0).round() / 1000.0;
        let elapsed = abs_diff(time, start_time);

        if distance > self.th.click_distance || elapsed > self.th.click_time() {
            debug!("{drag_kind}: distance {distance} elapsed {elapsed:?}");
            let drag_mode = self.state_mut(drag_kind).snap_mode;
            let current = self.locate(point, drag_mode);

            if self.active_kind != Some(drag_kind) {
                let anchor_exact = down_point
                    .or(self.state_mut(drag_kind).down_point)
                    .unwrap_or(location);
                let anchor = self.locate(anchor_exact, drag_mode);
                let drag = self.state_mut(drag_kind);
                drag.down_point = Some(anchor);
                drag.down_time = Some(down_time.unwrap_or(time));
                drag.rect = Some(Rect::around(anchor, 1.0, 1.0));
                self.set_active_kind(drag_kind);

                if current != anchor {
                    self.extend_drag(drag_kind, current);
                    self.set_active_kind(drag_kind);
                }
            } else {
                let ending = self.active_phase.is_end();
                self.extend_drag(drag_kind, current);
                if ending {
                    self.end_drags(Some(current));
                }
                self.set_active_kind(drag_kind);
            }
        } else {
            // small movement while pressed still counts as a click
            trace!("{down_kind}: within click tolerance ({distance})");
            let radius = self.th.point_radius;
            self.state_mut(down_kind).rect = Some(Rect::around(location, radius, radius));
            self.set_active_kind(down_kind);
        }
    }

    pub fn on_up(&mut self, button: Button, point: Point, time: Instant, click_count: u8) {
        if !self.is_enabled_and_bound() {
            return;
        }
        let pressed = self
            .tracking
            .get(&button.down_kind())
            .is_some_and(|st| st.down_point.is_some());
        if !pressed {
            trace!("{button:?} released without a live press, ignoring");
            return;
        }
        self.now = Some(time);
        let click_kind = button.click_kind();

        if let Some(prev) = self.active_kind {
            if prev != click_kind {
                self.end_state(prev);
            }
            if prev.is_drag() {
                info!("{prev} released, not a click");
                for b in Button::ALL {
                    self.clear_kind(b.down_kind());
                    self.clear_kind(b.click_kind());
                }
                return;
            }
        }

        let mode = self.state_mut(click_kind).snap_mode;
        let location = self.locate(point, mode);
        let radius = self.th.point_radius;
        let rect = Rect::around(location, radius, radius);
        self.state_mut(click_kind).rect = Some(rect);
        self.set_active_kind(click_kind);

        let st = self.state_mut(click_kind);
        st.up_point = Some(location);
        st.up_time = Some(time);
        st.last_click_time = Some(time);
        st.fadeout_rect = Some(rect);

        let interval = self.th.double_click_interval();
        match click_count {
            1 => {
                let token =
                    self.debounce
                        .schedule_new(time, interval, Deferred::Click { kind: click_kind, rect });
                debug!("{click_kind}: single click pending as #{}", token.id());
                self.pending_click.insert(button, token);
            }
            2 => {
                info!("{click_kind}: double click at {location:?}");
                self.observers.publish(GestureEvent::DoubleClicked {
                    kind: click_kind,
                    rect,
                });
                if let Some(pending) = self.pending_click.remove(&button) {
                    self.debounce.cancel(pending, time);
                    self.debounce.schedule_new(
                        time,
                        interval.saturating_sub(DOUBLE_CLICK_CANCEL_LEAD),
                        Deferred::Cancel(pending),
                    );
                }
            }
            n => debug!("{click_kind}: click count {n} not classified"),
        }

        self.end_state(click_kind);
    }

    pub fn on_hover_moved(&mut self, point: Point) {
        if !self.is_enabled_and_bound() {
            return;
        }
        let mode = self.state_mut(GestureKind::Hover).snap_mode;
        let location = self.locate(point, mode);
        let radius = self.th.point_radius;
        let rect = Rect::around(location, radius, radius);
        let ended = self.active_phase.is_end();
        let st = self.state_mut(GestureKind::Hover);
        if st.rect != Some(rect) || ended {
            st.rect = Some(rect);
            self.set_active_kind(GestureKind::Hover);
        }
    }

    pub fn on_pointer_exited(&mut self) {
        if self.active_kind == Some(GestureKind::Hover) {
            self.end_state(GestureKind::Hover);
        }
    }

    pub fn on_pointer_entered(&mut self, point: Point) {
        if !self.is_enabled_and_bound() {
            return;
        }
        self.active_phase = Phase::Begin;
        let mode = self.state_mut(GestureKind::Hover).snap_mode;
        let location = self.locate(point, mode);
        let radius = self.th.point_radius;
        self.state_mut(GestureKind::Hover).rect = Some(Rect::around(location, radius, radius));
        self.set_active_kind(GestureKind::Hover);
    }

    /// Drops an in-flight drag without an `End` notification. The press that
    /// started it is forgotten too, so neither a release nor further motion
    /// can turn it back into a click or a drag.
    pub fn cancel_active_drag(&mut self) {
        if let Some(kind) = self.active_kind.filter(|k| k.is_drag()) {
            info!("{kind} canceled");
            self.active_kind = None;
            self.active_phase = Phase::Begin;
            self.clear_kind(kind);
            if let Some(button) = kind.button() {
                self.clear_kind(button.down_kind());
                self.clear_kind(button.click_kind());
            }
        }
    }

    /// Runs deferred work due at `now` and advances fade-out of finished kinds.
    pub fn tick(&mut self, now: Instant) {
        self.now = Some(now);
        for (token, action) in self.debounce.poll(now) {
            // an earlier action in this batch may have canceled this one
            if self.debounce.is_canceled(token) {
                debug!("deferred #{} canceled before firing", token.id());
                continue;
            }
            self.run_deferred(token, action, now);
        }

        let duration = self.th.fadeout_duration();
        let steps = self.th.fadeout_max_steps;
        let active = self.active_kind;
        let ended = self.active_phase.is_end();
        for (kind, st) in self.tracking.iter_mut() {
            if Some(*kind) != active || ended {
                st.advance_fadeout(now, duration, steps);
            }
        }
    }

    // --- internals ---------------------------------------------------------

    fn is_enabled_and_bound(&self) -> bool {
        self.enabled && self.surface.is_some()
    }

    fn clock(&self) -> Instant {
        self.now.unwrap_or_else(Instant::now)
    }

    fn state_mut(&mut self, kind: GestureKind) -> &mut TrackingState {
        self.tracking
            .entry(kind)
            .or_insert_with(|| TrackingState::new(kind.default_snap_mode()))
    }

    fn clear_kind(&mut self, kind: GestureKind) {
        if let Some(st) = self.tracking.get_mut(&kind) {
            st.clear();
        }
    }

    fn locate(&self, point: Point, mode: SnapMode) -> Point {
        self.snapper
            .as_ref()
            .and_then(|s| s.snap_point(point, mode))
            .unwrap_or(point)
    }

    fn notify(&self, kind: GestureKind, rect: Option<Rect>, phase: Phase) {
        self.observers
            .publish(GestureEvent::Tracked { kind, rect, phase });
    }

    fn set_active_kind(&mut self, kind: GestureKind) {
        if self.active_kind != Some(kind) {
            if let Some(prev) = self.active_kind {
                self.end_state(prev);
            }
            debug!(
                "active kind {} -> {kind}",
                self.active_kind.map_or("none", GestureKind::label)
            );
            self.active_kind = Some(kind);
            self.active_phase = Phase::Begin;
            let st = self.state_mut(kind);
            st.activate();
            st.consecutive_count = 0;
        } else {
            let rearm = self.active_phase != Phase::Middle;
            self.active_phase = Phase::Middle;
            let st = self.state_mut(kind);
            if rearm {
                st.activate();
            }
            st.consecutive_count += 1;
        }
        let rect = self.state_mut(kind).rect;
        self.notify(kind, rect, self.active_phase);
    }

    fn end_state(&mut self, kind: GestureKind) {
        if self.surface.is_none() {
            return;
        }
        let now = self.clock();
        let Some(st) = self.tracking.get_mut(&kind) else {
            return;
        };
        if st.end_signaled {
            return;
        }
        if st.fadeout_rect.is_none() {
            st.fadeout_rect = st.rect;
        }
        st.end_signaled = true;
        st.ended_at = Some(now);
        let rect = st.fadeout_rect.or(st.rect);
        let progress = st.fadeout_progress;

        self.active_phase = Phase::End(0.0);
        if kind.is_drag() {
            self.end_drags(None);
            if let Some(button) = kind.button() {
                // a finished drag can't be resumed from its stale press
                self.clear_kind(button.down_kind());
                self.clear_kind(button.click_kind());
            }
        }

        if (0.0..1.0).contains(&progress) {
            self.notify(kind, rect, Phase::End(1.0));
        }
    }

    fn extend_drag(&mut self, kind: GestureKind, current: Point) {
        let drag = self.state_mut(kind);
        if let Some(anchor) = drag.down_point {
            drag.rect = Some(Rect::from_corners(anchor, current));
        }
    }

    fn end_drags(&mut self, location: Option<Point>) {
        let now = self.clock();
        for button in Button::ALL {
            let kind = button.drag_kind();
            let Some(drag) = self.tracking.get_mut(&kind) else {
                continue;
            };
            if drag.down_point.is_none() {
                continue;
            }
            if let Some(loc) = location {
                drag.up_point = Some(loc);
            }
            drag.up_time = Some(now);
            drag.fadeout_rect = drag.rect;
            let generation = drag.generation();
            debug!("{kind} finalized, clearing on next tick");
            self.debounce
                .schedule_new(now, Duration::ZERO, Deferred::ClearDrag { kind, generation });
        }
    }

    fn run_deferred(&mut self, token: DebounceToken, action: Deferred, now: Instant) {
        match action {
            Deferred::Click { kind, rect } => {
                if let Some(button) = kind.button() {
                    if self.pending_click.get(&button) == Some(&token) {
                        self.pending_click.remove(&button);
                    }
                }
                info!("{kind}: click at {:?}", rect.center());
                self.observers
                    .publish(GestureEvent::Clicked { kind, rect });
            }
            Deferred::Cancel(target) => {
                self.debounce.cancel(target, now);
            }
            Deferred::ClearDrag { kind, generation } => {
                match self.tracking.get_mut(&kind) {
                    Some(st) if st.generation() == generation => {
                        debug!("{kind} cleared");
                        st.clear();
                    }
                    _ => trace!("{kind}: newer activation, keeping state"),
                }
            }
        }
    }
}
