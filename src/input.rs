//! Pointer input at the boundary: the closed set of raw events the gesture
//! machine accepts, plus an evdev mouse decoder producing them.

use std::time::{Duration, Instant};

use evdev::{Device, EventType, InputEvent, KeyCode, RelativeAxisCode, SynchronizationCode};
use log::trace;

use crate::config::Thresholds;
use crate::geometry::Point;
use crate::gestures::{Button, HostSurface};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Down {
        button: Button,
        point: Point,
        time: Instant,
    },
    Dragged {
        button: Button,
        point: Point,
        time: Instant,
    },
    Up {
        button: Button,
        point: Point,
        time: Instant,
        click_count: u8,
    },
    Moved {
        point: Point,
    },
    Entered {
        point: Point,
    },
    Exited,
    FocusLost,
}

/// Assigns click counts for sources that don't report one.
/// Presses of the same button close in time and space alternate 1, 2, 1, 2.
#[derive(Debug, Clone)]
pub struct ClickCounter {
    interval: Duration,
    slop: f64,
    last: Option<(Button, Point, Instant)>,
    count: u8,
}

impl ClickCounter {
    pub fn new(interval: Duration, slop: f64) -> Self {
        Self {
            interval,
            slop,
            last: None,
            count: 0,
        }
    }

    pub fn from_thresholds(th: &Thresholds) -> Self {
        Self::new(th.double_click_interval(), th.click_distance)
    }

    pub fn press(&mut self, button: Button, point: Point, time: Instant) -> u8 {
        let repeat = self.last.is_some_and(|(b, p, t)| {
            b == button
                && p.distance(point) <= self.slop
                && time.saturating_duration_since(t) <= self.interval
        });
        self.count = if repeat { self.count % 2 + 1 } else { 1 };
        self.last = Some((button, point, time));
        self.count
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.count = 0;
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
}

/// Relative pointer devices with at least a left button.
pub fn discover_pointers() -> Vec<DeviceInfo> {
    let mut out = vec![];
    if let Ok(rd) = std::fs::read_dir("/dev/input") {
        for e in rd.flatten() {
            let p = e.path();
            if !p
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.starts_with("event"))
            {
                continue;
            }
            if let Ok(dev) = Device::open(&p) {
                if is_pointer(&dev) {
                    out.push(DeviceInfo {
                        path: p.display().to_string(),
                        name: dev.name().unwrap_or("unknown").to_string(),
                    });
                }
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Whether the current user is listed in the `input` group, which is what
/// reading `/dev/input/event*` usually takes.
pub fn in_input_group() -> bool {
    let Ok(groups) = std::fs::read_to_string("/etc/group") else {
        return false;
    };
    let user = whoami::username();
    group_has_member(&groups, "input", &user)
}

fn group_has_member(groups: &str, group: &str, user: &str) -> bool {
    groups
        .lines()
        .filter(|line| line.split(':').next() == Some(group))
        .filter_map(|line| line.split(':').nth(3))
        .any(|members| members.split(',').any(|m| m.trim() == user))
}

fn is_pointer(dev: &Device) -> bool {
    let events = dev.supported_events();
    if !(events.contains(EventType::KEY) && events.contains(EventType::RELATIVE)) {
        return false;
    }
    let has_button = dev
        .supported_keys()
        .is_some_and(|k| k.contains(KeyCode::BTN_LEFT));
    let has_motion = dev.supported_relative_axes().is_some_and(|a| {
        a.contains(RelativeAxisCode::REL_X) && a.contains(RelativeAxisCode::REL_Y)
    });
    has_button && has_motion
}

/// Turns relative mouse reports into [`PointerInput`]s on an absolute cursor
/// clamped to the surface.
#[derive(Debug)]
pub struct PointerDecoder {
    surface: HostSurface,
    cursor: Point,
    pressed: [bool; 2],
    press_counts: [u8; 2],
    changes: Vec<(Button, bool)>,
    moved: bool,
    entered: bool,
    clicks: ClickCounter,
}

fn slot(button: Button) -> usize {
    match button {
        Button::Primary => 0,
        Button::Secondary => 1,
    }
}

impl PointerDecoder {
    pub fn new(surface: HostSurface, clicks: ClickCounter) -> Self {
        Self {
            surface,
            cursor: Point::new(surface.width / 2.0, surface.height / 2.0),
            pressed: [false; 2],
            press_counts: [1; 2],
            changes: Vec::new(),
            moved: false,
            entered: false,
            clicks,
        }
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn on_motion(&mut self, dx: f64, dy: f64) {
        self.cursor = self
            .surface
            .clamp(Point::new(self.cursor.x + dx, self.cursor.y + dy));
        self.moved = true;
    }

    pub fn on_button(&mut self, button: Button, pressed: bool) {
        self.changes.push((button, pressed));
    }

    /// Feeds one raw evdev event; returns inputs when a report completes.
    pub fn decode(&mut self, ev: &InputEvent, now: Instant) -> Vec<PointerInput> {
        let ty = ev.event_type();
        if ty == EventType::RELATIVE {
            match ev.code() {
                c if c == RelativeAxisCode::REL_X.0 => self.on_motion(f64::from(ev.value()), 0.0),
                c if c == RelativeAxisCode::REL_Y.0 => self.on_motion(0.0, f64::from(ev.value())),
                _ => {}
            }
        } else if ty == EventType::KEY {
            let button = match ev.code() {
                c if c == KeyCode::BTN_LEFT.0 => Some(Button::Primary),
                c if c == KeyCode::BTN_RIGHT.0 => Some(Button::Secondary),
                _ => None,
            };
            // value 2 is autorepeat
            if let (Some(b), 0 | 1) = (button, ev.value()) {
                self.on_button(b, ev.value() == 1);
            }
        } else if ty == EventType::SYNCHRONIZATION && ev.code() == SynchronizationCode::SYN_REPORT.0
        {
            return self.on_report(now);
        }
        Vec::new()
    }

    /// Closes one report: entry first, then button edges, then motion.
    pub fn on_report(&mut self, time: Instant) -> Vec<PointerInput> {
        let mut out = Vec::new();
        let point = self.cursor;

        if !self.entered {
            self.entered = true;
            out.push(PointerInput::Entered { point });
        }

        for (button, down) in std::mem::take(&mut self.changes) {
            let i = slot(button);
            if self.pressed[i] == down {
                trace!("duplicate {button:?} edge ignored");
                continue;
            }
            self.pressed[i] = down;
            if down {
                self.press_counts[i] = self.clicks.press(button, point, time);
                out.push(PointerInput::Down {
                    button,
                    point,
                    time,
                });
            } else {
                out.push(PointerInput::Up {
                    button,
                    point,
                    time,
                    click_count: self.press_counts[i],
                });
            }
        }

        if std::mem::take(&mut self.moved) {
            let held = Button::ALL.into_iter().find(|b| self.pressed[slot(*b)]);
            out.push(match held {
                Some(button) => PointerInput::Dragged {
                    button,
                    point,
                    time,
                },
                None => PointerInput::Moved { point },
            });
        }
        out
    }

    /// Releases held buttons as a lost focus, e.g. when the device goes away.
    pub fn focus_lost(&mut self) -> Vec<PointerInput> {
        self.pressed = [false; 2];
        self.changes.clear();
        self.moved = false;
        self.entered = false;
        self.clicks.reset();
        vec![PointerInput::FocusLost, PointerInput::Exited]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn decoder() -> PointerDecoder {
        PointerDecoder::new(
            HostSurface::new(100.0, 100.0),
            ClickCounter::new(ms(500), 6.0),
        )
    }

    #[test]
    fn counter_alternates_for_quick_repeats() {
        let t0 = Instant::now();
        let mut c = ClickCounter::new(ms(500), 6.0);
        let p = Point::new(10.0, 10.0);
        assert_eq!(c.press(Button::Primary, p, t0), 1);
        assert_eq!(c.press(Button::Primary, p, t0 + ms(200)), 2);
        assert_eq!(c.press(Button::Primary, p, t0 + ms(400)), 1);
        assert_eq!(c.press(Button::Primary, p, t0 + ms(600)), 2);
    }

    #[test]
    fn counter_resets_on_gap_distance_or_button() {
        let t0 = Instant::now();
        let mut c = ClickCounter::new(ms(500), 6.0);
        let p = Point::new(10.0, 10.0);
        c.press(Button::Primary, p, t0);
        assert_eq!(c.press(Button::Primary, p, t0 + ms(900)), 1);
        assert_eq!(c.press(Button::Primary, Point::new(40.0, 10.0), t0 + ms(950)), 1);
        assert_eq!(c.press(Button::Secondary, Point::new(40.0, 10.0), t0 + ms(1000)), 1);
    }

    #[test]
    fn first_report_enters_then_moves() {
        let t0 = Instant::now();
        let mut d = decoder();
        d.on_motion(5.0, -5.0);
        let out = d.on_report(t0);
        assert_eq!(
            out,
            vec![
                PointerInput::Entered {
                    point: Point::new(55.0, 45.0)
                },
                PointerInput::Moved {
                    point: Point::new(55.0, 45.0)
                },
            ]
        );
    }

    #[test]
    fn group_membership_lookup() {
        let groups = "root:x:0:\ninput:x:104:alice,bob\ninputs:x:200:carol\n";
        assert!(group_has_member(groups, "input", "bob"));
        assert!(!group_has_member(groups, "input", "carol"));
        assert!(!group_has_member(groups, "input", "root"));
    }

    #[test]
    fn cursor_is_clamped_to_surface() {
        let mut d = decoder();
        d.on_motion(500.0, -500.0);
        assert_eq!(d.cursor(), Point::new(100.0, 0.0));
    }

    #[test]
    fn press_move_release_maps_to_down_drag_up() {
        let t0 = Instant::now();
        let mut d = decoder();
        d.on_report(t0);

        d.on_button(Button::Primary, true);
        let out = d.on_report(t0 + ms(10));
        assert!(matches!(out[..], [PointerInput::Down { button: Button::Primary, .. }]));

        d.on_motion(10.0, 0.0);
        let out = d.on_report(t0 + ms(20));
        assert!(matches!(out[..], [PointerInput::Dragged { button: Button::Primary, .. }]));

        d.on_button(Button::Primary, false);
        let out = d.on_report(t0 + ms(30));
        assert!(matches!(out[..], [PointerInput::Up { click_count: 1, .. }]));
    }

    #[test]
    fn second_quick_click_reports_count_two() {
        let t0 = Instant::now();
        let mut d = decoder();
        d.on_report(t0);
        for (i, at) in [10u64, 20].into_iter().enumerate() {
            d.on_button(Button::Primary, true);
            d.on_report(t0 + ms(at * 10));
            d.on_button(Button::Primary, false);
            let out = d.on_report(t0 + ms(at * 10 + 5));
            let expected = i as u8 + 1;
            assert!(matches!(out[..], [PointerInput::Up { click_count, .. }] if click_count == expected));
        }
    }

    #[test]
    fn duplicate_edges_are_dropped() {
        let t0 = Instant::now();
        let mut d = decoder();
        d.on_report(t0);
        d.on_button(Button::Secondary, false);
        assert!(d.on_report(t0 + ms(5)).is_empty());
    }

    #[test]
    fn focus_loss_releases_everything() {
        let t0 = Instant::now();
        let mut d = decoder();
        d.on_report(t0);
        d.on_button(Button::Primary, true);
        d.on_report(t0 + ms(5));
        assert_eq!(d.focus_lost(), vec![PointerInput::FocusLost, PointerInput::Exited]);
        d.on_motion(1.0, 0.0);
        let out = d.on_report(t0 + ms(10));
        assert!(matches!(out[..], [PointerInput::Entered { .. }, PointerInput::Moved { .. }]));
    }
}
