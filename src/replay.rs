//! Scripted replay of pointer input through a fresh gesture machine.
//!
//! Scripts are JSON lines, one raw event each, with a millisecond offset:
//!
//! ```text
//! {"t_ms": 0,  "event": "down", "button": "primary", "x": 10, "y": 10}
//! {"t_ms": 50, "event": "up",   "button": "primary", "x": 11, "y": 11, "clicks": 1}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fs, io};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Profile;
use crate::geometry::Point;
use crate::gestures::{Button, GestureMachine};
use crate::input::PointerInput;
use crate::observers::{GestureEvent, Recorder};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        source: serde_json::Error,
    },
}

fn one() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Down {
        button: Button,
        x: f64,
        y: f64,
    },
    Drag {
        button: Button,
        x: f64,
        y: f64,
    },
    Up {
        button: Button,
        x: f64,
        y: f64,
        #[serde(default = "one")]
        clicks: u8,
    },
    Move {
        x: f64,
        y: f64,
    },
    Enter {
        x: f64,
        y: f64,
    },
    Exit,
    FocusLost,
    Enable,
    Disable,
    Tick,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptLine {
    pub t_ms: u64,
    #[serde(flatten)]
    pub event: ScriptEvent,
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>, ReplayError> {
    let mut out = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed = serde_json::from_str(line).map_err(|source| ReplayError::Line {
            line: i + 1,
            source,
        })?;
        out.push(parsed);
    }
    Ok(out)
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptLine>, ReplayError> {
    let txt = fs::read_to_string(path).map_err(|source| ReplayError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script(&txt)
}

fn apply(m: &mut GestureMachine, ev: &ScriptEvent, time: Instant) {
    let input = match *ev {
        ScriptEvent::Down { button, x, y } => PointerInput::Down {
            button,
            point: Point::new(x, y),
            time,
        },
        ScriptEvent::Drag { button, x, y } => PointerInput::Dragged {
            button,
            point: Point::new(x, y),
            time,
        },
        ScriptEvent::Up {
            button,
            x,
            y,
            clicks,
        } => PointerInput::Up {
            button,
            point: Point::new(x, y),
            time,
            click_count: clicks,
        },
        ScriptEvent::Move { x, y } => PointerInput::Moved {
            point: Point::new(x, y),
        },
        ScriptEvent::Enter { x, y } => PointerInput::Entered {
            point: Point::new(x, y),
        },
        ScriptEvent::Exit => PointerInput::Exited,
        ScriptEvent::FocusLost => PointerInput::FocusLost,
        ScriptEvent::Enable => return m.set_enabled(true),
        ScriptEvent::Disable => return m.set_enabled(false),
        ScriptEvent::Tick => return,
    };
    m.handle(input);
}

/// Runs `script` through a machine configured from `profile` and returns
/// every event observers saw, including clicks resolved after the last line.
pub fn run(profile: &Profile, script: &[ScriptLine], snap: bool) -> Vec<GestureEvent> {
    let rec = Recorder::new();
    let mut m = GestureMachine::new(profile.thresholds.clone());
    if snap {
        m = m.with_snapper(Box::new(profile.snap.snapper()));
    }
    m.bind_surface(profile.surface.surface());
    m.observers().subscribe(Arc::new(rec.clone()));

    let base = Instant::now();
    let mut last = base;
    for line in script {
        let at = base + Duration::from_millis(line.t_ms);
        // timers due before this event fire first
        m.tick(at);
        debug!("replay t={}ms {:?}", line.t_ms, line.event);
        apply(&mut m, &line.event, at);
        last = last.max(at);
    }

    let th = &profile.thresholds;
    let tail = last + th.double_click_interval() + th.fadeout_duration() + Duration::from_millis(1);
    m.tick(tail);
    rec.events()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gestures::{GestureKind, Phase};

    fn count(events: &[GestureEvent], f: impl Fn(&GestureEvent) -> bool) -> usize {
        events.iter().filter(|e| f(e)).count()
    }

    #[test]
    fn parses_lines_and_skips_comments() {
        let script = parse_script(
            "# click\n\
             {\"t_ms\":0,\"event\":\"down\",\"button\":\"primary\",\"x\":10,\"y\":10}\n\
             \n\
             {\"t_ms\":50,\"event\":\"up\",\"button\":\"primary\",\"x\":11,\"y\":11}\n\
             {\"t_ms\":60,\"event\":\"exit\"}\n",
        )
        .unwrap();
        assert_eq!(script.len(), 3);
        assert_eq!(
            script[1].event,
            ScriptEvent::Up {
                button: Button::Primary,
                x: 11.0,
                y: 11.0,
                clicks: 1
            }
        );
        assert_eq!(script[2].event, ScriptEvent::Exit);
    }

    #[test]
    fn reports_bad_line_number() {
        let err = parse_script("{\"t_ms\":0,\"event\":\"exit\"}\n{\"t_ms\":1,\"event\":\"jump\"}\n")
            .unwrap_err();
        assert!(matches!(err, ReplayError::Line { line: 2, .. }));
    }

    #[test]
    fn click_script_resolves_single_click() {
        let script = parse_script(
            "{\"t_ms\":0,\"event\":\"down\",\"button\":\"primary\",\"x\":10,\"y\":10}\n\
             {\"t_ms\":50,\"event\":\"up\",\"button\":\"primary\",\"x\":11,\"y\":11,\"clicks\":1}\n",
        )
        .unwrap();
        let events = run(&Profile::default(), &script, false);
        assert_eq!(
            count(&events, |e| matches!(e, GestureEvent::Clicked { kind: GestureKind::PrimaryClick, .. })),
            1
        );
    }

    #[test]
    fn drag_script_never_clicks() {
        let script = parse_script(
            "{\"t_ms\":0,\"event\":\"down\",\"button\":\"primary\",\"x\":0,\"y\":0}\n\
             {\"t_ms\":50,\"event\":\"drag\",\"button\":\"primary\",\"x\":20,\"y\":0}\n\
             {\"t_ms\":100,\"event\":\"up\",\"button\":\"primary\",\"x\":20,\"y\":0}\n",
        )
        .unwrap();
        let events = run(&Profile::default(), &script, false);
        assert_eq!(count(&events, |e| matches!(e, GestureEvent::Clicked { .. })), 0);
        assert_eq!(
            count(&events, |e| matches!(
                e,
                GestureEvent::Tracked {
                    kind: GestureKind::PrimaryDrag,
                    phase: Phase::End(_),
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn disabled_span_is_ignored() {
        let script = parse_script(
            "{\"t_ms\":0,\"event\":\"disable\"}\n\
             {\"t_ms\":10,\"event\":\"down\",\"button\":\"secondary\",\"x\":5,\"y\":5}\n\
             {\"t_ms\":20,\"event\":\"up\",\"button\":\"secondary\",\"x\":5,\"y\":5}\n",
        )
        .unwrap();
        assert!(run(&Profile::default(), &script, true).is_empty());
    }
}
