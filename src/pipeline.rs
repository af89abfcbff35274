use anyhow::{Result, anyhow};
use evdev::Device;
use log::{info, warn};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use pointerctl::config::Profile;
use pointerctl::gestures::GestureMachine;
use pointerctl::input::{self, ClickCounter, PointerDecoder, PointerInput};
use pointerctl::observers::{GestureEvent, GestureObserver, ObserverHub, Queued};
use pointerctl::{GestureKind, Phase, Rect};

/// Prints every gesture event as one JSON line on stdout.
struct JsonLines;

impl JsonLines {
    fn emit(&self, ev: GestureEvent) {
        match serde_json::to_string(&ev) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("could not encode {ev:?}: {e}"),
        }
    }
}

impl GestureObserver for JsonLines {
    fn tracked(&self, kind: GestureKind, rect: Option<Rect>, phase: Phase) {
        self.emit(GestureEvent::Tracked { kind, rect, phase });
    }
    fn clicked(&self, kind: GestureKind, rect: Rect) {
        self.emit(GestureEvent::Clicked { kind, rect });
    }
    fn double_clicked(&self, kind: GestureKind, rect: Rect) {
        self.emit(GestureEvent::DoubleClicked { kind, rect });
    }
}

pub fn print_events(events: &[GestureEvent]) {
    for ev in events {
        JsonLines.emit(ev.clone());
    }
}

const IDLE_POLL: Duration = Duration::from_millis(4);

/// Idle wait, cut short when a deferred click or clear is due sooner.
fn idle_sleep(deadline: Option<Instant>, now: Instant) -> Duration {
    deadline
        .map(|d| d.saturating_duration_since(now))
        .map_or(IDLE_POLL, |left| left.min(IDLE_POLL))
}

fn feed(machine: &mut GestureMachine, inputs: Vec<PointerInput>) {
    for input in inputs {
        machine.handle(input);
    }
}

/// Classifies a live mouse until SIGINT/SIGTERM.
pub fn run_watch(profile: &Profile, device: Option<String>) -> Result<()> {
    let path = match device {
        Some(p) => p,
        None => input::discover_pointers()
            .into_iter()
            .next()
            .map(|d| d.path)
            .ok_or_else(|| anyhow!("no pointer devices detected; try `pointerctl devices`"))?,
    };
    let mut dev = Device::open(&path).map_err(|e| anyhow!("failed to open {path}: {e}"))?;
    dev.set_nonblocking(true)?;
    info!(
        "watching {} ({}) with profile '{}'",
        dev.name().unwrap_or("unknown"),
        path,
        profile.name()
    );

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&stop))?;

    let queue = Arc::new(Queued::new());
    let hub = ObserverHub::new(queue.clone());
    hub.subscribe(Arc::new(JsonLines));

    let surface = profile.surface.surface();
    let mut machine = GestureMachine::new(profile.thresholds.clone())
        .with_snapper(Box::new(profile.snap.snapper()))
        .with_observers(hub);
    machine.bind_surface(surface);
    let mut decoder = PointerDecoder::new(surface, ClickCounter::from_thresholds(&profile.thresholds));

    while !stop.load(Ordering::Relaxed) {
        let mut any_event = false;
        let mut inputs = Vec::new();
        match dev.fetch_events() {
            Ok(events) => {
                let now = Instant::now();
                for ev in events {
                    any_event = true;
                    inputs.extend(decoder.decode(&ev, now));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("device {path} went away: {e}");
                feed(&mut machine, decoder.focus_lost());
                stop.store(true, Ordering::Relaxed);
            }
        }
        feed(&mut machine, inputs);

        machine.tick(Instant::now());
        queue.drain();

        if !any_event {
            thread::sleep(idle_sleep(machine.next_deadline(), Instant::now()));
        }
    }

    // flush clicks still waiting on the double-click interval
    let th = &profile.thresholds;
    machine.tick(Instant::now() + th.double_click_interval());
    queue.drain();
    info!("watch stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_sleep_is_capped_by_next_deadline() {
        let now = Instant::now();
        assert_eq!(idle_sleep(None, now), IDLE_POLL);
        assert_eq!(idle_sleep(Some(now + Duration::from_secs(1)), now), IDLE_POLL);
        assert_eq!(
            idle_sleep(Some(now + Duration::from_millis(1)), now),
            Duration::from_millis(1)
        );
        assert_eq!(idle_sleep(Some(now), now + Duration::from_millis(3)), Duration::ZERO);
    }
}
