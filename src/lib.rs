//! Pointer gesture classification.
//!
//! [`GestureMachine`] turns raw pointer input (button down/up, movement,
//! enter/exit) into hover, click, double-click and drag notifications, each
//! with a bounding rect and a lifecycle [`Phase`].

pub mod config;
pub mod debounce;
pub mod geometry;
pub mod gestures;
pub mod input;
pub mod observers;
pub mod replay;
pub mod snap;
pub mod tracker;

pub use geometry::{Point, Rect};
pub use gestures::{Button, GestureKind, GestureMachine, HostSurface, Phase};
pub use observers::{GestureEvent, GestureObserver, ObserverHub};
