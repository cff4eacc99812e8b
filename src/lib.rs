//! Gesture-to-OS-action core: turns per-frame hand skeletons into debounced action intents.

pub mod bindings;
pub mod config;
pub mod control;
pub mod error;
pub mod gesture;
pub mod learner;
pub mod modes;
pub mod pipeline;
pub mod tracker;
pub mod types;

pub use control::{Controller, InputSink, Status};
pub use types::{ActionIntent, GestureLabel, HandRole, HandSkeleton, Landmark, LandmarkFrame};
