//! Browser wiring: page event hooks and the JavaScript-facing handle.

pub mod handle;
pub mod hooks;
