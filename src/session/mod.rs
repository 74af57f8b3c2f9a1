pub mod commands;
mod controller;
mod state;

pub use controller::{SessionController, SessionEvents, TauriEvents};
pub use state::{SessionError, SessionPhase, SessionSnapshot};
