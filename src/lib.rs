// Library surface for the race engine; the binary is a thin headless driver.
pub mod analysis;
pub mod app_dirs;
pub mod config;
pub mod content;
pub mod error;
pub mod game;
pub mod metrics;
pub mod runtime;
pub mod session;
pub mod sync;
pub mod time_series;

pub use game::{GameSession, Lobby, SessionEvent};
