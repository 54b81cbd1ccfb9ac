mod app;
mod assignment;
mod capacity;
mod error;
mod registration;
mod stats;

pub use app::{app, AppState};
