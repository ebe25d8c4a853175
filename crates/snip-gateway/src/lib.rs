//! HTTP gateway for the snip URL shortener.

pub mod app;
pub mod cli;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod model;
pub mod state;

pub use app::App;
pub use state::AppState;
