//! `raidcore-server`: the HTTP/WebSocket surface, process entry point, and
//! graceful shutdown for the session and raid coordination core (spec §6).
//!
//! Every other crate in the workspace is domain logic; this crate is wiring:
//! `state` assembles collaborators into one `AppState`, `http` and
//! `websocket` expose them, `error` maps [`raidcore_core::CoreError`] onto
//! the wire envelope (spec §7), and `metrics` owns the Prometheus recorder.

pub mod error;
pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use error::ServerError;
pub use http::create_router;
pub use state::AppState;
