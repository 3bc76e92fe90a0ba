//! hostpulse_agent: host telemetry sampling, history and live fan-out to
//! dashboard viewers over WebSocket.

pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod retention;
pub mod sampler;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
