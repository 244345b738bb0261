//! Wakegate - a lazy-start controller for Docker containers behind a reverse proxy
//!
//! This library keeps labeled containers stopped until traffic arrives:
//! - Discovers eligible containers by a configurable label prefix
//! - Resolves an incoming hostname to a container via explicit labels or
//!   by partially parsing Traefik `Host()`/`HostRegexp()` router rules
//! - Starts a container on demand, together with its declared dependency
//!   providers, and reports readiness hints back to the requester
//! - Watches per-container network byte counters and stops containers
//!   again after a configurable window of inactivity
//! - Exposes a small HTTP endpoint for the proxy to send wake-up requests
//!   to, plus status pages for the managed inventory

pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod host;
pub mod labels;
pub mod rules;
pub mod server;
pub mod state;
