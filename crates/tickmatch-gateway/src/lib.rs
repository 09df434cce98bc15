//! tickmatch-gateway
//!
//! Multi-transport front end for the tickmatch matching engine.
//!
//! This crate glues together `tickmatch-core` and `tickmatch-wire`
//! behind TCP, UDP, and multicast transports, and exposes a
//! `supervisor::run(Config)` entrypoint.

pub mod config;
pub mod envelope;
pub mod ingress;
pub mod multicast;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod router;
pub mod stats;
pub mod supervisor;
pub mod tcp;
pub mod udp;
pub mod user_map;
