//! # qosagent
//!
//! Node-local QoS agent core. Reconciliation work for pods, pools and service
//! profiles is driven through [`engine::AsyncWorkers`], which keeps at most
//! one execution in flight per key and always converges on the latest
//! request for that key.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod telemetry;
