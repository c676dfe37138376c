#![forbid(unsafe_code)]

//! Time-zone aware task reminders with at-least-once notification delivery.
//!
//! Tasks are anchored to an origin instant and IANA zone. Reminders fire a
//! fixed number of minutes before that instant, travel through a durable
//! queue, and are delivered by a polling worker that treats each reminder's
//! `sent` flag as its de-duplication barrier.

pub mod api;
pub mod cache;
pub mod channels;
pub mod config;
pub mod errors;
pub mod models;
pub mod notification;
pub mod persistence;
pub mod queue;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod timezone;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
