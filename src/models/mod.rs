//! Domain model module declarations.

pub mod job;
pub mod reminder;
pub mod task;
