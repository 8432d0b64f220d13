//! Broadcasting of job events for in-process observers.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster};
