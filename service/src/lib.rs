//! Batched, order-preserving translation over a pool of worker threads.

#![deny(warnings)]

mod config;
mod error;
mod scheduler;
mod sentence;

pub use config::{Device, Mode, SchedulerConfig};
pub use error::ScheduleError;
pub use scheduler::{Scheduler, TaskHandle};
pub use sentence::{Batches, Sentence, SentenceBatch, FIELD_SEPARATOR};

#[cfg(test)]
mod test_scheduler;
