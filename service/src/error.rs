use thiserror::Error;

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum ScheduleError {
    #[error("no worker thread configured")]
    NoWorkers,
    #[error("max batch size must be positive")]
    ZeroBatchSize,
    #[error("empty batch submitted")]
    EmptyBatch,
    #[error("failed to spawn worker {name}: {message}")]
    Spawn { name: String, message: String },
    #[error("worker {name} failed to start: {message}")]
    InitPanicked { name: String, message: String },
    #[error("task {index} panicked: {message}")]
    TaskPanicked { index: usize, message: String },
    #[error("task {index} dropped by its worker")]
    TaskLost { index: usize },
    #[error("task {index} returned {actual} results for {expected} sentences")]
    ResultCount {
        index: usize,
        expected: usize,
        actual: usize,
    },
}
