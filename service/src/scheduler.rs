use crate::{Batches, Device, Mode, ScheduleError, SchedulerConfig, SentenceBatch};
use log::{debug, info, warn};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};
use tokenizer::Vocab;
use tokio::sync::oneshot;

type Job<W> = Box<dyn FnOnce(&mut W) + Send>;
type Init<W> = Arc<dyn Fn(Device) -> W + Send + Sync>;

/// 批量翻译调度器。
///
/// 每个工作线程绑定一个设备，并在自己的线程上用 `init` 构造独占的状态 `W`
/// （通常是一个解码器），任务之间不共享任何可变状态。
pub struct Scheduler<W> {
    config: SchedulerConfig,
    init: Init<W>,
    queue: Option<Sender<Job<W>>>,
    workers: Vec<JoinHandle<()>>,
    /// Worker state of the unbatched mode, built on first use.
    local: Option<W>,
    submitted: usize,
}

/// Completion handle of one submitted batch.
pub struct TaskHandle<R> {
    index: usize,
    receiver: oneshot::Receiver<Result<R, ScheduleError>>,
}

impl<R> TaskHandle<R> {
    /// Submission index of the task.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Blocks until the task is done. Must not be called inside an async
    /// runtime; use [`TaskHandle::wait`] there.
    pub fn join(self) -> Result<R, ScheduleError> {
        let index = self.index;
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(ScheduleError::TaskLost { index }))
    }

    pub async fn wait(self) -> Result<R, ScheduleError> {
        let index = self.index;
        self.receiver
            .await
            .unwrap_or(Err(ScheduleError::TaskLost { index }))
    }
}

impl<W: 'static> Scheduler<W> {
    pub fn new(
        config: SchedulerConfig,
        init: impl Fn(Device) -> W + Send + Sync + 'static,
    ) -> Result<Self, ScheduleError> {
        config.validate()?;
        let init: Init<W> = Arc::new(init);

        let mut ans = Self {
            config,
            init,
            queue: None,
            workers: Vec::new(),
            local: None,
            submitted: 0,
        };
        match ans.config.mode {
            Mode::Batched => {
                let (sender, receiver) = mpsc::channel();
                let receiver = Arc::new(Mutex::new(receiver));
                // dropping `ans` on an early return closes the queue and joins
                ans.queue = Some(sender);

                let (ready, started) = mpsc::channel();
                let devices = ans.config.worker_devices();
                for (i, device) in devices.iter().copied().enumerate() {
                    let worker = spawn_worker(
                        i,
                        device,
                        ans.init.clone(),
                        receiver.clone(),
                        ready.clone(),
                    )?;
                    ans.workers.push(worker);
                }
                drop(ready);
                for result in started.iter().take(devices.len()) {
                    result?;
                }

                info!(
                    "scheduler started: {} cpu threads, {} x {:?} device threads, batch size {}",
                    ans.config.cpu_threads,
                    ans.config.threads_per_device,
                    ans.config.devices,
                    ans.config.max_batch_size,
                );
            }
            Mode::Unbatched => info!("scheduler started in unbatched mode"),
        }
        Ok(ans)
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Sentences per batch in the current mode.
    #[inline]
    pub fn batch_size(&self) -> usize {
        match self.config.mode {
            Mode::Batched => self.config.max_batch_size,
            Mode::Unbatched => 1,
        }
    }

    /// Queues `task` over `batch` on the pool. In unbatched mode the task
    /// runs before this returns.
    pub fn submit<R, F>(
        &mut self,
        batch: SentenceBatch,
        task: F,
    ) -> Result<TaskHandle<R>, ScheduleError>
    where
        R: Send + 'static,
        F: FnOnce(&mut W, &SentenceBatch) -> R + Send + 'static,
    {
        if batch.is_empty() {
            return Err(ScheduleError::EmptyBatch);
        }
        if self.queue.is_none() && self.local.is_none() {
            let state = catch_unwind(AssertUnwindSafe(|| (self.init)(Device::Cpu)))
                .map_err(|e| ScheduleError::InitPanicked {
                    name: "local".into(),
                    message: panic_message(&*e),
                })?;
            self.local = Some(state);
        }
        let index = self.submitted;
        self.submitted += 1;
        debug!("submit task {index} of {} sentences", batch.len());

        let (sender, receiver) = oneshot::channel();
        let job = move |state: &mut W| {
            let ans = catch_unwind(AssertUnwindSafe(|| task(state, &batch))).map_err(|e| {
                ScheduleError::TaskPanicked {
                    index,
                    message: panic_message(&*e),
                }
            });
            if let Err(e) = &ans {
                warn!("{e}");
            }
            // the handle may be gone already
            let _ = sender.send(ans);
        };

        match &self.queue {
            Some(queue) => {
                if queue.send(Box::new(job)).is_err() {
                    warn!("task {index} submitted after all workers exited");
                }
            }
            None => {
                if let Some(state) = self.local.as_mut() {
                    job(state);
                }
            }
        }
        Ok(TaskHandle { index, receiver })
    }

    /// Runs `task` once per batch of `lines` and returns the results in
    /// submission order. Stops at the first failed batch.
    pub fn run_batches<I, V, R, F>(
        &mut self,
        lines: I,
        vocab: &V,
        task: F,
    ) -> Result<Vec<R>, ScheduleError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        V: Vocab + ?Sized,
        R: Send + 'static,
        F: Fn(&mut W, &SentenceBatch) -> R + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let handles = Batches::new(lines, vocab, self.batch_size())
            .map(|batch| {
                let task = task.clone();
                self.submit(batch, move |state, batch| task(state, batch))
            })
            .collect::<Result<Vec<_>, _>>()?;
        handles.into_iter().map(TaskHandle::join).collect()
    }

    /// Like [`Scheduler::run_batches`], with `task` producing one result per
    /// sentence; the results come back one per input line, in input order.
    pub fn translate<I, V, R, F>(
        &mut self,
        lines: I,
        vocab: &V,
        task: F,
    ) -> Result<Vec<R>, ScheduleError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        V: Vocab + ?Sized,
        R: Send + 'static,
        F: Fn(&mut W, &SentenceBatch) -> Vec<R> + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let handles = Batches::new(lines, vocab, self.batch_size())
            .map(|batch| {
                let len = batch.len();
                let task = task.clone();
                self.submit(batch, move |state, batch| task(state, batch))
                    .map(|handle| (len, handle))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut ans = Vec::new();
        for (expected, handle) in handles {
            let index = handle.index();
            let results = handle.join()?;
            if results.len() != expected {
                return Err(ScheduleError::ResultCount {
                    index,
                    expected,
                    actual: results.len(),
                });
            }
            ans.extend(results);
        }
        Ok(ans)
    }
}

impl<W> Drop for Scheduler<W> {
    fn drop(&mut self) {
        // 关闭队列，工作线程取完剩余任务后退出
        self.queue.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn spawn_worker<W: 'static>(
    i: usize,
    device: Device,
    init: Init<W>,
    queue: Arc<Mutex<Receiver<Job<W>>>>,
    ready: Sender<Result<(), ScheduleError>>,
) -> Result<JoinHandle<()>, ScheduleError> {
    let name = format!("{device}-{i}");
    let worker = name.clone();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let mut state = match catch_unwind(AssertUnwindSafe(|| init(device))) {
                Ok(state) => {
                    let _ = ready.send(Ok(()));
                    state
                }
                Err(e) => {
                    let message = panic_message(&*e);
                    warn!("worker {worker} failed to start: {message}");
                    let _ = ready.send(Err(ScheduleError::InitPanicked {
                        name: worker,
                        message,
                    }));
                    return;
                }
            };
            drop(ready);
            loop {
                let job = match queue.lock() {
                    Ok(queue) => queue.recv(),
                    Err(_) => break,
                };
                match job {
                    Ok(job) => job(&mut state),
                    Err(_) => break,
                }
            }
            debug!("worker {i} on {device} exits");
        })
        .map_err(|e| ScheduleError::Spawn {
            name,
            message: e.to_string(),
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
