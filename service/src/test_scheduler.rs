use crate::{Device, Mode, ScheduleError, Scheduler, SchedulerConfig, SentenceBatch};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering::SeqCst},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};
use tokenizer::VocabTxt;

fn vocab() -> VocabTxt {
    VocabTxt::from_words(["</s>", "<unk>", "a", "b", "c", "boom"])
}

fn cpu(threads: usize, batch: usize) -> SchedulerConfig {
    SchedulerConfig {
        cpu_threads: threads,
        max_batch_size: batch,
        ..Default::default()
    }
}

#[test]
fn test_order() {
    let vocab = vocab();
    let finished = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new(cpu(3, 1), |_| ()).unwrap();

    let record = finished.clone();
    let ans = scheduler
        .run_batches(["a", "b", "c"], &vocab, move |_, batch| {
            let id = batch[0].field(0)[0];
            // "a" finishes last, "c" first
            thread::sleep(Duration::from_millis(match id {
                2 => 300,
                3 => 150,
                _ => 0,
            }));
            record.lock().unwrap().push(id);
            id
        })
        .unwrap();

    assert_eq!(ans, [2, 3, 4]);
    assert_eq!(finished.lock().unwrap()[0], 4);
}

#[test]
fn test_batch_sizes() {
    let vocab = vocab();
    let mut scheduler = Scheduler::new(cpu(2, 2), |_| ()).unwrap();
    let sizes = scheduler
        .run_batches(["a", "b", "c", "a b", "c"], &vocab, |_, batch| batch.len())
        .unwrap();
    assert_eq!(sizes, [2, 2, 1]);
}

#[test]
fn test_translate() {
    let vocab = vocab();
    let mut scheduler = Scheduler::new(cpu(2, 2), |_| 0usize).unwrap();
    let lines = ["a b", "c", "b b b", "a", "c a"];
    let ans = scheduler
        .translate(lines, &vocab, |count, batch| {
            *count += 1;
            batch
                .iter()
                .map(|s| (s.line_num(), s.len()))
                .collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(ans, [(0, 2), (1, 1), (2, 3), (3, 1), (4, 2)]);

    let err = scheduler
        .translate(lines, &vocab, |_, _| Vec::<()>::new())
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::ResultCount {
            expected: 2,
            actual: 0,
            ..
        }
    ));
}

#[test]
fn test_unbatched() {
    let vocab = vocab();
    let inits = Arc::new(AtomicUsize::new(0));
    let config = SchedulerConfig {
        cpu_threads: 0,
        max_batch_size: 4,
        mode: Mode::Unbatched,
        ..Default::default()
    };
    let counter = inits.clone();
    let mut scheduler = Scheduler::new(config, move |device| {
        assert_eq!(device, Device::Cpu);
        counter.fetch_add(1, SeqCst);
        thread::current().id()
    })
    .unwrap();
    assert_eq!(scheduler.batch_size(), 1);
    assert_eq!(inits.load(SeqCst), 0);

    let ans = scheduler
        .run_batches(["a b", "c", "a"], &vocab, |owner, batch| {
            assert_eq!(*owner, thread::current().id());
            (batch.len(), batch[0].line_num())
        })
        .unwrap();
    assert_eq!(ans, [(1, 0), (1, 1), (1, 2)]);
    assert_eq!(inits.load(SeqCst), 1);
}

#[test]
fn test_panic() {
    let vocab = vocab();
    let mut scheduler = Scheduler::new(cpu(1, 1), |_| ()).unwrap();
    let task = |_: &mut (), batch: &SentenceBatch| {
        if batch[0].field(0) == [5] {
            panic!("boom at line {}", batch[0].line_num())
        }
        batch[0].line_num()
    };

    let err = scheduler
        .run_batches(["a", "boom", "c"], &vocab, task)
        .unwrap_err();
    assert_eq!(
        err,
        ScheduleError::TaskPanicked {
            index: 1,
            message: "boom at line 1".into(),
        }
    );

    // the worker survives
    assert_eq!(
        scheduler.run_batches(["a", "c"], &vocab, task).unwrap(),
        [0, 1]
    );
}

#[test]
fn test_empty_batch() {
    let mut scheduler = Scheduler::new(cpu(1, 1), |_| ()).unwrap();
    let err = scheduler
        .submit(SentenceBatch::default(), |_, _| ())
        .err()
        .unwrap();
    assert_eq!(err, ScheduleError::EmptyBatch);
}

#[test]
fn test_workers() {
    let devices = Arc::new(Mutex::new(Vec::new()));
    let config = SchedulerConfig {
        cpu_threads: 1,
        devices: vec![0],
        threads_per_device: 2,
        max_batch_size: 3,
        mode: Mode::Batched,
    };
    let record = devices.clone();
    let scheduler = Scheduler::new(config, move |device| {
        record.lock().unwrap().push(device);
        assert!(thread::current().name().is_some());
    })
    .unwrap();
    drop(scheduler);

    let mut devices = devices.lock().unwrap().clone();
    devices.sort_by_key(|d| match d {
        Device::Cpu => 0,
        Device::Accelerator(i) => *i + 1,
    });
    assert_eq!(
        devices,
        [Device::Cpu, Device::Accelerator(0), Device::Accelerator(0)]
    );
}

#[test]
fn test_invalid_config() {
    let err = Scheduler::new(cpu(0, 1), |_| ()).err().unwrap();
    assert_eq!(err, ScheduleError::NoWorkers);
    let err = Scheduler::new(cpu(1, 0), |_| ()).err().unwrap();
    assert_eq!(err, ScheduleError::ZeroBatchSize);
}

#[test]
fn test_wait() {
    let vocab = vocab();
    let mut scheduler = Scheduler::new(cpu(2, 2), |_| ()).unwrap();
    let handles = crate::Batches::new(["a", "b", "c"], &vocab, 2)
        .map(|batch| scheduler.submit(batch, |_, batch| batch.len()).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        handles.iter().map(|h| h.index()).collect::<Vec<_>>(),
        [0, 1]
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let sizes = runtime.block_on(async {
        let mut ans = Vec::new();
        for handle in handles {
            ans.push(handle.wait().await.unwrap());
        }
        ans
    });
    assert_eq!(sizes, [2, 1]);
}

#[test]
fn test_worker_fails_to_start() {
    let config = SchedulerConfig {
        cpu_threads: 1,
        devices: vec![0, 1],
        ..Default::default()
    };
    let err = Scheduler::new(config, |device| {
        if device == Device::Accelerator(1) {
            panic!("no device 1")
        }
    })
    .err()
    .unwrap();
    assert_eq!(
        err,
        ScheduleError::InitPanicked {
            name: "device1-2".into(),
            message: "no device 1".into(),
        }
    );
}

#[test]
fn test_local_fails_to_start() {
    let vocab = vocab();
    let config = SchedulerConfig {
        mode: Mode::Unbatched,
        ..Default::default()
    };
    let mut scheduler = Scheduler::new(config, |_| -> () { panic!("no local state") }).unwrap();
    let err = scheduler
        .run_batches(["a"], &vocab, |_, batch| batch.len())
        .unwrap_err();
    assert_eq!(
        err,
        ScheduleError::InitPanicked {
            name: "local".into(),
            message: "no local state".into(),
        }
    );
}
