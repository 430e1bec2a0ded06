//! The transformer: a worker pool, an output queue and a processor behind a
//! small lifecycle state machine.
//!
//! ```text
//! uninitialized --init--> inited --start--> started --stop--> stopped
//!                           ^  |
//!                           +--+ add_op
//! ```
//!
//! `put` is accepted only while started. `get` keeps returning records until
//! the transformer is stopped and every submitted record has been consumed.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::concurrent::{BoundedQueue, Task, WorkerPool};
use crate::config::TransformerConfig;
use crate::error::{Result, TransformerError};
use crate::params::{KvConf, OpConfig, OpParams};
use crate::processor::{process_record, Layout, Processor, ProcessorFactory, TOCHW_OP};
use crate::record::{InputRecord, OutputRecord};

/// Interval at which `get` re-checks for exhaustion while the output queue is empty.
pub const GET_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Output queue capacity before `init` sets the configured limit.
const INITIAL_OUTPUT_LIMIT: usize = 1000;

/// Hands out transformer ids. Owned by whoever creates transformers.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id, starting at 1.
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Lifecycle state of a [`Transformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransformerState {
    Uninitialized = 0,
    Inited = 1,
    Started = 2,
    Stopped = 3,
}

impl TransformerState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransformerState::Uninitialized => "uninitialized",
            TransformerState::Inited => "inited",
            TransformerState::Started => "started",
            TransformerState::Stopped => "stopped",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransformerState::Inited,
            2 => TransformerState::Started,
            3 => TransformerState::Stopped,
            _ => TransformerState::Uninitialized,
        }
    }
}

impl fmt::Display for TransformerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State touched by worker threads and the consumer without the lifecycle lock.
struct Shared {
    output: BoundedQueue<OutputRecord>,
    state: AtomicU8,
    in_count: AtomicU64,
    out_count: AtomicU64,
}

impl Shared {
    fn state(&self) -> TransformerState {
        TransformerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn unconsumed(&self) -> u64 {
        let out = self.out_count.load(Ordering::SeqCst);
        self.in_count.load(Ordering::SeqCst).saturating_sub(out)
    }

    fn is_exhausted(&self) -> bool {
        self.state() != TransformerState::Started && self.unconsumed() == 0
    }
}

struct Running {
    pool: WorkerPool,
    processor: Arc<dyn Processor>,
    layout: Layout,
}

struct Lifecycle {
    state: TransformerState,
    config: Option<TransformerConfig>,
    ops: Vec<OpConfig>,
    layout: Layout,
    processor: Option<Arc<dyn Processor>>,
    running: Option<Arc<Running>>,
}

/// Multi-threaded record transformer.
///
/// Outputs arrive in completion order, not submission order; correlate them
/// through [`OutputRecord::id`].
pub struct Transformer {
    id: u64,
    factory: ProcessorFactory,
    lifecycle: Mutex<Lifecycle>,
    shared: Arc<Shared>,
}

impl Transformer {
    /// Create a transformer using the built-in operators.
    pub fn new(ids: &IdGenerator) -> Self {
        Self::with_factory(ids, ProcessorFactory::default())
    }

    /// Create a transformer whose processors come from `factory`.
    pub fn with_factory(ids: &IdGenerator, factory: ProcessorFactory) -> Self {
        let id = ids.next_id();
        tracing::info!("Transformer {} created", id);
        Self {
            id,
            factory,
            lifecycle: Mutex::new(Lifecycle {
                state: TransformerState::Uninitialized,
                config: None,
                ops: Vec::new(),
                layout: Layout::Hwc,
                processor: None,
                running: None,
            }),
            shared: Arc::new(Shared {
                output: BoundedQueue::new(INITIAL_OUTPUT_LIMIT),
                state: AtomicU8::new(TransformerState::Uninitialized as u8),
                in_count: AtomicU64::new(0),
                out_count: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, lifecycle: &mut Lifecycle, state: TransformerState) {
        lifecycle.state = state;
        self.shared.state.store(state as u8, Ordering::Release);
    }

    fn invalid_state(&self, op: &'static str, state: TransformerState) -> TransformerError {
        tracing::warn!(
            "Transformer {}: '{}' not allowed in state '{}'",
            self.id,
            op,
            state
        );
        TransformerError::InvalidState {
            op,
            state: state.to_string(),
        }
    }

    /// Apply worker and queue settings. Only valid once, before anything else.
    pub fn init(&self, config: &TransformerConfig) -> Result<()> {
        let mut lifecycle = self.lock();
        if lifecycle.state != TransformerState::Uninitialized {
            return Err(self.invalid_state("init", lifecycle.state));
        }
        if let Err(e) = config.validate() {
            tracing::warn!("Transformer {}: rejected config: {}", self.id, e);
            return Err(e.into());
        }

        self.shared.output.set_limit(config.worker_queue_limit);
        lifecycle.layout = config.layout();
        lifecycle.config = Some(config.clone());
        self.set_state(&mut lifecycle, TransformerState::Inited);
        tracing::info!(
            "Transformer {} inited: {} threads, queue limit {}, layout {:?}",
            self.id,
            config.thread_num,
            config.worker_queue_limit,
            lifecycle.layout
        );
        Ok(())
    }

    /// [`init`](Self::init) from the flat key/value form.
    pub fn init_kv(&self, conf: &KvConf) -> Result<()> {
        let config = TransformerConfig::from_kv(conf).map_err(|e| {
            tracing::warn!("Transformer {}: rejected config: {}", self.id, e);
            TransformerError::from(e)
        })?;
        self.init(&config)
    }

    /// Append an operator to the chain. Only valid after `init`, before `start`.
    pub fn add_op(&self, name: impl Into<String>, params: KvConf) -> Result<()> {
        self.add_op_config(OpConfig {
            name: name.into(),
            params,
        })
    }

    pub fn add_op_config(&self, op: OpConfig) -> Result<()> {
        let mut lifecycle = self.lock();
        if lifecycle.state != TransformerState::Inited {
            return Err(self.invalid_state("add_op", lifecycle.state));
        }
        if !self.factory.is_known_op(&op.name) {
            tracing::warn!("Transformer {}: unsupported operator '{}'", self.id, op.name);
            return Err(TransformerError::UnknownOperator(op.name));
        }
        if op.name == TOCHW_OP {
            let flag = OpParams::new(&op.params).get_int_or("value", 1);
            lifecycle.layout = lifecycle.layout.or(Layout::from_flag(flag));
        }
        tracing::debug!("Transformer {}: added op '{}' {:?}", self.id, op.name, op.params);
        lifecycle.ops.push(op);
        Ok(())
    }

    /// Append several operators, stopping at the first rejected one.
    pub fn add_ops(&self, ops: impl IntoIterator<Item = OpConfig>) -> Result<()> {
        ops.into_iter().try_for_each(|op| self.add_op_config(op))
    }

    /// Use `processor` instead of building one from the factory at `start`.
    pub fn set_processor(&self, processor: Arc<dyn Processor>) -> Result<()> {
        let mut lifecycle = self.lock();
        match lifecycle.state {
            TransformerState::Uninitialized | TransformerState::Inited => {
                lifecycle.processor = Some(processor);
                Ok(())
            }
            state => Err(self.invalid_state("set_processor", state)),
        }
    }

    /// Build the processor and spawn the workers.
    ///
    /// On failure the transformer stays in its previous state.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lock();
        let config = match (lifecycle.state, &lifecycle.config) {
            (TransformerState::Inited, Some(config)) => config.clone(),
            (TransformerState::Uninitialized, _) => {
                tracing::warn!("Transformer {}: start before successful init", self.id);
                return Err(TransformerError::NotConfigured);
            }
            (state, _) => return Err(self.invalid_state("start", state)),
        };
        if lifecycle.ops.is_empty() {
            tracing::warn!("Transformer {}: start with empty pipeline", self.id);
            return Err(TransformerError::EmptyPipeline);
        }

        let processor = match &lifecycle.processor {
            Some(processor) => Arc::clone(processor),
            None => self
                .factory
                .create(&config.processor, &lifecycle.ops, config.seed)?,
        };

        let pool = WorkerPool::new(
            format!("transformer-{}", self.id),
            config.thread_num,
            config.worker_queue_limit,
        );
        if let Err(e) = pool.start() {
            tracing::error!("Transformer {}: failed to start workers: {}", self.id, e);
            pool.notify_exit();
            pool.join();
            return Err(e.into());
        }

        lifecycle.running = Some(Arc::new(Running {
            pool,
            processor,
            layout: lifecycle.layout,
        }));
        self.set_state(&mut lifecycle, TransformerState::Started);
        tracing::info!(
            "Transformer {} started with {} ops",
            self.id,
            lifecycle.ops.len()
        );
        Ok(())
    }

    /// Reject further `put`s. Queued and in-flight records still complete.
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lock();
        if lifecycle.state != TransformerState::Started {
            return Err(self.invalid_state("stop", lifecycle.state));
        }
        self.set_state(&mut lifecycle, TransformerState::Stopped);
        tracing::info!(
            "Transformer {} stopped: {} in, {} out",
            self.id,
            self.in_count(),
            self.out_count()
        );
        Ok(())
    }

    /// True in every state except `started`.
    pub fn is_stopped(&self) -> bool {
        self.shared.state() != TransformerState::Started
    }

    /// Submit a record. Blocks while the task queue is full.
    pub fn put(&self, input: InputRecord) -> Result<()> {
        // Counted under the lock so a concurrent `stop` never observes an
        // accepted record missing from `in_count`.
        let running = {
            let lifecycle = self.lock();
            match (lifecycle.state, &lifecycle.running) {
                (TransformerState::Started, Some(running)) => {
                    self.shared.in_count.fetch_add(1, Ordering::SeqCst);
                    Arc::clone(running)
                }
                (state, _) => return Err(self.invalid_state("put", state)),
            }
        };

        let shared = Arc::clone(&self.shared);
        let processor = Arc::clone(&running.processor);
        let layout = running.layout;
        let task = Task::new(move || {
            let record = process_record(processor.as_ref(), &input, layout);
            let code = record.err_code;
            if !record.is_ok() {
                tracing::warn!(
                    id = record.id,
                    code,
                    "Failed to transform record: {}",
                    record.err_message
                );
            }
            shared.output.put(record);
            code
        });

        if let Err(e) = running.pool.append_task(task) {
            self.shared.in_count.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("Transformer {}: failed to submit task: {}", self.id, e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Submit caller-owned buffers; they are copied before this returns.
    pub fn put_raw(&self, id: u32, data: &[u8], label: &[u8]) -> Result<()> {
        self.put(InputRecord::from_slices(id, data, label))
    }

    /// Next completed record.
    ///
    /// Waits while records are outstanding; returns
    /// [`TransformerError::Exhausted`] once stopped with nothing left.
    pub fn get(&self) -> Result<OutputRecord> {
        loop {
            if let Some(record) = self.shared.output.try_get() {
                return Ok(self.consumed(record));
            }
            if self.shared.is_exhausted() {
                tracing::info!("Transformer {} has stopped and has no more data", self.id);
                return Err(TransformerError::Exhausted);
            }
            if let Some(record) = self.shared.output.get_timeout(GET_POLL_INTERVAL) {
                return Ok(self.consumed(record));
            }
        }
    }

    /// Single bounded wait for a record. `Ok(None)` on timeout.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<OutputRecord>> {
        if let Some(record) = self.shared.output.try_get() {
            return Ok(Some(self.consumed(record)));
        }
        if self.shared.is_exhausted() {
            return Err(TransformerError::Exhausted);
        }
        Ok(self
            .shared
            .output
            .get_timeout(timeout)
            .map(|record| self.consumed(record)))
    }

    fn consumed(&self, record: OutputRecord) -> OutputRecord {
        self.shared.out_count.fetch_add(1, Ordering::SeqCst);
        record
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransformerState {
        self.shared.state()
    }

    /// Records accepted by `put`.
    pub fn in_count(&self) -> u64 {
        self.shared.in_count.load(Ordering::SeqCst)
    }

    /// Records returned by `get`.
    pub fn out_count(&self) -> u64 {
        self.shared.out_count.load(Ordering::SeqCst)
    }

    /// Submitted but not yet retrieved. Only stable once stopped.
    pub fn unconsumed_count(&self) -> u64 {
        self.shared.unconsumed()
    }

    pub fn layout(&self) -> Layout {
        self.lock().layout
    }

    /// The operator chain as configured so far.
    pub fn ops(&self) -> Vec<OpConfig> {
        self.lock().ops.clone()
    }
}

impl Drop for Transformer {
    fn drop(&mut self) {
        tracing::info!("Dropping transformer {}", self.id);
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if lifecycle.state == TransformerState::Started {
            lifecycle.state = TransformerState::Stopped;
            self.shared
                .state
                .store(TransformerState::Stopped as u8, Ordering::Release);
        }

        // Workers blocked on a full output queue must be able to finish.
        self.shared.output.set_limit(usize::MAX);
        if let Some(running) = lifecycle.running.take() {
            running.pool.notify_exit();
            running.pool.join();
        }

        for record in self.shared.output.drain() {
            tracing::info!(
                "Transformer {}: deleting unconsumed record {}",
                self.id,
                record.id
            );
        }
        tracing::info!("Transformer {} dropped", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, ErrorKind, ProcessError, ProcessResult};
    use crate::processor::{Frame, ScriptRegistry};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::collections::HashSet;
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([x as u8, y as u8, 7])
        }));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn kv(pairs: &[(&str, &str)]) -> KvConf {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn started(ids: &IdGenerator, threads: usize, limit: usize, ops: &[&str]) -> Transformer {
        let t = Transformer::new(ids);
        t.init(&TransformerConfig::new(threads, limit)).unwrap();
        for op in ops {
            t.add_op(*op, KvConf::new()).unwrap();
        }
        t.start().unwrap();
        t
    }

    /// Drain until exhaustion, returning every record.
    fn drain(t: &Transformer) -> Vec<OutputRecord> {
        let mut out = Vec::new();
        loop {
            match t.get() {
                Ok(record) => {
                    assert!(t.in_count() >= t.out_count());
                    out.push(record);
                }
                Err(TransformerError::Exhausted) => return out,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    struct AlwaysFails;

    impl Processor for AlwaysFails {
        fn kind(&self) -> &str {
            "failing"
        }

        fn process(&self, _input: &InputRecord) -> ProcessResult<Frame> {
            Err(ProcessError::new(ErrorCode::DecodeFailed, "stub failure"))
        }
    }

    #[test]
    fn test_two_records_then_exhausted() {
        let ids = IdGenerator::new();
        let t = Transformer::new(&ids);
        t.init_kv(&kv(&[("thread_num", "2"), ("worker_queue_limit", "4")]))
            .unwrap();
        t.add_op("decode", KvConf::new()).unwrap();
        t.start().unwrap();
        t.put(InputRecord::new(1, png(4, 3), "a")).unwrap();
        t.put(InputRecord::new(2, png(4, 3), "b")).unwrap();
        t.stop().unwrap();

        let first = t.get().unwrap();
        let second = t.get().unwrap();
        let got: HashSet<u32> = [first.id, second.id].into_iter().collect();
        assert_eq!(got, HashSet::from([1, 2]));
        assert!(first.is_ok());
        assert_eq!(first.shape, vec![3, 4, 3]);
        assert!(matches!(t.get(), Err(TransformerError::Exhausted)));
        assert_eq!(t.unconsumed_count(), 0);
    }

    #[test]
    fn test_zero_threads_never_starts() {
        let ids = IdGenerator::new();
        let t = Transformer::new(&ids);
        let err = t
            .init_kv(&kv(&[("thread_num", "0"), ("worker_queue_limit", "4")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        assert!(t.add_op("decode", KvConf::new()).is_err());
        let err = t.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(t.state(), TransformerState::Uninitialized);
        assert!(t.is_stopped());
    }

    #[test]
    fn test_put_counts_only_accepted_records() {
        let ids = IdGenerator::new();
        let t = Transformer::new(&ids);
        let err = t.put(InputRecord::new(1, png(2, 2), "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(t.in_count(), 0);

        t.init(&TransformerConfig::new(2, 8)).unwrap();
        t.add_op("decode", KvConf::new()).unwrap();
        t.start().unwrap();
        for id in 0..5 {
            t.put_raw(id, &png(2, 2), b"l").unwrap();
        }
        assert_eq!(t.in_count(), 5);

        t.get().unwrap();
        assert_eq!(t.out_count(), 1);
        assert!(t.in_count() >= t.out_count());

        t.stop().unwrap();
        assert!(t.put(InputRecord::new(9, png(2, 2), "")).is_err());
        assert_eq!(t.in_count(), 5);
        assert_eq!(drain(&t).len(), 4);
        assert_eq!(t.out_count(), 5);
    }

    #[test]
    fn test_round_trip_unique_ids_under_backpressure() {
        const N: u32 = 60;
        let ids = IdGenerator::new();
        let t = started(&ids, 3, 2, &["decode"]);
        let data = png(5, 5);

        let outputs = std::thread::scope(|s| {
            s.spawn(|| {
                for id in 0..N {
                    t.put(InputRecord::new(id, data.clone(), "")).unwrap();
                }
                t.stop().unwrap();
            });
            drain(&t)
        });

        let seen: HashSet<u32> = outputs.iter().map(|r| r.id).collect();
        assert_eq!(outputs.len(), N as usize);
        assert_eq!(seen.len(), N as usize);
        assert_eq!(t.in_count(), N as u64);
        assert_eq!(t.out_count(), N as u64);
    }

    #[test]
    fn test_failing_processor_returns_raw_input() {
        let ids = IdGenerator::new();
        let t = Transformer::new(&ids);
        t.init(&TransformerConfig::new(2, 4)).unwrap();
        t.add_op("decode", KvConf::new()).unwrap();
        t.set_processor(Arc::new(AlwaysFails)).unwrap();
        t.start().unwrap();

        let inputs: Vec<InputRecord> = (0..4)
            .map(|id| InputRecord::new(id, vec![id as u8; 3 + id as usize], "x"))
            .collect();
        for input in &inputs {
            t.put(input.clone()).unwrap();
        }
        t.stop().unwrap();

        let outputs = drain(&t);
        assert_eq!(outputs.len(), inputs.len());
        for out in outputs {
            let input = &inputs[out.id as usize];
            assert_eq!(out.data, input.data);
            assert_ne!(out.err_code, 0);
            assert!(out.shape.is_empty());
        }
    }

    #[test]
    fn test_add_op_state_and_name_checks() {
        let ids = IdGenerator::new();
        let t = Transformer::new(&ids);
        assert_eq!(
            t.add_op("decode", KvConf::new()).unwrap_err().kind(),
            ErrorKind::State
        );

        t.init(&TransformerConfig::new(1, 1)).unwrap();
        let err = t.add_op("sharpen", KvConf::new()).unwrap_err();
        assert!(matches!(err, TransformerError::UnknownOperator(ref n) if n == "sharpen"));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        assert!(matches!(t.start(), Err(TransformerError::EmptyPipeline)));
        assert_eq!(t.state(), TransformerState::Inited);

        t.add_op("decode", KvConf::new()).unwrap();
        t.start().unwrap();
        assert_eq!(
            t.add_op("flip", KvConf::new()).unwrap_err().kind(),
            ErrorKind::State
        );
        assert_eq!(t.ops().len(), 1);
        assert!(t.init(&TransformerConfig::new(1, 1)).is_err());
        assert!(t.start().is_err());
    }

    #[test]
    fn test_tochw_switches_layout() {
        let ids = IdGenerator::new();
        let t = started(&ids, 1, 2, &["decode", "tochw"]);
        assert_eq!(t.layout(), Layout::Chw);
        t.put(InputRecord::new(1, png(4, 2), "")).unwrap();
        t.stop().unwrap();
        let out = t.get().unwrap();
        assert_eq!(out.shape, vec![3, 2, 4]);
    }

    #[test]
    fn test_operator_failure_is_per_record() {
        let ids = IdGenerator::new();
        let t = Transformer::new(&ids);
        t.init(&TransformerConfig::new(2, 4)).unwrap();
        t.add_ops([
            OpConfig::new("decode"),
            OpConfig::new("resize").param("resize_w", 2).param("resize_h", 2),
        ])
        .unwrap();
        t.start().unwrap();
        t.put(InputRecord::new(1, png(6, 6), "")).unwrap();
        t.put(InputRecord::new(2, b"garbage".to_vec(), "")).unwrap();
        t.stop().unwrap();

        let mut outputs = drain(&t);
        outputs.sort_by_key(|r| r.id);
        assert_eq!(outputs[0].shape, vec![2, 2, 3]);
        assert_eq!(outputs[1].err_code, ErrorCode::DecodeFailed.as_i32());
        assert_eq!(outputs[1].data, b"garbage".to_vec());
    }

    #[test]
    fn test_get_timeout_and_never_started() {
        let ids = IdGenerator::new();
        let idle = Transformer::new(&ids);
        assert!(matches!(idle.get(), Err(TransformerError::Exhausted)));

        let t = started(&ids, 1, 2, &["decode"]);
        assert!(matches!(t.get_timeout(Duration::from_millis(20)), Ok(None)));
        t.stop().unwrap();
        assert!(matches!(
            t.get_timeout(Duration::from_millis(20)),
            Err(TransformerError::Exhausted)
        ));
        assert!(t.stop().is_err());
    }

    #[test]
    fn test_drop_with_workers_blocked_on_output() {
        let ids = IdGenerator::new();
        let t = started(&ids, 1, 1, &["decode"]);
        for id in 0..3 {
            t.put(InputRecord::new(id, png(2, 2), "")).unwrap();
        }
        // Nothing consumed: the output queue is full and a worker is blocked.
        drop(t);
    }

    #[test]
    fn test_ids_come_from_generator() {
        let ids = IdGenerator::new();
        let a = Transformer::new(&ids);
        let b = Transformer::new(&ids);
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
    }

    #[test]
    fn test_script_processor_from_factory() {
        let mut scripts = ScriptRegistry::new();
        scripts.register_fn(
            "constant",
            |_: &InputRecord, _: Option<&Frame>, params: &OpParams<'_>| {
                let v = params.get_int_or("value", 0) as u8;
                Frame::new(1, 2, 1, vec![v, v])
            },
        );
        let factory = ProcessorFactory::new(Default::default(), scripts);
        let ids = IdGenerator::new();
        let t = Transformer::with_factory(&ids, factory);
        t.init_kv(&kv(&[
            ("thread_num", "1"),
            ("worker_queue_limit", "2"),
            ("processor", "script"),
        ]))
        .unwrap();
        t.add_op_config(
            OpConfig::new("script")
                .param("name", "constant")
                .param("value", 9),
        )
        .unwrap();
        t.start().unwrap();
        t.put(InputRecord::new(4, vec![1u8], "")).unwrap();
        t.stop().unwrap();

        let out = t.get().unwrap();
        assert_eq!(out.shape, vec![1, 2, 1]);
        assert_eq!(out.data, vec![9, 9]);
    }

    #[test]
    fn test_unknown_processor_kind_fails_start() {
        let ids = IdGenerator::new();
        let t = Transformer::new(&ids);
        let mut config = TransformerConfig::new(1, 1);
        config.processor = "lua".to_string();
        t.init(&config).unwrap();
        t.add_op("decode", KvConf::new()).unwrap();
        assert_eq!(t.start().unwrap_err().kind(), ErrorKind::Configuration);
        assert_eq!(t.state(), TransformerState::Inited);
    }
}
