// Shared statistics region for all simulated clients
//
// Every client owns one `WorkerSlot`. Only the owning worker thread writes its
// counters; the reporter reads all slots and writes the few baseline fields at
// the warmup -> execute transition. Relaxed atomics are enough: the readers are
// a once-per-second progress display and the final summary taken after every
// worker thread has been joined.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::constants::{HIST_HIGH_US, HIST_LOW_US, HIST_SIGFIG};

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW_US, HIST_HIGH_US, HIST_SIGFIG)
        .expect("histogram bounds are valid constants")
}

fn as_us(d: Duration) -> u64 {
    d.as_micros().min(u64::MAX as u128) as u64
}

/// Count, total and max latency for one operation kind of one client.
pub struct OpCounters {
    count: AtomicU64,
    total_us: AtomicU64,
    max_us: AtomicU64,
    hist: Mutex<Histogram<u64>>,
}

impl OpCounters {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
            hist: Mutex::new(new_histogram()),
        }
    }

    pub fn record(&self, latency: Duration) {
        let us = as_us(latency);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
        let _ = self.hist.lock().record(us.clamp(HIST_LOW_US, HIST_HIGH_US));
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.total_us.store(0, Ordering::Relaxed);
        self.max_us.store(0, Ordering::Relaxed);
        self.hist.lock().reset();
    }
}

/// Reduced statistics for one operation kind.
#[derive(Debug, Clone)]
pub struct OpSummary {
    pub name: String,
    pub count: u64,
    pub total_us: u64,
    pub max_us: u64,
    pub hist: Histogram<u64>,
}

impl OpSummary {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            total_us: 0,
            max_us: 0,
            hist: new_histogram(),
        }
    }

    fn merge(&mut self, c: &OpCounters) {
        self.count += c.count.load(Ordering::Relaxed);
        self.total_us += c.total_us.load(Ordering::Relaxed);
        self.max_us = self.max_us.max(c.max_us.load(Ordering::Relaxed));
        let _ = self.hist.add(&*c.hist.lock());
    }

    /// Average latency in milliseconds; only meaningful for `count > 0`.
    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_us as f64 / self.count as f64 / 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.max_us as f64 / 1000.0
    }
}

/// Per-client state shared between the worker thread and the reporter.
pub struct WorkerSlot {
    pub id: usize,
    /// Index of the worker process (thread group) running this client
    pub process: usize,

    bytes: AtomicU64,
    bytes_done_warmup: AtomicU64,
    line: AtomicU64,

    done: AtomicBool,
    cleanup: AtomicBool,
    cleanup_finished: AtomicBool,
    failed: AtomicBool,
    /// Inside a pacing sleep; the reporter does not count this as a stall
    sleeping: AtomicBool,

    /// Microseconds since the run origin
    phase_start_us: AtomicU64,
    last_op_us: AtomicU64,

    max_latency_us: AtomicU64,
    worst_latency_us: AtomicU64,

    diagnostics: AtomicU64,
    ops: Vec<OpCounters>,
}

impl WorkerSlot {
    fn new(id: usize, process: usize, nops: usize) -> Self {
        Self {
            id,
            process,
            bytes: AtomicU64::new(0),
            bytes_done_warmup: AtomicU64::new(0),
            line: AtomicU64::new(0),
            done: AtomicBool::new(false),
            cleanup: AtomicBool::new(false),
            cleanup_finished: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            sleeping: AtomicBool::new(false),
            phase_start_us: AtomicU64::new(0),
            last_op_us: AtomicU64::new(0),
            max_latency_us: AtomicU64::new(0),
            worst_latency_us: AtomicU64::new(0),
            diagnostics: AtomicU64::new(0),
            ops: (0..nops).map(|_| OpCounters::new()).collect(),
        }
    }

    /// `client<id>`, substituted for the placeholder in trace lines
    pub fn client_name(&self) -> String {
        format!("client{}", self.id)
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn bytes_done_warmup(&self) -> u64 {
        self.bytes_done_warmup.load(Ordering::Relaxed)
    }

    /// Bytes moved since the warmup baseline
    pub fn phase_bytes(&self) -> u64 {
        self.bytes().saturating_sub(self.bytes_done_warmup())
    }

    fn capture_warmup_baseline(&self) {
        self.bytes_done_warmup.store(self.bytes(), Ordering::Relaxed);
    }

    pub fn next_line(&self) -> u64 {
        self.line.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn line(&self) -> u64 {
        self.line.load(Ordering::Relaxed)
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Relaxed);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    pub fn mark_cleanup(&self) {
        self.cleanup.store(true, Ordering::Relaxed);
    }

    pub fn in_cleanup(&self) -> bool {
        self.cleanup.load(Ordering::Relaxed)
    }

    pub fn mark_cleanup_finished(&self) {
        self.cleanup_finished.store(true, Ordering::Relaxed);
    }

    pub fn cleanup_finished(&self) -> bool {
        self.cleanup_finished.load(Ordering::Relaxed)
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Relaxed);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn set_sleeping(&self, sleeping: bool) {
        self.sleeping.store(sleeping, Ordering::Relaxed);
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping.load(Ordering::Relaxed)
    }

    pub fn phase_start_us(&self) -> u64 {
        self.phase_start_us.load(Ordering::Relaxed)
    }

    pub fn set_phase_start_us(&self, us: u64) {
        self.phase_start_us.store(us, Ordering::Relaxed);
    }

    pub fn last_op_us(&self) -> u64 {
        self.last_op_us.load(Ordering::Relaxed)
    }

    pub fn touch(&self, now_us: u64) {
        self.last_op_us.store(now_us, Ordering::Relaxed);
    }

    /// Offer a scheduling latency; keeps the maximum since the last report.
    pub fn note_latency(&self, latency: Duration) {
        self.max_latency_us.fetch_max(as_us(latency), Ordering::Relaxed);
    }

    pub fn max_latency_us(&self) -> u64 {
        self.max_latency_us.load(Ordering::Relaxed)
    }

    /// Read and clear the maximum latency seen since the last report.
    pub fn take_max_latency_us(&self) -> u64 {
        self.max_latency_us.swap(0, Ordering::Relaxed)
    }

    pub fn raise_worst_latency_us(&self, us: u64) {
        self.worst_latency_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn worst_latency_us(&self) -> u64 {
        self.worst_latency_us.load(Ordering::Relaxed)
    }

    pub fn add_diagnostic(&self) {
        self.diagnostics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn diagnostics(&self) -> u64 {
        self.diagnostics.load(Ordering::Relaxed)
    }

    pub fn record_op(&self, kind: usize, latency: Duration) {
        if let Some(c) = self.ops.get(kind) {
            c.record(latency);
        }
    }

    pub fn op_count(&self, kind: usize) -> u64 {
        self.ops.get(kind).map_or(0, OpCounters::count)
    }

    pub fn total_ops(&self) -> u64 {
        self.ops.iter().map(OpCounters::count).sum()
    }

    /// Warmup is over: new byte baseline, fresh latency and op statistics.
    fn reset_for_execute(&self, now_us: u64) {
        self.capture_warmup_baseline();
        self.worst_latency_us.store(0, Ordering::Relaxed);
        self.set_phase_start_us(now_us);
        for c in &self.ops {
            c.reset();
        }
    }
}

/// The whole shared region: one slot per client plus run-wide flags.
pub struct RunState {
    origin: Instant,
    abort: AtomicBool,
    op_names: Vec<String>,
    slots: Vec<WorkerSlot>,
}

impl RunState {
    /// Allocate `nprocs * clients_per_process` zeroed slots. Client `i`
    /// belongs to process `i / clients_per_process`.
    pub fn new(nprocs: usize, clients_per_process: usize, op_names: Vec<String>) -> Self {
        let cpp = clients_per_process.max(1);
        let nops = op_names.len();
        let slots = (0..nprocs * cpp)
            .map(|id| WorkerSlot::new(id, id / cpp, nops))
            .collect();
        Self {
            origin: Instant::now(),
            abort: AtomicBool::new(false),
            op_names,
            slots,
        }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Microseconds between the run origin and `at`
    pub fn us_since_origin(&self, at: Instant) -> u64 {
        as_us(at.saturating_duration_since(self.origin))
    }

    pub fn now_us(&self) -> u64 {
        self.us_since_origin(Instant::now())
    }

    pub fn slots(&self) -> &[WorkerSlot] {
        &self.slots
    }

    pub fn slot(&self, id: usize) -> &WorkerSlot {
        &self.slots[id]
    }

    pub fn nclients(&self) -> usize {
        self.slots.len()
    }

    pub fn op_names(&self) -> &[String] {
        &self.op_names
    }

    /// Run-wide cancellation; workers stop at their next loop iteration.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
        self.mark_all_done();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn mark_all_done(&self) {
        for s in &self.slots {
            s.mark_done();
        }
    }

    /// Mark every client as (re)starting its phase at `at`.
    pub fn start_phase(&self, at: Instant) {
        let us = self.us_since_origin(at);
        for s in &self.slots {
            s.set_phase_start_us(us);
            s.touch(us);
        }
    }

    pub(crate) fn end_warmup(&self, at: Instant) {
        let us = self.us_since_origin(at);
        for s in &self.slots {
            s.reset_for_execute(us);
        }
    }

    pub fn total_phase_bytes(&self) -> u64 {
        self.slots.iter().map(WorkerSlot::phase_bytes).sum()
    }

    pub fn total_diagnostics(&self) -> u64 {
        self.slots.iter().map(WorkerSlot::diagnostics).sum()
    }

    pub fn worst_latency_us(&self) -> u64 {
        self.slots
            .iter()
            .map(WorkerSlot::worst_latency_us)
            .max()
            .unwrap_or(0)
    }

    /// Sum counts and totals, max-reduce maxima across all clients.
    pub fn summarize(&self) -> Vec<OpSummary> {
        let mut out: Vec<OpSummary> = self.op_names.iter().map(|n| OpSummary::empty(n)).collect();
        for slot in &self.slots {
            for (sum, c) in out.iter_mut().zip(&slot.ops) {
                sum.merge(c);
            }
        }
        out
    }

    /// Statistics of a single client.
    pub fn summarize_client(&self, id: usize) -> Vec<OpSummary> {
        let mut out: Vec<OpSummary> = self.op_names.iter().map(|n| OpSummary::empty(n)).collect();
        for (sum, c) in out.iter_mut().zip(&self.slots[id].ops) {
            sum.merge(c);
        }
        out
    }
}
