// src/controller.rs
// Worker lifecycle: validate, set up, release, report, collect.
//
// Each worker process is an OS thread running its clients' replay loops with
// blocking I/O. The controller itself runs a small tokio runtime for the
// one-second reporter tick, Ctrl-C handling and collecting group results.

use anyhow::{anyhow, Context, Result};
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Builder as RtBuilder;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::backend::{block::Block, fileio::FileIo, nfs::Nfs, scsi::Scsi, smb::Smb, sockio::SockIo, Backend};
use crate::config::{BackendKind, Options};
use crate::constants::{PRINT_FREQ, READY_TIMEOUT};
use crate::error::ReplayError;
use crate::replay::{Client, Group};
use crate::report::{latency_report, throughput_line, Reporter, TsvExporter};
use crate::stats::{OpSummary, RunState};
use crate::trace::check_loadfile;

/// What a finished run hands back to the caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Execute phase throughput in MB/sec
    pub throughput: f64,
    pub max_latency: Duration,
    pub clients: usize,
    pub procs: usize,
    pub ops: Vec<OpSummary>,
    pub diagnostics: u64,
    /// Total bytes moved since the warmup baseline
    pub bytes: u64,
}

impl RunSummary {
    pub fn op(&self, name: &str) -> Option<&OpSummary> {
        self.ops.iter().find(|o| o.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Default)]
struct GateState {
    ready: usize,
    failed: Option<(usize, String)>,
    released: bool,
}

/// Startup barrier: the controller waits for every process to finish
/// backend setup (or one to fail, or the timeout) before releasing them.
pub struct ReadyGate {
    total: usize,
    state: Mutex<GateState>,
    cond: Condvar,
}

impl ReadyGate {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: Mutex::new(GateState::default()),
            cond: Condvar::new(),
        }
    }

    pub fn ready(&self) {
        let mut s = self.state.lock();
        s.ready += 1;
        self.cond.notify_all();
    }

    pub fn fail(&self, process: usize, reason: String) {
        let mut s = self.state.lock();
        if s.failed.is_none() {
            s.failed = Some((process, reason));
        }
        self.cond.notify_all();
    }

    /// Block until everyone is ready. Errors on a setup failure or timeout.
    pub fn wait_all(&self, timeout: Duration) -> Result<(), ReplayError> {
        let deadline = Instant::now() + timeout;
        let mut s = self.state.lock();
        loop {
            if let Some((process, reason)) = s.failed.clone() {
                return Err(ReplayError::SetupFailed { process, reason });
            }
            if s.ready >= self.total {
                return Ok(());
            }
            if self.cond.wait_until(&mut s, deadline).timed_out() {
                if s.ready >= self.total {
                    return Ok(());
                }
                return Err(ReplayError::SetupTimeout {
                    ready: s.ready,
                    total: self.total,
                    waited: timeout,
                });
            }
        }
    }

    pub fn release(&self) {
        let mut s = self.state.lock();
        s.released = true;
        self.cond.notify_all();
    }

    /// Worker side: park until the controller releases the clients.
    pub fn wait_release(&self) {
        let mut s = self.state.lock();
        while !s.released {
            self.cond.wait(&mut s);
        }
    }
}

/// Pick the backend named in the options and run.
pub fn run(opts: Arc<Options>) -> Result<RunSummary> {
    match opts.backend {
        BackendKind::Fileio => run_with(FileIo::new(), opts),
        BackendKind::Sockio => run_with(SockIo::new(), opts),
        BackendKind::Block => run_with(Block::new(), opts),
        BackendKind::Nfs => run_with(Nfs::new(), opts),
        BackendKind::Scsi => run_with(Scsi::new(), opts),
        BackendKind::Smb => run_with(Smb::new(), opts),
    }
}

type GroupResult = (usize, Result<()>);

/// Run the full lifecycle against a specific backend.
pub fn run_with<B: Backend>(backend: B, opts: Arc<Options>) -> Result<RunSummary> {
    opts.validate()?;
    let nprocs = opts.nprocs;
    let cpp = opts.clients_per_process;
    let nclients = opts.nclients();

    for i in 0..nclients {
        check_loadfile(&opts.loadfile_for(i)?)?;
    }

    backend
        .init(&opts)
        .with_context(|| format!("Failed to initialize the {} backend", backend.name()))?;

    println!(
        "Running for {} seconds with load '{}' and minimum warmup {} secs",
        opts.timelimit,
        opts.loadfile.as_deref().unwrap_or_default(),
        opts.warmup_secs()
    );

    let backend = Arc::new(backend);
    let table = Arc::new(backend.op_table(&opts));
    let state = Arc::new(RunState::new(nprocs, cpp, table.names()));
    let gate = Arc::new(ReadyGate::new(nprocs));
    let (tx, rx) = mpsc::unbounded_channel::<GroupResult>();
    let loadfiles = (0..nprocs)
        .map(|p| opts.loadfile_for(p))
        .collect::<Result<Vec<PathBuf>>>()?;

    let mut handles = Vec::with_capacity(nprocs);
    for process in 0..nprocs {
        let backend = backend.clone();
        let table = table.clone();
        let worker_state = state.clone();
        let opts = opts.clone();
        let worker_gate = gate.clone();
        let tx = tx.clone();
        let loadfile = loadfiles[process].clone();

        let spawned = thread::Builder::new()
            .name(format!("dbench-proc-{}", process))
            .spawn(move || {
                let mut clients = Vec::with_capacity(cpp);
                for id in process * cpp..(process + 1) * cpp {
                    let slot = worker_state.slot(id);
                    match backend.setup(slot, &opts) {
                        Ok(session) => clients.push(Client::new(slot, session, opts.client_rate())),
                        Err(e) => {
                            worker_gate.fail(process, format!("{:#}", e));
                            return;
                        }
                    }
                }
                debug!("process {} set up {} clients", process, clients.len());
                worker_gate.ready();
                worker_gate.wait_release();
                if worker_state.is_aborted() {
                    return;
                }

                let group = Group {
                    process,
                    backend: backend.as_ref(),
                    table: table.as_ref(),
                    state: worker_state.as_ref(),
                    opts: opts.as_ref(),
                    loadfile: &loadfile,
                };
                let result = group.run(&mut clients);
                if result.is_err() {
                    worker_state.abort();
                }
                let _ = tx.send((process, result));
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                state.abort();
                gate.release();
                join_all(handles);
                return Err(e).with_context(|| format!("Failed to spawn worker process {}", process));
            }
        }
    }
    drop(tx);

    println!("Waiting for child processes to finish setup.");
    if let Err(e) = gate.wait_all(READY_TIMEOUT) {
        state.abort();
        gate.release();
        join_all(handles);
        return Err(e.into());
    }

    println!("Releasing clients");
    let mut reporter = Reporter::new(state.clone(), opts.clone());
    reporter.start(Instant::now());
    gate.release();

    let rt = RtBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let outcome = rt.block_on(supervise(rx, &mut reporter, state.clone(), nprocs));

    join_all(handles);

    if let Some(line) = reporter.tick(Instant::now()).line {
        println!("{}", line);
    }
    reporter.finish();
    outcome?;

    println!();
    print!("{}", latency_report(&state, &opts));

    let ops = state.summarize();
    if let Some(base) = &opts.results_tsv {
        let secs = reporter.execute_elapsed(Instant::now()).as_secs_f64();
        TsvExporter::new(base).export_results(&ops, secs)?;
    }

    let max_latency = Duration::from_micros(state.worst_latency_us());
    println!("{}", throughput_line(reporter.throughput(), max_latency, &opts));

    Ok(RunSummary {
        throughput: reporter.throughput(),
        max_latency,
        clients: nclients,
        procs: nprocs,
        ops,
        diagnostics: state.total_diagnostics(),
        bytes: state.total_phase_bytes(),
    })
}

/// Print progress every second until every group has reported back.
async fn supervise(
    mut rx: mpsc::UnboundedReceiver<GroupResult>,
    reporter: &mut Reporter,
    state: Arc<RunState>,
    nprocs: usize,
) -> Result<()> {
    let mut ticker = tokio::time::interval(PRINT_FREQ);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut finished = 0usize;
    let mut first_error: Option<anyhow::Error> = None;
    let mut interrupted = false;

    while finished < nprocs {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(line) = reporter.tick(Instant::now()).line {
                    println!("{}", line);
                }
            }
            msg = rx.recv() => match msg {
                Some((process, Ok(()))) => {
                    debug!("process {} finished", process);
                    finished += 1;
                }
                Some((process, Err(e))) => {
                    error!("process {} failed: {:#}", process, e);
                    state.abort();
                    finished += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                None => {
                    // A worker went away without reporting: it panicked.
                    state.abort();
                    if first_error.is_none() {
                        first_error = Some(anyhow!(
                            "{} of {} worker processes exited without a result",
                            nprocs - finished,
                            nprocs
                        ));
                    }
                    break;
                }
            },
            res = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                match res {
                    Ok(()) => {
                        warn!("Interrupted, stopping clients");
                        state.mark_all_done();
                    }
                    Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!("All {} worker processes finished", nprocs);
            Ok(())
        }
    }
}

fn join_all(handles: Vec<thread::JoinHandle<()>>) {
    for h in handles {
        let name = h.thread().name().unwrap_or("worker").to_string();
        if h.join().is_err() {
            error!("{} panicked", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_all_ready() {
        let gate = Arc::new(ReadyGate::new(3));
        let mut hs = Vec::new();
        for _ in 0..3 {
            let g = gate.clone();
            hs.push(thread::spawn(move || {
                g.ready();
                g.wait_release();
            }));
        }
        gate.wait_all(Duration::from_secs(5)).unwrap();
        gate.release();
        for h in hs {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_gate_timeout() {
        let gate = ReadyGate::new(2);
        gate.ready();
        let start = Instant::now();
        let err = gate.wait_all(Duration::from_millis(100)).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(100));
        match err {
            ReplayError::SetupTimeout { ready, total, .. } => {
                assert_eq!(ready, 1);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_gate_setup_failure() {
        let gate = ReadyGate::new(2);
        gate.ready();
        gate.fail(1, "cannot connect".into());
        match gate.wait_all(Duration::from_secs(5)).unwrap_err() {
            ReplayError::SetupFailed { process, reason } => {
                assert_eq!(process, 1);
                assert_eq!(reason, "cannot connect");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn reporter(nprocs: usize) -> (Arc<RunState>, Reporter) {
        let state = Arc::new(RunState::new(nprocs, 1, vec!["Close".into()]));
        let opts = Arc::new(Options {
            nprocs,
            timelimit: 60,
            ..Default::default()
        });
        let mut reporter = Reporter::new(state.clone(), opts);
        reporter.start(Instant::now());
        (state, reporter)
    }

    #[tokio::test]
    async fn test_supervise_all_finished() {
        let (state, mut reporter) = reporter(2);
        let (tx, rx) = mpsc::unbounded_channel::<GroupResult>();
        tx.send((0, Ok(()))).unwrap();
        tx.send((1, Ok(()))).unwrap();
        supervise(rx, &mut reporter, state.clone(), 2).await.unwrap();
        assert!(!state.is_aborted());
    }

    #[tokio::test]
    async fn test_supervise_group_failure_aborts_run() {
        let (state, mut reporter) = reporter(2);
        let (tx, rx) = mpsc::unbounded_channel::<GroupResult>();
        tx.send((1, Err(anyhow!("disk on fire")))).unwrap();
        tx.send((0, Ok(()))).unwrap();
        let err = supervise(rx, &mut reporter, state.clone(), 2).await.unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
        assert!(state.is_aborted());
    }

    #[tokio::test]
    async fn test_supervise_lost_worker() {
        let (state, mut reporter) = reporter(2);
        let (tx, rx) = mpsc::unbounded_channel::<GroupResult>();
        tx.send((0, Ok(()))).unwrap();
        drop(tx);
        let err = supervise(rx, &mut reporter, state.clone(), 2).await.unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
        assert!(state.is_aborted());
    }
}
