//! Phase tracking, progress lines and the final summary
//!
//! The controller calls [`Reporter::tick`] once per second. Each tick sums
//! the shared slots, drives the warmup -> execute -> cleanup transitions off
//! wall-clock deadlines and renders one progress line.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::Options;
use crate::stats::{OpSummary, RunState};

/// Global run phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Warmup,
    Execute,
    Cleanup,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotStarted => "not started",
            Phase::Warmup => "warmup",
            Phase::Execute => "execute",
            Phase::Cleanup => "cleanup",
            Phase::Done => "done",
        }
    }
}

/// Result of one reporter tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub phase: Phase,
    /// Progress line to print, if any
    pub line: Option<String>,
}

pub struct Reporter {
    state: Arc<RunState>,
    opts: Arc<Options>,
    phase: Phase,
    phase_start: Instant,
    warmup: u64,
    execute_start: Option<Instant>,
    end: Option<Instant>,
    throughput: f64,
}

impl Reporter {
    pub fn new(state: Arc<RunState>, opts: Arc<Options>) -> Self {
        let warmup = opts.warmup_secs();
        Self {
            state,
            opts,
            phase: Phase::NotStarted,
            phase_start: Instant::now(),
            warmup,
            execute_start: None,
            end: None,
            throughput: 0.0,
        }
    }

    /// Clients were released at `at`.
    pub fn start(&mut self, at: Instant) {
        self.phase_start = at;
        self.phase = if self.warmup > 0 {
            Phase::Warmup
        } else {
            self.execute_start = Some(at);
            Phase::Execute
        };
        self.state.start_phase(at);
        info!("Run started in {} phase", self.phase.as_str());
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Last execute phase throughput in MB/sec
    pub fn throughput(&self) -> f64 {
        self.throughput
    }

    /// When the execute deadline fired, if it has
    pub fn end(&self) -> Option<Instant> {
        self.end
    }

    /// Time spent in the execute phase as of `now`
    pub fn execute_elapsed(&self, now: Instant) -> Duration {
        match self.execute_start {
            Some(start) => self.end.unwrap_or(now).saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    pub fn finish(&mut self) {
        self.phase = Phase::Done;
    }

    pub fn tick(&mut self, now: Instant) -> Tick {
        if matches!(self.phase, Phase::NotStarted | Phase::Done) {
            return Tick {
                phase: self.phase,
                line: None,
            };
        }

        let nclients = self.state.nclients().max(1);
        let slots = self.state.slots();
        let total_bytes: u64 = slots.iter().map(|s| s.phase_bytes()).sum();
        let total_lines: u64 = slots.iter().map(|s| s.line()).sum();
        let num_finished = slots.iter().filter(|s| s.cleanup_finished()).count();
        let num_active = nclients - num_finished;

        let t = now.saturating_duration_since(self.phase_start).as_secs_f64();

        if self.phase == Phase::Warmup && t > self.warmup as f64 {
            info!("Warmup finished after {:.1} sec, starting execute phase", t);
            self.phase_start = now;
            self.execute_start = Some(now);
            self.state.end_warmup(now);
            self.phase = Phase::Execute;
            return Tick {
                phase: self.phase,
                line: None,
            };
        }

        if self.phase == Phase::Execute && t > self.opts.timelimit as f64 {
            info!("Time limit reached, stopping clients");
            self.state.mark_all_done();
            self.end = Some(now);
            self.phase = Phase::Cleanup;
        }

        if t < 1.0 {
            return Tick {
                phase: self.phase,
                line: None,
            };
        }

        let mut latency_us = 0u64;
        if self.phase != Phase::Cleanup {
            let now_us = self.state.us_since_origin(now);
            for s in slots {
                let mut lat = s.take_max_latency_us();
                if !s.is_sleeping() && !s.cleanup_finished() {
                    lat = lat.max(now_us.saturating_sub(s.last_op_us()));
                }
                s.raise_worst_latency_us(lat);
                latency_us = latency_us.max(lat);
            }
        }

        let mbps = 1.0e-6 * total_bytes as f64 / t;
        let lines = total_lines / nclients as u64;
        let ms = latency_us as f64 / 1000.0;
        let mr = self.opts.machine_readable;

        let line = match self.phase {
            Phase::Warmup if mr => {
                format!("@W@{}@{}@{:.2}@{}@{:.3}@", num_active, lines, mbps, t as u64, ms)
            }
            Phase::Warmup => format!(
                "{:4}  {:8}  {:7.2} MB/sec  warmup {:3.0} sec  latency {:.3} ms",
                num_active, lines, mbps, t, ms
            ),
            Phase::Cleanup if mr => {
                format!("@C@{}@{}@{:.2}@{}@{:.3}@", num_active, lines, mbps, t as u64, ms)
            }
            Phase::Cleanup => format!("{:4}  cleanup {:3.0} sec", num_active, t),
            _ => {
                self.throughput = mbps;
                if mr {
                    format!("@R@{}@{}@{:.2}@{}@{:.3}@", num_active, lines, mbps, t as u64, ms)
                } else {
                    format!(
                        "{:4}  {:8}  {:7.2} MB/sec  execute {:3.0} sec  latency {:.3} ms",
                        nclients, lines, mbps, t, ms
                    )
                }
            }
        };

        Tick {
            phase: self.phase,
            line: Some(line),
        }
    }
}

/// Operation table; `ops` is printed, `all` decides which rows exist.
pub fn latency_table(ops: &[OpSummary], all: &[OpSummary], machine_readable: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, " Operation                Count    AvgLat    MaxLat");
    let _ = writeln!(out, " --------------------------------------------------");
    for (op, sum) in ops.iter().zip(all) {
        if sum.count == 0 {
            continue;
        }
        if machine_readable {
            let _ = writeln!(out, ":{}:{}:{:.3}:{:.3}:", op.name, op.count, op.avg_ms(), op.max_ms());
        } else {
            let _ = writeln!(
                out,
                " {:<22} {:7} {:9.3} {:9.3}",
                op.name,
                op.count,
                op.avg_ms(),
                op.max_ms()
            );
        }
    }
    out
}

/// Global table followed by per-client sections when requested.
pub fn latency_report(state: &RunState, opts: &Options) -> String {
    let sum = state.summarize();
    let mut out = latency_table(&sum, &sum, opts.machine_readable);
    out.push('\n');

    if !opts.per_client_results {
        return out;
    }

    out.push_str("Per client results:\n");
    for slot in state.slots() {
        let _ = writeln!(
            out,
            "Client {} did {} lines and {} bytes",
            slot.id,
            slot.line(),
            slot.phase_bytes()
        );
        out.push_str(&latency_table(&state.summarize_client(slot.id), &sum, opts.machine_readable));
        out.push('\n');
    }
    out
}

/// Final one-line verdict.
pub fn throughput_line(throughput: f64, max_latency: Duration, opts: &Options) -> String {
    let ms = max_latency.as_secs_f64() * 1000.0;
    if opts.machine_readable {
        format!(";{};{};{};{:.3};", throughput, opts.nclients(), opts.nprocs, ms)
    } else {
        format!(
            "Throughput {} MB/sec{}{}  {} clients  {} procs  max_latency={:.3} ms",
            throughput,
            if opts.sync_open { " (sync open)" } else { "" },
            if opts.sync_dirs { " (sync dirs)" } else { "" },
            opts.nclients(),
            opts.nprocs,
            ms
        )
    }
}

/// Writes `<base>-results.tsv` with one row per executed operation kind.
pub struct TsvExporter {
    basename: String,
}

impl TsvExporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            basename: path.as_ref().to_string_lossy().to_string(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}-results.tsv", self.basename)
    }

    pub fn export_results(&self, ops: &[OpSummary], execute_secs: f64) -> Result<String> {
        let path = self.path();
        let mut f = File::create(&path).with_context(|| format!("Failed to create {}", path))?;

        writeln!(f, "operation\tcount\tmean_us\tp50_us\tp90_us\tp99_us\tmax_us\tops_per_sec")?;
        for op in ops.iter().filter(|o| o.count > 0) {
            let ops_per_sec = if execute_secs > 0.0 {
                op.count as f64 / execute_secs
            } else {
                0.0
            };
            writeln!(
                f,
                "{}\t{}\t{:.2}\t{}\t{}\t{}\t{}\t{:.2}",
                op.name,
                op.count,
                op.total_us as f64 / op.count as f64,
                op.hist.value_at_quantile(0.50),
                op.hist.value_at_quantile(0.90),
                op.hist.value_at_quantile(0.99),
                op.max_us,
                ops_per_sec
            )?;
        }
        info!("TSV results exported to: {}", path);
        Ok(path)
    }
}
