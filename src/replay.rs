//! Replay loop
//!
//! One worker process (thread) runs [`Group::run`] for its clients. The
//! clients share a single pass over the load file: every line is replayed by
//! each client in turn before the next line is read. Cancellation is
//! cooperative and checked before each line: a client marked done by the
//! reporter or the run-wide abort flag ends the group's replay and moves it
//! to cleanup.

use anyhow::{Context, Result};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::Options;
use crate::constants::{MAX_PARAMS, SLEEP_OP};
use crate::error::ReplayError;
use crate::ops::{Op, OpTable};
use crate::pacing::{self, Pace, RatePacer};
use crate::stats::{RunState, WorkerSlot};
use crate::trace::{parse_param, LineOutcome, TraceLine, TraceReader};

/// Thread-local half of a simulated client.
pub struct Client<S> {
    pub id: usize,
    pub name: String,
    pub session: S,
    pacer: RatePacer,
}

impl<S> Client<S> {
    pub fn new(slot: &WorkerSlot, session: S, rate: f64) -> Self {
        Self {
            id: slot.id,
            name: slot.client_name(),
            session,
            pacer: RatePacer::new(rate),
        }
    }

    /// New pass over the load file: fresh phase start and rate baseline.
    fn reset(&mut self, slot: &WorkerSlot, now_us: u64) {
        slot.set_phase_start_us(now_us);
        self.pacer.reset();
    }
}

/// Everything a group needs besides its clients.
pub struct Group<'a, B: Backend> {
    pub process: usize,
    pub backend: &'a B,
    pub table: &'a OpTable<B::Session>,
    pub state: &'a RunState,
    pub opts: &'a Options,
    pub loadfile: &'a Path,
}

/// Resolved path and numeric arguments of a trace line.
fn resolve_args(base: &Path, args: &[String]) -> (Option<String>, Option<String>, [i64; MAX_PARAMS]) {
    let base = base.to_string_lossy();
    let base = base.trim_end_matches('/');
    let resolve = |a: &str| format!("{}{}", base, a);

    let mut fname = None;
    let mut fname2 = None;
    let mut params = [0i64; MAX_PARAMS];
    let mut np = 0;

    for (i, arg) in args.iter().enumerate() {
        if arg.starts_with('/') && i < 2 {
            if i == 0 {
                fname = Some(resolve(arg));
            } else {
                fname2 = Some(resolve(arg));
            }
            continue;
        }
        if np < MAX_PARAMS {
            params[np] = parse_param(arg);
            np += 1;
        }
    }
    (fname, fname2, params)
}

fn sleep_paced(slot: &WorkerSlot, d: Duration) {
    slot.set_sleeping(true);
    thread::sleep(d);
    slot.set_sleeping(false);
}

impl<'a, B: Backend> Group<'a, B> {
    /// Replay the load file for `clients` until the trace ends (`run_once`),
    /// a client hits its line limit, or the run says stop. Then clean up.
    pub fn run(&self, clients: &mut [Client<B::Session>]) -> Result<()> {
        let base = self.backend.base_dir(self.opts, self.process);
        let mut reader = TraceReader::open(self.loadfile)?;

        self.reset_clients(clients);
        let mut lines_this_pass = 0u64;

        'replay: loop {
            if self.should_stop(clients) {
                debug!("process {} stopping", self.process);
                break;
            }

            let Some(raw) = reader.next_line()? else {
                if self.opts.run_once {
                    info!("process {} reached end of {}", self.process, reader.path().display());
                    break;
                }
                if lines_this_pass == 0 {
                    warn!("load file {} is empty", reader.path().display());
                    break;
                }
                reader.rewind()?;
                lines_this_pass = 0;
                self.reset_clients(clients);
                continue;
            };
            lines_this_pass += 1;
            let line_no = reader.line_no();

            for client in clients.iter_mut() {
                let slot = self.state.slot(client.id);
                if slot.is_done() || self.state.is_aborted() {
                    break 'replay;
                }
                let n = slot.next_line();
                if let Some(limit) = self.opts.line_limit {
                    if n > limit {
                        slot.mark_done();
                        break 'replay;
                    }
                }
                if let Err(e) = self.replay_line(client, slot, &base, &raw, line_no) {
                    slot.mark_failed();
                    return Err(e);
                }
            }
        }

        self.cleanup(clients)
    }

    fn should_stop(&self, clients: &[Client<B::Session>]) -> bool {
        self.state.is_aborted()
            || clients.iter().any(|c| self.state.slot(c.id).is_done())
    }

    fn reset_clients(&self, clients: &mut [Client<B::Session>]) {
        let now_us = self.state.now_us();
        for c in clients.iter_mut() {
            c.reset(self.state.slot(c.id), now_us);
        }
    }

    /// Parse, pace, dispatch and record one line for one client.
    fn replay_line(
        &self,
        client: &mut Client<B::Session>,
        slot: &WorkerSlot,
        base: &Path,
        raw: &str,
        line_no: u64,
    ) -> Result<()> {
        let tl = match TraceLine::parse(raw, &client.name) {
            LineOutcome::Skip => return Ok(()),
            LineOutcome::Legacy(op) => {
                return Err(ReplayError::LegacyTrace { op, line: line_no }.into());
            }
            LineOutcome::BadStatus(status) => {
                slot.add_diagnostic();
                warn!("Badly formed status '{}' at line {}", status, line_no);
                return Ok(());
            }
            LineOutcome::Op(tl) => tl,
        };

        self.pace(client, slot, &tl);
        slot.touch(self.state.now_us());

        let (fname, fname2, params) = resolve_args(base, &tl.args);

        if tl.op.eq_ignore_ascii_case(SLEEP_OP) {
            let us = params[0].max(0) as u64;
            sleep_paced(slot, Duration::from_micros(us));
            return Ok(());
        }

        let Some((kind, handler)) = self.table.lookup(&tl.op) else {
            slot.add_diagnostic();
            warn!(
                "[{}] operation {} is not supported by the {} backend",
                line_no,
                tl.op,
                self.backend.name()
            );
            return Ok(());
        };

        let op = Op {
            slot,
            line: line_no,
            name: &tl.op,
            fname,
            fname2,
            status: &tl.status,
            params,
        };

        let start = Instant::now();
        let res = handler(&mut client.session, &op);
        slot.record_op(kind, start.elapsed());
        slot.touch(self.state.now_us());

        res.with_context(|| format!("client {} line {}: {}", client.id, line_no, tl.op))
    }

    fn pace(&self, client: &mut Client<B::Session>, slot: &WorkerSlot, tl: &TraceLine) {
        let pace = match tl.target_time {
            Some(target) if self.opts.target_rate == 0.0 => {
                let elapsed_us = self.state.now_us().saturating_sub(slot.phase_start_us());
                let max = Duration::from_micros(slot.max_latency_us());
                pacing::time_delay(target, Duration::from_micros(elapsed_us), max)
            }
            _ => client.pacer.pace(slot.bytes(), Instant::now()),
        };

        let Pace { sleep, latency } = pace;
        if let Some(late) = latency {
            slot.note_latency(late);
        }
        if let Some(d) = sleep {
            sleep_paced(slot, d);
        }
    }

    fn cleanup(&self, clients: &mut [Client<B::Session>]) -> Result<()> {
        for client in clients.iter_mut() {
            let slot = self.state.slot(client.id);
            if !self.opts.skip_cleanup {
                slot.mark_cleanup();
                self.backend
                    .cleanup(&mut client.session, slot)
                    .with_context(|| format!("cleanup of client {} failed", client.id))?;
            }
            slot.mark_cleanup_finished();
        }
        Ok(())
    }
}
