//! Operation records and the per-backend dispatch table
//!
//! Each backend registers the operation names meaningful to its protocol.
//! Lookup is case-insensitive. The table position of an operation doubles as
//! its index into the per-client statistics counters.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::constants::MAX_PARAMS;
use crate::error::ReplayError;
use crate::stats::WorkerSlot;

/// One resolved operation handed to a backend handler. Built fresh for each
/// dispatch and dropped afterwards.
pub struct Op<'a> {
    pub slot: &'a WorkerSlot,
    /// Line number within the current pass over the load file
    pub line: u64,
    pub name: &'a str,
    pub fname: Option<String>,
    pub fname2: Option<String>,
    pub status: &'a str,
    pub params: [i64; MAX_PARAMS],
}

impl<'a> Op<'a> {
    /// Primary path; an error when the trace line carried none.
    pub fn fname(&self) -> Result<&str> {
        self.fname
            .as_deref()
            .with_context(|| format!("[{}] {} needs a path argument", self.line, self.name))
    }

    pub fn fname2(&self) -> Result<&str> {
        self.fname2
            .as_deref()
            .with_context(|| format!("[{}] {} needs a second path argument", self.line, self.name))
    }

    pub fn param(&self, i: usize) -> i64 {
        self.params.get(i).copied().unwrap_or(0)
    }

    /// Non-fatal diagnostic attributed to this client and line.
    pub fn warn(&self, msg: fmt::Arguments<'_>) {
        self.slot.add_diagnostic();
        warn!("({}) {}", self.line, msg);
    }

    /// Fatal outcome for the owning client.
    pub fn failed(&self, reason: impl Into<String>) -> anyhow::Error {
        self.slot.mark_failed();
        ReplayError::WorkerFailed {
            id: self.slot.id,
            line: self.line,
            reason: reason.into(),
        }
        .into()
    }
}

/// Handler signature shared by every backend.
pub type Handler<S> = fn(&mut S, &Op<'_>) -> Result<()>;

struct Entry<S> {
    name: &'static str,
    handler: Handler<S>,
}

/// Name to handler mapping for one backend session type.
pub struct OpTable<S> {
    entries: Vec<Entry<S>>,
    index: HashMap<String, usize>,
}

impl<S> Default for OpTable<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<S> OpTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style registration. A name may only be registered once.
    pub fn with(mut self, name: &'static str, handler: Handler<S>) -> Self {
        if let Err(e) = self.register(name, handler) {
            warn!("{:#}", e);
        }
        self
    }

    pub fn register(&mut self, name: &'static str, handler: Handler<S>) -> Result<()> {
        let key = name.to_ascii_lowercase();
        if self.index.contains_key(&key) {
            bail!("operation {} registered twice", name);
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(Entry { name, handler });
        Ok(())
    }

    /// Statistics index and handler for an operation name, any case.
    pub fn lookup(&self, name: &str) -> Option<(usize, Handler<S>)> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|&i| (i, self.entries[i].handler))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names in statistics index order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
