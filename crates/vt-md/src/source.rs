//! Tick sources for replay.
//!
//! A [`TickSource`] hands out one fresh [`TickStream`] per instrument each
//! time it is opened. Streams are plain blocking iterators; the replay feed
//! pulls one tick per interval.
//!
//! - [`MemorySource`] — ticks held in memory (tests, demos)
//! - [`JsonLinesSource`] — `<dir>/<instrument>.jsonl`, one tick object per line

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use anyhow::{Context, Result};
use tracing::warn;
use vt_core::PricePoint;

use crate::json_util::parse_tick_line;

/// A stream of ticks for one instrument. `Err` items are I/O failures.
pub type TickStream = Box<dyn Iterator<Item = Result<PricePoint>> + Send>;

/// Where replayed ticks come from.
pub trait TickSource: Send + Sync {
    /// Open a new stream positioned at the first tick of `instrument`.
    fn open(&self, instrument: &str) -> Result<TickStream>;
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// In-memory ticks keyed by instrument. Unknown instruments yield an empty
/// stream.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    ticks: AHashMap<String, Vec<PricePoint>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticks(mut self, instrument: &str, ticks: Vec<PricePoint>) -> Self {
        self.ticks.insert(instrument.to_string(), ticks);
        self
    }

    pub fn push(&mut self, point: PricePoint) {
        self.ticks.entry(point.instrument.clone()).or_default().push(point);
    }
}

impl TickSource for MemorySource {
    fn open(&self, instrument: &str) -> Result<TickStream> {
        let ticks = self.ticks.get(instrument).cloned().unwrap_or_default();
        Ok(Box::new(ticks.into_iter().map(Ok)))
    }
}

// ---------------------------------------------------------------------------
// JsonLinesSource
// ---------------------------------------------------------------------------

/// Recorded ticks in `<dir>/<instrument>.jsonl`.
///
/// Blank and malformed lines are skipped with a warning; read errors are
/// passed through as `Err` items.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    dir: PathBuf,
}

impl JsonLinesSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{instrument}.jsonl"))
    }
}

impl TickSource for JsonLinesSource {
    fn open(&self, instrument: &str) -> Result<TickStream> {
        let path = self.path_for(instrument);
        let file = File::open(&path).with_context(|| format!("open tick file {}", path.display()))?;
        let instrument = instrument.to_string();

        let stream = BufReader::new(file).lines().enumerate().filter_map(move |(n, line)| match line {
            Err(e) => Some(Err(anyhow::Error::new(e).context(format!("{instrument}: read line {}", n + 1)))),
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => {
                let parsed = parse_tick_line(&line, &instrument);
                if parsed.is_none() {
                    warn!("[source:{instrument}] skipping malformed line {}", n + 1);
                }
                parsed.map(Ok)
            }
        });
        Ok(Box::new(stream))
    }
}
