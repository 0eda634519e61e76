//! Per-level wave sizing.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{Level, MAX_ARCHETYPE_SLOTS};

/// Relative slack removed before rounding extrapolated counts up, so that
/// products which are whole numbers on paper (10 × 1.1) stay whole.
const COUNT_SNAP_RELATIVE: f64 = 1e-9;

/// Authored spawn counts and cadence for a single level.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawWaveEntry")]
pub struct WaveEntry {
    counts: [u32; MAX_ARCHETYPE_SLOTS],
    interval_secs: f64,
}

impl WaveEntry {
    /// Creates an entry from per-slot counts and the base spawn interval in seconds.
    #[must_use]
    pub const fn new(counts: [u32; MAX_ARCHETYPE_SLOTS], interval_secs: f64) -> Self {
        Self {
            counts,
            interval_secs,
        }
    }

    /// Enemies spawned per archetype slot.
    #[must_use]
    pub const fn counts(&self) -> [u32; MAX_ARCHETYPE_SLOTS] {
        self.counts
    }

    /// Base interval between spawns, in seconds.
    #[must_use]
    pub const fn interval_secs(&self) -> f64 {
        self.interval_secs
    }
}

#[derive(Deserialize)]
struct RawWaveEntry {
    counts: Vec<u32>,
    interval: f64,
}

impl TryFrom<RawWaveEntry> for WaveEntry {
    type Error = String;

    fn try_from(raw: RawWaveEntry) -> Result<Self, Self::Error> {
        if raw.counts.len() > MAX_ARCHETYPE_SLOTS {
            return Err(format!(
                "wave entry lists {} counts but spawners have {MAX_ARCHETYPE_SLOTS} slots",
                raw.counts.len()
            ));
        }
        let mut counts = [0; MAX_ARCHETYPE_SLOTS];
        counts[..raw.counts.len()].copy_from_slice(&raw.counts);
        Ok(Self::new(counts, raw.interval))
    }
}

/// Ordered wave entries, indexed by level starting at one.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct WaveTable {
    entries: Vec<WaveEntry>,
}

impl WaveTable {
    /// Creates a table from entries ordered by level.
    #[must_use]
    pub fn new(entries: Vec<WaveEntry>) -> Self {
        Self { entries }
    }

    /// Authored entries in level order.
    #[must_use]
    pub fn entries(&self) -> &[WaveEntry] {
        &self.entries
    }

    /// Number of authored levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether the table has no authored levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Growth applied to waves requested beyond the end of an authored table.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Extrapolation {
    /// Per-level multiplicative growth of each slot count. Must be at least one.
    pub growth: f64,
    /// Per-level reduction factor applied to the interval divisor.
    pub reduction: f64,
    /// Floor for extrapolated intervals and jittered waits, in seconds.
    pub min_interval_secs: f64,
}

impl Default for Extrapolation {
    fn default() -> Self {
        Self {
            growth: 1.15,
            reduction: 0.05,
            min_interval_secs: 0.25,
        }
    }
}

impl Extrapolation {
    /// Interval floor as a duration.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        secs_to_duration(self.min_interval_secs)
    }
}

/// Spawn quota and cadence of one wave after level resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedWave {
    counts: [u32; MAX_ARCHETYPE_SLOTS],
    interval: Duration,
}

impl ResolvedWave {
    /// Wave that spawns nothing.
    pub const EMPTY: ResolvedWave = ResolvedWave {
        counts: [0; MAX_ARCHETYPE_SLOTS],
        interval: Duration::ZERO,
    };

    /// Creates a resolved wave from explicit counts and interval.
    #[must_use]
    pub const fn new(counts: [u32; MAX_ARCHETYPE_SLOTS], interval: Duration) -> Self {
        Self { counts, interval }
    }

    /// Enemies spawned per archetype slot.
    #[must_use]
    pub const fn counts(&self) -> [u32; MAX_ARCHETYPE_SLOTS] {
        self.counts
    }

    /// Base interval between two spawns, before jitter.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Total enemies in the wave.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.counts
            .iter()
            .fold(0u32, |total, count| total.saturating_add(*count))
    }

    /// Reports whether the wave spawns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Zeroes every slot at or beyond `filled_slots`.
    #[must_use]
    pub fn masked(mut self, filled_slots: usize) -> Self {
        for count in self.counts.iter_mut().skip(filled_slots) {
            *count = 0;
        }
        self
    }
}

/// Resolves the quota and cadence of `level` from `table`.
///
/// Levels inside the table return the authored entry unchanged. Levels past the
/// end grow each count geometrically from the last entry, rounded up, and
/// shrink the interval by `1 + reduction × n`, never below the configured floor.
/// An empty table yields [`ResolvedWave::EMPTY`].
#[must_use]
pub fn resolve_wave(level: Level, table: &WaveTable, extrapolation: &Extrapolation) -> ResolvedWave {
    let Some(last) = table.entries().last() else {
        warn!(level = level.get(), "wave_table_empty");
        return ResolvedWave::EMPTY;
    };

    let index = (level.get() as usize).saturating_sub(1);
    if let Some(entry) = table.entries().get(index) {
        return ResolvedWave::new(entry.counts(), secs_to_duration(entry.interval_secs()));
    }

    let beyond = f64::from(level.get()) - table.len() as f64;
    let scale = extrapolation.growth.max(0.0).powf(beyond);
    let mut counts = [0; MAX_ARCHETYPE_SLOTS];
    for (count, authored) in counts.iter_mut().zip(last.counts()) {
        *count = extrapolate_count(authored, scale);
    }

    let divisor = 1.0 + extrapolation.reduction * beyond;
    let shrunk = if divisor > 0.0 {
        last.interval_secs() / divisor
    } else {
        extrapolation.min_interval_secs
    };
    let interval_secs = shrunk.max(extrapolation.min_interval_secs);

    ResolvedWave::new(counts, secs_to_duration(interval_secs))
}

fn extrapolate_count(authored: u32, scale: f64) -> u32 {
    if authored == 0 {
        return 0;
    }

    let scaled = f64::from(authored) * scale;
    if !scaled.is_finite() {
        return u32::MAX;
    }

    let snapped = (scaled - scaled.abs() * COUNT_SNAP_RELATIVE).ceil();
    snapped.max(0.0).min(f64::from(u32::MAX)) as u32
}

/// Converts seconds to a duration, mapping negative or non-finite input to zero.
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
