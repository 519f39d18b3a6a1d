//! Spacetime history: a ring of per-turn 3D snapshots.
//!
//! Each snapshot maps every cell to the records present there at that turn.
//! A cell may hold more than one record per agent: the agent's current
//! record, plus afterimages left behind at cells it recently occupied. For a
//! fixed (cell, agent) pair at most one record carries the snapshot's own
//! turn.
//!
//! [`HistoryBuffer`] is the read contract the view builder consumes;
//! [`RingHistory`] is the in-memory implementation the authoritative store
//! writes into once per tick.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use lightcone_types::{AgentId, Int3D, Int4D, SharedRecord, UniverseSettings};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::WorldError;
use crate::geometry;

/// Temporal copies of one agent at one cell. Usually a single record.
pub type RecordCopies = SmallVec<[SharedRecord; 1]>;

/// Everything stored at one cell of one snapshot.
pub type CellRecords = BTreeMap<AgentId, RecordCopies>;

static EMPTY_CELL: CellRecords = BTreeMap::new();

/// Read access to recorded spacetime history.
pub trait HistoryBuffer {
    /// Records stored at a spacetime cell.
    ///
    /// An empty cell yields an empty map, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] for cells outside the universe,
    /// [`WorldError::TimeNotRetained`] when the turn is not held, and
    /// [`WorldError::EmptyHistory`] before the first tick is recorded.
    fn records_at(&self, at: Int4D) -> Result<&CellRecords, WorldError>;
}

/// All cells of the universe at one turn.
#[derive(Debug, Clone)]
pub struct Snapshot {
    time: i32,
    cells: Vec<CellRecords>,
}

impl Snapshot {
    fn empty(time: i32, settings: &UniverseSettings) -> Self {
        Self {
            time,
            cells: vec![CellRecords::new(); settings.cell_count()],
        }
    }

    /// The turn this snapshot describes.
    pub const fn time(&self) -> i32 {
        self.time
    }

    /// Records at a flat cell index.
    pub fn cell(&self, index: usize) -> Option<&CellRecords> {
        self.cells.get(index)
    }

    /// Total number of records held, afterimages included.
    pub fn record_count(&self) -> usize {
        self.cells
            .iter()
            .flat_map(BTreeMap::values)
            .map(SmallVec::len)
            .sum()
    }

    fn place(&mut self, index: usize, record: SharedRecord) {
        if let Some(cell) = self.cells.get_mut(index) {
            let copies = cell.entry(record.id).or_default();
            if !copies.iter().any(|r| r.time() == record.time()) {
                copies.push(record);
            }
        }
    }
}

/// Fixed-depth ring of snapshots, oldest at the front.
#[derive(Debug, Clone)]
pub struct RingHistory {
    settings: UniverseSettings,
    depth: usize,
    snapshots: VecDeque<Snapshot>,
}

impl RingHistory {
    /// Create an empty history.
    ///
    /// Depth covers the longest light delay across the universe and the
    /// afterimage window, so neither lookback ever misses a retained turn.
    /// Light that never arrives needs no lookback.
    pub fn new(settings: UniverseSettings) -> Self {
        let reach = match geometry::max_delay(&settings) {
            i32::MAX => 0,
            d => d,
        };
        let lookback = reach.max(settings.afterimage_duration);
        let depth = usize::try_from(lookback.max(0))
            .unwrap_or(0)
            .saturating_add(1);
        Self {
            settings,
            depth,
            snapshots: VecDeque::with_capacity(depth),
        }
    }

    /// Universe settings this history was sized for.
    pub const fn settings(&self) -> &UniverseSettings {
        &self.settings
    }

    /// Maximum number of retained snapshots.
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no tick has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Oldest retained turn.
    pub fn oldest_time(&self) -> Option<i32> {
        self.snapshots.front().map(Snapshot::time)
    }

    /// Newest retained turn.
    pub fn newest_time(&self) -> Option<i32> {
        self.snapshots.back().map(Snapshot::time)
    }

    /// Snapshot for a turn, if retained.
    pub fn snapshot(&self, time: i32) -> Option<&Snapshot> {
        let oldest = self.oldest_time()?;
        let offset = usize::try_from(time.checked_sub(oldest)?).ok()?;
        self.snapshots.get(offset)
    }

    /// Record one tick.
    ///
    /// Every record must be stamped with `time`, lie inside the universe,
    /// and appear at most once. Each record is placed at its own cell, and
    /// an afterimage is placed at every earlier cell from its coordinate
    /// history that is still within `afterimage_duration` turns. The
    /// afterimage is the agent's retained record from the turn it left that
    /// cell; if that turn has already been evicted no afterimage is placed.
    ///
    /// Nothing is written if validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NonSequentialTick`] if `time` does not follow
    /// the newest retained turn, [`WorldError::RecordTimeMismatch`],
    /// [`WorldError::OutOfBounds`], or [`WorldError::DuplicateRecord`] for
    /// an invalid record.
    pub fn push_tick<I>(&mut self, time: i32, records: I) -> Result<(), WorldError>
    where
        I: IntoIterator<Item = SharedRecord>,
    {
        if let Some(newest) = self.newest_time() {
            let expected = newest.saturating_add(1);
            if time != expected {
                return Err(WorldError::NonSequentialTick {
                    expected,
                    got: time,
                });
            }
        }

        let records: Vec<SharedRecord> = records.into_iter().collect();
        let mut seen = BTreeSet::new();
        let mut placements = Vec::with_capacity(records.len());
        for record in &records {
            if record.time() != time {
                return Err(WorldError::RecordTimeMismatch {
                    agent: record.id,
                    record: record.position,
                    tick: time,
                });
            }
            if !seen.insert(record.id) {
                return Err(WorldError::DuplicateRecord(record.id));
            }
            placements.push(geometry::cell_index(record.cell(), &self.settings)?);
        }

        let mut snapshot = Snapshot::empty(time, &self.settings);
        for (record, index) in records.iter().zip(placements) {
            snapshot.place(index, Arc::clone(record));
        }

        let mut afterimages = 0usize;
        let window_start = time.saturating_sub(self.settings.afterimage_duration);
        for record in &records {
            for past in &record.coordinate_history {
                if past.t < window_start || past.to_int3d() == record.cell() {
                    continue;
                }
                if let Some((index, retained)) = self.retained_record(record.id, *past) {
                    snapshot.place(index, retained);
                    afterimages = afterimages.saturating_add(1);
                }
            }
        }

        debug!(
            time,
            agents = records.len(),
            afterimages,
            "Recorded history snapshot"
        );

        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.depth {
            self.snapshots.pop_front();
        }
        Ok(())
    }

    /// The record an agent left at `past` (its cell and turn), with that
    /// cell's flat index.
    fn retained_record(&self, id: AgentId, past: Int4D) -> Option<(usize, SharedRecord)> {
        let index = geometry::cell_index(past.to_int3d(), &self.settings).ok()?;
        let snapshot = self.snapshot(past.t)?;
        let record = snapshot
            .cell(index)?
            .get(&id)?
            .iter()
            .find(|r| r.time() == past.t)?;
        Some((index, Arc::clone(record)))
    }

    /// Every record an agent has at a cell across all retained turns.
    pub fn trail(&self, id: AgentId, cell: Int3D) -> Vec<SharedRecord> {
        let Ok(index) = geometry::cell_index(cell, &self.settings) else {
            return Vec::new();
        };
        self.snapshots
            .iter()
            .filter_map(|s| s.cell(index))
            .filter_map(|c| c.get(&id))
            .flat_map(|copies| copies.iter().cloned())
            .collect()
    }
}

impl HistoryBuffer for RingHistory {
    fn records_at(&self, at: Int4D) -> Result<&CellRecords, WorldError> {
        let index = geometry::cell_index(at.to_int3d(), &self.settings)?;
        let (Some(oldest), Some(newest)) = (self.oldest_time(), self.newest_time()) else {
            return Err(WorldError::EmptyHistory);
        };
        let snapshot = self.snapshot(at.t).ok_or(WorldError::TimeNotRetained {
            time: at.t,
            oldest,
            newest,
        })?;
        Ok(snapshot.cell(index).unwrap_or(&EMPTY_CELL))
    }
}
