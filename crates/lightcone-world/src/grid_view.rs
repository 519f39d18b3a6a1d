//! Light-delay-correct grid views.
//!
//! A [`GridView`] is what the universe looks like from one spacetime cell:
//! every other cell is sampled at the turn whose light is just arriving at
//! the center. The view holds exactly one record per agent (the newest one
//! admissible) and a [`SpatialIndex`] consistent with those records.
//!
//! Views are built fresh every tick by [`ViewBuilder::build_grid_view`] and
//! never mutated afterwards.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use lightcone_types::{AgentId, Int4D, SharedRecord, UniverseSettings};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::error::WorldError;
use crate::geometry;
use crate::history::HistoryBuffer;
use crate::spatial::SpatialIndex;

/// One light-delayed snapshot of the universe, seen from `center`.
#[derive(Debug, Clone)]
pub struct GridView {
    center: Int4D,
    center_agents: Vec<SharedRecord>,
    agent_map: BTreeMap<AgentId, SharedRecord>,
    spatial_index: SpatialIndex,
    settings: UniverseSettings,
}

impl GridView {
    /// A view with no agents.
    pub fn empty(center: Int4D, settings: UniverseSettings) -> Self {
        Self {
            center,
            center_agents: Vec::new(),
            agent_map: BTreeMap::new(),
            spatial_index: SpatialIndex::new(&settings),
            settings,
        }
    }

    /// Assemble a view from explicit records.
    ///
    /// `records` is deduplicated to the newest record per agent and indexed.
    /// `center_agents` is taken as given: it lists the agents physically at
    /// the center this turn, and need not agree with `records` (observer
    /// derivation reconciles the two). Records outside the universe are
    /// reported and dropped.
    pub fn from_parts<I>(
        center: Int4D,
        center_agents: Vec<SharedRecord>,
        records: I,
        settings: UniverseSettings,
        diagnostics: &dyn DiagnosticsSink,
    ) -> Self
    where
        I: IntoIterator<Item = SharedRecord>,
    {
        let mut agent_map = BTreeMap::new();
        for record in records {
            keep_newest(&mut agent_map, &record);
        }
        let spatial_index = index_records(&mut agent_map, &settings, diagnostics);
        Self {
            center,
            center_agents,
            agent_map,
            spatial_index,
            settings,
        }
    }

    /// Same center and settings, different contents.
    pub(crate) fn with_contents(
        &self,
        agent_map: BTreeMap<AgentId, SharedRecord>,
        spatial_index: SpatialIndex,
    ) -> Self {
        Self {
            center: self.center,
            center_agents: self.center_agents.clone(),
            agent_map,
            spatial_index,
            settings: self.settings.clone(),
        }
    }

    /// The spacetime cell the view is taken from.
    pub const fn center(&self) -> Int4D {
        self.center
    }

    /// Agents physically present at the center this turn.
    pub fn center_agents(&self) -> &[SharedRecord] {
        &self.center_agents
    }

    /// The newest admissible record for an agent.
    pub fn agent(&self, id: AgentId) -> Option<&SharedRecord> {
        self.agent_map.get(&id)
    }

    /// Whether the view holds a record for an agent.
    pub fn contains(&self, id: AgentId) -> bool {
        self.agent_map.contains_key(&id)
    }

    /// All records, one per agent, ordered by id.
    pub const fn agent_map(&self) -> &BTreeMap<AgentId, SharedRecord> {
        &self.agent_map
    }

    /// Cell -> group -> ids index over `agent_map`.
    pub const fn spatial_index(&self) -> &SpatialIndex {
        &self.spatial_index
    }

    /// Universe settings the view was built under.
    pub const fn settings(&self) -> &UniverseSettings {
        &self.settings
    }

    /// Number of agents in the view.
    pub fn len(&self) -> usize {
        self.agent_map.len()
    }

    /// Whether the view holds no agents.
    pub fn is_empty(&self) -> bool {
        self.agent_map.is_empty()
    }

    /// Whether every agent is indexed exactly once, at its record's cell.
    pub fn is_consistent(&self) -> bool {
        self.spatial_index.len() == self.agent_map.len()
            && self
                .agent_map
                .values()
                .all(|r| self.spatial_index.contains(r.cell(), r.id))
    }
}

/// Builds grid views and observer views against one universe.
///
/// Holds the injected diagnostics sink; has no other state.
#[derive(Clone)]
pub struct ViewBuilder {
    pub(crate) settings: UniverseSettings,
    pub(crate) diagnostics: Arc<dyn DiagnosticsSink>,
}

impl core::fmt::Debug for ViewBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewBuilder")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ViewBuilder {
    /// Create a builder.
    pub fn new(settings: UniverseSettings, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            settings,
            diagnostics,
        }
    }

    /// Universe settings.
    pub const fn settings(&self) -> &UniverseSettings {
        &self.settings
    }

    /// Build the view of the universe from `center`.
    ///
    /// Every cell is read at turn `center.t - delay(center, cell)`. Per
    /// agent the newest record wins, whether the competing copies are
    /// afterimages in one cell or duplicates across cells. An out-of-bounds
    /// center is reported and yields an empty view; unretained turns and
    /// empty cells contribute nothing.
    pub fn build_grid_view<H>(&self, history: &H, center: Int4D) -> GridView
    where
        H: HistoryBuffer + ?Sized,
    {
        let origin = center.to_int3d();
        if let Err(err) = geometry::check_bounds(origin, &self.settings) {
            self.diagnostics.report(Diagnostic::Geometry(err));
            return GridView::empty(center, self.settings.clone());
        }

        let mut agent_map: BTreeMap<AgentId, SharedRecord> = BTreeMap::new();
        for cell in geometry::cells(&self.settings) {
            let lag = geometry::delay(origin, cell, self.settings.speed_of_light);
            let at = cell.at_time(center.t.saturating_sub(lag));
            let records = match history.records_at(at) {
                Ok(records) => records,
                Err(WorldError::TimeNotRetained { .. } | WorldError::EmptyHistory) => continue,
                Err(err) => {
                    self.diagnostics.report(Diagnostic::Geometry(err));
                    continue;
                }
            };
            for copies in records.values() {
                if let Some(newest) = copies.iter().max_by_key(|r| r.time()) {
                    keep_newest(&mut agent_map, newest);
                }
            }
        }

        let center_agents: Vec<SharedRecord> = agent_map
            .values()
            .filter(|r| r.cell() == origin && r.time() == center.t)
            .cloned()
            .collect();
        let spatial_index = index_records(&mut agent_map, &self.settings, &*self.diagnostics);

        debug!(
            %center,
            agents = agent_map.len(),
            co_located = center_agents.len(),
            "Built grid view"
        );

        GridView {
            center,
            center_agents,
            agent_map,
            spatial_index,
            settings: self.settings.clone(),
        }
    }
}

/// Insert `record` unless the map already holds a record for the same agent
/// that is at least as new. Ties keep the first copy seen.
fn keep_newest(map: &mut BTreeMap<AgentId, SharedRecord>, record: &SharedRecord) {
    match map.entry(record.id) {
        Entry::Vacant(slot) => {
            slot.insert(Arc::clone(record));
        }
        Entry::Occupied(mut slot) => {
            if slot.get().time() < record.time() {
                slot.insert(Arc::clone(record));
            }
        }
    }
}

/// Index every record at its cell under its re-derived group. Records that
/// cannot be indexed are reported and removed from the map.
fn index_records(
    agent_map: &mut BTreeMap<AgentId, SharedRecord>,
    settings: &UniverseSettings,
    diagnostics: &dyn DiagnosticsSink,
) -> SpatialIndex {
    let mut index = SpatialIndex::new(settings);
    agent_map.retain(|id, record| {
        let group = settings.group_of(record.continuous.to_double3d());
        match index.insert(record.cell(), group, *id) {
            Ok(()) => true,
            Err(err) => {
                diagnostics.report(Diagnostic::Geometry(err));
                false
            }
        }
    });
    index
}

#[cfg(test)]
mod tests {
    use lightcone_types::{AgentRecord, Double4D, Int3D};

    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::history::RingHistory;

    fn settings() -> UniverseSettings {
        UniverseSettings::cube(4, 1.0)
    }

    fn record(id: AgentId, t: i32, cell: Int3D, s: &UniverseSettings) -> AgentRecord {
        let p = cell.to_double3d().offset(0.5, 0.5, 0.5).at_time(f64::from(t));
        AgentRecord::new(id, p, s)
    }

    fn builder(sink: &Arc<CollectingDiagnostics>) -> ViewBuilder {
        let sink: Arc<dyn DiagnosticsSink> = Arc::clone(sink) as Arc<dyn DiagnosticsSink>;
        ViewBuilder::new(settings(), sink)
    }

    #[test]
    fn distant_agent_is_seen_with_light_delay() {
        let s = settings();
        let sink = Arc::new(CollectingDiagnostics::new());
        let mut history = RingHistory::new(s.clone());
        let a = AgentId::new();
        let b = AgentId::new();
        for t in 0..=5 {
            let ra = record(a, t, Int3D::new(0, 0, 0), &s)
                .with_internal("turn", serde_json::json!(t));
            let rb = record(b, t, Int3D::new(3, 0, 0), &s)
                .with_internal("turn", serde_json::json!(t));
            assert!(history.push_tick(t, [Arc::new(ra), Arc::new(rb)]).is_ok());
        }

        let view = builder(&sink).build_grid_view(&history, Int4D::new(5, 0, 0, 0));
        assert_eq!(view.agent(a).map(|r| r.time()), Some(5));
        assert_eq!(view.agent(b).map(|r| r.time()), Some(2));
        assert_eq!(view.agent(b).and_then(|r| r.internal_i64("turn")), Some(2));
        assert_eq!(view.center_agents().len(), 1);
        assert!(view.is_consistent());
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn agents_beyond_recorded_history_are_invisible() {
        let s = settings();
        let sink = Arc::new(CollectingDiagnostics::new());
        let mut history = RingHistory::new(s.clone());
        let far = AgentId::new();
        assert!(history
            .push_tick(0, [Arc::new(record(far, 0, Int3D::new(3, 3, 3), &s))])
            .is_ok());
        // At t=0 light from (3,3,3) has not arrived at the origin.
        let view = builder(&sink).build_grid_view(&history, Int4D::new(0, 0, 0, 0));
        assert!(view.is_empty());
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn unusable_speed_of_light_shows_only_the_center_cell() {
        let s = UniverseSettings {
            speed_of_light: f64::NAN,
            ..settings()
        };
        let sink = Arc::new(CollectingDiagnostics::new());
        let mut history = RingHistory::new(s.clone());
        let here = AgentId::new();
        let there = AgentId::new();
        for t in 0..=3 {
            let _ = history.push_tick(
                t,
                [
                    Arc::new(record(here, t, Int3D::new(0, 0, 0), &s)),
                    Arc::new(record(there, t, Int3D::new(1, 0, 0), &s)),
                ],
            );
        }
        let b = ViewBuilder::new(s, Arc::clone(&sink) as Arc<dyn DiagnosticsSink>);
        let view = b.build_grid_view(&history, Int4D::new(3, 0, 0, 0));
        assert!(view.contains(here));
        assert!(!view.contains(there));
    }

    #[test]
    fn out_of_bounds_center_yields_empty_view() {
        let s = settings();
        let sink = Arc::new(CollectingDiagnostics::new());
        let mut history = RingHistory::new(s.clone());
        let _ = history.push_tick(0, [Arc::new(record(AgentId::new(), 0, Int3D::new(1, 1, 1), &s))]);
        let view = builder(&sink).build_grid_view(&history, Int4D::new(0, 7, 0, 0));
        assert!(view.is_empty());
        assert!(view.spatial_index().is_empty());
        assert_eq!(sink.geometry_count(), 1);
    }

    #[test]
    fn afterimage_and_current_record_collapse_to_newest() {
        let s = UniverseSettings {
            afterimage_duration: 3,
            ..settings()
        };
        let sink = Arc::new(CollectingDiagnostics::new());
        let mut history = RingHistory::new(s.clone());
        let id = AgentId::new();
        let mut live = record(id, 0, Int3D::new(1, 0, 0), &s);
        let _ = history.push_tick(0, [Arc::new(live.clone())]);
        live.move_to(Double4D::new(1.0, 0.5, 0.5, 0.5), &s);
        let _ = history.push_tick(1, [Arc::new(live.clone())]);

        // Observer at (0,0,0) t=1: cell (0,0,0) has the current record (t=1);
        // cell (1,0,0) at t=0 holds the pre-move record.
        let b = ViewBuilder::new(s, Arc::clone(&sink) as Arc<dyn DiagnosticsSink>);
        let view = b.build_grid_view(&history, Int4D::new(1, 0, 0, 0));
        assert_eq!(view.len(), 1);
        assert_eq!(view.agent(id).map(|r| r.time()), Some(1));
        assert_eq!(view.spatial_index().locate(id), vec![Int3D::new(0, 0, 0)]);
        assert!(view.is_consistent());
    }

    #[test]
    fn from_parts_dedupes_and_drops_out_of_bounds() {
        let s = settings();
        let sink = CollectingDiagnostics::new();
        let id = AgentId::new();
        let stray = AgentId::new();
        let old = Arc::new(record(id, 1, Int3D::new(1, 1, 1), &s));
        let new = Arc::new(record(id, 3, Int3D::new(2, 1, 1), &s));
        let outside = Arc::new(record(stray, 3, Int3D::new(8, 0, 0), &s));
        let view = GridView::from_parts(
            Int4D::new(3, 0, 0, 0),
            Vec::new(),
            [old, Arc::clone(&new), outside],
            s,
            &sink,
        );
        assert_eq!(view.len(), 1);
        assert_eq!(view.agent(id), Some(&new));
        assert!(!view.contains(stray));
        assert_eq!(sink.geometry_count(), 1);
        assert!(view.is_consistent());
    }
}
