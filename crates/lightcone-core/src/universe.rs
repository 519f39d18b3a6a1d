//! The authoritative universe store.
//!
//! [`Universe`] owns the one mutable copy of every agent record. Each tick
//! follows the same cycle:
//!
//! 1. [`record_tick`](Universe::record_tick) freezes the current records
//!    into the history ring;
//! 2. [`observer_views`](Universe::observer_views) builds light-delayed views
//!    for every occupied cell;
//! 3. observers plan in [`PlanSandbox`]es and
//!    [`submit_plan`](Universe::submit_plan) commits them;
//! 4. [`advance`](Universe::advance) moves every agent to the next turn.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lightcone_plan::PlanSandbox;
use lightcone_types::{
    AgentId, AgentRecord, CommandErrorMessage, Double3D, Int3D, Int4D, LocalizableString,
    UniverseSettings, Velocity,
};
use lightcone_world::{
    DiagnosticsSink, GridView, ObserverView, RingHistory, ViewBuilder, WorldError, geometry,
};
use tracing::{debug, info};

use crate::motion::Motion;

/// Error message key for a planned command whose target no longer exists.
pub const UNKNOWN_TARGET_KEY: &str = "command.unknown_target";

/// Errors that can occur while driving the universe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    /// A spatial or history operation failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// The agent is not part of the universe.
    #[error("unknown agent {agent}")]
    UnknownAgent {
        /// The missing agent.
        agent: AgentId,
    },

    /// The agent has no observer view this tick.
    #[error("agent {agent} has no observer view")]
    NoView {
        /// The agent without a view.
        agent: AgentId,
    },

    /// A plan was formed against a view from another turn.
    #[error("plan formed at turn {planned} cannot be committed at turn {current}")]
    StalePlan {
        /// Turn the plan's view was taken at.
        planned: i32,
        /// The universe's current turn.
        current: i32,
    },
}

/// Observer views keyed by observer id.
pub type ObserverViews = BTreeMap<AgentId, Arc<ObserverView>>;

/// In-memory authoritative state plus its light-delay history.
pub struct Universe {
    settings: UniverseSettings,
    time: i32,
    agents: BTreeMap<AgentId, AgentRecord>,
    history: RingHistory,
    builder: ViewBuilder,
    motion: Box<dyn Motion>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl core::fmt::Debug for Universe {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Universe")
            .field("time", &self.time)
            .field("agents", &self.agents.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Universe {
    /// An empty universe at turn 0.
    pub fn new(
        settings: UniverseSettings,
        motion: Box<dyn Motion>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            history: RingHistory::new(settings.clone()),
            builder: ViewBuilder::new(settings.clone(), Arc::clone(&diagnostics)),
            settings,
            time: 0,
            agents: BTreeMap::new(),
            motion,
            diagnostics,
        }
    }

    /// Universe settings.
    pub const fn settings(&self) -> &UniverseSettings {
        &self.settings
    }

    /// The current turn.
    pub const fn time(&self) -> i32 {
        self.time
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the universe has no agents.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The authoritative record of an agent.
    pub fn agent(&self, id: AgentId) -> Option<&AgentRecord> {
        self.agents.get(&id)
    }

    /// All authoritative records, ordered by id.
    pub fn agents(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values()
    }

    /// The history ring views are built from.
    pub const fn history(&self) -> &RingHistory {
        &self.history
    }

    /// The view builder, sharing this universe's diagnostics sink.
    pub const fn builder(&self) -> &ViewBuilder {
        &self.builder
    }

    /// Whether the current turn has been recorded into history.
    pub fn is_recorded(&self) -> bool {
        self.history.newest_time() == Some(self.time)
    }

    /// Add an agent at `position` with `velocity`, at the current turn.
    ///
    /// An agent spawned after [`record_tick`](Self::record_tick) first
    /// appears in history on the next recorded turn.
    ///
    /// # Errors
    ///
    /// Returns [`UniverseError::World`] if the position is outside the
    /// universe.
    pub fn spawn(&mut self, position: Double3D, velocity: Velocity) -> Result<AgentId, UniverseError> {
        geometry::check_bounds(position.to_int3d(), &self.settings)?;
        let id = AgentId::new();
        let at = position.at_time(f64::from(self.time));
        let record = AgentRecord::new(id, at, &self.settings)
            .with_velocity(velocity.clamped(self.settings.speed_of_light));
        debug!(agent = %id, cell = %record.cell(), "Spawned agent");
        self.agents.insert(id, record);
        Ok(id)
    }

    /// Freeze the current records into history.
    ///
    /// # Errors
    ///
    /// Returns [`UniverseError::World`] if the turn was already recorded or
    /// a record is inconsistent with the turn.
    pub fn record_tick(&mut self) -> Result<(), UniverseError> {
        let records = self.agents.values().cloned().map(Arc::new);
        self.history.push_tick(self.time, records)?;
        debug!(time = self.time, agents = self.agents.len(), "Recorded tick");
        Ok(())
    }

    /// Grid view from an arbitrary center.
    pub fn grid_view(&self, center: Int4D) -> GridView {
        self.builder.build_grid_view(&self.history, center)
    }

    /// Views for every agent present this turn.
    ///
    /// One grid view is built per occupied cell and shared by every group
    /// derived from it.
    pub fn observer_views(&self) -> ObserverViews {
        let occupied: BTreeSet<Int3D> = self.agents.values().map(AgentRecord::cell).collect();
        let mut views = ObserverViews::new();
        for cell in occupied {
            let grid = self.grid_view(cell.at_time(self.time));
            views.extend(self.builder.derive_observer_views(&grid));
        }
        debug!(
            time = self.time,
            cells = views.values().map(|v| v.center()).collect::<BTreeSet<_>>().len(),
            observers = views.len(),
            "Built observer views"
        );
        views
    }

    /// A fresh planning sandbox for `observer` over its view.
    ///
    /// # Errors
    ///
    /// Returns [`UniverseError::NoView`] if `views` holds no view for the
    /// observer.
    pub fn sandbox_for(
        &self,
        views: &ObserverViews,
        observer: AgentId,
    ) -> Result<PlanSandbox, UniverseError> {
        let view = views
            .get(&observer)
            .ok_or(UniverseError::NoView { agent: observer })?;
        Ok(PlanSandbox::new(
            Arc::clone(view),
            observer,
            Arc::clone(&self.diagnostics),
        ))
    }

    /// Commit a plan against authoritative state.
    ///
    /// Commands run in queue order with the same two-phase rule as the
    /// sandbox: a failed self-check leaves the observer untouched and skips
    /// the target; a failed target check is reported but does not stop later
    /// commands. A target that no longer exists yields a failure result.
    /// Returns one result per queued command.
    ///
    /// # Errors
    ///
    /// Returns [`UniverseError::UnknownAgent`] if the observer is gone, or
    /// [`UniverseError::StalePlan`] if the plan's view is from another turn.
    pub fn submit_plan(
        &mut self,
        plan: &PlanSandbox,
    ) -> Result<Vec<CommandErrorMessage>, UniverseError> {
        let observer = plan.observer_id();
        let from_coordinate = plan.observer_coordinate();
        if from_coordinate.t != self.time {
            return Err(UniverseError::StalePlan {
                planned: from_coordinate.t,
                current: self.time,
            });
        }
        if !self.agents.contains_key(&observer) {
            return Err(UniverseError::UnknownAgent { agent: observer });
        }

        let mut results = Vec::with_capacity(plan.commands().len());
        for command in plan.commands() {
            let mut scratch = match self.agents.get(&observer) {
                Some(record) => record.clone(),
                None => return Err(UniverseError::UnknownAgent { agent: observer }),
            };
            let checked = command.self_check_and_execute(&mut scratch, &self.settings);
            if !checked.success {
                results.push(checked);
                continue;
            }
            self.agents.insert(observer, scratch);

            let result = match self.agents.get_mut(&command.target_id()) {
                Some(target) => {
                    command.check_and_execute(target, observer, from_coordinate, &self.settings)
                }
                None => CommandErrorMessage::failure(LocalizableString::with_args(
                    UNKNOWN_TARGET_KEY,
                    [command.target_id().to_string()],
                )),
            };
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        info!(
            observer = %observer,
            commands = results.len(),
            failed,
            "Committed plan"
        );
        Ok(results)
    }

    /// Move every agent to the next turn.
    ///
    /// Returns the new turn.
    pub fn advance(&mut self) -> i32 {
        let next = self.time.saturating_add(1);
        for record in self.agents.values_mut() {
            let (position, velocity) = self.motion.step(record, next, &self.settings);
            record.set_velocity(velocity);
            record.move_to(position, &self.settings);
            record.trim_history(&self.settings);
        }
        self.time = next;
        debug!(time = next, "Advanced universe");
        next
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lightcone_plan::Command;
    use lightcone_world::CollectingDiagnostics;
    use serde_json::json;

    use super::*;
    use crate::motion::Inertial;

    #[derive(Debug)]
    struct Gift {
        target: AgentId,
    }

    impl Command for Gift {
        fn name(&self) -> &str {
            "gift"
        }

        fn target_id(&self) -> AgentId {
            self.target
        }

        fn self_check_and_execute(
            &self,
            observer: &mut AgentRecord,
            _settings: &UniverseSettings,
        ) -> CommandErrorMessage {
            let gold = observer.internal_i64("gold").unwrap_or_default();
            if gold < 1 {
                return CommandErrorMessage::failure(LocalizableString::new("gift.broke"));
            }
            observer.internal.insert("gold".into(), json!(gold - 1));
            CommandErrorMessage::ok()
        }

        fn check_and_execute(
            &self,
            target: &mut AgentRecord,
            _from: AgentId,
            _from_coordinate: Int4D,
            _settings: &UniverseSettings,
        ) -> CommandErrorMessage {
            let gold = target.internal_i64("gold").unwrap_or_default();
            target.internal.insert("gold".into(), json!(gold + 1));
            CommandErrorMessage::ok()
        }
    }

    fn universe() -> (Universe, Arc<CollectingDiagnostics>) {
        let sink = Arc::new(CollectingDiagnostics::new());
        let u = Universe::new(
            UniverseSettings::cube(4, 1.0),
            Box::new(Inertial),
            Arc::clone(&sink) as Arc<dyn DiagnosticsSink>,
        );
        (u, sink)
    }

    #[test]
    fn spawn_rejects_out_of_bounds() {
        let (mut u, _) = universe();
        assert!(u.spawn(Double3D::new(0.5, 0.5, 0.5), Velocity::default()).is_ok());
        assert!(matches!(
            u.spawn(Double3D::new(4.5, 0.5, 0.5), Velocity::default()),
            Err(UniverseError::World { .. })
        ));
        assert_eq!(u.len(), 1);
    }

    #[test]
    fn recording_twice_is_an_error() {
        let (mut u, _) = universe();
        let _ = u.spawn(Double3D::new(0.5, 0.5, 0.5), Velocity::default());
        assert!(u.record_tick().is_ok());
        assert!(u.is_recorded());
        assert!(u.record_tick().is_err());
        u.advance();
        assert!(!u.is_recorded());
        assert!(u.record_tick().is_ok());
    }

    #[test]
    fn advance_moves_agents_and_keeps_history() {
        let (mut u, _) = universe();
        let id = u.spawn(Double3D::new(0.5, 0.5, 0.5), Velocity::new(1.0, 0.0, 0.0)).unwrap();
        for _ in 0..3 {
            u.record_tick().unwrap();
            u.advance();
        }
        let r = u.agent(id).unwrap();
        assert_eq!(r.position, Int4D::new(3, 3, 0, 0));
        assert_eq!(r.coordinate_history.len(), 3);
        assert_eq!(u.history().len(), 3);
    }

    #[test]
    fn views_cover_every_agent_and_plans_commit() {
        let (mut u, sink) = universe();
        let giver = u.spawn(Double3D::new(1.5, 1.5, 1.5), Velocity::default()).unwrap();
        let taker = u.spawn(Double3D::new(1.6, 1.6, 1.6), Velocity::default()).unwrap();
        u.agents.get_mut(&giver).unwrap().internal.insert("gold".into(), json!(1));
        u.record_tick().unwrap();

        let views = u.observer_views();
        assert_eq!(views.len(), 2);
        let mut plan = u.sandbox_for(&views, giver).unwrap();
        plan.add_command(Arc::new(Gift { target: taker }));
        plan.add_command(Arc::new(Gift { target: taker }));
        assert_eq!(plan.commands().len(), 1);

        let results = u.submit_plan(&plan).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(u.agent(giver).and_then(|r| r.internal_i64("gold")), Some(0));
        assert_eq!(u.agent(taker).and_then(|r| r.internal_i64("gold")), Some(1));
        assert!(sink.entries().is_empty());

        u.advance();
        assert!(matches!(
            u.submit_plan(&plan),
            Err(UniverseError::StalePlan { planned: 0, current: 1 })
        ));
    }

    #[test]
    fn sandbox_needs_a_view() {
        let (u, _) = universe();
        assert!(matches!(
            u.sandbox_for(&ObserverViews::new(), AgentId::new()),
            Err(UniverseError::NoView { .. })
        ));
    }
}
