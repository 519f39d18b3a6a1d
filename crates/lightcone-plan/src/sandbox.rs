//! Per-observer speculative planning.
//!
//! A [`PlanSandbox`] wraps one read-only [`ObserverView`] with an overlay of
//! owned agent records and an ordered command queue. Every id moves through
//! three states:
//!
//! - pristine: no overlay entry, reads fall through to the base view;
//! - materialized: deep-copied from the base view on first mutable access;
//! - mutated: changed by command execution, any number of times.
//!
//! After every queue mutation the overlay equals what replaying the queue,
//! in order, from the base view would produce. Removal restores this by
//! resetting the affected ids and replaying; commands are never undone
//! incrementally since they need not be invertible.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use lightcone_types::{AgentId, AgentRecord, CommandErrorMessage, Int4D, UniverseSettings};
use lightcone_world::{Diagnostic, DiagnosticsSink, ObserverView};
use tracing::debug;

use crate::command::{SharedCommand, same_command};

/// Callback fired after the command queue changes. Receives the new queue.
pub type OnChange = Box<dyn FnMut(&[SharedCommand])>;

/// One observer's plan over a base view.
///
/// Single-owner and single-threaded. Not `Sync` by construction of the
/// callback.
pub struct PlanSandbox {
    base: Arc<ObserverView>,
    observer: AgentId,
    overlay: BTreeMap<AgentId, AgentRecord>,
    queue: Vec<SharedCommand>,
    on_change: Option<OnChange>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl fmt::Debug for PlanSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanSandbox")
            .field("observer", &self.observer)
            .field("center", &self.base.center())
            .field("overlay", &self.overlay.keys().collect::<Vec<_>>())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl PlanSandbox {
    /// Start an empty plan for `observer` over `base`.
    pub fn new(
        base: Arc<ObserverView>,
        observer: AgentId,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            base,
            observer,
            overlay: BTreeMap::new(),
            queue: Vec::new(),
            on_change: None,
            diagnostics,
        }
    }

    /// Register the queue-change callback, replacing any previous one.
    pub fn set_on_change<F>(&mut self, callback: F)
    where
        F: FnMut(&[SharedCommand]) + 'static,
    {
        self.on_change = Some(Box::new(callback));
    }

    /// The planning observer.
    pub const fn observer_id(&self) -> AgentId {
        self.observer
    }

    /// The read-only view the plan is built over.
    pub const fn base(&self) -> &Arc<ObserverView> {
        &self.base
    }

    /// Where the observer stood when the view was taken.
    ///
    /// Passed to every target-side check, both when a command is added and
    /// when it is replayed.
    pub fn observer_coordinate(&self) -> Int4D {
        self.base.center()
    }

    /// Universe settings of the base view.
    pub fn settings(&self) -> &UniverseSettings {
        self.base.view().settings()
    }

    /// The queued commands, in order.
    pub fn commands(&self) -> &[SharedCommand] {
        &self.queue
    }

    /// Whether `id` has an overlay entry.
    pub fn is_materialized(&self, id: AgentId) -> bool {
        self.overlay.contains_key(&id)
    }

    /// The overlay record if materialized, else the base view's record.
    pub fn get_agent_data(&self, id: AgentId) -> Option<&AgentRecord> {
        self.overlay
            .get(&id)
            .or_else(|| self.base.agent(id).map(Arc::as_ref))
    }

    /// The owned overlay record, materializing it on first access.
    ///
    /// An id absent from the base view is reported as a consistency
    /// violation and materialized as a placeholder. Direct edits made here
    /// are not commands: the next replay touching this id discards them.
    pub fn get_mutable_agent_data(&mut self, id: AgentId) -> &mut AgentRecord {
        materialize(&mut self.overlay, &self.base, &*self.diagnostics, id)
    }

    /// Add one command to the plan.
    ///
    /// The self-check runs first, on a copy of the observer's record. If it
    /// fails, nothing is queued or changed and that failure is returned. If
    /// it passes, the observer's record is updated, the target-side check
    /// runs against the target's record, and the command is queued whatever
    /// that check returns. The target-side result is returned.
    pub fn add_command(&mut self, command: SharedCommand) -> CommandErrorMessage {
        let result = self.push_command(command);
        self.notify();
        result
    }

    /// Add commands in order, firing the change callback once at the end.
    pub fn add_all_command<I>(&mut self, commands: I) -> Vec<CommandErrorMessage>
    where
        I: IntoIterator<Item = SharedCommand>,
    {
        let results = commands
            .into_iter()
            .map(|command| self.push_command(command))
            .collect();
        self.notify();
        results
    }

    /// Remove one queued command, then reset and replay its target and the
    /// observer. Returns whether the command was queued.
    pub fn remove_command(&mut self, command: &SharedCommand) -> bool {
        let Some(position) = self.queue.iter().position(|c| same_command(c, command)) else {
            return false;
        };
        let removed = self.queue.remove(position);
        debug!(
            observer = %self.observer,
            command = removed.name(),
            queued = self.queue.len(),
            "Removed planned command"
        );
        self.replay(BTreeSet::from([removed.target_id(), self.observer]));
        self.notify();
        true
    }

    /// Remove a batch of commands, then reset and replay every affected id
    /// once. Returns how many were removed; the callback fires only if that
    /// is non-zero.
    pub fn remove_all_command(&mut self, commands: &[SharedCommand]) -> usize {
        let mut affected = BTreeSet::from([self.observer]);
        let before = self.queue.len();
        self.queue.retain(|queued| {
            let doomed = commands.iter().any(|c| same_command(c, queued));
            if doomed {
                affected.insert(queued.target_id());
            }
            !doomed
        });
        let removed = before.saturating_sub(self.queue.len());
        if removed == 0 {
            return 0;
        }
        debug!(
            observer = %self.observer,
            removed,
            replayed = affected.len(),
            "Removed planned commands"
        );
        self.replay(affected);
        self.notify();
        removed
    }

    /// Drop the whole plan. Every id returns to pristine.
    pub fn clear_command(&mut self) {
        self.queue.clear();
        self.overlay.clear();
        self.notify();
    }

    fn push_command(&mut self, command: SharedCommand) -> CommandErrorMessage {
        let checked = self.run_self_check(&command);
        if !checked.success {
            debug!(
                observer = %self.observer,
                command = command.name(),
                error = %checked.error_message,
                "Self-check failed, command not queued"
            );
            return checked;
        }
        let result = self.run_target_check(&command);
        if !result.success {
            debug!(
                observer = %self.observer,
                command = command.name(),
                target = %command.target_id(),
                error = %result.error_message,
                "Target check failed, command queued anyway"
            );
        }
        self.queue.push(command);
        result
    }

    /// Run the self-check on a scratch copy of the observer's record and
    /// keep the copy only on success.
    fn run_self_check(&mut self, command: &SharedCommand) -> CommandErrorMessage {
        let observer = self.observer;
        let mut scratch = self
            .overlay
            .get(&observer)
            .cloned()
            .unwrap_or_else(|| pristine_copy(&self.base, &*self.diagnostics, observer));
        let settings = self.base.view().settings();
        let result = command.self_check_and_execute(&mut scratch, settings);
        if result.success {
            self.overlay.insert(observer, scratch);
        }
        result
    }

    fn run_target_check(&mut self, command: &SharedCommand) -> CommandErrorMessage {
        let from = self.observer;
        let from_coordinate = self.base.center();
        let target = materialize(
            &mut self.overlay,
            &self.base,
            &*self.diagnostics,
            command.target_id(),
        );
        command.check_and_execute(target, from, from_coordinate, self.base.view().settings())
    }

    /// Reset `ids` to pristine and rebuild them from the queue.
    ///
    /// Self-side effects are replayed only when the observer is reset; a
    /// self-check that no longer passes contributes nothing. Target-side
    /// effects are replayed for targets in `ids`, in queue order.
    fn replay(&mut self, ids: BTreeSet<AgentId>) {
        for id in &ids {
            self.overlay.remove(id);
        }
        let observer_reset = ids.contains(&self.observer);
        let queue = self.queue.clone();
        for command in &queue {
            if observer_reset {
                let checked = self.run_self_check(command);
                if !checked.success {
                    debug!(
                        observer = %self.observer,
                        command = command.name(),
                        error = %checked.error_message,
                        "Self-check no longer passes on replay"
                    );
                }
            }
            if ids.contains(&command.target_id()) {
                let result = self.run_target_check(command);
                if !result.success {
                    debug!(
                        observer = %self.observer,
                        command = command.name(),
                        target = %command.target_id(),
                        error = %result.error_message,
                        "Target check fails on replay"
                    );
                }
            }
        }
    }

    fn notify(&mut self) {
        if let Some(callback) = self.on_change.as_mut() {
            callback(&self.queue);
        }
    }
}

/// Deep copy of the base record for `id`, or a placeholder if the base view
/// does not hold it.
fn pristine_copy(
    base: &ObserverView,
    diagnostics: &dyn DiagnosticsSink,
    id: AgentId,
) -> AgentRecord {
    if let Some(record) = base.agent(id) {
        return AgentRecord::clone(record);
    }
    diagnostics.report(Diagnostic::consistency(
        "planned agent missing from base view",
        Some(id),
    ));
    AgentRecord::placeholder(id, base.center().t, base.view().settings())
}

fn materialize<'a>(
    overlay: &'a mut BTreeMap<AgentId, AgentRecord>,
    base: &ObserverView,
    diagnostics: &dyn DiagnosticsSink,
    id: AgentId,
) -> &'a mut AgentRecord {
    overlay
        .entry(id)
        .or_insert_with(|| pristine_copy(base, diagnostics, id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::indexing_slicing)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use lightcone_types::{Double4D, LocalizableString, NamedCheck};
    use lightcone_world::{CollectingDiagnostics, GridView, ViewBuilder};
    use serde_json::json;

    use super::*;
    use crate::command::Command;

    const STORAGE: &str = "storage";

    /// Sets the target's storage. The observer pays one unit of fuel; fails
    /// the self-check when the observer has none.
    #[derive(Debug)]
    struct SetStorage {
        target: AgentId,
        value: i64,
    }

    impl Command for SetStorage {
        fn name(&self) -> &str {
            "set_storage"
        }

        fn target_id(&self) -> AgentId {
            self.target
        }

        fn self_check_and_execute(
            &self,
            observer: &mut AgentRecord,
            _settings: &UniverseSettings,
        ) -> CommandErrorMessage {
            let fuel = observer.internal_i64("fuel").unwrap_or_default();
            if fuel <= 0 {
                return CommandErrorMessage::failure(LocalizableString::new("command.no_fuel"));
            }
            observer.internal.insert("fuel".into(), json!(fuel - 1));
            CommandErrorMessage::ok()
        }

        fn check_and_execute(
            &self,
            target: &mut AgentRecord,
            _from: AgentId,
            _from_coordinate: Int4D,
            _settings: &UniverseSettings,
        ) -> CommandErrorMessage {
            let allowed = self.value >= 0;
            if allowed {
                target.internal.insert(STORAGE.into(), json!(self.value));
            }
            CommandErrorMessage::from_checks([NamedCheck::new("storage.non_negative", allowed)])
        }
    }

    fn set(target: AgentId, value: i64) -> SharedCommand {
        Arc::new(SetStorage { target, value })
    }

    /// Adds fuel to its target. The self side is free.
    #[derive(Debug)]
    struct Refuel {
        target: AgentId,
        amount: i64,
    }

    impl Command for Refuel {
        fn name(&self) -> &str {
            "refuel"
        }

        fn target_id(&self) -> AgentId {
            self.target
        }

        fn self_check_and_execute(
            &self,
            _observer: &mut AgentRecord,
            _settings: &UniverseSettings,
        ) -> CommandErrorMessage {
            CommandErrorMessage::ok()
        }

        fn check_and_execute(
            &self,
            target: &mut AgentRecord,
            _from: AgentId,
            _from_coordinate: Int4D,
            _settings: &UniverseSettings,
        ) -> CommandErrorMessage {
            let fuel = target.internal_i64("fuel").unwrap_or_default();
            target.internal.insert("fuel".into(), json!(fuel + self.amount));
            CommandErrorMessage::ok()
        }
    }

    /// Doubles the observer's fuel, then adds `step` to the target's fuel.
    /// Aimed at the observer, both sides touch the same record.
    #[derive(Debug)]
    struct Compound {
        target: AgentId,
        step: i64,
    }

    impl Command for Compound {
        fn name(&self) -> &str {
            "compound"
        }

        fn target_id(&self) -> AgentId {
            self.target
        }

        fn self_check_and_execute(
            &self,
            observer: &mut AgentRecord,
            _settings: &UniverseSettings,
        ) -> CommandErrorMessage {
            let fuel = observer.internal_i64("fuel").unwrap_or_default();
            observer.internal.insert("fuel".into(), json!(fuel * 2));
            CommandErrorMessage::ok()
        }

        fn check_and_execute(
            &self,
            target: &mut AgentRecord,
            _from: AgentId,
            _from_coordinate: Int4D,
            _settings: &UniverseSettings,
        ) -> CommandErrorMessage {
            let fuel = target.internal_i64("fuel").unwrap_or_default();
            target.internal.insert("fuel".into(), json!(fuel + self.step));
            CommandErrorMessage::ok()
        }
    }

    struct Fixture {
        observer: AgentId,
        target: AgentId,
        stranger: AgentId,
        sink: Arc<CollectingDiagnostics>,
        sandbox: PlanSandbox,
    }

    fn fixture(fuel: i64) -> Fixture {
        let settings = UniverseSettings::cube(4, 1.0);
        let observer = AgentId::new();
        let target = AgentId::new();
        let stranger = AgentId::new();
        let me = Arc::new(
            AgentRecord::new(observer, Double4D::new(2.0, 1.5, 1.5, 1.5), &settings)
                .with_internal("fuel", json!(fuel)),
        );
        let them = Arc::new(
            AgentRecord::new(target, Double4D::new(1.0, 2.5, 1.5, 1.5), &settings)
                .with_internal(STORAGE, json!(100)),
        );
        let sink = Arc::new(CollectingDiagnostics::new());
        let dyn_sink: Arc<dyn DiagnosticsSink> = Arc::clone(&sink) as Arc<dyn DiagnosticsSink>;
        let grid = GridView::from_parts(
            Int4D::new(2, 1, 1, 1),
            vec![Arc::clone(&me)],
            [me, them],
            settings.clone(),
            &*dyn_sink,
        );
        let views = ViewBuilder::new(settings, Arc::clone(&dyn_sink)).derive_observer_views(&grid);
        let base = Arc::clone(views.get(&observer).unwrap());
        Fixture {
            observer,
            target,
            stranger,
            sink,
            sandbox: PlanSandbox::new(base, observer, dyn_sink),
        }
    }

    fn storage(sandbox: &PlanSandbox, id: AgentId) -> Option<i64> {
        sandbox.get_agent_data(id).and_then(|r| r.internal_i64(STORAGE))
    }

    fn fuel(sandbox: &PlanSandbox, id: AgentId) -> Option<i64> {
        sandbox.get_agent_data(id).and_then(|r| r.internal_i64("fuel"))
    }

    #[test]
    fn removal_replays_from_base_instead_of_undoing() {
        let Fixture {
            observer,
            target,
            mut sandbox,
            ..
        } = fixture(10);
        let fifty = set(target, 50);
        let ten = set(target, 10);
        sandbox.add_command(Arc::clone(&fifty));
        sandbox.add_command(Arc::clone(&ten));
        assert_eq!(storage(&sandbox, target), Some(10));
        assert_eq!(fuel(&sandbox, observer), Some(8));

        assert!(sandbox.remove_command(&fifty));
        assert_eq!(storage(&sandbox, target), Some(10));
        assert_eq!(fuel(&sandbox, observer), Some(9));
        assert_eq!(sandbox.commands().len(), 1);

        assert!(sandbox.remove_command(&ten));
        assert_eq!(storage(&sandbox, target), Some(100));
        assert!(!sandbox.is_materialized(target));
        assert!(!sandbox.is_materialized(observer));
    }

    #[test]
    fn failed_self_check_gates_the_queue() {
        let Fixture {
            target,
            mut sandbox,
            ..
        } = fixture(0);
        let result = sandbox.add_command(set(target, 50));
        assert!(!result.success);
        assert!(sandbox.commands().is_empty());
        assert!(!sandbox.is_materialized(target));
        assert_eq!(storage(&sandbox, target), Some(100));
    }

    #[test]
    fn failed_target_check_is_queued_anyway() {
        let Fixture {
            target,
            mut sandbox,
            ..
        } = fixture(3);
        let result = sandbox.add_command(set(target, -1));
        assert!(!result.success);
        assert_eq!(sandbox.commands().len(), 1);
        assert_eq!(storage(&sandbox, target), Some(100));
    }

    #[test]
    fn clear_restores_every_id_to_base() {
        let Fixture {
            observer,
            target,
            stranger,
            mut sandbox,
            ..
        } = fixture(5);
        sandbox.add_all_command([set(target, 1), set(target, 2)]);
        sandbox.clear_command();
        assert!(sandbox.commands().is_empty());
        assert_eq!(storage(&sandbox, target), Some(100));
        assert_eq!(fuel(&sandbox, observer), Some(5));
        assert!(sandbox.get_agent_data(stranger).is_none());
        sandbox.clear_command();
        assert_eq!(storage(&sandbox, target), Some(100));
    }

    #[test]
    fn on_change_fires_once_per_call() {
        let Fixture {
            target,
            mut sandbox,
            ..
        } = fixture(10);
        let calls = Rc::new(Cell::new(0usize));
        let seen = Rc::clone(&calls);
        sandbox.set_on_change(move |_| seen.set(seen.get() + 1));

        let a = set(target, 1);
        let b = set(target, 2);
        sandbox.add_command(Arc::clone(&a));
        sandbox.add_all_command([Arc::clone(&b), set(target, 3)]);
        assert_eq!(calls.get(), 2);

        assert_eq!(sandbox.remove_all_command(&[a, b]), 2);
        assert_eq!(calls.get(), 3);
        // Nothing left to remove: no change, no callback.
        assert_eq!(sandbox.remove_all_command(&[set(target, 3)]), 0);
        assert_eq!(calls.get(), 3);

        sandbox.clear_command();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn self_targeting_commands_replay_self_side_first() {
        let Fixture {
            observer,
            mut sandbox,
            ..
        } = fixture(1);
        let a: SharedCommand = Arc::new(Compound { target: observer, step: 3 });
        let b: SharedCommand = Arc::new(Compound { target: observer, step: 5 });
        let c: SharedCommand = Arc::new(Compound { target: observer, step: 7 });
        sandbox.add_all_command([Arc::clone(&a), Arc::clone(&b), c]);
        // 1 -> 2 -> 5 -> 10 -> 15 -> 30 -> 37
        assert_eq!(fuel(&sandbox, observer), Some(37));

        assert!(sandbox.remove_command(&b));
        // 1 -> 2 -> 5 -> 10 -> 17
        assert_eq!(fuel(&sandbox, observer), Some(17));

        assert!(sandbox.remove_command(&a));
        assert_eq!(fuel(&sandbox, observer), Some(9));
    }

    #[test]
    fn removing_an_enabler_fails_later_self_checks_on_replay() {
        let Fixture {
            observer,
            target,
            sink,
            mut sandbox,
            ..
        } = fixture(1);
        let refuel: SharedCommand = Arc::new(Refuel { target: observer, amount: 1 });
        assert!(sandbox.add_command(Arc::clone(&refuel)).success);
        assert!(sandbox.add_command(set(target, 50)).success);
        assert!(sandbox.add_command(set(target, 60)).success);
        assert_eq!(fuel(&sandbox, observer), Some(0));
        assert_eq!(storage(&sandbox, target), Some(60));

        assert!(sandbox.remove_command(&refuel));
        // The first set spends the only unit of fuel; the second one's
        // self-check fails and contributes nothing. Both stay queued and the
        // target, not being reset, keeps its overlay value.
        assert_eq!(fuel(&sandbox, observer), Some(0));
        assert_eq!(sandbox.commands().len(), 2);
        assert_eq!(storage(&sandbox, target), Some(60));
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn target_failures_replay_without_effect() {
        let Fixture {
            target,
            mut sandbox,
            ..
        } = fixture(5);
        let bad = set(target, -1);
        let good = set(target, 50);
        sandbox.add_all_command([Arc::clone(&bad), Arc::clone(&good)]);
        assert_eq!(storage(&sandbox, target), Some(50));

        assert!(sandbox.remove_command(&good));
        assert_eq!(storage(&sandbox, target), Some(100));
        assert!(sandbox.is_materialized(target));
        assert_eq!(sandbox.commands().len(), 1);
        assert!(same_command(&sandbox.commands()[0], &bad));
    }

    #[test]
    fn add_all_returns_one_result_per_command() {
        let Fixture {
            observer,
            target,
            mut sandbox,
            ..
        } = fixture(1);
        let results = sandbox.add_all_command([set(target, -1), set(target, 5)]);
        assert_eq!(results.len(), 2);

        // Self-check passed, target check failed: queued anyway.
        assert!(!results[0].success);
        assert_eq!(results[0].error_message.args, vec!["storage.non_negative"]);
        // The first command spent the only fuel: gated out.
        assert!(!results[1].success);
        assert_eq!(results[1].error_message.key, "command.no_fuel");

        assert_eq!(sandbox.commands().len(), 1);
        assert_eq!(fuel(&sandbox, observer), Some(0));
        assert_eq!(storage(&sandbox, target), Some(100));
    }

    #[test]
    fn missing_target_materializes_a_placeholder() {
        let Fixture {
            stranger,
            sink,
            mut sandbox,
            ..
        } = fixture(1);
        let result = sandbox.add_command(set(stranger, 7));
        assert!(result.success);
        assert_eq!(storage(&sandbox, stranger), Some(7));
        assert_eq!(sink.consistency_count(), 1);
    }

    #[test]
    fn mutable_access_returns_the_same_copy() {
        let Fixture {
            target,
            mut sandbox,
            ..
        } = fixture(1);
        sandbox
            .get_mutable_agent_data(target)
            .internal
            .insert(STORAGE.into(), json!(42));
        assert_eq!(storage(&sandbox, target), Some(42));
        // The base view is never written through.
        assert_eq!(
            sandbox.base().agent(target).and_then(|r| r.internal_i64(STORAGE)),
            Some(100)
        );
    }
}
