//! Per-observer view derivation.
//!
//! Agents standing at a grid view's center see each other with zero delay,
//! so their own current records must override whatever older copies the
//! light-delayed scan picked up. Each co-located group gets its own view:
//! the grid view's map and index with the group's records patched in.
//!
//! The patch is copy-on-write. Only the planes and rows holding the center
//! cell or a displaced record are copied; everything else is shared with the
//! grid view, which is never modified.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lightcone_types::{AgentId, GroupId, Int3D, Int4D, SharedRecord};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::grid_view::{GridView, ViewBuilder};

/// The view handed to every observer of one co-located group.
#[derive(Debug, Clone)]
pub struct ObserverView {
    group: GroupId,
    members: Vec<AgentId>,
    peers: Vec<SharedRecord>,
    view: GridView,
}

impl ObserverView {
    /// Group the observers share.
    pub const fn group(&self) -> GroupId {
        self.group
    }

    /// Ids of the observers this view was derived for.
    pub fn members(&self) -> &[AgentId] {
        &self.members
    }

    /// Live co-located peers (`time == center.t`), observers included.
    ///
    /// Afterimages never appear here even though they stay in the
    /// underlying map.
    pub fn peers(&self) -> &[SharedRecord] {
        &self.peers
    }

    /// The patched grid view.
    pub const fn view(&self) -> &GridView {
        &self.view
    }

    /// Center of the underlying view.
    pub const fn center(&self) -> Int4D {
        self.view.center()
    }

    /// Record for an agent, if visible.
    pub fn agent(&self, id: AgentId) -> Option<&SharedRecord> {
        self.view.agent(id)
    }
}

impl ViewBuilder {
    /// Derive one view per group of agents at the grid view's center.
    ///
    /// Every observer id maps to its group's view; members of one group
    /// share the same `Arc`.
    pub fn derive_observer_views(&self, grid: &GridView) -> BTreeMap<AgentId, Arc<ObserverView>> {
        let mut groups: BTreeMap<GroupId, Vec<SharedRecord>> = BTreeMap::new();
        for record in grid.center_agents() {
            let group = self.settings.group_of(record.continuous.to_double3d());
            groups.entry(group).or_default().push(Arc::clone(record));
        }

        let mut views = BTreeMap::new();
        for (group, members) in groups {
            let view = Arc::new(derive_group(grid, group, &members, &*self.diagnostics));
            for member in &members {
                views.insert(member.id, Arc::clone(&view));
            }
        }

        debug!(
            center = %grid.center(),
            observers = views.len(),
            "Derived observer views"
        );
        views
    }
}

fn derive_group(
    grid: &GridView,
    group: GroupId,
    members: &[SharedRecord],
    diagnostics: &dyn DiagnosticsSink,
) -> ObserverView {
    let settings = grid.settings();
    let center = grid.center();
    let mut agent_map = grid.agent_map().clone();
    let mut index = grid.spatial_index().clone();
    let mut touched: BTreeSet<Int3D> = BTreeSet::new();

    // Members unknown to the grid view, or known only by an older record.
    let prioritized = members.iter().filter(|m| {
        agent_map
            .get(&m.id)
            .is_none_or(|known| known.time() < m.time())
    });

    let mut updates: Vec<SharedRecord> = Vec::new();
    for record in prioritized {
        if let Some(stale) = agent_map.get(&record.id) {
            let cell = stale.cell();
            match index.remove(cell, record.id) {
                Ok(true) => {
                    touched.insert(cell);
                }
                Ok(false) | Err(_) => {
                    diagnostics.report(Diagnostic::consistency(
                        "displaced record missing from its index cell",
                        Some(record.id),
                    ));
                    touched.extend(index.remove_everywhere(record.id));
                }
            }
        }
        updates.push(Arc::clone(record));
    }

    for record in updates {
        let cell = record.cell();
        let record_group = settings.group_of(record.continuous.to_double3d());
        match index.insert(cell, record_group, record.id) {
            Ok(()) => {
                touched.insert(cell);
                agent_map.insert(record.id, record);
            }
            Err(err) => {
                diagnostics.report(Diagnostic::Geometry(err));
                agent_map.remove(&record.id);
            }
        }
    }

    for cell in touched {
        if index.prune_empty(cell) > 0 {
            diagnostics.report(Diagnostic::consistency(
                format!("empty group list left at {cell}"),
                None,
            ));
        }
    }

    let peers = members
        .iter()
        .filter_map(|m| agent_map.get(&m.id))
        .filter(|r| !r.is_afterimage_at(center.t))
        .cloned()
        .collect();

    ObserverView {
        group,
        members: members.iter().map(|m| m.id).collect(),
        peers,
        view: grid.with_contents(agent_map, index),
    }
}
