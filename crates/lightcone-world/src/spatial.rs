//! Copy-on-write spatial index: cell -> group -> agent ids.
//!
//! The index is stored as x-planes of y-rows of z-cells, each level behind
//! an [`Arc`]. Cloning an index is O(x_dim). Editing a cell copies only the
//! plane and row on the path to that cell (via [`Arc::make_mut`]); every
//! other plane and row stays shared with the index it was cloned from. This
//! is what lets each observer group derive its own index from the shared
//! grid view without rebuilding all x*y*z cells.

use std::collections::BTreeMap;
use std::sync::Arc;

use lightcone_types::{AgentId, GroupId, Int3D, UniverseSettings};
use smallvec::SmallVec;

use crate::error::WorldError;

/// Agent ids of one group within one cell.
pub type GroupMembers = SmallVec<[AgentId; 4]>;

/// Groups present in one cell. Never holds an empty member list.
pub type GroupMap = BTreeMap<GroupId, GroupMembers>;

type Row = Arc<Vec<GroupMap>>;
type Plane = Arc<Vec<Row>>;

/// Spatial index over the whole universe grid.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    dims: Int3D,
    planes: Vec<Plane>,
    len: usize,
}

impl SpatialIndex {
    /// An empty index sized to the universe.
    ///
    /// All rows start out as one shared empty row.
    #[allow(clippy::cast_sign_loss)]
    pub fn new(settings: &UniverseSettings) -> Self {
        let nx = settings.x_dim.max(0) as usize;
        let ny = settings.y_dim.max(0) as usize;
        let nz = settings.z_dim.max(0) as usize;
        let empty_row: Row = Arc::new(vec![GroupMap::new(); nz]);
        let empty_plane: Plane = Arc::new(vec![empty_row; ny]);
        Self {
            dims: settings.dims(),
            planes: vec![empty_plane; nx],
            len: 0,
        }
    }

    /// Grid dimensions.
    pub const fn dims(&self) -> Int3D {
        self.dims
    }

    /// Total number of indexed ids.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no id is indexed.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Groups at a cell, or `None` if the cell is out of bounds.
    pub fn cell(&self, cell: Int3D) -> Option<&GroupMap> {
        let (x, y, z) = self.offsets(cell).ok()?;
        self.planes.get(x)?.get(y)?.get(z)
    }

    /// Ids of one group at one cell. Empty if absent.
    pub fn group(&self, cell: Int3D, group: GroupId) -> &[AgentId] {
        self.cell(cell)
            .and_then(|groups| groups.get(&group))
            .map(SmallVec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `id` is indexed at `cell`.
    pub fn contains(&self, cell: Int3D, id: AgentId) -> bool {
        self.cell(cell)
            .is_some_and(|groups| groups.values().any(|m| m.contains(&id)))
    }

    /// Index `id` under `group` at `cell`. Inserting an id twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] if the cell is outside the grid.
    pub fn insert(&mut self, cell: Int3D, group: GroupId, id: AgentId) -> Result<(), WorldError> {
        let members = self.cell_mut(cell)?.entry(group).or_default();
        if !members.contains(&id) {
            members.push(id);
            self.len = self.len.saturating_add(1);
        }
        Ok(())
    }

    /// Remove `id` from every group at `cell`, pruning groups left empty.
    ///
    /// Returns whether anything was removed. Cells that do not hold the id
    /// are not copied.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::OutOfBounds`] if the cell is outside the grid.
    pub fn remove(&mut self, cell: Int3D, id: AgentId) -> Result<bool, WorldError> {
        self.offsets(cell)?;
        if !self.contains(cell, id) {
            return Ok(false);
        }
        let groups = self.cell_mut(cell)?;
        let mut removed = 0usize;
        for members in groups.values_mut() {
            let before = members.len();
            members.retain(|m| *m != id);
            removed = removed.saturating_add(before.saturating_sub(members.len()));
        }
        groups.retain(|_, members| !members.is_empty());
        self.len = self.len.saturating_sub(removed);
        Ok(removed > 0)
    }

    /// Remove `id` from every cell that holds it. Returns the cells it was
    /// removed from.
    pub fn remove_everywhere(&mut self, id: AgentId) -> Vec<Int3D> {
        let holding = self.locate(id);
        for cell in &holding {
            // Cells come from `locate`, so they are in bounds.
            let _ = self.remove(*cell, id);
        }
        holding
    }

    /// Every cell currently holding `id`.
    pub fn locate(&self, id: AgentId) -> Vec<Int3D> {
        self.occupied()
            .filter(|(_, groups)| groups.values().any(|m| m.contains(&id)))
            .map(|(cell, _)| cell)
            .collect()
    }

    /// Drop empty member lists at `cell`. Returns how many were dropped.
    pub fn prune_empty(&mut self, cell: Int3D) -> usize {
        let has_empty = self
            .cell(cell)
            .is_some_and(|groups| groups.values().any(SmallVec::is_empty));
        if !has_empty {
            return 0;
        }
        let Ok(groups) = self.cell_mut(cell) else {
            return 0;
        };
        let before = groups.len();
        groups.retain(|_, members| !members.is_empty());
        before.saturating_sub(groups.len())
    }

    /// Iterate non-empty cells in x-major order.
    pub fn occupied(&self) -> impl Iterator<Item = (Int3D, &GroupMap)> {
        let dims = self.dims;
        (0..dims.x).zip(self.planes.iter()).flat_map(move |(x, plane)| {
            (0..dims.y).zip(plane.iter()).flat_map(move |(y, row)| {
                (0..dims.z)
                    .zip(row.iter())
                    .filter(|(_, groups)| !groups.is_empty())
                    .map(move |(z, groups)| (Int3D::new(x, y, z), groups))
            })
        })
    }

    /// Whether the row at `(x, y)` is the same allocation in both indexes.
    pub fn shares_row_with(&self, other: &Self, x: i32, y: i32) -> bool {
        let (Ok(xi), Ok(yi)) = (usize::try_from(x), usize::try_from(y)) else {
            return false;
        };
        let mine = self.planes.get(xi).and_then(|p| p.get(yi));
        let theirs = other.planes.get(xi).and_then(|p| p.get(yi));
        match (mine, theirs) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn offsets(&self, cell: Int3D) -> Result<(usize, usize, usize), WorldError> {
        let out_of_bounds = || WorldError::OutOfBounds {
            cell,
            dims: self.dims,
        };
        if cell.x >= self.dims.x || cell.y >= self.dims.y || cell.z >= self.dims.z {
            return Err(out_of_bounds());
        }
        let (Ok(x), Ok(y), Ok(z)) = (
            usize::try_from(cell.x),
            usize::try_from(cell.y),
            usize::try_from(cell.z),
        ) else {
            return Err(out_of_bounds());
        };
        Ok((x, y, z))
    }

    fn cell_mut(&mut self, cell: Int3D) -> Result<&mut GroupMap, WorldError> {
        let (x, y, z) = self.offsets(cell)?;
        let out_of_bounds = WorldError::OutOfBounds {
            cell,
            dims: self.dims,
        };
        let plane = self.planes.get_mut(x).ok_or_else(|| out_of_bounds.clone())?;
        let row = Arc::make_mut(plane)
            .get_mut(y)
            .ok_or_else(|| out_of_bounds.clone())?;
        Arc::make_mut(row).get_mut(z).ok_or(out_of_bounds)
    }
}
