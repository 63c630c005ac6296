use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

use crate::grid::{BoxId, COLUMNS, CellPos, Grid, RowFactory};

/// Longest accepted swap animation; longer configured values are clamped.
pub const MAX_SWAP_DURATION: Duration = Duration::from_secs(600);

/// Precondition failures of grid operations. All of them leave the grid
/// untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("no drag in progress")]
    NoDragSource,
    #[error("drop target holds no box")]
    EmptyTarget,
    #[error("box {0} dropped onto itself")]
    SameBox(BoxId),
    #[error("box {0} is not in the grid")]
    UnknownBox(BoxId),
    #[error("Nothing to undo.")]
    NothingToUndo,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub columns: usize,
    pub initial_rows: usize,
    pub swap_duration: Duration,
    /// Seed for box colors; None draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            columns: COLUMNS,
            initial_rows: 1,
            swap_duration: Duration::from_millis(1000),
            seed: None,
        }
    }
}

/// Something that can carry the "hovered" marker during a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragTarget {
    Box(BoxId),
    /// An empty cell
    Cell(CellPos),
}

/// Visual displacement in grid units (columns, rows).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSwap {
    pub source: CellPos,
    pub target: CellPos,
    pub source_id: BoxId,
    pub target_id: BoxId,
    pub started: Instant,
    pub due: Instant,
}

impl PendingSwap {
    fn progress(&self, now: Instant) -> f32 {
        let total = self.due.saturating_duration_since(self.started);
        if total.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0)
    }
}

fn ease_in_out(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Owns the grid and everything that mutates it: drag lifecycle, timed
/// swaps, row generation and the snapshot history.
pub struct GridController {
    grid: Grid,
    /// Box id -> cell. Rebuilt only by `install`, so every box reachable by
    /// input is known here.
    locator: HashMap<BoxId, CellPos>,
    factory: RowFactory,
    swap_duration: Duration,

    // Drag state
    dragged: Option<BoxId>,
    transfer: Option<BoxId>,
    fading: Option<BoxId>,
    hovered: HashSet<DragTarget>,

    pending: Vec<PendingSwap>,
    history: Vec<Grid>,
}

impl GridController {
    pub fn new(config: Config) -> Self {
        let mut factory = RowFactory::new(config.columns, config.seed);
        let mut grid = Grid::new();
        for _ in 0..config.initial_rows {
            let row = factory.next_row(grid.row_count());
            grid.push_row(row);
        }
        Self::assemble(grid, factory, config.swap_duration)
    }

    /// Start from an existing grid (which may contain empty cells).
    pub fn with_grid(grid: Grid, config: Config) -> Self {
        let factory = RowFactory::new(config.columns, config.seed);
        Self::assemble(grid, factory, config.swap_duration)
    }

    fn assemble(grid: Grid, factory: RowFactory, swap_duration: Duration) -> Self {
        let mut ctl = Self {
            grid: Grid::new(),
            locator: HashMap::new(),
            factory,
            swap_duration: swap_duration.min(MAX_SWAP_DURATION),
            dragged: None,
            transfer: None,
            fading: None,
            hovered: HashSet::new(),
            pending: Vec::new(),
            history: Vec::new(),
        };
        ctl.install(grid);
        ctl
    }

    /// Make `grid` the live grid and register all of its boxes and cells.
    /// Construction, row appends, swap commits and undo all go through here.
    fn install(&mut self, grid: Grid) {
        self.grid = grid;
        self.reindex();
    }

    fn reindex(&mut self) {
        self.locator = self.grid.boxes().map(|(pos, b)| (b.id, pos)).collect();
        // Hover markers on elements that no longer exist are dropped
        let grid = &self.grid;
        let locator = &self.locator;
        self.hovered.retain(|t| match *t {
            DragTarget::Box(id) => locator.contains_key(&id),
            DragTarget::Cell(pos) => grid.cell(pos).is_some_and(|c| c.content.is_none()),
        });
    }

    fn snapshot(&mut self) {
        self.history.push(self.grid.clone());
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn columns(&self) -> usize {
        self.factory.columns()
    }

    pub fn swap_duration(&self) -> Duration {
        self.swap_duration
    }

    pub fn locate(&self, id: BoxId) -> Option<CellPos> {
        self.locator.get(&id).copied()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    #[cfg(test)]
    pub fn history(&self) -> &[Grid] {
        &self.history
    }

    pub fn is_dragging(&self) -> bool {
        self.dragged.is_some()
    }

    pub fn dragged(&self) -> Option<BoxId> {
        self.dragged
    }

    pub fn is_fading(&self, id: BoxId) -> bool {
        self.fading == Some(id)
    }

    pub fn is_hovered(&self, target: DragTarget) -> bool {
        self.hovered.contains(&target)
    }

    pub fn pending_swaps(&self) -> &[PendingSwap] {
        &self.pending
    }

    /// The drag target an element at `pos` represents: its box, or the cell
    /// itself when empty.
    pub fn target_at(&self, pos: CellPos) -> Option<DragTarget> {
        let cell = self.grid.cell(pos)?;
        Some(match &cell.content {
            Some(b) => DragTarget::Box(b.id),
            None => DragTarget::Cell(pos),
        })
    }

    fn is_valid_target(&self, target: DragTarget) -> bool {
        match target {
            DragTarget::Box(id) => self.locator.contains_key(&id),
            DragTarget::Cell(pos) => self.grid.cell(pos).is_some_and(|c| c.content.is_none()),
        }
    }

    // ===== Drag coordinator =====

    /// Begin dragging `id`. The current grid is saved before anything moves.
    pub fn drag_start(&mut self, id: BoxId) -> Result<(), GridError> {
        if !self.locator.contains_key(&id) {
            return Err(GridError::UnknownBox(id));
        }
        self.dragged = Some(id);
        self.fading = Some(id);
        self.snapshot();
        self.transfer = Some(id);
        debug!("drag start: box {id}");
        Ok(())
    }

    /// Returns true if the hovered marker was applied.
    pub fn drag_enter(&mut self, target: DragTarget) -> bool {
        if !self.is_valid_target(target) {
            return false;
        }
        self.hovered.insert(target)
    }

    pub fn drag_leave(&mut self, target: DragTarget) -> bool {
        self.hovered.remove(&target)
    }

    /// Whether a drop onto `target` would be accepted for delivery. Actual
    /// preconditions are checked by `drop`.
    pub fn drag_over(&self, target: DragTarget) -> bool {
        self.is_valid_target(target)
    }

    /// Finish the gesture whether or not a drop happened.
    pub fn drag_end(&mut self) {
        if let Some(id) = self.dragged.take() {
            debug!("drag end: box {id}");
        }
        self.fading = None;
        self.transfer = None;
        self.hovered.clear();
    }

    // ===== Swap engine =====

    /// Drop the dragged box onto the box `target`. The exchange is animated
    /// and committed by `tick` once the swap duration has elapsed.
    pub fn drop(&mut self, target: Option<BoxId>, now: Instant) -> Result<(), GridError> {
        let source_id = match (self.dragged, self.transfer) {
            (Some(_), Some(id)) => id,
            _ => return Err(GridError::NoDragSource),
        };
        let target_id = target.ok_or(GridError::EmptyTarget)?;
        if source_id == target_id {
            return Err(GridError::SameBox(source_id));
        }
        let source = self.locate(source_id).ok_or(GridError::UnknownBox(source_id))?;
        let target = self.locate(target_id).ok_or(GridError::UnknownBox(target_id))?;

        info!(
            "swap scheduled: box {source_id} ({},{}) <-> box {target_id} ({},{})",
            source.row, source.col, target.row, target.col
        );
        let due = now.checked_add(self.swap_duration).unwrap_or_else(|| {
            warn!("swap deadline overflows the clock; committing on next tick");
            now
        });
        self.pending.push(PendingSwap {
            source,
            target,
            source_id,
            target_id,
            started: now,
            due,
        });
        Ok(())
    }

    /// Current animated displacement of `id`, if it is part of a pending swap.
    pub fn translation(&self, id: BoxId, now: Instant) -> Option<Offset> {
        self.pending.iter().find_map(|p| {
            let (from, to) = if p.source_id == id {
                (p.source, p.target)
            } else if p.target_id == id {
                (p.target, p.source)
            } else {
                return None;
            };
            let t = ease_in_out(p.progress(now));
            Some(Offset {
                dx: (to.col as f32 - from.col as f32) * t,
                dy: (to.row as f32 - from.row as f32) * t,
            })
        })
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }

    /// Commit every swap that is due. Pending swaps are never cancelled: a
    /// swap commits against whatever the grid holds at its recorded cells when
    /// it comes due. Returns the number of swaps committed.
    pub fn tick(&mut self, now: Instant) -> usize {
        if self.pending.iter().all(|p| p.due > now) {
            return 0;
        }
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = waiting;
        due.sort_by_key(|p| p.due);

        let mut committed = 0;
        for swap in due {
            if !self.grid.swap_cells(swap.source, swap.target) {
                warn!(
                    "swap of boxes {} and {} skipped: cell no longer exists",
                    swap.source_id, swap.target_id
                );
                continue;
            }
            self.reindex();
            self.snapshot();
            committed += 1;
            info!("swap committed: boxes {} and {}", swap.source_id, swap.target_id);
        }
        committed
    }

    // ===== Row factory =====

    /// Append a row of fresh boxes. Returns the index of the new row.
    pub fn add_row(&mut self) -> usize {
        self.snapshot();
        let index = self.grid.row_count();
        let row = self.factory.next_row(index);
        let mut grid = std::mem::take(&mut self.grid);
        grid.push_row(row);
        self.install(grid);
        self.snapshot();
        info!("row {index} added ({} boxes)", self.grid.box_count());
        index
    }

    // ===== Snapshot stack =====

    /// Restore the most recent saved grid that differs from the live one.
    /// Entries above it equal the live grid (checkpoints of the current
    /// state) and are discarded with it. When no entry differs the history
    /// is left untouched. Returns the remaining history depth.
    pub fn undo(&mut self) -> Result<usize, GridError> {
        let Some(index) = self.history.iter().rposition(|g| *g != self.grid) else {
            debug!("undo requested with nothing to restore ({} checkpoints)", self.history.len());
            return Err(GridError::NothingToUndo);
        };
        self.history.truncate(index + 1);
        let Some(prev) = self.history.pop() else {
            return Err(GridError::NothingToUndo);
        };
        self.install(prev);
        info!("undo: restored snapshot ({} left)", self.history.len());
        debug!("grid after undo: {:?}", self.grid.ids());
        Ok(self.history.len())
    }
}
