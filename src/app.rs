use std::cmp::min;
use std::time::Instant;

use log::debug;

use crate::controller::{Config, DragTarget, GridController, GridError};
use crate::grid::{BoxId, CellPos};
use crate::ui::{Hit, HitMap};

pub struct App {
    pub should_quit: bool,

    // UI state
    pub status: String,
    /// Blocking notice; swallows input until dismissed
    pub notice: Option<String>,
    pub show_help: bool,

    // Keyboard cursor and first visible grid row
    pub cursor: CellPos,
    pub row_offset: usize,

    /// Target currently under the pointer (or cursor) during a drag
    pub pointer_target: Option<DragTarget>,

    pub controller: GridController,

    /// Filled by the UI on every draw
    pub hit_map: HitMap,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            should_quit: false,
            status: "Drag a box onto another to swap. a add row | u undo | ? help | q quit".into(),
            notice: None,
            show_help: false,
            cursor: CellPos::new(0, 0),
            row_offset: 0,
            pointer_target: None,
            controller: GridController::new(config),
            hit_map: HitMap::default(),
        }
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn is_animating(&self) -> bool {
        !self.controller.pending_swaps().is_empty()
    }

    /// Commit due swaps. Returns true if the grid changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let n = self.controller.tick(now);
        if n > 0 {
            self.status = format!(
                "Swap complete (history {})",
                self.controller.history_len()
            );
        }
        n > 0
    }

    // ===== Toolbar actions =====

    pub fn add_row(&mut self) {
        let row = self.controller.add_row();
        self.status = format!("Added row {}", row + 1);
    }

    pub fn undo(&mut self) {
        match self.controller.undo() {
            Ok(left) => {
                self.status = format!("Undo: restored snapshot ({left} left)");
                self.clamp_cursor();
            }
            Err(e @ GridError::NothingToUndo) => {
                // The notice is modal; a gesture in progress cannot finish behind it
                if self.controller.is_dragging() {
                    self.end_drag();
                }
                self.notice = Some(e.to_string());
            }
            Err(e) => debug!("undo ignored: {e}"),
        }
    }

    // ===== Drag gestures =====

    fn start_drag_at(&mut self, pos: CellPos) {
        let Some(id) = self.controller.grid().box_at(pos).map(|b| b.id) else {
            return;
        };
        match self.controller.drag_start(id) {
            Ok(()) => {
                self.status = format!("Dragging box {id}");
                self.move_pointer_to(Some(pos));
            }
            Err(e) => debug!("drag start ignored: {e}"),
        }
    }

    /// Update hover markers for a pointer now over `pos` (None = outside the grid).
    fn move_pointer_to(&mut self, pos: Option<CellPos>) {
        let target = pos.and_then(|p| self.controller.target_at(p));
        if target == self.pointer_target {
            if let Some(t) = target {
                self.controller.drag_over(t);
            }
            return;
        }
        if let Some(old) = self.pointer_target.take() {
            self.controller.drag_leave(old);
        }
        if let Some(new) = target {
            self.controller.drag_enter(new);
            self.controller.drag_over(new);
        }
        self.pointer_target = target;
    }

    fn drop_at(&mut self, pos: CellPos, now: Instant) {
        let source = self.controller.dragged();
        let target: Option<BoxId> = self.controller.grid().box_at(pos).map(|b| b.id);
        match self.controller.drop(target, now) {
            Ok(()) => {
                if let (Some(a), Some(b)) = (source, target) {
                    self.status = format!(
                        "Swapping {a} <-> {b} ({} ms)…",
                        self.controller.swap_duration().as_millis()
                    );
                }
            }
            Err(e) => {
                debug!("drop ignored: {e}");
                self.status = "Drop cancelled".into();
            }
        }
    }

    fn end_drag(&mut self) {
        if let Some(old) = self.pointer_target.take() {
            self.controller.drag_leave(old);
        }
        self.controller.drag_end();
    }

    // ===== Mouse =====

    pub fn on_mouse_down(&mut self, x: u16, y: u16) {
        if self.notice.is_some() {
            self.dismiss_notice();
            return;
        }
        match self.hit_map.hit(x, y) {
            Some(Hit::AddRow) => self.add_row(),
            Some(Hit::Undo) => self.undo(),
            Some(Hit::Cell(pos)) => {
                self.cursor = pos;
                self.start_drag_at(pos);
            }
            None => {}
        }
    }

    pub fn on_mouse_drag(&mut self, x: u16, y: u16) {
        if self.notice.is_some() || !self.controller.is_dragging() {
            return;
        }
        let pos = match self.hit_map.hit(x, y) {
            Some(Hit::Cell(pos)) => Some(pos),
            _ => None,
        };
        self.move_pointer_to(pos);
    }

    pub fn on_mouse_up(&mut self, x: u16, y: u16, now: Instant) {
        if self.notice.is_some() || !self.controller.is_dragging() {
            return;
        }
        if let Some(Hit::Cell(pos)) = self.hit_map.hit(x, y) {
            self.cursor = pos;
            self.drop_at(pos, now);
        } else {
            self.status = "Drag aborted".into();
        }
        self.end_drag();
    }

    pub fn scroll(&mut self, down: bool) {
        let rows = self.controller.grid().row_count();
        if down {
            self.cursor.row = min(self.cursor.row + 1, rows.saturating_sub(1));
        } else {
            self.cursor.row = self.cursor.row.saturating_sub(1);
        }
    }

    // ===== Keyboard =====

    /// Space: pick up the box under the cursor, or drop onto the cursor cell.
    pub fn toggle_pickup(&mut self, now: Instant) {
        if self.controller.is_dragging() {
            self.drop_at(self.cursor, now);
            self.end_drag();
        } else {
            self.start_drag_at(self.cursor);
        }
    }

    pub fn cancel_drag(&mut self) {
        if self.controller.is_dragging() {
            self.end_drag();
            self.status = "Drag aborted".into();
        }
    }

    pub fn move_cursor(&mut self, drow: isize, dcol: isize) {
        let rows = self.controller.grid().row_count();
        let cols = self.controller.columns();
        if rows == 0 || cols == 0 {
            return;
        }
        self.cursor.row = self.cursor.row.saturating_add_signed(drow).min(rows - 1);
        self.cursor.col = self.cursor.col.saturating_add_signed(dcol).min(cols - 1);
        if self.controller.is_dragging() {
            self.move_pointer_to(Some(self.cursor));
        }
    }

    fn clamp_cursor(&mut self) {
        let rows = self.controller.grid().row_count();
        self.cursor.row = self.cursor.row.min(rows.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui;
    use ratatui::{Terminal, backend::TestBackend};
    use std::time::Duration;

    fn app(rows: usize) -> App {
        App::new(Config {
            initial_rows: rows,
            seed: Some(5),
            ..Config::default()
        })
    }

    fn layout(app: &mut App) {
        let mut terminal = Terminal::new(TestBackend::new(60, 24)).unwrap();
        terminal.draw(|f| ui::draw(f, app)).unwrap();
    }

    fn center_of(app: &App, hit: Hit) -> (u16, u16) {
        let r = app.hit_map.area_of(hit).unwrap();
        (r.x + r.width / 2, r.y + r.height / 2)
    }

    #[test]
    fn mouse_drag_swaps_boxes_after_delay() {
        let mut app = app(1);
        layout(&mut app);
        let t0 = Instant::now();
        let (sx, sy) = center_of(&app, Hit::Cell(CellPos::new(0, 0)));
        let (tx, ty) = center_of(&app, Hit::Cell(CellPos::new(0, 2)));

        app.on_mouse_down(sx, sy);
        assert!(app.controller.is_fading(0));
        app.on_mouse_drag(tx, ty);
        assert!(app.controller.is_hovered(DragTarget::Box(200)));
        assert!(!app.controller.is_hovered(DragTarget::Box(0)));
        app.on_mouse_up(tx, ty, t0);
        assert!(!app.controller.is_dragging());
        assert!(!app.controller.is_hovered(DragTarget::Box(200)));
        assert!(app.is_animating());

        assert!(!app.tick(t0 + Duration::from_millis(500)));
        assert!(app.tick(t0 + Duration::from_millis(1000)));
        assert_eq!(app.controller.grid().ids(), vec![200, 100, 0]);

        app.undo();
        assert_eq!(app.controller.grid().ids(), vec![0, 100, 200]);
        assert!(app.notice.is_none());
    }

    #[test]
    fn release_outside_grid_only_cleans_up() {
        let mut app = app(1);
        layout(&mut app);
        let (sx, sy) = center_of(&app, Hit::Cell(CellPos::new(0, 1)));
        app.on_mouse_down(sx, sy);
        app.on_mouse_drag(59, 23);
        app.on_mouse_up(59, 23, Instant::now());
        assert!(!app.controller.is_dragging());
        assert!(!app.controller.is_fading(100));
        assert!(!app.is_animating());
        assert_eq!(app.status, "Drag aborted");
    }

    #[test]
    fn toolbar_buttons_add_row_and_undo() {
        let mut app = app(1);
        layout(&mut app);
        let (ax, ay) = center_of(&app, Hit::AddRow);
        app.on_mouse_down(ax, ay);
        assert_eq!(app.controller.grid().row_count(), 2);

        layout(&mut app);
        let (ux, uy) = center_of(&app, Hit::Undo);
        app.on_mouse_down(ux, uy);
        assert_eq!(app.controller.grid().row_count(), 1);
        assert!(app.notice.is_none());

        app.on_mouse_down(ux, uy);
        assert_eq!(app.notice.as_deref(), Some("Nothing to undo."));
        // The notice blocks the next click, which only dismisses it
        app.on_mouse_down(ax, ay);
        assert!(app.notice.is_none());
        assert_eq!(app.controller.grid().row_count(), 1);
    }

    #[test]
    fn notice_ends_drag_and_blocks_release() {
        let mut app = app(1);
        layout(&mut app);
        let (sx, sy) = center_of(&app, Hit::Cell(CellPos::new(0, 0)));
        let (tx, ty) = center_of(&app, Hit::Cell(CellPos::new(0, 2)));

        app.on_mouse_down(sx, sy);
        app.on_mouse_drag(tx, ty);
        // Only the drag-start checkpoint exists, so there is nothing to restore
        app.undo();
        assert_eq!(app.notice.as_deref(), Some("Nothing to undo."));
        assert!(!app.controller.is_dragging());
        assert!(!app.controller.is_hovered(DragTarget::Box(200)));

        app.on_mouse_drag(sx, sy);
        app.on_mouse_up(tx, ty, Instant::now());
        assert!(!app.is_animating());
        assert!(app.notice.is_some());
        assert_eq!(app.controller.grid().ids(), vec![0, 100, 200]);
    }

    #[test]
    fn keyboard_pickup_and_drop() {
        let mut app = app(2);
        let t0 = Instant::now();
        app.toggle_pickup(t0);
        assert_eq!(app.controller.dragged(), Some(0));
        app.move_cursor(1, 1);
        assert_eq!(app.cursor, CellPos::new(1, 1));
        assert!(app.controller.is_hovered(DragTarget::Box(400)));
        app.toggle_pickup(t0);
        assert!(!app.controller.is_dragging());
        app.tick(t0 + Duration::from_secs(1));
        assert_eq!(app.controller.locate(0), Some(CellPos::new(1, 1)));
        assert_eq!(app.controller.locate(400), Some(CellPos::new(0, 0)));
    }

    #[test]
    fn escape_cancels_keyboard_drag() {
        let mut app = app(1);
        app.toggle_pickup(Instant::now());
        app.move_cursor(0, 1);
        app.cancel_drag();
        assert!(!app.controller.is_dragging());
        assert!(!app.controller.is_hovered(DragTarget::Box(100)));
        assert!(!app.is_animating());
    }

    #[test]
    fn cursor_is_clamped_after_undo() {
        let mut app = app(1);
        app.add_row();
        app.move_cursor(1, 0);
        assert_eq!(app.cursor.row, 1);
        app.undo();
        assert_eq!(app.cursor.row, 0);
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut app = app(1);
        app.move_cursor(-1, -1);
        assert_eq!(app.cursor, CellPos::new(0, 0));
        app.move_cursor(5, 5);
        assert_eq!(app.cursor, CellPos::new(0, 2));
        app.scroll(true);
        assert_eq!(app.cursor.row, 0);
    }
}
