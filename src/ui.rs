use std::time::Instant;

use crate::app::App;
use crate::controller::DragTarget;
use crate::grid::{CellPos, GridBox};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
};

/// Height of one grid row in terminal lines, borders included.
const CELL_HEIGHT: u16 = 5;
const MIN_CELL_HEIGHT: u16 = 3;

/// Interactive element under a screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    AddRow,
    Undo,
    Cell(CellPos),
}

/// Screen regions of the interactive elements from the last frame. Rebuilt on
/// every draw from the live grid, so restored or appended cells are always
/// reachable.
#[derive(Debug, Default, Clone)]
pub struct HitMap {
    regions: Vec<(Rect, Hit)>,
}

impl HitMap {
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn push(&mut self, area: Rect, hit: Hit) {
        self.regions.push((area, hit));
    }

    pub fn hit(&self, x: u16, y: u16) -> Option<Hit> {
        self.regions
            .iter()
            .find(|(r, _)| x >= r.x && x < r.right() && y >= r.y && y < r.bottom())
            .map(|(_, h)| *h)
    }

    #[cfg(test)]
    pub fn area_of(&self, hit: Hit) -> Option<Rect> {
        self.regions.iter().find(|(_, h)| *h == hit).map(|(r, _)| *r)
    }
}

pub fn draw(f: &mut Frame, app: &mut App) {
    let now = Instant::now();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1), Constraint::Length(2)].as_ref())
        .split(f.size());

    app.hit_map.clear();
    draw_toolbar(f, chunks[0], app);
    draw_grid(f, chunks[1], app, now);
    draw_status(f, chunks[2], app);

    if app.show_help {
        draw_help(f, f.size());
    }
    if let Some(msg) = app.notice.clone() {
        draw_notice(f, f.size(), &msg);
    }
}

fn draw_toolbar(f: &mut Frame, area: Rect, app: &mut App) {
    let parts = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(13), Constraint::Length(10), Constraint::Min(0)].as_ref())
        .split(area);

    let button = |label: &str| {
        Paragraph::new(label.to_string())
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD))
            .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded))
    };
    f.render_widget(button("Add Row"), parts[0]);
    f.render_widget(button("Undo"), parts[1]);
    app.hit_map.push(parts[0], Hit::AddRow);
    app.hit_map.push(parts[1], Hit::Undo);

    let info = Paragraph::new(Line::from(vec![
        Span::styled("history ", Style::default().fg(Color::DarkGray)),
        Span::raw(app.controller.history_len().to_string()),
        Span::styled("  rows ", Style::default().fg(Color::DarkGray)),
        Span::raw(app.controller.grid().row_count().to_string()),
    ]))
    .block(Block::default().borders(Borders::ALL).title("gridswap"));
    f.render_widget(info, parts[2]);
}

/// Screen rectangle of each visible cell, plus the size of one cell.
fn cell_layout(
    area: Rect,
    rows: usize,
    columns: usize,
    row_offset: usize,
) -> (Vec<(CellPos, Rect)>, u16, u16) {
    if columns == 0 || area.width == 0 || area.height == 0 {
        return (Vec::new(), 0, 0);
    }
    let cell_w = area.width / columns as u16;
    let row_count = u16::try_from(rows.max(1)).unwrap_or(u16::MAX);
    let cell_h = (area.height / row_count).clamp(MIN_CELL_HEIGHT, CELL_HEIGHT);
    let mut cells = Vec::new();
    for r in row_offset..rows {
        let y = area.y + (r - row_offset) as u16 * cell_h;
        if y + cell_h > area.bottom() {
            break;
        }
        for c in 0..columns {
            let x = area.x + c as u16 * cell_w;
            cells.push((CellPos::new(r, c), Rect::new(x, y, cell_w, cell_h)));
        }
    }
    (cells, cell_w, cell_h)
}

/// Rows that fit in `height` at the given cell height.
pub fn visible_rows(height: u16, cell_h: u16) -> usize {
    if cell_h == 0 {
        return 0;
    }
    (height / cell_h) as usize
}

fn draw_grid(f: &mut Frame, area: Rect, app: &mut App, now: Instant) {
    let block = Block::default().borders(Borders::ALL).title("Grid");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = app.controller.grid().row_count();
    let columns = app.controller.columns();
    if rows == 0 {
        let p = Paragraph::new("Empty grid. Press a or click Add Row.");
        f.render_widget(p, inner);
        return;
    }

    // Keep the keyboard cursor in view
    let probe = cell_layout(inner, rows, columns, 0).2;
    let fit = visible_rows(inner.height, probe).max(1);
    if app.cursor.row < app.row_offset {
        app.row_offset = app.cursor.row;
    } else if app.cursor.row >= app.row_offset + fit {
        app.row_offset = app.cursor.row + 1 - fit;
    }
    app.row_offset = app.row_offset.min(rows.saturating_sub(1));

    let (cells, cell_w, cell_h) = cell_layout(inner, rows, columns, app.row_offset);
    let mut moving: Vec<(Rect, GridBox)> = Vec::new();

    for (pos, rect) in &cells {
        let (pos, rect) = (*pos, *rect);
        app.hit_map.push(rect, Hit::Cell(pos));

        let content = app.controller.grid().box_at(pos).cloned();
        let target = match &content {
            Some(b) => DragTarget::Box(b.id),
            None => DragTarget::Cell(pos),
        };
        let hovered = app.controller.is_hovered(target);
        let border_style = if hovered {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else if app.cursor == pos {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let cell_block = Block::default()
            .borders(Borders::ALL)
            .border_type(if hovered { BorderType::Thick } else { BorderType::Plain })
            .border_style(border_style);
        let box_area = cell_block.inner(rect);
        f.render_widget(cell_block, rect);

        let Some(b) = content else { continue };
        match app.controller.translation(b.id, now) {
            Some(off) => {
                let dx = (off.dx * f32::from(cell_w)).round() as i32;
                let dy = (off.dy * f32::from(cell_h)).round() as i32;
                if let Some(r) = shifted(box_area, dx, dy, inner) {
                    moving.push((r, b));
                }
            }
            None => {
                let fading = app.controller.is_fading(b.id);
                render_box(f, box_area, &b, fading);
            }
        }
    }

    // Sliding boxes are drawn last so they pass over the static ones
    for (rect, b) in moving {
        render_box(f, rect, &b, false);
    }
}

/// `r` moved by (dx, dy), clipped to `bounds`.
fn shifted(r: Rect, dx: i32, dy: i32, bounds: Rect) -> Option<Rect> {
    let x = i32::from(r.x) + dx;
    let y = i32::from(r.y) + dy;
    if x < 0 || y < 0 {
        return None;
    }
    let moved = Rect::new(x as u16, y as u16, r.width, r.height);
    let clipped = moved.intersection(bounds);
    if clipped.width == 0 || clipped.height == 0 {
        None
    } else {
        Some(clipped)
    }
}

fn render_box(f: &mut Frame, area: Rect, b: &GridBox, fading: bool) {
    if area.width == 0 || area.height == 0 {
        return;
    }
    let bg = Color::Rgb(b.color.0, b.color.1, b.color.2);
    let fg = if b.color.is_light() { Color::Black } else { Color::White };
    let mut style = Style::default().bg(bg).fg(fg);
    if fading {
        style = style.add_modifier(Modifier::DIM | Modifier::ITALIC);
    }
    let pad = area.height.saturating_sub(1) / 2;
    let mut lines: Vec<Line> = (0..pad).map(|_| Line::from("")).collect();
    lines.push(Line::from(b.label.as_str()));
    let p = Paragraph::new(lines).alignment(Alignment::Center).style(style);
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let mode = if app.controller.is_dragging() {
        "DRAG"
    } else if !app.controller.pending_swaps().is_empty() {
        "SWAP"
    } else {
        "IDLE"
    };
    let text = Line::from(vec![
        Span::styled(
            format!("[{mode}] "),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(&app.status),
    ]);
    let p = Paragraph::new(text).block(Block::default().borders(Borders::TOP));
    f.render_widget(p, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect::new(
        area.x + (area.width - w) / 2,
        area.y + (area.height - h) / 2,
        w,
        h,
    )
}

fn draw_notice(f: &mut Frame, area: Rect, msg: &str) {
    let popup = centered(area, (msg.len() as u16 + 6).max(24), 5);
    let p = Paragraph::new(vec![
        Line::from(msg.to_string()),
        Line::from(""),
        Line::from(Span::styled("[ OK ]", Style::default().add_modifier(Modifier::REVERSED))),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title("Notice"),
    );
    f.render_widget(Clear, popup);
    f.render_widget(p, popup);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let rows = [
        ("mouse drag", "drag a box onto another box to swap"),
        ("arrows / hjkl", "move cursor"),
        ("space", "pick up / drop box at cursor"),
        ("esc", "cancel drag"),
        ("a", "add row"),
        ("u", "undo"),
        ("?", "toggle help"),
        ("q", "quit"),
    ];
    let lines: Vec<Line> = rows
        .iter()
        .map(|(k, d)| {
            Line::from(vec![
                Span::styled(format!("{k:>14}  "), Style::default().fg(Color::Yellow)),
                Span::raw(*d),
            ])
        })
        .collect();
    let popup = centered(area, 56, rows.len() as u16 + 2);
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(Clear, popup);
    f.render_widget(p, popup);
}
