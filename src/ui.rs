use anyhow::Result;
use code_mapping::{
    ChannelObserver, MappingSession, RegistryRow, SessionEvent, SessionEventKind, SessionSnapshot,
    SessionUpdate, Side,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::BTreeSet;
use std::io;
use std::sync::mpsc::{self, Receiver};

const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Hospital,
    Company,
    Connections,
}

impl Pane {
    pub fn next(&self) -> Self {
        match self {
            Pane::Hospital => Pane::Company,
            Pane::Company => Pane::Connections,
            Pane::Connections => Pane::Hospital,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Pane::Hospital => Pane::Connections,
            Pane::Company => Pane::Hospital,
            Pane::Connections => Pane::Company,
        }
    }
}

pub struct App {
    session: MappingSession,
    updates: Receiver<SessionUpdate>,
    pub view: SessionSnapshot,
    pub focus: Pane,
    pub hospital_state: TableState,
    pub company_state: TableState,
    pub connections_state: TableState,
    pub marked: BTreeSet<usize>,
    status: Option<String>,
}

impl App {
    pub fn new(mut session: MappingSession) -> Self {
        let (tx, rx) = mpsc::channel();
        session.subscribe(Box::new(ChannelObserver::new(tx)));

        let view = session.snapshot();
        let mut app = Self {
            session,
            updates: rx,
            view,
            focus: Pane::Hospital,
            hospital_state: TableState::default(),
            company_state: TableState::default(),
            connections_state: TableState::default(),
            marked: BTreeSet::new(),
            status: None,
        };
        app.clamp_selections();
        app
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    fn len(&self, pane: Pane) -> usize {
        match pane {
            Pane::Hospital => self.view.hospital.len(),
            Pane::Company => self.view.company.len(),
            Pane::Connections => self.view.connections.len(),
        }
    }

    fn state_mut(&mut self, pane: Pane) -> &mut TableState {
        match pane {
            Pane::Hospital => &mut self.hospital_state,
            Pane::Company => &mut self.company_state,
            Pane::Connections => &mut self.connections_state,
        }
    }

    /// Keep every selection inside its table after the data changed.
    /// Nothing is selected until the curator moves in a pane.
    fn clamp_selections(&mut self) {
        for pane in [Pane::Hospital, Pane::Company, Pane::Connections] {
            let len = self.len(pane);
            let state = self.state_mut(pane);
            let selected = match (state.selected(), len) {
                (_, 0) | (None, _) => None,
                (Some(i), len) => Some(i.min(len - 1)),
            };
            state.select(selected);
        }
    }

    /// Pull everything the session published since the last call
    fn drain_updates(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            if matches!(
                update.event.kind,
                SessionEventKind::Revoked { .. }
                    | SessionEventKind::Loaded { .. }
                    | SessionEventKind::LoadFailed { .. }
            ) {
                // positions no longer refer to the same rows
                self.marked.clear();
            }
            self.status = Some(update.event.describe());
            self.view = update.snapshot;
        }
        self.clamp_selections();
    }

    fn report(&mut self, result: code_mapping::Result<SessionEvent>) {
        self.drain_updates();
        if let Err(e) = result {
            self.status = Some(format!("⚠ {}", e));
        }
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    pub fn next_pane(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn previous_pane(&mut self) {
        self.focus = self.focus.previous();
    }

    fn move_by(&mut self, delta: isize, wrap: bool) {
        let len = self.len(self.focus);
        if len == 0 {
            return;
        }
        let state = self.state_mut(self.focus);
        let last = len as isize - 1;
        let Some(current) = state.selected() else {
            // first move in this pane picks the nearest end
            state.select(Some(if delta < 0 { last as usize } else { 0 }));
            return;
        };
        let target = current as isize + delta;
        let i = if wrap {
            if target > last {
                0
            } else if target < 0 {
                last
            } else {
                target
            }
        } else {
            target.clamp(0, last)
        };
        state.select(Some(i as usize));
    }

    pub fn next(&mut self) {
        self.move_by(1, true);
    }

    pub fn previous(&mut self) {
        self.move_by(-1, true);
    }

    pub fn page_down(&mut self) {
        self.move_by(PAGE_SIZE as isize, false);
    }

    pub fn page_up(&mut self) {
        self.move_by(-(PAGE_SIZE as isize), false);
    }

    pub fn home(&mut self) {
        if self.len(self.focus) > 0 {
            self.state_mut(self.focus).select(Some(0));
        }
    }

    pub fn end(&mut self) {
        let len = self.len(self.focus);
        if len > 0 {
            self.state_mut(self.focus).select(Some(len - 1));
        }
    }

    // ------------------------------------------------------------------------
    // Curator actions
    // ------------------------------------------------------------------------

    pub fn confirm_selection(&mut self) {
        let result = self
            .session
            .confirm(self.hospital_state.selected(), self.company_state.selected());
        let linked = result.is_ok();
        self.report(result);
        if linked {
            let last = self.view.connections.len().saturating_sub(1);
            self.connections_state.select(Some(last));
        }
    }

    pub fn toggle_mark(&mut self) {
        if self.focus != Pane::Connections {
            return;
        }
        if let Some(i) = self.connections_state.selected() {
            if !self.marked.remove(&i) {
                self.marked.insert(i);
            }
        }
    }

    /// Revoke marked rows, or the highlighted row when nothing is marked
    pub fn revoke_marked(&mut self) {
        let positions: BTreeSet<usize> = if self.marked.is_empty() && self.focus == Pane::Connections {
            self.connections_state.selected().into_iter().collect()
        } else {
            self.marked.clone()
        };
        let result = self.session.revoke(&positions);
        self.report(result);
    }

    pub fn save(&mut self) -> bool {
        let result = self.session.save_connections();
        let saved = result.is_ok();
        self.report(result);
        saved
    }

    pub fn reload(&mut self) {
        let result = self.session.load_connections();
        self.report(result);
    }

    fn covered_count(rows: &[RegistryRow]) -> usize {
        rows.iter().filter(|row| row.covered).count()
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                // save and quit; stay open if the save failed so nothing is lost
                KeyCode::Char('q') => {
                    if app.save() {
                        return Ok(());
                    }
                }
                KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.next_pane(),
                KeyCode::BackTab => app.previous_pane(),
                KeyCode::Enter | KeyCode::Char('c') => app.confirm_selection(),
                KeyCode::Char(' ') => app.toggle_mark(),
                KeyCode::Char('d') | KeyCode::Delete => app.revoke_marked(),
                KeyCode::Char('s') => {
                    app.save();
                }
                KeyCode::Char('r') => app.reload(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.home(),
                KeyCode::End => app.end(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),      // Header with coverage counts
            Constraint::Percentage(50), // Both registries
            Constraint::Min(0),         // Connections
            Constraint::Length(3),      // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let registry_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    render_registry(f, registry_chunks[0], app, Side::Hospital);
    render_registry(f, registry_chunks[1], app, Side::Company);
    render_connections(f, chunks[2], app);
    render_status_bar(f, chunks[3], app);
}

fn border_style(app: &App, pane: Pane) -> Style {
    if app.focus == pane {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    }
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let hospital_covered = App::covered_count(&app.view.hospital);
    let company_covered = App::covered_count(&app.view.company);

    let spans = vec![
        Span::styled(
            "Code Mapping",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Hospital {}/{} linked", hospital_covered, app.view.hospital.len()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Company {}/{} linked", company_covered, app.view.company.len()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Connections: {}", app.view.connections.len()),
            Style::default().fg(Color::White),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_registry(f: &mut Frame, area: Rect, app: &mut App, side: Side) {
    let pane = match side {
        Side::Hospital => Pane::Hospital,
        Side::Company => Pane::Company,
    };

    let rows = app.view.rows(side).iter().map(|row| {
        let style = if row.covered {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        let marker = if row.covered { "✓" } else { " " };

        Row::new(vec![
            Cell::from(marker),
            Cell::from(row.name.clone()),
            Cell::from(row.code.clone()),
        ])
        .style(style)
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Percentage(60),
            Constraint::Percentage(40),
        ],
    )
    .header(header_row(&["", "Name", "Code"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style(app, pane))
            .title(format!(" {} registry ", side.name())),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    let state = match side {
        Side::Hospital => &mut app.hospital_state,
        Side::Company => &mut app.company_state,
    };
    f.render_stateful_widget(table, area, state);
}

fn render_connections(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.view.connections.iter().enumerate().map(|(i, c)| {
        let marked = app.marked.contains(&i);
        let style = if marked {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };

        Row::new(vec![
            Cell::from(if marked { "✗" } else { " " }),
            Cell::from(format!("{}", i)),
            Cell::from(c.hosp_name.clone()),
            Cell::from(c.hosp_code.clone()),
            Cell::from(c.lg_name.clone()),
            Cell::from(c.lg_code.clone()),
        ])
        .style(style)
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(5),
            Constraint::Percentage(30),
            Constraint::Percentage(15),
            Constraint::Percentage(30),
            Constraint::Percentage(15),
        ],
    )
    .header(header_row(&[
        "",
        "#",
        "Hospital name",
        "Hospital code",
        "Company name",
        "Company code",
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style(app, Pane::Connections))
            .title(" Connections "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.connections_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some(status) = app.status() {
        let color = if status.starts_with('⚠') {
            Color::Red
        } else {
            Color::Green
        };
        status_spans.push(Span::styled(format!(" {} ", status), Style::default().fg(color)));
        status_spans.push(Span::raw("|"));
    }

    for (key, label, color) in [
        ("Enter", " Link", Color::Yellow),
        ("Space", " Mark", Color::Yellow),
        ("d", " Unlink", Color::Yellow),
        ("Tab", " Pane", Color::Yellow),
        ("s", " Save", Color::Yellow),
        ("r", " Reload", Color::Yellow),
        ("q", " Save+Quit", Color::Red),
        ("Esc", " Quit", Color::Red),
    ] {
        status_spans.push(Span::raw(" "));
        status_spans.push(Span::styled(key, Style::default().fg(color)));
        status_spans.push(Span::raw(label));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_mapping::{Connection, MemoryPersistence, NamedCode};

    fn app_with(persistence: MemoryPersistence) -> App {
        let session = MappingSession::new(
            vec![NamedCode::new("Alpha", "H1"), NamedCode::new("Beta", "H2")],
            vec![NamedCode::new("Beta", "L2"), NamedCode::new("Gamma", "L3")],
            Box::new(persistence),
        );
        App::new(session)
    }

    /// Move into both registry panes, which selects their first rows
    fn select_first_rows(app: &mut App) {
        app.focus = Pane::Hospital;
        app.next();
        app.next_pane();
        app.next();
        app.focus = Pane::Hospital;
    }

    #[test]
    fn test_nothing_selected_until_curator_moves() {
        let mut app = app_with(MemoryPersistence::new());
        assert_eq!(app.hospital_state.selected(), None);
        assert_eq!(app.company_state.selected(), None);

        app.confirm_selection();
        assert!(app.view.connections.is_empty());
        assert!(app.status().unwrap().starts_with('⚠'));

        // one side chosen is still not a selection
        app.next();
        app.confirm_selection();
        assert!(app.view.connections.is_empty());
        assert_eq!(app.company_state.selected(), None);
    }

    #[test]
    fn test_confirm_updates_view() {
        let mut app = app_with(MemoryPersistence::new());
        select_first_rows(&mut app);

        app.confirm_selection();

        assert_eq!(app.view.connections.len(), 1);
        assert!(app.view.hospital[0].covered);
        assert!(!app.view.hospital[1].covered);
        assert_eq!(app.connections_state.selected(), Some(0));
    }

    #[test]
    fn test_revoke_without_mark_reports() {
        let mut app = app_with(MemoryPersistence::new());

        app.revoke_marked();

        assert!(app.status().unwrap().starts_with('⚠'));
    }

    #[test]
    fn test_mark_and_revoke() {
        let mut app = app_with(MemoryPersistence::new());
        select_first_rows(&mut app);
        app.confirm_selection();
        app.next(); // hospital row 1
        app.confirm_selection();

        app.focus = Pane::Connections;
        app.home();
        app.toggle_mark();
        app.revoke_marked();

        assert_eq!(app.view.connections.len(), 1);
        assert_eq!(app.view.connections[0].hosp_code, "H2");
        assert!(app.marked.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let memory = MemoryPersistence::new();
        let mut app = app_with(memory.clone());
        select_first_rows(&mut app);
        app.confirm_selection();

        assert!(app.save());
        assert_eq!(
            memory.saved(),
            Some(vec![Connection::new("Alpha", "H1", "Beta", "L2")])
        );

        app.reload();
        assert_eq!(app.view.connections.len(), 1);
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app_with(MemoryPersistence::new());

        // first move from no selection lands on the last row
        app.previous();
        assert_eq!(app.hospital_state.selected(), Some(1));
        app.next();
        assert_eq!(app.hospital_state.selected(), Some(0));
        app.page_down();
        assert_eq!(app.hospital_state.selected(), Some(1));
    }
}
