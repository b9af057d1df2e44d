use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ledger_pivot::{format_currency, write_csv, Session, Summary};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::fs::File;
use std::io;
use std::path::PathBuf;

pub const EXPORT_FILE: &str = "ledger-summary.csv";
const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Accounts,
    Excluded,
}

impl Focus {
    pub fn toggle(&self) -> Self {
        match self {
            Focus::Accounts => Focus::Excluded,
            Focus::Excluded => Focus::Accounts,
        }
    }
}

pub struct App {
    pub session: Session,
    pub summary: Summary,
    pub state: TableState,
    pub excluded_state: TableState,
    pub focus: Focus,
    pub message: Option<String>,
    pub export_path: PathBuf,
}

impl App {
    pub fn new(mut session: Session) -> ledger_pivot::Result<Self> {
        let summary = session.summary()?;

        let mut state = TableState::default();
        if !summary.accounts().is_empty() {
            state.select(Some(0));
        }

        Ok(Self {
            session,
            summary,
            state,
            excluded_state: TableState::default(),
            focus: Focus::Accounts,
            message: None,
            export_path: PathBuf::from(EXPORT_FILE),
        })
    }

    fn focused_len(&self) -> usize {
        match self.focus {
            Focus::Accounts => self.summary.accounts().len(),
            Focus::Excluded => self.summary.excluded_totals().len(),
        }
    }

    fn focused_state(&mut self) -> &mut TableState {
        match self.focus {
            Focus::Accounts => &mut self.state,
            Focus::Excluded => &mut self.excluded_state,
        }
    }

    pub fn selected_account(&self) -> Option<&str> {
        self.state
            .selected()
            .and_then(|i| self.summary.accounts().get(i))
            .map(String::as_str)
    }

    pub fn selected_excluded(&self) -> Option<&str> {
        self.excluded_state
            .selected()
            .and_then(|i| self.summary.excluded_totals().get(i))
            .map(|(account, _)| account.as_str())
    }

    /// Swap in a fresh summary and keep both selections in range.
    fn refresh(&mut self, summary: Summary) {
        self.summary = summary;
        clamp(&mut self.state, self.summary.accounts().len());
        clamp(&mut self.excluded_state, self.summary.excluded_totals().len());
    }

    pub fn exclude_selected(&mut self) {
        let Some(account) = self.selected_account().map(str::to_string) else {
            return;
        };

        match self.session.exclude(&account) {
            Ok(summary) => {
                self.refresh(summary);
                self.message = Some(format!("Excluded {}", account));
            }
            Err(e) => {
                // Keep the table usable: the last account can't go
                let mut message = format!("❌ {}", e);
                match self.session.restore(&account) {
                    Ok(summary) => self.refresh(summary),
                    Err(restore_err) => {
                        message.push_str(&format!(" (restoring {} failed: {})", account, restore_err))
                    }
                }
                self.message = Some(message);
            }
        }
    }

    pub fn restore_selected(&mut self) {
        let Some(account) = self.selected_excluded().map(str::to_string) else {
            return;
        };

        match self.session.restore(&account) {
            Ok(summary) => {
                self.refresh(summary);
                if self.state.selected().is_none() {
                    self.state.select(Some(0));
                }
                self.message = Some(format!("Restored {}", account));
            }
            Err(e) => self.message = Some(format!("❌ {}", e)),
        }
    }

    pub fn export_csv(&mut self) {
        let result = File::create(&self.export_path)
            .map_err(ledger_pivot::PivotError::from)
            .and_then(|file| write_csv(&self.summary, file));

        self.message = Some(match result {
            Ok(()) => format!("✓ Exported to {}", self.export_path.display()),
            Err(e) => format!("❌ Export failed: {}", e),
        });
    }

    pub fn toggle_focus(&mut self) {
        self.focus = self.focus.toggle();
        let len = self.focused_len();
        let state = self.focused_state();
        if state.selected().is_none() && len > 0 {
            state.select(Some(0));
        }
    }

    pub fn next(&mut self) {
        let len = self.focused_len();
        if len == 0 {
            return;
        }
        let state = self.focused_state();
        let i = match state.selected() {
            Some(i) => {
                if i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.focused_len();
        if len == 0 {
            return;
        }
        let state = self.focused_state();
        let i = match state.selected() {
            Some(i) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.focused_len();
        if len == 0 {
            return;
        }
        let state = self.focused_state();
        let i = match state.selected() {
            Some(i) => (i + PAGE_SIZE).min(len - 1),
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let state = self.focused_state();
        let i = state.selected().map(|i| i.saturating_sub(PAGE_SIZE)).unwrap_or(0);
        state.select(Some(i));
    }
}

fn clamp(state: &mut TableState, len: usize) {
    match state.selected() {
        _ if len == 0 => state.select(None),
        Some(i) if i >= len => state.select(Some(len - 1)),
        _ => {}
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
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.toggle_focus(),
                KeyCode::Char('x') => app.exclude_selected(),
                KeyCode::Char('r') => app.restore_selected(),
                KeyCode::Char('e') => app.export_csv(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => {
                    if app.focused_len() > 0 {
                        app.focused_state().select(Some(0));
                    }
                }
                KeyCode::End => {
                    let len = app.focused_len();
                    if len > 0 {
                        app.focused_state().select(Some(len - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Pivot + excluded panel
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(75), // Pivot table
            Constraint::Percentage(25), // Excluded accounts
        ])
        .split(chunks[1]);

    render_pivot(f, content_chunks[0], app);
    render_excluded(f, content_chunks[1], app);

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let source = app
        .session
        .dataset()
        .map(|d| d.source.as_str())
        .unwrap_or("-");
    let stats = app.summary.stats();

    let mut spans = vec![
        Span::styled(
            "Ledger Pivot",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(source.to_string(), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled(
            format!(
                "{} accounts × {} months",
                app.summary.accounts().len(),
                app.summary.months().len()
            ),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Total: {}", format_currency(app.summary.grand_total())),
            Style::default().fg(Color::Green),
        ),
    ];

    let skipped = stats.dropped_blank_account + stats.dropped_bad_date;
    if skipped > 0 {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("{} rows skipped", skipped),
            Style::default().fg(Color::Red),
        ));
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_pivot(f: &mut Frame, area: Rect, app: &mut App) {
    let header_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);

    let mut header_cells = vec![Cell::from("Account").style(header_style)];
    header_cells.extend(
        app.summary
            .months()
            .iter()
            .map(|m| Cell::from(m.label()).style(header_style)),
    );
    header_cells.push(Cell::from("Total").style(header_style));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let mut rows: Vec<Row> = app
        .summary
        .accounts()
        .iter()
        .filter_map(|account| {
            let amounts = app.summary.row(account)?;
            let mut cells = vec![Cell::from(truncate(account, 28))];
            cells.extend(amounts.iter().map(|v| amount_cell(*v)));
            cells.push(amount_cell(amounts.iter().sum()));
            Some(Row::new(cells).height(1))
        })
        .collect();

    // Totals row; navigation stops before it
    let mut total_cells = vec![Cell::from("Total")];
    total_cells.extend(app.summary.column_totals().into_iter().map(amount_cell));
    total_cells.push(amount_cell(app.summary.grand_total()));
    rows.push(
        Row::new(total_cells)
            .style(Style::default().add_modifier(Modifier::BOLD))
            .height(1),
    );

    let mut widths = vec![Constraint::Length(30)];
    widths.extend(app.summary.months().iter().map(|_| Constraint::Length(14)));
    widths.push(Constraint::Length(16));

    let border = if app.focus == Focus::Accounts {
        Color::Yellow
    } else {
        Color::White
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(" Accounts by Month "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_excluded(f: &mut Frame, area: Rect, app: &mut App) {
    let header = Row::new(vec![
        Cell::from("Account").style(Style::default().fg(Color::Yellow)),
        Cell::from("Total").style(Style::default().fg(Color::Yellow)),
    ])
    .style(Style::default().bg(Color::DarkGray));

    let rows: Vec<Row> = app
        .summary
        .excluded_totals()
        .iter()
        .map(|(account, total)| {
            Row::new(vec![
                Cell::from(truncate(account, 20)),
                amount_cell(*total),
            ])
        })
        .collect();

    let border = if app.focus == Focus::Excluded {
        Color::Yellow
    } else {
        Color::White
    };

    let table = Table::new(rows, [Constraint::Min(12), Constraint::Length(14)])
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(" Excluded "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.excluded_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some(message) = &app.message {
        status_spans.push(Span::styled(
            format!(" {} ", message),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw("| "));
    }

    status_spans.push(Span::styled("x", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Exclude | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Restore | "));
    status_spans.push(Span::styled("e", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Export CSV | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Panel | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn amount_cell(amount: f64) -> Cell<'static> {
    let color = if amount < 0.0 { Color::Red } else { Color::White };
    Cell::from(format_currency(amount)).style(Style::default().fg(color))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_pivot::{sample_dataset, FieldKind};

    fn app() -> App {
        App::new(Session::with_dataset(sample_dataset()).unwrap()).unwrap()
    }

    #[test]
    fn test_exclude_and_restore_selected() {
        let mut app = app();
        app.next();
        assert_eq!(app.selected_account(), Some("Account 2"));

        app.exclude_selected();
        assert_eq!(app.summary.accounts().len(), 3);
        assert_eq!(app.summary.excluded_total("Account 2"), Some(3200.0));

        app.toggle_focus();
        assert_eq!(app.selected_excluded(), Some("Account 2"));
        app.restore_selected();
        assert_eq!(app.summary.accounts().len(), 4);
        assert_eq!(app.selected_excluded(), None);
    }

    #[test]
    fn test_last_account_cannot_be_excluded() {
        let mut app = app();
        for _ in 0..3 {
            app.exclude_selected();
        }
        assert_eq!(app.summary.accounts(), &["Account 4".to_string()]);

        app.exclude_selected();
        assert_eq!(app.summary.accounts().len(), 1);
        assert!(app.session.filters().excluded().len() == 3);
        assert!(app.message.as_deref().unwrap_or("").starts_with("❌"));
    }

    #[test]
    fn test_failed_undo_is_reported() {
        let mut app = app();
        // Every recompute now fails, including the undo of the exclusion
        assert!(app
            .session
            .set_field_override(FieldKind::Date, Some("Missing".to_string()))
            .is_err());

        app.exclude_selected();
        let message = app.message.as_deref().unwrap_or("");
        assert!(message.starts_with("❌ no valid dates"));
        assert!(message.contains("restoring Account 1 failed"));
        assert!(app.session.filters().excluded().is_empty());
        assert_eq!(app.summary.accounts().len(), 4);
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        app.previous();
        assert_eq!(app.selected_account(), Some("Account 4"));
        app.next();
        assert_eq!(app.selected_account(), Some("Account 1"));
        app.page_down();
        assert_eq!(app.selected_account(), Some("Account 4"));
        app.page_up();
        assert_eq!(app.selected_account(), Some("Account 1"));
    }

    #[test]
    fn test_export_writes_csv() {
        let mut app = app();
        app.export_path = std::env::temp_dir().join(format!("ledger-summary-{}.csv", uuid::Uuid::new_v4()));
        app.export_csv();

        let written = std::fs::read_to_string(&app.export_path).unwrap();
        std::fs::remove_file(&app.export_path).ok();
        assert!(written.starts_with("Account,Jan 2023,Feb 2023,Mar 2023,Total"));
        assert!(app.message.as_deref().unwrap_or("").starts_with("✓"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Rent", 10), "Rent");
        assert_eq!(truncate("Professional Fees", 10), "Profess...");
    }
}
