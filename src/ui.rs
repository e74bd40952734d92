use crate::fields::FieldMapping;
use crate::graph::{FraudGraph, GraphEdge, GraphNode};
use crate::risk::RiskTier;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
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
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Entities,
    Connections,
    Fields,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Entities => Page::Connections,
            Page::Connections => Page::Fields,
            Page::Fields => Page::Entities,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Entities => Page::Fields,
            Page::Connections => Page::Entities,
            Page::Fields => Page::Connections,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Entities => "Entities",
            Page::Connections => "Connections",
            Page::Fields => "Fields",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierFilter {
    All,
    Only(RiskTier),
}

impl TierFilter {
    fn keeps(&self, node: &GraphNode) -> bool {
        match self {
            TierFilter::All => true,
            TierFilter::Only(tier) => node.risk_tier == *tier,
        }
    }

    fn label(&self) -> &str {
        match self {
            TierFilter::All => "All",
            TierFilter::Only(tier) => tier.as_str(),
        }
    }
}

pub struct App {
    pub graph: FraudGraph,
    pub mapping: FieldMapping,
    pub title: String,
    /// Indices into `graph.nodes` that pass the current filters
    pub visible_nodes: Vec<usize>,
    pub state: TableState,
    pub connections_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub tier_filter: TierFilter,
    pub hide_isolated: bool,
}

impl App {
    pub fn new(graph: FraudGraph, mapping: FieldMapping, title: impl Into<String>) -> Self {
        let mut connections_state = TableState::default();
        if !graph.edges.is_empty() {
            connections_state.select(Some(0));
        }

        let mut app = Self {
            graph,
            mapping,
            title: title.into(),
            visible_nodes: Vec::new(),
            state: TableState::default(),
            connections_state,
            current_page: Page::Entities,
            show_detail: false,
            tier_filter: TierFilter::All,
            hide_isolated: false,
        };
        app.refresh();
        app
    }

    fn refresh(&mut self) {
        let filter = self.tier_filter;
        let hide_isolated = self.hide_isolated;

        self.visible_nodes = self
            .graph
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| filter.keeps(n))
            .filter(|(_, n)| !(hide_isolated && n.risk_tier == RiskTier::None))
            .map(|(i, _)| i)
            .collect();

        // Reset selection to first item
        if !self.visible_nodes.is_empty() {
            self.state.select(Some(0));
        } else {
            self.state.select(None);
        }
    }

    pub fn apply_filter(&mut self, filter: TierFilter) {
        self.tier_filter = filter;
        self.refresh();
    }

    pub fn toggle_isolated(&mut self) {
        self.hide_isolated = !self.hide_isolated;
        self.refresh();
    }

    pub fn clear_filter(&mut self) {
        self.tier_filter = TierFilter::All;
        self.hide_isolated = false;
        self.refresh();
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_node(&self) -> Option<&GraphNode> {
        self.state
            .selected()
            .and_then(|i| self.visible_nodes.get(i))
            .map(|&idx| &self.graph.nodes[idx])
    }

    /// Edges touching the selected node
    pub fn selected_edges(&self) -> Vec<&GraphEdge> {
        match self.selected_node() {
            Some(node) => self.graph.edges.iter().filter(|e| e.involves(&node.id)).collect(),
            None => Vec::new(),
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn active_table(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Connections => (&mut self.connections_state, self.graph.edges.len()),
            _ => (&mut self.state, self.visible_nodes.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn first(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        state.select(Some(0));
    }

    fn field_names(&self, edge: &GraphEdge) -> String {
        edge.matched_names.join(", ")
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!("terminal UI failed: {:?}", err);
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
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('c') => app.clear_filter(),
                KeyCode::Char('i') => app.toggle_isolated(),
                KeyCode::Char('1') => app.apply_filter(TierFilter::All),
                KeyCode::Char('2') => app.apply_filter(TierFilter::Only(RiskTier::High)),
                KeyCode::Char('3') => app.apply_filter(TierFilter::Only(RiskTier::Medium)),
                KeyCode::Char('4') => app.apply_filter(TierFilter::Only(RiskTier::Low)),
                KeyCode::Char('5') => app.apply_filter(TierFilter::Only(RiskTier::None)),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.first(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Entities {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_entities(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Entities => render_entities(f, chunks[1], app),
            Page::Connections => render_connections(f, chunks[1], app),
            Page::Fields => render_fields(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn tier_color(tier: RiskTier) -> Color {
    match tier {
        RiskTier::None => Color::Rgb(229, 229, 234),
        RiskTier::Low => Color::Rgb(180, 228, 255),
        RiskTier::Medium => Color::Rgb(136, 201, 255),
        RiskTier::High => Color::Rgb(0, 122, 255),
    }
}

fn header_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let summary = app.graph.summary();

    let mut tab_spans = vec![Span::styled(
        format!("{}  ", app.title),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )];
    for (i, page) in [Page::Entities, Page::Connections, Page::Fields].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::raw(format!(
        "{} entities, {} connections",
        summary.total_entities, summary.total_connections
    )));
    for tier in [RiskTier::High, RiskTier::Medium, RiskTier::Low] {
        tab_spans.push(Span::raw("  "));
        tab_spans.push(Span::styled(
            format!("{} {}", tier.as_str(), summary.by_tier.get(&tier).copied().unwrap_or(0)),
            Style::default().fg(tier_color(tier)),
        ));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_entities(f: &mut Frame, area: Rect, app: &mut App) {
    let header = Row::new(
        ["ID", "Risk", "Score", "Links", "Shared Fields"]
            .iter()
            .map(|h| Cell::from(*h).style(header_style())),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows: Vec<Row> = app
        .visible_nodes
        .iter()
        .map(|&idx| {
            let node = &app.graph.nodes[idx];
            let fields: Vec<String> = node
                .field_types
                .iter()
                .map(|k| app.mapping.display_name(*k))
                .collect();
            let color = tier_color(node.risk_tier);

            Row::new(vec![
                Cell::from(node.label.clone()),
                Cell::from(node.risk_tier.as_str()).style(Style::default().fg(color)),
                Cell::from(format!("{}", node.risk_score)),
                Cell::from(format!("{}", node.connections)),
                Cell::from(truncate(&fields.join(", "), 40)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(32),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Entities "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_connections(f: &mut Frame, area: Rect, app: &mut App) {
    let header = Row::new(
        ["Client 1", "Client 2", "Shared Features", "Value"]
            .iter()
            .map(|h| Cell::from(*h).style(header_style())),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows: Vec<Row> = app
        .graph
        .edges
        .iter()
        .map(|edge| {
            let style = if edge.matched_fields.len() > 1 {
                Style::default().fg(Color::Magenta)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(truncate(&edge.source, 24)),
                Cell::from(truncate(&edge.target, 24)),
                Cell::from(app.field_names(edge)).style(style),
                Cell::from(truncate(edge.shared_value.as_deref().unwrap_or("-"), 30)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(26),
            Constraint::Length(36),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Connections "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.connections_state);
}

fn render_fields(f: &mut Frame, area: Rect, app: &App) {
    let usage = app.graph.field_usage();

    let mut content = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  Configured Fields",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    for def in app.mapping.fields() {
        let detail = if def.key.is_identifier() {
            "identifier".to_string()
        } else {
            format!("{} connections", usage.get(&def.key).copied().unwrap_or(0))
        };
        content.push(Line::from(vec![
            Span::styled(format!("  {:>2}. ", def.key.get()), Style::default().fg(Color::Yellow)),
            Span::raw(format!("{:<24}", def.display_name)),
            Span::styled(detail, Style::default().fg(Color::DarkGray)),
        ]));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Risk: 1 field type = Low, 2 = Medium, 3+ = High",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Fields "),
    );

    f.render_widget(paragraph, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Entity Details ");

    let node = match app.selected_node() {
        Some(n) => n,
        None => {
            f.render_widget(Paragraph::new("No entity selected").block(block), area);
            return;
        }
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let mut content = vec![
        Line::from(""),
        Line::from(vec![Span::styled("  ID: ", label), Span::raw(node.id.clone())]),
        Line::from(vec![
            Span::styled("  Risk: ", label),
            Span::styled(node.risk_tier.as_str(), Style::default().fg(tier_color(node.risk_tier))),
            Span::raw(format!("  (score {})", node.risk_score)),
        ]),
        Line::from(vec![
            Span::styled("  Connections: ", label),
            Span::raw(node.connections.to_string()),
        ]),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(Span::styled(
            "  LINKED ENTITIES",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )),
        Line::from(""),
    ];

    for edge in app.selected_edges() {
        let other = if edge.source == node.id { &edge.target } else { &edge.source };
        content.push(Line::from(vec![
            Span::raw(format!("  {} ", truncate(other, 20))),
            Span::styled(app.field_names(edge), Style::default().fg(Color::DarkGray)),
        ]));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Connections => (app.connections_state.selected(), app.graph.edges.len()),
        _ => (app.state.selected(), app.visible_nodes.len()),
    };
    let key = Style::default().fg(Color::Yellow);

    let mut status_spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled(
            format!("Tier: {}", app.tier_filter.label()),
            Style::default().fg(Color::Green),
        ),
    ];
    if app.hide_isolated {
        status_spans.push(Span::styled(" (isolated hidden)", Style::default().fg(Color::Green)));
    }

    for (k, text) in [
        ("1-5", " Tier | "),
        ("i", " Isolated | "),
        ("c", " Clear | "),
        ("Enter", " Details | "),
        ("Tab", " Page | "),
    ] {
        if k == "1-5" {
            status_spans.push(Span::raw(" | "));
        }
        status_spans.push(Span::styled(k, key));
        status_spans.push(Span::raw(text));
    }
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
