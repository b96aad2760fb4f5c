use std::collections::VecDeque;
use std::net::SocketAddr;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use mled::{EngineState, Interface, NetworkStats, NodeDto, NodeStatus};

use crate::events::{LogEntry, LogLevel};

/// Everything the screen shows about the engine, sampled once per frame.
pub struct Dashboard {
    pub state: EngineState,
    pub epoch_id: u32,
    pub show_ms: u32,
    pub local_addr: Option<SocketAddr>,
    pub interface: Option<Interface>,
    pub nodes: Vec<NodeDto>,
    pub stats: NetworkStats,
}

pub struct TuiState {
    logs: VecDeque<LogEntry>,
    capacity: usize,
    /// Lines scrolled back from the newest entry.
    scroll: usize,
}

impl TuiState {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            scroll: 0,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.logs.len() >= self.capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
        if self.scroll > 0 {
            self.scroll = (self.scroll + 1).min(self.logs.len().saturating_sub(1));
        }
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(LogLevel::Info, message));
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(LogLevel::Warn, message));
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(LogLevel::Error, message));
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 5).min(self.logs.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(5);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    /// Up to `height` entries ending `scroll` lines before the newest.
    pub fn visible_logs(&self, height: usize) -> impl Iterator<Item = &LogEntry> {
        let end = self.logs.len().saturating_sub(self.scroll);
        let start = end.saturating_sub(height);
        self.logs.range(start..end)
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, dashboard: &Dashboard) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(6),
            Constraint::Length(12),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], dashboard);
    render_nodes(frame, chunks[1], &dashboard.nodes);
    render_log(frame, chunks[2], state);
    render_help(frame, chunks[3]);
}

fn render_header(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let title = format!(" MLED Controller - {} ", dashboard.state.as_str());
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let count = |status: NodeStatus| dashboard.nodes.iter().filter(|n| n.status == status).count();
    let bound = match (&dashboard.local_addr, &dashboard.interface) {
        (Some(addr), Some(iface)) => format!("{} via {} ({})", addr, iface.name, iface.addr),
        _ => "not bound".to_string(),
    };
    let stats = &dashboard.stats;

    let lines = vec![
        Line::from(vec![
            Span::styled("Epoch: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:08X}", dashboard.epoch_id)),
            Span::styled("  Show: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} ms", dashboard.show_ms)),
            Span::styled("  Socket: ", Style::default().fg(Color::Gray)),
            Span::raw(bound),
        ]),
        Line::from(vec![
            Span::styled("Nodes: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{} online", count(NodeStatus::Online)),
                Style::default().fg(Color::Green),
            ),
            Span::raw(" / "),
            Span::styled(
                format!("{} weak", count(NodeStatus::Weak)),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw(" / "),
            Span::styled(
                format!("{} offline", count(NodeStatus::Offline)),
                Style::default().fg(Color::Red),
            ),
            Span::styled("  Packets: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{} sent / {} recv / {} dropped / {} errors",
                stats.packets_sent, stats.packets_received, stats.packets_dropped, stats.send_errors
            )),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn status_color(status: NodeStatus) -> Color {
    match status {
        NodeStatus::Online => Color::Green,
        NodeStatus::Weak => Color::Yellow,
        NodeStatus::Offline => Color::Red,
    }
}

fn render_nodes(frame: &mut Frame, area: Rect, nodes: &[NodeDto]) {
    let block = Block::default()
        .title(format!(" Nodes ({}) ", nodes.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let header = Row::new(["ID", "Name", "Address", "RSSI", "Status", "Pattern"]).style(
        Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::BOLD),
    );

    let rows = nodes.iter().map(|node| {
        let pattern = node
            .current_pattern
            .as_ref()
            .map(|p| format!("{} {}%", p.kind, p.brightness))
            .unwrap_or_else(|| "-".to_string());
        Row::new(vec![
            Cell::from(node.node_id.clone()),
            Cell::from(node.name.clone()),
            Cell::from(format!("{}:{}", node.ip, node.port)),
            Cell::from(format!("{} dBm", node.rssi)),
            Cell::from(node.status.as_str()).style(Style::default().fg(status_color(node.status))),
            Cell::from(pattern),
        ])
    });

    let widths = [
        Constraint::Length(10),
        Constraint::Length(18),
        Constraint::Length(22),
        Constraint::Length(9),
        Constraint::Length(8),
        Constraint::Min(10),
    ];

    let table = Table::new(rows, widths).header(header).block(block);
    frame.render_widget(table, area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = state
        .visible_logs(height)
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Info => Color::White,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(
                    format!("{:<5} ", entry.level.as_str()),
                    Style::default().fg(color),
                ),
                Span::raw(entry.message.clone()),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new(
        "q/Esc quit  p ping  b beacon  o all off  r all rainbow  PgUp/PgDn scroll  End latest",
    )
    .block(block)
    .style(
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    );

    frame.render_widget(text, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(state: &TuiState, height: usize) -> Vec<String> {
        state
            .visible_logs(height)
            .map(|e| e.message.clone())
            .collect()
    }

    #[test]
    fn test_log_capacity() {
        let mut state = TuiState::new(3);
        for i in 0..5 {
            state.log_info(format!("m{}", i));
        }
        assert_eq!(messages(&state, 10), ["m2", "m3", "m4"]);
    }

    #[test]
    fn test_scroll_window() {
        let mut state = TuiState::new(100);
        for i in 0..20 {
            state.log_info(format!("m{}", i));
        }
        assert_eq!(messages(&state, 2), ["m18", "m19"]);

        state.scroll_up();
        assert_eq!(messages(&state, 2), ["m13", "m14"]);

        state.log_warn("m20");
        assert_eq!(messages(&state, 2), ["m13", "m14"]);

        state.scroll_down();
        state.scroll_down();
        assert_eq!(messages(&state, 2), ["m19", "m20"]);

        state.scroll_up();
        state.scroll_to_bottom();
        assert_eq!(messages(&state, 1), ["m20"]);
    }
}
