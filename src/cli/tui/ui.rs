//! UI rendering for the job detail view.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
};

use crate::cli::labels::{self, label};
use crate::core::{JobRecord, PLACEHOLDER, status_label};
use crate::detail::{CancelPhase, DetailModel, SubscriptionHealth};

use super::app::Tab;

const ENGINE_NAME: &str = "Amazon ECR Plugin v1.0";

/// Main render function.
pub fn render(frame: &mut Frame, model: &DetailModel, tab: Tab, scroll: u16) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Breadcrumb
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Footer/help
        ])
        .split(frame.area());

    render_breadcrumb(frame, model, chunks[0]);

    match &model.record {
        Some(record) if !model.loading => render_job(frame, model, record, chunks[1], tab, scroll),
        _ => {
            let text = Paragraph::new(format!("  {}", label(labels::LOADING)))
                .style(Style::default().fg(Color::DarkGray))
                .block(Block::default().borders(Borders::ALL));
            frame.render_widget(text, chunks[1]);
        }
    }

    render_footer(frame, model, chunks[2]);

    if model.cancel_phase.modal_open() {
        render_confirm_modal(frame, model.cancel_phase);
    }
}

fn render_breadcrumb(frame: &mut Frame, model: &DetailModel, area: Rect) {
    let sep = Span::styled(" › ", Style::default().fg(Color::DarkGray));
    let line = Line::from(vec![
        Span::raw(" "),
        Span::raw(label(labels::HOME)),
        sep.clone(),
        Span::raw(label(labels::TASKS)),
        sep,
        Span::styled(
            model.job_id.as_str(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_job(
    frame: &mut Frame,
    model: &DetailModel,
    record: &JobRecord,
    area: Rect,
    tab: Tab,
    scroll: u16,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title + stop button
            Constraint::Length(5), // General configuration
            Constraint::Length(3), // Tabs
            Constraint::Min(0),    // Tab content
        ])
        .split(area);

    let stop_style = if model.cancel_enabled {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let title = Line::from(vec![
        Span::styled(
            format!(" {}  ", record.id),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("[s] {}", label(labels::BTN_STOP)), stop_style),
    ]);
    frame.render_widget(
        Paragraph::new(title).block(Block::default().borders(Borders::ALL)),
        chunks[0],
    );

    let general = vec![
        kv(label(labels::ENGINE), ENGINE_NAME.to_string()),
        kv(
            label(labels::SOURCE_TYPE),
            record.field_or_placeholder("sourceType").to_string(),
        ),
        kv(
            label(labels::REP_STATUS),
            status_label(record.progress).to_string(),
        ),
    ];
    frame.render_widget(
        Paragraph::new(general).block(
            Block::default()
                .title(label(labels::GENERAL_CONFIG))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        chunks[1],
    );

    let titles: Vec<&str> = [labels::DETAILS, labels::IMAGES, labels::OPTION]
        .into_iter()
        .map(label)
        .collect();
    let tabs = Tabs::new(titles)
        .select(tab.index())
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, chunks[2]);

    let lines: Vec<Line> = match tab {
        Tab::Details => detail_rows(record)
            .into_iter()
            .map(|(k, v)| kv(k, v))
            .collect(),
        Tab::Images => image_list(record)
            .into_iter()
            .map(|image| Line::from(format!("  {}", image)))
            .collect(),
        Tab::Options => vec![
            kv(label(labels::DESCRIPTION), record.description.clone()),
            kv(
                label(labels::ALARM_EMAIL),
                record.field_or_placeholder("alarmEmail").to_string(),
            ),
        ],
    };

    let content = Paragraph::new(lines)
        .scroll((scroll, 0))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(content, chunks[3]);
}

fn kv(key: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<34}", key), Style::default().fg(Color::Cyan)),
        Span::raw(value),
    ])
}

/// An account id of `-` means the bucket lives in the current account.
pub fn in_current_account(account_id: &str) -> bool {
    account_id == PLACEHOLDER
}

fn yes_no(value: bool) -> String {
    let text = if value { "Yes" } else { "No" };
    text.to_string()
}

/// Rows of the details tab, in display order.
pub fn detail_rows(record: &JobRecord) -> Vec<(&'static str, String)> {
    let src_account = record.field_or_placeholder("srcAccountId");
    let dest_account = record.field_or_placeholder("destAccountId");

    vec![
        (label(labels::TASK_ID), record.id.clone()),
        (
            label(labels::CREATED_AT),
            record.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ),
        (
            "Source Region",
            record.field_or_placeholder("srcRegion").to_string(),
        ),
        (
            "Is Source in current account?",
            yes_no(in_current_account(src_account)),
        ),
        ("Source Account Id", src_account.to_string()),
        (
            "Source Credential",
            record.field_or_placeholder("srcCredential").to_string(),
        ),
        (
            "Destination Region",
            record.field_or_placeholder("destRegion").to_string(),
        ),
        (
            "Is Destination in current account?",
            yes_no(in_current_account(dest_account)),
        ),
        ("AWS Account ID", dest_account.to_string()),
        (
            "Credential Store",
            record.field_or_placeholder("destCredential").to_string(),
        ),
        (
            "Prefix",
            record.field_or_placeholder("destPrefix").to_string(),
        ),
    ]
}

/// Images selected for replication, one per line.
pub fn image_list(record: &JobRecord) -> Vec<String> {
    let raw = record.field_or_placeholder("srcImageList");
    if raw == PLACEHOLDER {
        return vec![PLACEHOLDER.to_string()];
    }
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn render_footer(frame: &mut Frame, model: &DetailModel, area: Rect) {
    let help_text = match model.cancel_phase {
        CancelPhase::Idle => "[←→] Tabs  [↑↓] Scroll  [s] Stop  [r] Refresh  [q] Quit",
        CancelPhase::Confirming => "[y] Confirm  [n] Cancel  [q] Quit",
        CancelPhase::Submitting => "[q] Quit",
    };

    let (health, health_color) = match model.subscription {
        SubscriptionHealth::Connecting => ("connecting".to_string(), Color::Yellow),
        SubscriptionHealth::Live => ("live".to_string(), Color::Green),
        SubscriptionHealth::Reconnecting { attempt } => {
            (format!("reconnecting ({})", attempt), Color::Yellow)
        }
        SubscriptionHealth::Degraded => ("offline, press r".to_string(), Color::Red),
    };

    let mut spans = vec![
        Span::raw(format!("  {}  ", help_text)),
        Span::styled(format!("● {}", health), Style::default().fg(health_color)),
    ];

    if let Some(error) = model.cancel_error.as_ref().or(model.fetch_error.as_ref()) {
        spans.push(Span::styled(
            format!("  Error: {}", error),
            Style::default().fg(Color::Red),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_confirm_modal(frame: &mut Frame, phase: CancelPhase) {
    let area = centered_rect(50, 7, frame.area());

    let actions = match phase {
        // Dismiss is ignored until the request settles.
        CancelPhase::Submitting => Line::from(vec![
            Span::raw("  "),
            Span::styled("• • •", Style::default().fg(Color::Yellow)),
        ]),
        _ => Line::from(vec![
            Span::raw(format!("  [n] {}   ", label(labels::BTN_CANCEL))),
            Span::styled(
                format!("[y] {}", label(labels::BTN_CONFIRM)),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
        ]),
    };

    let text = vec![
        Line::from(""),
        Line::from(format!("  {}", label(labels::STOP_TASK_TIPS))),
        Line::from(""),
        actions,
    ];

    let block = Block::default()
        .title(label(labels::STOP_TASK))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn centered_rect(width_pct: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_pct) / 2),
            Constraint::Percentage(width_pct),
            Constraint::Percentage((100 - width_pct) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Parameter, Progress, RawJob};
    use ratatui::{Terminal, backend::TestBackend};
    use std::sync::Arc;

    fn record() -> JobRecord {
        JobRecord::from_raw(RawJob {
            id: "job-42".to_string(),
            progress: Some(Progress::Running),
            created_at: "2021-03-04T10:20:00Z".parse().unwrap(),
            description: None,
            parameters: Some(vec![
                Parameter::new("srcAccountId", ""),
                Parameter::new("destAccountId", "123456789012"),
                Parameter::new("srcImageList", "ubuntu:18.04, nginx:latest\nredis"),
            ]),
        })
    }

    fn model(phase: CancelPhase) -> DetailModel {
        DetailModel {
            job_id: "job-42".to_string(),
            loading: false,
            record: Some(Arc::new(record())),
            cancel_phase: phase,
            cancel_enabled: true,
            subscription: SubscriptionHealth::Live,
            fetch_error: None,
            cancel_error: None,
        }
    }

    fn screen(model: &DetailModel, tab: Tab) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|f| render(f, model, tab, 0)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn account_placeholder_means_current_account() {
        let rows = detail_rows(&record());
        let lookup = |k: &str| rows.iter().find(|(key, _)| *key == k).unwrap().1.clone();

        assert_eq!(lookup("Is Source in current account?"), "Yes");
        assert_eq!(lookup("Is Destination in current account?"), "No");
        assert_eq!(lookup("Created"), "2021-03-04 10:20");
        assert_eq!(lookup("Prefix"), "-");
    }

    #[test]
    fn image_list_splits_entries() {
        assert_eq!(
            image_list(&record()),
            vec!["ubuntu:18.04", "nginx:latest", "redis"]
        );
    }

    #[test]
    fn renders_breadcrumb_and_status() {
        let text = screen(&model(CancelPhase::Idle), Tab::Details);
        assert!(text.contains("Home"));
        assert!(text.contains("job-42"));
        assert!(text.contains("In Progress"));
        assert!(!text.contains("Stop Task"));
    }

    #[test]
    fn renders_modal_while_confirming() {
        let text = screen(&model(CancelPhase::Confirming), Tab::Details);
        assert!(text.contains("Stop Task"));
        assert!(text.contains("Confirm"));
    }

    #[test]
    fn submitting_modal_offers_no_dismiss() {
        let text = screen(&model(CancelPhase::Submitting), Tab::Details);
        assert!(text.contains("Stop Task"));
        assert!(text.contains("• • •"));
        assert!(!text.contains("[n]"));
        assert!(!text.contains("[y]"));
    }

    #[test]
    fn renders_loading_placeholder_before_first_snapshot() {
        let mut m = model(CancelPhase::Idle);
        m.loading = true;
        m.record = None;
        let text = screen(&m, Tab::Details);
        assert!(text.contains("Loading..."));
    }
}
