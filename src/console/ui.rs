use crate::console::command::HELP_LINES;
use crate::console::input::LineEdit;
use crate::dashboard::{Activity, DashboardState, DataState, ReadyData};
use crate::markdown;
use crate::models::{ChangeType, FormField, Kpi};
use crate::shaping::{chart_series, format_number, humanize_label};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const TITLE: &str = "Vibrant Financial Dashboard";
const REPORT_TITLE: &str = "AI-Generated Business Report";
const FORM_WIDTH: u16 = 38;

/// Everything the draw pass reads.
pub struct Screen<'a> {
    pub state: &'a DashboardState,
    pub input: &'a LineEdit,
    pub notice: Option<&'a str>,
    pub show_help: bool,
    pub report_scroll: u16,
}

pub fn draw(f: &mut Frame, screen: &Screen<'_>) {
    let area = f.area();
    let banner_height = if screen.state.error.is_some() { 3 } else { 0 };
    let notice_height = if screen.notice.is_some() { 1 } else { 0 };

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(banner_height),
            Constraint::Min(8),
            Constraint::Length(notice_height),
            Constraint::Length(3),
        ])
        .split(area);

    let header = Paragraph::new(Line::from(Span::styled(
        TITLE,
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, root[0]);

    if let Some(error) = &screen.state.error {
        let banner = Paragraph::new(error.as_str())
            .style(Style::default().fg(Color::Red))
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .wrap(Wrap { trim: true });
        f.render_widget(banner, root[1]);
    }

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(FORM_WIDTH), Constraint::Min(20)])
        .split(root[2]);
    draw_form(f, body[0], screen.state);
    draw_dashboard(f, body[1], screen.state);

    if let Some(notice) = screen.notice {
        f.render_widget(
            Paragraph::new(notice).style(Style::default().fg(Color::Yellow)),
            root[3],
        );
    }

    let prompt = format!("> {}", screen.input.value());
    f.render_widget(
        Paragraph::new(prompt).block(Block::default().borders(Borders::ALL).title("Command (type 'help')")),
        root[4],
    );
    let cursor_x = root[4].x + 3 + screen.input.cursor() as u16;
    f.set_cursor_position((cursor_x.min(root[4].right().saturating_sub(2)), root[4].y + 1));

    if screen.show_help {
        let popup = center_rect(area, 80, HELP_LINES.len() as u16 + 2);
        f.render_widget(Clear, popup);
        let lines: Vec<Line> = HELP_LINES.iter().map(|line| Line::from(*line)).collect();
        f.render_widget(
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Commands")),
            popup,
        );
    }

    if let Some(report) = &screen.state.report {
        let popup = report_area(area);
        f.render_widget(Clear, popup);
        let body = markdown::render_text(&markdown::parse(&report.markdown));
        let viewer = Paragraph::new(Text::from(body))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(Span::styled(REPORT_TITLE, Style::default().add_modifier(Modifier::BOLD)))
                    .title_bottom("Esc, Enter or click outside to close"),
            )
            .wrap(Wrap { trim: false })
            .scroll((screen.report_scroll, 0));
        f.render_widget(viewer, popup);
    }
}

/// Where the report viewer sits; clicks outside it dismiss the report.
pub fn report_area(area: Rect) -> Rect {
    center_rect(area, area.width.saturating_mul(4) / 5, area.height.saturating_mul(4) / 5)
}

fn center_rect(rect: Rect, w: u16, h: u16) -> Rect {
    let x = rect.x + rect.width.saturating_sub(w) / 2;
    let y = rect.y + rect.height.saturating_sub(h) / 2;
    Rect {
        x,
        y,
        width: w.min(rect.width),
        height: h.min(rect.height),
    }
}

fn draw_form(f: &mut Frame, area: Rect, state: &DashboardState) {
    let mut lines = Vec::new();
    for field in FormField::ALL {
        let marker = if field.required() { " *" } else { "" };
        lines.push(Line::from(vec![
            Span::styled(format!("{}{}", field.label(), marker), Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(format!("  ({}=)", field.as_str()), Style::default().fg(Color::DarkGray)),
        ]));
        let value = state.form.get(field);
        lines.push(if value.is_empty() {
            Line::from(Span::styled(
                format!("  {}", field.placeholder()),
                Style::default().fg(Color::DarkGray),
            ))
        } else {
            Line::from(format!("  {}", value))
        });
    }
    lines.push(Line::from(""));
    lines.push(if state.activity == Activity::Submitting {
        Line::from(Span::styled("Adding Record...", Style::default().fg(Color::Yellow)))
    } else {
        Line::from(Span::styled(
            "[ Add Financial Record ]",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ))
    });

    let form = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Add New Financial Record"))
        .wrap(Wrap { trim: false });
    f.render_widget(form, area);
}

fn draw_dashboard(f: &mut Frame, area: Rect, state: &DashboardState) {
    if state.activity == Activity::Loading {
        f.render_widget(
            Paragraph::new("Loading...").block(Block::default().borders(Borders::ALL)),
            area,
        );
        return;
    }

    match &state.data {
        DataState::Unavailable => {
            f.render_widget(
                Paragraph::new("No data loaded. Type 'refresh' to try again.")
                    .block(Block::default().borders(Borders::ALL)),
                area,
            );
        }
        DataState::Empty { .. } => {
            let welcome = vec![
                Line::from(Span::styled(
                    "Welcome to Your Dashboard!",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from("It looks like there's no data yet. Use the form to add your first financial record."),
                Line::from("Once you have data, your KPIs and chart will appear here."),
            ];
            f.render_widget(
                Paragraph::new(welcome)
                    .block(Block::default().borders(Borders::ALL))
                    .wrap(Wrap { trim: true }),
                area,
            );
        }
        DataState::Ready(ready) => draw_ready(f, area, state, ready),
    }
}

fn draw_ready(f: &mut Frame, area: Rect, state: &DashboardState, ready: &ReadyData) {
    let kpi_height = if ready.view.kpis.is_empty() { 0 } else { 5 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(kpi_height), Constraint::Min(6)])
        .split(area);

    f.render_widget(Paragraph::new(action_bar(state)), rows[0]);

    if !ready.view.kpis.is_empty() {
        let count = ready.view.kpis.len() as u32;
        let cards = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(ready.view.kpis.iter().map(|_| Constraint::Ratio(1, count)))
            .split(rows[1]);
        for (kpi, card) in ready.view.kpis.iter().zip(cards.iter()) {
            f.render_widget(kpi_card(kpi), *card);
        }
    }

    draw_chart(f, rows[2], ready);
}

fn action_bar(state: &DashboardState) -> Line<'static> {
    let enabled = state.ai_actions_enabled();
    let forecast = if state.activity == Activity::Forecasting {
        Span::styled("Forecasting...", Style::default().fg(Color::Yellow))
    } else {
        action("forecast", "AI Forecast", enabled)
    };
    let report = if state.activity == Activity::GeneratingReport {
        Span::styled("Analyzing...", Style::default().fg(Color::Yellow))
    } else {
        action("report", "AI Report", enabled)
    };
    Line::from(vec![forecast, Span::raw("    "), report])
}

fn action(command: &str, label: &str, enabled: bool) -> Span<'static> {
    if enabled {
        Span::styled(
            format!("[{}] {}", command, label),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled(
            format!("[{}] {} (disabled)", command, label),
            Style::default().fg(Color::DarkGray),
        )
    }
}

fn kpi_card(kpi: &Kpi) -> Paragraph<'_> {
    let mut lines = vec![Line::from(Span::styled(
        kpi.value.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    if let Some(change) = &kpi.change {
        let (arrow, color) = match kpi.change_type {
            Some(ChangeType::Increase) => ("▲", Color::Green),
            Some(ChangeType::Decrease) => ("▼", Color::Red),
            None => ("=", Color::Gray),
        };
        lines.push(Line::from(Span::styled(
            format!("{} {}", arrow, change),
            Style::default().fg(color),
        )));
        lines.push(Line::from(Span::styled("vs last period", Style::default().fg(Color::DarkGray))));
    }
    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(kpi.label.as_str()))
}

fn draw_chart(f: &mut Frame, area: Rect, ready: &ReadyData) {
    let keys = &ready.chart_keys;
    let points = chart_series(&ready.view.rows, ready.forecast.as_deref(), keys);

    let history = Style::default().fg(Color::Cyan);
    let forecast = Style::default().fg(Color::Magenta);
    let bars: Vec<Bar> = points
        .iter()
        .map(|point| {
            let (value, text) = match point.value {
                Some(value) if value.is_finite() => (value.max(0.0).round() as u64, format_number(value)),
                _ => (0, "N/A".to_string()),
            };
            Bar::default()
                .value(value)
                .text_value(text)
                .label(Line::from(point.label.clone()))
                .style(if point.forecast { forecast } else { history })
        })
        .collect();

    let inner_width = area.width.saturating_sub(2);
    let slots = (bars.len() as u16).max(1);
    let bar_width = (inner_width / slots).saturating_sub(1).clamp(3, 10);

    let mut title = vec![Span::raw(format!(
        "{} by {}  ",
        humanize_label(&keys.y_axis),
        humanize_label(&keys.x_axis)
    ))];
    title.push(Span::styled("█ history", history));
    if ready.forecast.is_some() {
        title.push(Span::raw("  "));
        title.push(Span::styled("█ forecast", forecast));
    }

    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(Line::from(title)))
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(1);
    f.render_widget(chart, area);
}
