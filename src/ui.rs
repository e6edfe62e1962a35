use crate::app::{ActiveInput, App, FormField, InputMode, Screen};
use crate::models::{FilterMode, Task, TaskDraft, TaskStatus};
use chrono::{DateTime, Local};
use crossterm::event::{self, Event as CEvent};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

fn centered_rect_absolute(width: u16, height: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((r.height.saturating_sub(height)) / 2),
                Constraint::Length(height),
                Constraint::Length((r.height.saturating_sub(height) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Length((r.width.saturating_sub(width)) / 2),
                Constraint::Length(width),
                Constraint::Length((r.width.saturating_sub(width) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

fn key_hint(key: &'static str, action: &'static str) -> [Span<'static>; 2] {
    [
        Span::styled(key, Style::default().fg(Color::Red)),
        Span::raw(action),
    ]
}

fn get_legend(app: &App) -> Text<'static> {
    let hints: Vec<[Span<'static>; 2]> = match (app.screen, app.input_mode) {
        (Screen::Login, _) => vec![
            key_hint(" Tab ", ": Next Field "),
            key_hint(" Enter ", ": Log In "),
            key_hint(" F2 ", ": Register "),
            key_hint(" Esc ", ": Quit "),
        ],
        (Screen::Register, _) => vec![
            key_hint(" Tab ", ": Next Field "),
            key_hint(" Enter ", ": Create Account "),
            key_hint(" Esc ", ": Back To Login "),
        ],
        (Screen::Dashboard, InputMode::Normal) => vec![
            key_hint(" q ", ": Quit "),
            key_hint(" j/k ", ": Move "),
            key_hint(" a ", ": Add "),
            key_hint(" e ", ": Edit "),
            key_hint(" Space ", ": Toggle Done "),
            key_hint(" d ", ": Delete "),
            key_hint(" / ", ": Search "),
            key_hint(" f ", ": Filter "),
            key_hint(" r ", ": Reload "),
            key_hint(" L ", ": Log Out "),
        ],
        (Screen::Dashboard, InputMode::Adding) | (Screen::Dashboard, InputMode::Editing) => vec![
            key_hint(" Tab ", ": Switch Field "),
            key_hint(" Enter ", ": Save "),
            key_hint(" Esc ", ": Cancel "),
        ],
        (Screen::Dashboard, InputMode::Searching) => vec![
            key_hint(" Enter ", ": Keep Search "),
            key_hint(" Esc ", ": Clear Search "),
        ],
    };
    Text::from(Line::from(hints.into_iter().flatten().collect::<Vec<_>>()))
}

pub async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> io::Result<()> {
    loop {
        app.drain_events();
        terminal.draw(|f| draw(f, &mut app))?;

        if app.needs_load {
            // the frame above already shows the loading state
            app.refresh_tasks().await;
            continue;
        }

        // Handle input
        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if app.handle_input(key).await {
                    return Ok(());
                }
            }
        }
    }
}

pub fn draw(f: &mut Frame, app: &mut App) {
    let size = f.area();

    // Split the main layout into body and footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints([Constraint::Min(0), Constraint::Length(2)].as_ref())
        .split(size);

    let body_chunk = chunks[0];
    let footer_chunk = chunks[1];

    match app.screen {
        Screen::Login => draw_login(f, app, body_chunk),
        Screen::Register => draw_register(f, app, body_chunk),
        Screen::Dashboard => draw_dashboard(f, app, body_chunk),
    }

    // Render the legend in the footer
    let legend = Paragraph::new(get_legend(app))
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });

    f.render_widget(legend, footer_chunk);
}

fn form_line(label: &'static str, value: &str, active: bool, secret: bool) -> Line<'static> {
    let shown = if secret {
        "*".repeat(value.chars().count())
    } else {
        value.to_string()
    };
    let label_style = if active {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };
    Line::from(vec![Span::styled(label, label_style), Span::raw(shown)])
}

fn draw_form(f: &mut Frame, area: Rect, title: &'static str, mut lines: Vec<Line<'static>>, error: Option<&str>) {
    if let Some(error) = error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(Color::Red),
        )));
    }

    let height = lines.len() as u16 + 2;
    let popup_area = centered_rect_absolute(50.min(area.width), height.min(area.height), area);
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Green));
    let form = Paragraph::new(lines)
        .style(Style::default().fg(Color::White))
        .block(block)
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(form, popup_area);
}

fn draw_login(f: &mut Frame, app: &App, area: Rect) {
    let lines = vec![
        form_line(
            "Email:    ",
            &app.login_form.email,
            app.form_field != FormField::Password,
            false,
        ),
        form_line(
            "Password: ",
            &app.login_form.password,
            app.form_field == FormField::Password,
            true,
        ),
    ];
    draw_form(f, area, "Login", lines, app.form_error.as_deref());
}

fn draw_register(f: &mut Frame, app: &App, area: Rect) {
    let form = &app.register_form;
    let lines = vec![
        form_line("Name:     ", &form.name, app.form_field == FormField::Name, false),
        form_line("Email:    ", &form.email, app.form_field == FormField::Email, false),
        form_line(
            "Password: ",
            &form.password,
            app.form_field == FormField::Password,
            true,
        ),
    ];
    draw_form(f, area, "Register", lines, app.form_error.as_deref());
}

fn filter_chip(mode: FilterMode, current: FilterMode) -> Span<'static> {
    let style = if mode == current {
        Style::default().bg(Color::Blue).fg(Color::White)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(format!(" {} ", mode.label()), style)
}

fn status_marker(status: TaskStatus) -> Span<'static> {
    match status {
        TaskStatus::Completed => Span::styled("[x] ", Style::default().fg(Color::Green)),
        TaskStatus::InProgress => Span::styled("[~] ", Style::default().fg(Color::Yellow)),
        TaskStatus::Pending => Span::raw("[ ] "),
    }
}

fn draw_dashboard(f: &mut Frame, app: &mut App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    // Header: counts, search text and filter chips
    let stats = app.dashboard.stats();
    let filter = app.dashboard.filter;
    let search_style = if app.input_mode == InputMode::Searching {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled("Total: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{}  ", stats.total)),
        Span::styled("Done: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{}  ", stats.done)),
        Span::styled("Pending: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{}   ", stats.pending)),
        filter_chip(FilterMode::All, filter),
        filter_chip(FilterMode::Active, filter),
        filter_chip(FilterMode::Completed, filter),
        Span::raw("   "),
        Span::styled(format!("Search: {}", app.dashboard.search), search_style),
    ]))
    .block(Block::default().borders(Borders::ALL).title("To-Do"));
    f.render_widget(header, rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)].as_ref())
        .split(rows[1]);

    let list_title = format!("Tasks ({})", filter.label());
    let visible: Vec<Task> = app.dashboard.visible_tasks().into_iter().cloned().collect();

    // Left panel: Task list
    let tasks_widget = if app.dashboard.is_loading() {
        List::new(vec![ListItem::new("Loading…")])
            .block(Block::default().borders(Borders::ALL).title(list_title))
    } else if visible.is_empty() {
        List::new(vec![ListItem::new("No tasks")])
            .block(Block::default().borders(Borders::ALL).title(list_title))
    } else {
        let tasks: Vec<ListItem> = visible
            .iter()
            .map(|task| {
                let title_style = if task.status.is_completed() {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![
                    status_marker(task.status),
                    Span::styled(task.title.clone(), title_style),
                ]))
            })
            .collect();

        List::new(tasks)
            .block(Block::default().borders(Borders::ALL).title(list_title))
            .highlight_style(
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ")
    };

    f.render_stateful_widget(tasks_widget, chunks[0], &mut app.state);

    // Right panel: Task details
    let detail_block = Block::default().borders(Borders::ALL).title("Task Details");
    let selected = app.state.selected().and_then(|i| visible.get(i));
    let paragraph = match selected {
        Some(task) => Paragraph::new(detail_lines(task)),
        None => Paragraph::new("Select a task to see its details"),
    };
    f.render_widget(paragraph.block(detail_block).wrap(Wrap { trim: true }), chunks[1]);

    match app.input_mode {
        InputMode::Adding => draw_task_form(
            f,
            area,
            "New Task (Press Enter to Submit)",
            &app.dashboard.new_task,
            app.active_input,
        ),
        InputMode::Editing => draw_task_form(
            f,
            area,
            "Edit Task (Press Enter to Save)",
            &app.dashboard.edit_draft,
            app.active_input,
        ),
        _ => {}
    }
}

fn detail_lines(task: &Task) -> Vec<Line<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::from(vec![Span::styled("Title: ", bold), Span::raw(task.title.clone())]),
        Line::from(vec![
            Span::styled("Status: ", bold),
            Span::raw(status_label(task.status)),
        ]),
    ];

    if let Some(created_at) = &task.created_at {
        lines.push(Line::from(vec![
            Span::styled("Created: ", bold),
            Span::raw(format_created_at(created_at)),
        ]));
    }
    if task.deleted {
        lines.push(Line::from(Span::styled(
            "Marked as deleted",
            Style::default().fg(Color::Red),
        )));
    }

    lines.push(Line::from(Span::styled("Description: ", bold)));
    if task.description.trim().is_empty() {
        lines.push(Line::from(Span::raw("No description")));
    } else {
        lines.extend(
            task.description
                .lines()
                .map(|line| Line::from(Span::raw(line.to_string()))),
        );
    }
    lines
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "Pending",
        TaskStatus::InProgress => "In progress",
        TaskStatus::Completed => "Completed",
    }
}

/// RFC 3339 timestamps are shown in local time; anything else verbatim.
pub fn format_created_at(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn draw_task_form(
    f: &mut Frame,
    area: Rect,
    title: &'static str,
    draft: &TaskDraft,
    active_input: ActiveInput,
) {
    let popup_width = popup_width(area.width);
    let title_lines = calculate_wrapped_lines(&draft.title, popup_width).max(1);
    let description_lines = calculate_wrapped_lines(&draft.description, popup_width).max(1);

    let popup_height = u16::try_from(title_lines + description_lines)
        .unwrap_or(u16::MAX)
        .saturating_add(4);
    let popup_height = popup_height.min(area.height.saturating_sub(2));
    let popup_area = centered_rect_absolute(popup_width + 2, popup_height, area);

    let label = |name: &'static str, input: ActiveInput| {
        let style = if input == active_input {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };
        Line::from(Span::styled(name, style))
    };

    let lines = vec![
        label("Title", ActiveInput::Title),
        Line::from(draft.title.clone()),
        label("Description (optional)", ActiveInput::Description),
        Line::from(draft.description.clone()),
    ];

    let popup_block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Green));

    let input = Paragraph::new(lines)
        .style(Style::default().fg(Color::White))
        .block(popup_block)
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(input, popup_area);
}

/// Inner width of the task form: 60% of the screen less its borders.
fn popup_width(area_width: u16) -> u16 {
    let width = u32::from(area_width) * 60 / 100;
    (width as u16).saturating_sub(2).max(1)
}

fn calculate_wrapped_lines(text: &str, max_width: u16) -> usize {
    let max_width = max_width.max(1) as usize;
    let mut line_count = 0;
    for line in text.lines() {
        let line_width = line.chars().count();
        line_count += line_width.div_ceil(max_width).max(1);
    }
    line_count
}
