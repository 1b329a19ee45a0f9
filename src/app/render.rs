//! Terminal rendering — a thin ratatui view over the block list.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block as UiBlock, Borders, Paragraph, Wrap};
use ratatui::Frame;

use super::App;
use crate::blocks::{Block, BlockKind, BlockStatus};
use crate::config::InputMode;

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    draw_blocks(frame, app, chunks[0]);
    draw_status(frame, app, chunks[1]);
    draw_input(frame, app, chunks[2]);
}

fn status_span(status: BlockStatus) -> Span<'static> {
    match status {
        BlockStatus::Pending => Span::styled("○", Style::default().fg(Color::DarkGray)),
        BlockStatus::Running => Span::styled("●", Style::default().fg(Color::Yellow)),
        BlockStatus::Success => Span::styled("✓", Style::default().fg(Color::Green)),
        BlockStatus::Error => Span::styled("✗", Style::default().fg(Color::Red)),
    }
}

fn block_lines<'a>(block: &'a Block, selected: bool) -> Vec<Line<'a>> {
    let mut lines = Vec::new();
    let marker = if block.in_context { "▎" } else { " " };
    let select_style = if selected {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };

    match &block.kind {
        BlockKind::AgentInput { text } => {
            for line in text.lines() {
                lines.push(Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Blue)),
                    Span::styled("❯ ", Style::default().fg(Color::Blue)),
                    Span::raw(line),
                ]));
            }
        }
        BlockKind::AgentOutput { text, streaming } => {
            for line in text.lines() {
                lines.push(Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Cyan)),
                    Span::raw(line),
                ]));
            }
            if *streaming && text.is_empty() {
                lines.push(Line::from(Span::styled(
                    "…",
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
        BlockKind::ThinkingOutput { text, .. } => {
            for line in text.lines() {
                lines.push(Line::from(Span::styled(
                    format!("{marker}· {line}"),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )));
            }
        }
        BlockKind::CodeInput {
            code,
            language,
            status,
        } => {
            lines.push(
                Line::from(vec![
                    status_span(*status),
                    Span::styled(
                        format!(" {language} "),
                        Style::default().fg(Color::Magenta),
                    ),
                ])
                .style(select_style),
            );
            for line in code.lines() {
                lines.push(Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Magenta)),
                    Span::styled("  ", Style::default()),
                    Span::styled(line, Style::default().fg(Color::White)),
                ]));
            }
        }
        BlockKind::ToolCall {
            tool_name,
            code,
            status,
            ..
        } => {
            lines.push(
                Line::from(vec![
                    status_span(*status),
                    Span::styled(
                        format!(" tool:{tool_name} "),
                        Style::default().fg(Color::Yellow),
                    ),
                ])
                .style(select_style),
            );
            for line in code.lines() {
                lines.push(Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Yellow)),
                    Span::styled("  ", Style::default()),
                    Span::raw(line),
                ]));
            }
        }
        BlockKind::CodeOutput { text, is_error } => {
            let color = if *is_error { Color::Red } else { Color::Gray };
            for line in text.lines() {
                lines.push(Line::from(Span::styled(
                    format!("{marker}  {line}"),
                    Style::default().fg(color),
                )));
            }
        }
        BlockKind::System { text } => {
            lines.push(Line::from(Span::styled(
                format!("{marker}[{text}]"),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    lines.push(Line::default());
    lines
}

fn draw_blocks(frame: &mut Frame, app: &App, area: Rect) {
    let store = app.store.lock().expect("block store poisoned");
    let mut lines: Vec<Line> = Vec::new();
    for block in store.iter() {
        lines.extend(block_lines(block, app.selected_block == Some(block.id)));
    }

    // Stick to the bottom, offset by user scroll.
    let height = area.height.saturating_sub(2) as usize;
    let total = lines.len();
    let bottom = total.saturating_sub(app.scroll_up as usize);
    let start = bottom.saturating_sub(height);

    let paragraph = Paragraph::new(lines[start..bottom].to_vec())
        .wrap(Wrap { trim: false })
        .block(UiBlock::default().borders(Borders::ALL).title(" artifice "));
    frame.render_widget(paragraph, area);
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(
            format!(" {} ", app.mode),
            Style::default()
                .fg(Color::Black)
                .bg(mode_color(app.mode))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(&app.agent_label, Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(
            if app.auto_send {
                "auto-send"
            } else {
                "manual"
            },
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(usage) = &app.last_usage {
        spans.push(Span::styled(
            format!(
                "  {}↑ {}↓ tok",
                usage.input_tokens, usage.output_tokens
            ),
            Style::default().fg(Color::DarkGray),
        ));
    }
    if app.is_paused() {
        spans.push(Span::styled(
            "  PAUSED: [y]run [n]skip [esc]cancel",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    } else if app.task_running() {
        spans.push(Span::styled(
            "  working… [esc]cancel",
            Style::default().fg(Color::Yellow),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let prompt = match app.mode {
        InputMode::Ai => "ai",
        InputMode::Python => "py",
        InputMode::Shell => "sh",
    };
    let paragraph = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("{prompt}> "),
            Style::default().fg(mode_color(app.mode)),
        ),
        Span::raw(&app.input),
    ]))
    .block(UiBlock::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

fn mode_color(mode: InputMode) -> Color {
    match mode {
        InputMode::Ai => Color::Cyan,
        InputMode::Python => Color::Green,
        InputMode::Shell => Color::Magenta,
    }
}
