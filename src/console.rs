//! Line-oriented front end: reads commands from stdin and prints the timer
//! and history screens as text.

use std::fmt::{Display, Write as _};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, TimeZone};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{
    history::DayGroup,
    timer::{
        commands::{apply_intent, TimerIntent},
        TimerSnapshot, TimerStatus,
    },
    AppState, Screen,
};

const HELP: &str = "\
commands:
  start | stop | toggle     run or interrupt the countdown
  edit [minutes]            change the duration (while stopped)
  type <text>               replace the text being edited
  commit [text]             confirm the edited duration
  status                    show the timer
  timer | history | settings
                            switch screens
  default <minutes>         startup duration for next launch
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Timer(TimerIntent),
    Show(Screen),
    Status,
    SetDefault(u32),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "start" => ConsoleCommand::Timer(TimerIntent::Start),
        "stop" => ConsoleCommand::Timer(TimerIntent::Stop),
        "toggle" | "t" => ConsoleCommand::Timer(TimerIntent::Toggle),
        "edit" | "e" => {
            let target = if rest.is_empty() {
                None
            } else {
                Some(
                    rest.parse::<u32>()
                        .map_err(|_| anyhow!("edit expects whole minutes, got '{rest}'"))?,
                )
            };
            ConsoleCommand::Timer(TimerIntent::Edit(target))
        }
        "type" => ConsoleCommand::Timer(TimerIntent::Type(rest.to_string())),
        "commit" | "c" => {
            let raw = (!rest.is_empty()).then(|| rest.to_string());
            ConsoleCommand::Timer(TimerIntent::CommitEdit(raw))
        }
        "status" | "" => ConsoleCommand::Status,
        "timer" => ConsoleCommand::Show(Screen::Timer),
        "history" | "h" => ConsoleCommand::Show(Screen::History),
        "settings" => ConsoleCommand::Show(Screen::Settings),
        "default" => {
            let minutes = rest
                .parse::<u32>()
                .map_err(|_| anyhow!("default expects whole minutes, got '{rest}'"))?;
            ConsoleCommand::SetDefault(minutes)
        }
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => bail!("unknown command '{other}' (try 'help')"),
    };

    Ok(command)
}

/// `mm:ss`, with minutes allowed past 99.
pub fn format_time(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn render_timer(snapshot: &TimerSnapshot) -> String {
    match snapshot.status {
        TimerStatus::Editing => format!(
            "[{} minutes] editing",
            snapshot.edit_buffer.as_deref().unwrap_or("")
        ),
        TimerStatus::Running => format!("{}  running", format_time(snapshot.remaining_seconds)),
        TimerStatus::Idle => format!(
            "{}  ready ({} minute session)",
            format_time(snapshot.remaining_seconds),
            snapshot.configured_minutes
        ),
    }
}

pub fn render_history<Tz>(groups: &[DayGroup], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if groups.is_empty() {
        return "No sessions yet.".to_string();
    }

    let mut out = String::new();
    for group in groups {
        let _ = writeln!(out, "{}", group.label);
        for record in &group.records {
            let mark = if record.completed { '✓' } else { '×' };
            let at = record.started_at.with_timezone(tz).format("%H:%M");
            let _ = writeln!(out, "  {mark} {at}  {} minutes", record.requested_duration);
            if let Some(note) = &record.note {
                let _ = writeln!(out, "      {note}");
            }
        }
    }
    out.trim_end().to_string()
}

async fn execute(app: &mut AppState, command: ConsoleCommand) -> Result<String> {
    let text = match command {
        ConsoleCommand::Timer(intent) => {
            app.navigate(Screen::Timer);
            let result = apply_intent(&app.timer, intent).await;
            let mut text = render_timer(&result.snapshot);
            if let Some(outcome) = result.finished {
                let summary = outcome.note.unwrap_or_else(|| "completed".to_string());
                text = format!("session recorded: {summary}\n{text}");
            } else if !result.applied {
                text = format!("(nothing changed)\n{text}");
            }
            text
        }
        ConsoleCommand::Show(screen) => {
            app.navigate(screen);
            render_screen(app).await
        }
        ConsoleCommand::Status => render_screen(app).await,
        ConsoleCommand::SetDefault(minutes) => {
            let settings = app.settings.update_default_minutes(minutes)?;
            format!(
                "sessions will start at {} minutes next launch",
                settings.default_minutes
            )
        }
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => String::new(),
    };
    Ok(text)
}

async fn render_screen(app: &AppState) -> String {
    match app.screen() {
        Screen::Timer => render_timer(&app.timer.snapshot().await),
        Screen::History => render_history(&app.history.grouped_by_day(&Local::now()), &Local),
        Screen::Settings => {
            let settings = app.settings.get();
            format!(
                "default duration: {} minutes\nstorage: {:?}\nsettings file: {}",
                settings.default_minutes,
                settings.storage,
                app.settings.path().display()
            )
        }
    }
}

/// Drives `app` from `input` until EOF or `quit`. Sessions that complete
/// while waiting for input are announced as they land in the history.
pub async fn run_console<R, W>(app: &mut AppState, input: R, mut output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let mut timer_rx = app.timer.subscribe();
    let mut announced = app.history.len();

    write_block(&mut output, &render_timer(&app.timer.snapshot().await)).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read command")? else {
                    break;
                };

                let text = match parse_command(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => match execute(app, command).await {
                        Ok(text) => text,
                        Err(err) => format!("error: {err:#}"),
                    },
                    Err(err) => err.to_string(),
                };
                write_block(&mut output, &text).await?;
                announced = app.history.len();
            }
            changed = timer_rx.changed() => {
                if changed.is_err() {
                    break;
                }

                let total = app.history.len();
                if total > announced {
                    let fresh = app.history.records();
                    for record in fresh.iter().take(total - announced).filter(|r| r.completed) {
                        let text = format!(
                            "session complete: {} minutes ✓",
                            record.requested_duration
                        );
                        write_block(&mut output, &text).await?;
                    }
                    announced = total;
                }
            }
        }
    }

    output.flush().await.context("failed to flush output")
}

async fn write_block<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<()> {
    output
        .write_all(format!("{text}\n").as_bytes())
        .await
        .context("failed to write output")?;
    output.flush().await.context("failed to flush output")
}
