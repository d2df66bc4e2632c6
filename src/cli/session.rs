use super::ui;
use crate::core::engine::ConversionEngine;
use crate::core::session::{Phase, SessionRegistry, Toggled, UserId};
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Id under which the terminal user's session is registered.
pub const LOCAL_USER: UserId = 0;

const HELP: &str = "Commands: pick <CUR>, toggle <CUR>, calc, amount <N>, status, reset, quit";

#[derive(Debug, PartialEq)]
enum Command {
    Pick(String),
    Toggle(String),
    Calc,
    Amount(String),
    Status,
    Reset,
    Help,
    Quit,
}

fn parse_command(line: &str, phase: Phase) -> Command {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim().to_string();
    match word.to_lowercase().as_str() {
        "pick" | "from" => Command::Pick(rest),
        "toggle" | "to" => Command::Toggle(rest),
        "calc" | "done" => Command::Calc,
        "amount" => Command::Amount(rest),
        "status" => Command::Status,
        "reset" | "cancel" => Command::Reset,
        "quit" | "exit" => Command::Quit,
        _ if phase == Phase::AmountRequested => Command::Amount(line.to_string()),
        _ => Command::Help,
    }
}

/// Applies one input line to the user's session and returns the reply,
/// or `None` when the user asked to quit.
pub async fn handle_line(
    engine: &ConversionEngine,
    registry: &SessionRegistry,
    user: UserId,
    line: &str,
) -> Option<String> {
    let mut session = registry.checkout(user).await;
    let command = parse_command(line, session.phase());
    debug!(user, ?command, phase = %session.phase(), "Session input");

    let reply = match command {
        Command::Quit => {
            registry.checkin(user, session).await;
            return None;
        }
        Command::Help => Ok(HELP.to_string()),
        Command::Status => Ok(match session.selection() {
            Some(selection) => {
                let targets: Vec<String> =
                    selection.targets.iter().map(|t| t.to_string()).collect();
                format!(
                    "{}: {} -> [{}]",
                    session.phase(),
                    selection.source,
                    targets.join(", ")
                )
            }
            None => session.phase().to_string(),
        }),
        Command::Pick(code) => session
            .pick(&code)
            .map(|source| format!("Source {source}. Toggle target currencies, then calc.")),
        Command::Toggle(code) => session.toggle(&code).map(|toggled| {
            let count = session.selection().map_or(0, |s| s.targets.len());
            match toggled {
                Toggled::Added => format!("Added {} ({} selected)", code.to_uppercase(), count),
                Toggled::Removed => format!("Removed {} ({} selected)", code.to_uppercase(), count),
            }
        }),
        Command::Calc => session
            .request_amount()
            .map(|()| "Enter the amount to convert:".to_string()),
        Command::Amount(text) => session
            .submit_amount(&text, engine)
            .await
            .map(|report| report.render()),
        Command::Reset => {
            session.reset();
            Ok("Session cleared.".to_string())
        }
    };

    registry.checkin(user, session).await;
    Some(match reply {
        Ok(text) => text,
        Err(e) => ui::style_text(&e.to_string(), ui::StyleType::Error),
    })
}

/// Line-oriented session on stdin until `quit` or end of input.
pub async fn run(engine: &ConversionEngine, registry: &SessionRegistry) -> Result<()> {
    println!("{}", ui::style_text(HELP, ui::StyleType::Subtle));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match handle_line(engine, registry, LOCAL_USER, &line).await {
            Some(reply) => println!("{reply}"),
            None => break,
        }
    }
    Ok(())
}
