use anyhow::Result;
use fragments::config::Config;
use fragments::runtime::{spawn_runtime, Orchestrator, OrchestratorUpdate, Phase, SubmitOutcome};
use fragments::state::TranscriptChange;
use fragments::types::{ContentPart, Message, Role, TemplateSelection};
use std::io::Write;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, PartialEq)]
enum LineCommand {
    Empty,
    Stop,
    Undo,
    Clear,
    Attach(String),
    Template(TemplateSelection),
    Quit,
    Submit(String),
}

fn parse_line(line: &str) -> LineCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineCommand::Empty;
    }
    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (trimmed, ""),
    };
    match command {
        "/stop" => LineCommand::Stop,
        "/undo" => LineCommand::Undo,
        "/clear" => LineCommand::Clear,
        "/q" | "/quit" | "/exit" => LineCommand::Quit,
        "/attach" if !argument.is_empty() => LineCommand::Attach(argument.to_string()),
        "/template" => match TemplateSelection::from_str(argument) {
            Ok(selection) => LineCommand::Template(selection),
            Err(never) => match never {},
        },
        _ => LineCommand::Submit(trimmed.to_string()),
    }
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn render_update(update: OrchestratorUpdate) {
    match update {
        OrchestratorUpdate::Phase(Phase::Reconciling) => println!("[running in sandbox]"),
        OrchestratorUpdate::Phase(Phase::Cancelled) => println!("[stopped]"),
        OrchestratorUpdate::Phase(Phase::Idle) => print_prompt(),
        OrchestratorUpdate::Phase(_) | OrchestratorUpdate::PreviewLoading(_) => {}
        OrchestratorUpdate::PartialFragment(fragment) => {
            if let Some(title) = fragment.title.as_deref() {
                eprint!("\r[{title}]");
            }
        }
        OrchestratorUpdate::ExecutionResult(result) => match &result.url {
            Some(url) => println!("[preview] {url}"),
            None => {
                for line in result.stdout.iter().chain(result.stderr.iter()) {
                    print!("{line}");
                }
                if let Some(error) = &result.runtime_error {
                    println!("[runtime error] {error}");
                }
            }
        },
        OrchestratorUpdate::Error {
            message,
            rate_limited,
        } => {
            if rate_limited {
                println!("[rate limited] {message}");
            } else {
                println!("[error] {message}");
            }
            print_prompt();
        }
    }
}

fn render_message(message: &Message) {
    if message.role != Role::Assistant {
        return;
    }
    for part in &message.content {
        match part {
            ContentPart::Text { text } if !text.is_empty() => println!("\n{text}"),
            ContentPart::Code { text } if !text.is_empty() => println!("```\n{text}\n```"),
            _ => {}
        }
    }
}

fn render_change(change: TranscriptChange) {
    match change {
        TranscriptChange::Appended { message, .. } | TranscriptChange::Replaced { message, .. } => {
            render_message(&message)
        }
        TranscriptChange::Truncated { index } => println!("[removed message {}]", index + 1),
        TranscriptChange::Cleared => println!("[cleared]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let mut orchestrator = Orchestrator::from_config(&config)?;
    let mut updates = orchestrator.subscribe_updates();
    let mut transcript = orchestrator.subscribe_transcript();
    let (runtime, join) = spawn_runtime(orchestrator);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_line(&line) {
                    LineCommand::Empty => print_prompt(),
                    LineCommand::Stop => runtime.stop()?,
                    LineCommand::Undo => {
                        runtime.undo()?;
                        print_prompt();
                    }
                    LineCommand::Clear => {
                        runtime.clear()?;
                        print_prompt();
                    }
                    LineCommand::Attach(path) => {
                        match runtime.attach_file(path.as_str()).await {
                            Ok(()) => println!("[attached {path}]"),
                            Err(error) => println!("[error] {error:#}"),
                        }
                        print_prompt();
                    }
                    LineCommand::Template(selection) => {
                        println!("[template {selection}]");
                        runtime.set_template(selection)?;
                        print_prompt();
                    }
                    LineCommand::Quit => break,
                    LineCommand::Submit(text) => {
                        runtime.set_input(text)?;
                        if runtime.submit_input().await? == SubmitOutcome::Stopped {
                            println!("[previous request stopped, input discarded]");
                        }
                    }
                }
            }
            Some(update) = updates.recv() => render_update(update),
            Some(change) = transcript.recv() => render_change(change),
        }
    }

    runtime.shutdown()?;
    join.await?;
    Ok(())
}
