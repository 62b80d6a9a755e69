//! `pixagent chat` — interactive REPL command.
//!
//! Opens a readline-based loop that sends each line to the agent and
//! streams the response back. Slash-commands cover confirmations,
//! transcript management, and scheduled tasks.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use px_domain::config::Config;
use px_domain::stream::{EndReason, OutputEvent};
use px_domain::turn::{Decision, Part, Role};

use crate::bootstrap;
use crate::runtime::{OutputStream, ScheduleSpec};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL.
pub async fn chat(config: Arc<Config>) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config)?;

    let history_path = history_path();
    if let Some(parent) = history_path.as_ref().and_then(|p| p.parent()) {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    eprintln!("pixagent interactive chat");
    eprintln!(
        "Backend: {}  |  Type /help for commands, Ctrl+D to exit",
        state.agent.backend_id()
    );
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(&state, trimmed).await {
                        break;
                    }
                    continue;
                }

                match state.agent.submit_user_turn(trimmed) {
                    Ok(events) => print_stream(&state, events).await,
                    Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /quit to exit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        rl.save_history(path).ok();
    }
    state.scheduler.shutdown();

    eprintln!("Goodbye!");
    Ok(())
}

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".pixagent")
            .join("chat_history.txt")
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
async fn handle_slash_command(state: &AppState, input: &str) -> bool {
    let (cmd, arg) = match input.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };

    match cmd {
        "/exit" | "/quit" => return true,

        "/approve" | "/reject" => {
            if arg.is_empty() {
                eprintln!("Usage: {cmd} <call_id>");
                return false;
            }
            let decision = if cmd == "/approve" {
                Decision::Approved
            } else {
                Decision::Rejected
            };
            if let Err(e) = state.agent.resolve_pending_confirmation(arg, decision) {
                eprintln!("\x1B[31merror: {e}\x1B[0m");
                return false;
            }
            match state.agent.resume() {
                Ok(events) => print_stream(state, events).await,
                Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
            }
        }

        "/pending" => {
            let pending = state.agent.pending_confirmations();
            if pending.is_empty() {
                eprintln!("No calls awaiting confirmation.");
            }
            for p in pending {
                eprintln!("  {}  {}  {}", p.call_id, p.tool_name, p.input);
            }
        }

        "/clear" => match state.agent.clear_transcript() {
            Ok(()) => eprintln!("Transcript cleared."),
            Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
        },

        "/transcript" => match state.agent.transcript() {
            Ok(turns) => {
                for turn in turns {
                    let role = match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        Role::System => "system",
                    };
                    for part in &turn.parts {
                        match part {
                            Part::Text { text } => eprintln!("{role:>9}: {text}"),
                            Part::ToolCall(tc) => eprintln!(
                                "{role:>9}: [{} {} {:?}]",
                                tc.tool_name, tc.call_id, tc.state
                            ),
                            Part::Data { kind, .. } => eprintln!("{role:>9}: <{kind}>"),
                        }
                    }
                }
            }
            Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
        },

        "/schedule" => {
            let parsed = arg
                .split_once(' ')
                .and_then(|(secs, text)| secs.parse::<u64>().ok().map(|s| (s, text.trim())));
            let Some((delay_secs, text)) = parsed else {
                eprintln!("Usage: /schedule <seconds> <description>");
                return false;
            };
            match state
                .scheduler
                .schedule(text, ScheduleSpec::Once { delay_secs })
            {
                Ok(task) => eprintln!("Scheduled {} in {delay_secs}s", task.id),
                Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
            }
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /approve <id>           Approve a pending tool call and resume");
            eprintln!("  /reject <id>            Reject a pending tool call and resume");
            eprintln!("  /pending                List calls awaiting confirmation");
            eprintln!("  /clear                  Empty the transcript");
            eprintln!("  /transcript             Print the stored transcript");
            eprintln!("  /schedule <secs> <text> Inject a scheduled task turn later");
            eprintln!("  /exit, /quit            Exit the chat");
            eprintln!("  /help                   Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Print a cycle's events. Ctrl+C cancels the cycle.
async fn print_stream(state: &AppState, mut events: OutputStream) {
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut interrupted = false;
    loop {
        let event = tokio::select! {
            ev = events.recv() => ev,
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                state.agent.cancel_active_stream();
                continue;
            }
        };
        let Some(event) = event else {
            break;
        };

        match event {
            OutputEvent::TextDelta { text } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            OutputEvent::ToolCallStarted { tool_name, .. } => {
                eprintln!("\x1B[2m[tool: {tool_name}]\x1B[0m");
            }
            OutputEvent::ConfirmationRequired {
                call_id,
                tool_name,
                input,
            } => {
                eprintln!("\x1B[33m{tool_name} wants to run with {input}\x1B[0m");
                eprintln!("  /approve {call_id}   or   /reject {call_id}");
            }
            OutputEvent::ToolCallResult {
                output, is_error, ..
            } => {
                if is_error {
                    eprintln!("\x1B[31m{output}\x1B[0m");
                } else {
                    println!("{output}");
                }
            }
            OutputEvent::Error { message } => {
                eprintln!("\x1B[31merror: {message}\x1B[0m");
            }
            OutputEvent::Step { .. } => {}
            OutputEvent::StreamEnd { reason } => {
                println!();
                if reason == EndReason::Cancelled {
                    eprintln!("(turn stopped)");
                }
            }
        }
    }
}
