//! Interactive chat loop

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use washdash_core::{ChatError, ChatPhase, ChatResult, GatewayError, ThreadController};

use crate::commands::{format_message, list_threads, send_and_print};

/// A line typed at the prompt
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    New,
    Threads,
    Open(String),
    Delete(String),
    Refresh,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ReplCommand::Send(line.to_string());
        };

        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match (name, arg) {
            ("new", None) => ReplCommand::New,
            ("threads" | "list", None) => ReplCommand::Threads,
            ("open", Some(id)) => ReplCommand::Open(id.to_string()),
            ("delete", Some(id)) => ReplCommand::Delete(id.to_string()),
            ("refresh", None) => ReplCommand::Refresh,
            ("help" | "?", None) => ReplCommand::Help,
            ("quit" | "exit", None) => ReplCommand::Quit,
            _ => ReplCommand::Unknown(line.to_string()),
        }
    }
}

pub async fn run(controller: &Arc<ThreadController>, thread: Option<&str>) -> Result<()> {
    match thread {
        Some(thread_id) => controller.select_thread(thread_id).await?,
        None => controller.open().await?,
    }
    print_conversation(controller);
    println!("Type a message, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = read_prompt(&mut lines, tokio::signal::ctrl_c()).await? else {
            println!();
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => print_help(),
            ReplCommand::New => {
                if report(controller.start_new_chat()) {
                    println!("[new conversation]");
                }
            }
            ReplCommand::Threads => {
                if let Err(e) = list_threads(controller).await {
                    eprintln!("error: {e}");
                }
            }
            ReplCommand::Open(thread_id) => {
                if report(controller.select_thread(&thread_id).await) {
                    print_conversation(controller);
                }
            }
            ReplCommand::Delete(thread_id) => {
                if report(controller.delete_thread(&thread_id).await) {
                    println!("[deleted {thread_id}]");
                    print_conversation(controller);
                }
            }
            ReplCommand::Refresh => {
                if report(controller.refresh_messages().await.map(|_| ())) {
                    print_conversation(controller);
                }
            }
            ReplCommand::Send(text) => {
                if let Err(e) = send_and_print(controller, &text).await {
                    eprintln!("error: {e}");
                    if let Some(unsent) = controller.snapshot().unsent_input {
                        eprintln!("(not sent, retype to retry: {unsent})");
                    } else if is_reply_timeout(&e) {
                        eprintln!("(the message was sent; the reply may still arrive, /refresh to check)");
                    }
                }
            }
            ReplCommand::Unknown(input) => {
                eprintln!("unknown command: {input} (try /help)");
            }
        }
    }
    Ok(())
}

/// Next line typed at the prompt, or `None` on end of input or interrupt
///
/// Ctrl-C has to be watched here explicitly: once a reply has been cancelled
/// with it, the process keeps its signal handler and no longer exits on it.
async fn read_prompt<R, I>(lines: &mut Lines<R>, interrupt: I) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

fn is_reply_timeout(error: &anyhow::Error) -> bool {
    matches!(
        error
            .downcast_ref::<ChatError>()
            .and_then(ChatError::gateway_error),
        Some(GatewayError::Timeout(_))
    )
}

/// Print an intent failure; true when the intent succeeded
fn report(result: ChatResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            eprintln!("error: {e}");
            false
        }
    }
}

fn print_conversation(controller: &ThreadController) {
    let snapshot = controller.snapshot();
    match &snapshot.phase {
        ChatPhase::Active { thread_id } => {
            let title = snapshot
                .threads
                .iter()
                .find(|t| t.id.as_deref() == Some(thread_id.as_str()))
                .map(|t| t.display_title())
                .unwrap_or(thread_id.as_str());
            println!("== {title} ==");
        }
        ChatPhase::Draft | ChatPhase::Idle => println!("== new conversation =="),
    }
    if snapshot.stale {
        println!("(history may be out of date, /refresh to reload)");
    }
    for message in &snapshot.messages {
        println!("{}", format_message(message));
    }
}

fn print_help() {
    println!("/new            start a new conversation");
    println!("/threads        list conversations");
    println!("/open <id>      switch to a conversation");
    println!("/delete <id>    delete a conversation");
    println!("/refresh        reload the current conversation");
    println!("/quit           leave");
    println!("Ctrl-C while a reply streams cancels it; at the prompt it leaves.");
}
