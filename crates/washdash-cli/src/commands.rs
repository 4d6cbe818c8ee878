//! One-shot subcommands and the streaming reply printer they share with the REPL

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::debug;
use washdash_core::{Message, SendOutcome, Thread, ThreadController};

pub async fn list_threads(controller: &ThreadController) -> Result<()> {
    let threads = controller.refresh_threads().await?;
    if threads.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }
    for thread in &threads {
        println!("{}", format_thread_line(thread));
    }
    Ok(())
}

pub async fn ask(controller: &Arc<ThreadController>, message: &str, thread: Option<&str>) -> Result<()> {
    match thread {
        Some(thread_id) => controller.select_thread(thread_id).await?,
        None => controller.start_new_chat()?,
    }
    send_and_print(controller, message).await
}

pub async fn delete(controller: &ThreadController, thread_id: &str) -> Result<()> {
    controller.delete_thread(thread_id).await?;
    println!("Deleted {}", thread_id);
    Ok(())
}

/// Send `content` and echo the reply as it grows
///
/// Ctrl-C while the reply is streaming cancels it instead of exiting.
pub async fn send_and_print(controller: &Arc<ThreadController>, content: &str) -> Result<()> {
    let printed = Arc::new(AtomicUsize::new(0));
    let printer = spawn_printer(controller, Arc::clone(&printed));
    let canceller = spawn_canceller(Arc::clone(controller));

    let result = controller.send_message(content).await;

    canceller.abort();
    printer.abort();
    let _ = canceller.await;
    let _ = printer.await;

    match result {
        Ok(SendOutcome::Completed { thread_id, reply }) => {
            let already = printed.load(Ordering::SeqCst);
            print!("{}", unprinted_tail(&reply, already));
            println!();
            debug!(thread_id = %thread_id, chars = reply.chars().count(), "Reply printed");
            Ok(())
        }
        Ok(SendOutcome::Cancelled { .. }) => {
            println!();
            println!("[reply cancelled]");
            Ok(())
        }
        Err(e) => {
            if printed.load(Ordering::SeqCst) > 0 {
                println!();
            }
            Err(e.into())
        }
    }
}

fn spawn_printer(controller: &ThreadController, printed: Arc<AtomicUsize>) -> JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let Some(text) = rx.borrow_and_update().streaming_text.clone() else {
                continue;
            };
            let done = printed.load(Ordering::SeqCst);
            let tail = unprinted_tail(&text, done);
            if !tail.is_empty() {
                print!("{}", tail);
                let _ = std::io::stdout().flush();
                printed.store(text.len(), Ordering::SeqCst);
            }
        }
    })
}

fn spawn_canceller(controller: Arc<ThreadController>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && controller.cancel_stream() {
            debug!("Reply cancelled from keyboard");
        }
    })
}

/// Part of `text` past the first `printed` bytes
fn unprinted_tail(text: &str, printed: usize) -> &str {
    text.get(printed..).unwrap_or_default()
}

pub fn format_thread_line(thread: &Thread) -> String {
    format!(
        "{:<24} {}  {}",
        thread.id.as_deref().unwrap_or("-"),
        thread.updated_at.format("%Y-%m-%d %H:%M"),
        thread.display_title()
    )
}

pub fn format_message(message: &Message) -> String {
    format!("{}: {}", message.role.as_str(), message.content)
}
