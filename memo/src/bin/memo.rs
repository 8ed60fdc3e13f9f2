// memo: CLI for the task stack daemon
//
// Commands:
//   memo                     Show the current task
//   memo stack               Interactive reorder (plain listing off a TTY)
//   memo push <description>  Start a new task, pausing the current one
//   memo pop                 Finish the current task and resume the next
//   memo switch              Swap the two top tasks
//   memo queue <description> Add a task to the bottom of the stack
//   memo log / memo history  Inspect the activity log

use anyhow::{anyhow, Result};
use chrono::Utc;
use crossterm::tty::IsTty;
use memo::client;
use memo::config::Config;
use memo::format::format_duration;
use memo::persistence::StopReason;
use memo::picker;
use memo::protocol::{ErrorCode, Request, Response};
use memo::stack::Task;
use std::env;
use std::io;

fn print_help() {
    println!(
        r#"memo - task stack manager

USAGE:
    memo                     Show the current task
    memo stack               Interactively move a task to the top
    memo push <description>  Push a new task onto the stack
    memo pop                 Pop the current task off the stack
    memo switch              Swap the top two tasks
    memo queue <description> Add a task to the bottom of the stack
    memo log                 Show the full activity log
    memo history             Show completed tasks with durations
    memo version             Show client and daemon versions
    memo help                Show this help message"#
    );
}

/// Resolve paths and make sure a daemon of this build is listening
fn ready_config() -> Result<Config> {
    let config = Config::from_env();
    client::ensure_compatible_daemon(&config)?;
    Ok(config)
}

fn unexpected(response: Response) -> anyhow::Error {
    match response {
        Response::Error { message, .. } => anyhow!("daemon error: {}", message),
        other => anyhow!("unexpected daemon response: {:?}", other),
    }
}

fn fetch_tasks(config: &Config) -> Result<Vec<Task>> {
    match client::send_request(config, &Request::List)? {
        Response::Stack { tasks } => Ok(tasks),
        other => Err(unexpected(other)),
    }
}

fn print_stack(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks. Use \"memo push <description>\" to start one.");
        return;
    }
    for (i, task) in tasks.iter().enumerate() {
        if i == 0 {
            println!(
                "\u{2192} {} (working for {})",
                task.description,
                format_duration(Utc::now() - task.started_at)
            );
        } else {
            println!("  {} (paused)", task.description);
        }
    }
}

fn cmd_current() -> Result<()> {
    let config = ready_config()?;
    let tasks = fetch_tasks(&config)?;

    match tasks.first() {
        None => println!("No tasks. Use \"memo push <description>\" to start one."),
        Some(task) => {
            println!(
                "\u{2192} {} (working for {})",
                task.description,
                format_duration(Utc::now() - task.started_at)
            );
            if tasks.len() > 1 {
                println!("  ({} paused)", tasks.len() - 1);
            }
        }
    }
    Ok(())
}

fn cmd_stack() -> Result<()> {
    let config = ready_config()?;
    let tasks = fetch_tasks(&config)?;

    if tasks.len() < 2 || !io::stdout().is_tty() {
        print_stack(&tasks);
        return Ok(());
    }

    let Some(selected) = picker::pick_task(&tasks)? else {
        return Ok(());
    };
    if selected == 0 {
        return Ok(());
    }

    let order = picker::move_to_front_order(tasks.len(), selected);
    match client::send_request(&config, &Request::Reorder { order })? {
        Response::Reordered { .. } => {
            println!("Paused: {}", tasks[0].description);
            println!("Resuming: {}", tasks[selected].description);
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn cmd_push(description: String) -> Result<()> {
    let config = ready_config()?;
    match client::send_request(&config, &Request::Push { description })? {
        Response::Pushed { started, paused } => {
            if let Some(paused) = paused {
                println!("Paused: {}", paused.description);
            }
            println!("Started: {}", started.description);
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn cmd_pop() -> Result<()> {
    let config = ready_config()?;
    match client::send_request(&config, &Request::Pop)? {
        Response::Popped { popped, resuming } => {
            println!(
                "Done: {} ({})",
                popped.description,
                format_duration(Utc::now() - popped.started_at)
            );
            match resuming {
                Some(task) => println!("Resuming: {}", task.description),
                None => println!("No more tasks."),
            }
            Ok(())
        }
        Response::Error {
            code: ErrorCode::EmptyStack,
            ..
        } => {
            println!("No tasks to pop.");
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn cmd_switch() -> Result<()> {
    let config = ready_config()?;
    match client::send_request(&config, &Request::Switch)? {
        Response::Switched { started, paused } => {
            println!("Paused: {}", paused.description);
            println!("Started: {}", started.description);
            Ok(())
        }
        Response::Error {
            code: ErrorCode::NotEnoughTasks,
            ..
        } => {
            println!("Need at least two tasks to switch.");
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn cmd_queue(description: String) -> Result<()> {
    let config = ready_config()?;
    match client::send_request(&config, &Request::Queue { description })? {
        Response::Queued { queued, current } => {
            println!("Queued: {}", queued.description);
            if let Some(current) = current {
                if current.id != queued.id {
                    println!("Still working on: {}", current.description);
                }
            }
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn cmd_log() -> Result<()> {
    let config = ready_config()?;
    match client::send_request(&config, &Request::Log)? {
        Response::Log { entries } => {
            if entries.is_empty() {
                println!("No activity yet.");
                return Ok(());
            }
            for entry in entries {
                println!(
                    "{}  {:<9} {} ({})",
                    entry.stopped.format("%Y-%m-%d %H:%M"),
                    entry.reason,
                    entry.task,
                    format_duration(entry.stopped - entry.started)
                );
            }
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn cmd_history() -> Result<()> {
    let config = ready_config()?;
    match client::send_request(&config, &Request::Log)? {
        Response::Log { entries } => {
            let completed: Vec<_> = entries
                .into_iter()
                .filter(|e| e.reason == StopReason::Popped)
                .collect();
            if completed.is_empty() {
                println!("No completed tasks yet.");
                return Ok(());
            }
            for entry in completed {
                println!(
                    "{}  {} ({})",
                    entry.stopped.format("%Y-%m-%d %H:%M"),
                    entry.task,
                    format_duration(entry.stopped - entry.started)
                );
            }
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn cmd_version() -> Result<()> {
    println!("memo {}", memo::version());
    let config = ready_config()?;
    match client::send_request(&config, &Request::Version)? {
        Response::Version { version } => {
            println!("daemon {}", version);
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

fn description_from(args: &[String], usage: &str) -> String {
    let description = args.join(" ");
    if description.trim().is_empty() {
        eprintln!("Usage: {}", usage);
        std::process::exit(1);
    }
    description
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None => cmd_current(),
        Some("stack") => cmd_stack(),
        Some("push") => cmd_push(description_from(&args[2..], "memo push <description>")),
        Some("pop") => cmd_pop(),
        Some("switch") => cmd_switch(),
        Some("queue") => cmd_queue(description_from(&args[2..], "memo queue <description>")),
        Some("log") => cmd_log(),
        Some("history") => cmd_history(),
        Some("version") => cmd_version(),
        Some("help" | "--help" | "-h") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}\n", other);
            print_help();
            std::process::exit(1);
        }
    }
}
