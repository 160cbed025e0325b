//! Headless host: prints the current page and reads navigation commands from
//! stdin. Used when the crate is built without the `desktop` feature.

use std::{env, path::PathBuf, sync::Arc};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    activation::ActivationError,
    app_runtime::{self, AppRuntime, StartupError},
    app_types::NavigationRequest,
    append_desktop_log,
    launch_context::LaunchContext,
    navigation::Frame,
    page_registry::{page_key_from_name, PageKey, PageViewModel},
    ui_dispatch::{self, ErrorPresenter},
};

pub struct ConsoleFrame;

impl Frame for ConsoleFrame {
    fn present(&mut self, page: PageKey, _view_model: Arc<dyn PageViewModel>) {
        append_desktop_log(&format!("presenting page {}", page.name()));
        println!("== {} ==", page.name());
    }
}

pub struct ConsoleErrorPresenter;

impl ErrorPresenter for ConsoleErrorPresenter {
    fn present_error(&self, title: &str, message: &str) {
        eprintln!("{title}\n{message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Go { page: String, clear_history: bool },
    Back,
    Where,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let words = shlex::split(line).ok_or_else(|| "unbalanced quotes".to_string())?;
    let Some((verb, rest)) = words.split_first() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "go" | "open" => {
            let mut page = None;
            let mut clear_history = false;
            for word in rest {
                if word == "--clear" {
                    clear_history = true;
                } else if page.is_none() {
                    page = Some(word.clone());
                } else {
                    return Err(format!("unexpected argument '{word}'"));
                }
            }
            let page = page.ok_or_else(|| "usage: go <page> [--clear]".to_string())?;
            ConsoleCommand::Go {
                page,
                clear_history,
            }
        }
        "back" => ConsoleCommand::Back,
        "where" | "status" => ConsoleCommand::Where,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(command))
}

fn print_help() {
    let pages: Vec<&str> = PageKey::ALL.iter().map(|page| page.name()).collect();
    println!("commands: go <page> [--clear], back, where, help, quit");
    println!("pages: {}", pages.join(", "));
}

/// Executes one command. Returns `false` when the loop should stop.
fn execute(runtime: &mut AppRuntime, command: ConsoleCommand) -> bool {
    let request = match command {
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => {
            print_help();
            return true;
        }
        ConsoleCommand::Where => {
            let navigation = runtime.navigation();
            match navigation.current_page() {
                Some(page) => println!(
                    "on {} (back stack: {})",
                    page.name(),
                    navigation.back_stack_len()
                ),
                None => println!("no page shown yet"),
            }
            return true;
        }
        ConsoleCommand::Back => NavigationRequest::GoBack,
        ConsoleCommand::Go {
            page,
            clear_history,
        } => match page_key_from_name(&page) {
            Some(page) => NavigationRequest::Navigate {
                page,
                parameter: None,
                clear_history,
            },
            None => {
                eprintln!("unknown page '{page}'");
                return true;
            }
        },
    };

    match runtime.request_navigation(request) {
        Ok(Some(false)) => println!("nothing to do"),
        Ok(_) => {}
        Err(error) => eprintln!("{error}"),
    }
    true
}

pub async fn run(app_root_dir: Option<PathBuf>) -> Result<(), StartupError> {
    let presenter = ConsoleErrorPresenter;
    let mut runtime = app_runtime::start_from_environment(app_root_dir, Box::new(ConsoleFrame)).await?;

    let context = LaunchContext::from_process_args(env::args());
    match runtime.activate(&context).await {
        Ok(()) => {}
        Err(ActivationError::Service(error)) => return Err(StartupError::Registry(error)),
        Err(error) => ui_dispatch::report_error("activation", &presenter, &error),
    }

    let shutdown = runtime.shutdown_token();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                ui_dispatch::report_error("console input", &presenter, &error);
                break;
            }
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        let keep_going =
            ui_dispatch::run_guarded("console command", &presenter, || execute(&mut runtime, command))
                .unwrap_or(true);
        if !keep_going {
            break;
        }
    }

    runtime.shutdown();
    Ok(())
}
