//! Interactive console for building, registering, and checking the server.
//!
//! Launch with `context7-docker-mcp repl`. Type `/help` for available
//! commands, Tab for completion.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use tokio::runtime::Handle;

use context7_docker::config::SUPPORTED_PLATFORMS;
use context7_docker::RemovalOutcome;

use crate::output;
use crate::probe;
use crate::toolkit::Toolkit;
use crate::verify::Suite;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/build", "Build the image [platform]"),
    ("/register", "Register with the host assistant [name]"),
    ("/deregister", "Remove the registration [name]"),
    ("/status", "Show registration status [name]"),
    ("/tools", "List tools advertised by the server"),
    ("/verify", "Run a verification suite [suite]"),
    ("/spawn", "Show the spawn command"),
    ("/info", "Show the resolved configuration"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

const HISTORY_FILE: &str = ".context7_docker_history";

/// Completion candidates for the argument of `cmd`.
fn argument_candidates(cmd: &str) -> &'static [&'static str] {
    match cmd {
        "/verify" => Suite::NAMES,
        "/build" => SUPPORTED_PLATFORMS,
        _ => &[],
    }
}

struct ConsoleHelper;

impl Completer for ConsoleHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        let prefix_start = input.len() - args.len();
        let matches: Vec<Pair> = argument_candidates(cmd)
            .iter()
            .filter(|c| c.starts_with(args.trim()))
            .map(|c| Pair {
                display: c.to_string(),
                replacement: format!("{c} "),
            })
            .collect();
        Ok((prefix_start, matches))
    }
}

impl Hinter for ConsoleHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for ConsoleHelper {}
impl Validator for ConsoleHelper {}
impl Helper for ConsoleHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL.
///
/// Line editing blocks the calling thread; each command is driven to
/// completion on `runtime` before the next prompt.
pub fn run(toolkit: &Toolkit, runtime: &Handle) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mcontext7-docker-mcp v{}\x1b[0m \x1b[90m{}\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        toolkit.config().image
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<ConsoleHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(ConsoleHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(HISTORY_FILE);
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mcontext7>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let arg = args.split_whitespace().next();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "build" => runtime.block_on(cmd_build(toolkit, arg)),
                    "register" => runtime.block_on(cmd_register(toolkit, arg)),
                    "deregister" => runtime.block_on(cmd_deregister(toolkit, arg)),
                    "status" => runtime.block_on(cmd_status(toolkit, arg)),
                    "tools" => runtime.block_on(cmd_tools(toolkit)),
                    "verify" => runtime.block_on(cmd_verify(toolkit, arg)),
                    "spawn" => eprintln!("  {}", toolkit.spawn_command()),
                    "info" => cmd_info(toolkit),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completes commands, suite names, and platforms.");
    eprintln!();
}

async fn cmd_build(toolkit: &Toolkit, platform: Option<&str>) {
    let platforms: Vec<String> = platform.map(str::to_string).into_iter().collect();
    match toolkit.build(&platforms, false, None).await {
        Ok(summary) => {
            let size = summary
                .facts
                .map(|f| format!(" ({:.1} MB, {})", f.size_bytes as f64 / 1_000_000.0, f.architecture))
                .unwrap_or_default();
            output::success(&format!("Built {}{size}", summary.image));
        }
        Err(e) => output::failure(&format!("Build failed: {e}")),
    }
}

async fn cmd_register(toolkit: &Toolkit, name: Option<&str>) {
    match toolkit.register(name).await {
        Ok(registration) => output::success(&format!(
            "Registered '{}' ({} scope{})",
            registration.name,
            registration.scope,
            if registration.replaced { ", replaced" } else { "" }
        )),
        Err(e) => output::failure(&format!("Registration failed: {e}")),
    }
}

async fn cmd_deregister(toolkit: &Toolkit, name: Option<&str>) {
    let name = name.unwrap_or(toolkit.config().registration_name.as_str());
    match toolkit.deregister(Some(name)).await {
        Ok(RemovalOutcome::Removed) => output::success(&format!("Removed '{name}'")),
        Ok(RemovalOutcome::NotPresent) => output::note(&format!("'{name}' was not registered")),
        Err(e) => output::failure(&format!("Deregistration failed: {e}")),
    }
}

async fn cmd_status(toolkit: &Toolkit, name: Option<&str>) {
    match toolkit.status(name).await {
        Ok(status) => eprintln!("{}", output::status_line(&status)),
        Err(e) => output::failure(&format!("Cannot read registrations: {e}")),
    }
}

async fn cmd_tools(toolkit: &Toolkit) {
    match toolkit.tools().await {
        Ok(tools) => {
            output::print_tools(&tools);
            let missing = probe::missing_required_tools(&tools);
            if !missing.is_empty() {
                output::failure(&format!("missing required tools: {}", missing.join(", ")));
            }
        }
        Err(e) => output::failure(&format!("tools/list failed: {e}")),
    }
}

async fn cmd_verify(toolkit: &Toolkit, suite: Option<&str>) {
    let suite = match suite.map(str::parse::<Suite>).transpose() {
        Ok(suite) => suite.unwrap_or(Suite::All),
        Err(e) => {
            output::failure(&e);
            return;
        }
    };
    let report = toolkit.verify(suite).await;
    output::print_report(&report);
}

fn cmd_info(toolkit: &Toolkit) {
    let config = toolkit.config();
    eprintln!();
    eprintln!("  Image:      {}", config.image);
    eprintln!("  Container:  {}", config.container_name);
    eprintln!("  Limits:     --memory {} --cpus {}", config.limits.memory, config.limits.cpus);
    eprintln!("  Scope:      {}", config.scope);
    eprintln!("  Name:       {}", config.registration_name);
    eprintln!(
        "  Secret:     {} ({})",
        config.secret.host_path.display(),
        if config.secret.is_present() { "mounted" } else { "absent" }
    );
    eprintln!();
}
