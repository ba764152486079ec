//! Interactive REPL over one adapter's tools.
//!
//! Launch with `fte-mcp repl <adapter>`. Type `/help` for commands, Tab for
//! completion, or `<tool> <json>` to call a tool.

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
use serde_json::Value;
use tokio::runtime::Handle;

use fte_dispatch::{Dispatcher, Request};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/tools", "List the adapter's tools"),
    ("/schema", "Show a tool's input schema"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// Completes commands, tool names, and `/schema` arguments.
struct ToolHelper {
    tools: Vec<String>,
}

impl Completer for ToolHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let commands = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                });
            let tools = self
                .tools
                .iter()
                .filter(|name| name.starts_with(input))
                .map(|name| Pair {
                    display: name.clone(),
                    replacement: format!("{name} "),
                });
            return Ok((0, commands.chain(tools).collect()));
        }

        if let Some(arg) = input.strip_prefix("/schema ") {
            let start = input.len() - arg.len();
            let matches = self
                .tools
                .iter()
                .filter(|name| name.starts_with(arg.trim()))
                .map(|name| Pair {
                    display: name.clone(),
                    replacement: name.clone(),
                })
                .collect();
            return Ok((start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for ToolHelper {
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

impl Highlighter for ToolHelper {}
impl Validator for ToolHelper {}
impl Helper for ToolHelper {}

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

/// What one input line asks for.
#[derive(Debug, PartialEq)]
enum ReplInput {
    Empty,
    Command { name: String, args: String },
    Call(Request),
    Invalid(String),
}

fn parse_input(line: &str) -> ReplInput {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }

    if let Some(command) = line.strip_prefix('/') {
        let mut parts = command.splitn(2, ' ');
        let name = parts.next().unwrap_or("").to_string();
        let args = parts.next().unwrap_or("").trim().to_string();
        return ReplInput::Command { name, args };
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let tool = parts.next().unwrap_or("");
    let json = parts.next().unwrap_or("").trim();
    if json.is_empty() {
        return ReplInput::Call(Request::new(tool, Default::default()));
    }

    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(input)) => ReplInput::Call(Request::new(tool, input)),
        Ok(_) => ReplInput::Invalid("Tool input must be a JSON object".to_string()),
        Err(e) => ReplInput::Invalid(format!("Invalid JSON: {e}")),
    }
}

/// Run the interactive REPL. Blocks the calling thread; call from `spawn_blocking`.
pub fn run(adapter: &str, dispatcher: Dispatcher, runtime: Handle) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mfte-mcp v{}\x1b[0m \x1b[90m{adapter} adapter\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Type \x1b[36m<tool> <json>\x1b[0m to call a tool, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let tools: Vec<String> = dispatcher
        .registry()
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rl: Editor<ToolHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(ToolHelper { tools }));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".fte_mcp_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = format!(" \x1b[36m{adapter}>\x1b[0m ");

    loop {
        match rl.readline(&prompt) {
            Ok(line) => match parse_input(&line) {
                ReplInput::Empty => {}
                ReplInput::Command { name, args } => match name.as_str() {
                    "exit" | "quit" => {
                        eprintln!("  Goodbye!");
                        break;
                    }
                    "" | "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "tools" => cmd_tools(&dispatcher),
                    "schema" => cmd_schema(&dispatcher, &args),
                    _ => eprintln!("  Unknown command '/{name}'. Type /help for commands."),
                },
                ReplInput::Call(request) => {
                    let response = runtime.block_on(dispatcher.dispatch(request));
                    match serde_json::to_string_pretty(&response.to_value()) {
                        Ok(text) => println!("{text}"),
                        Err(e) => eprintln!("  Error: {e}"),
                    }
                }
                ReplInput::Invalid(message) => eprintln!("  {message}"),
            },
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  Goodbye!");
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
    eprintln!("  Call a tool:  post_tweet {{\"text\": \"hello\"}}");
    eprintln!();
}

fn cmd_tools(dispatcher: &Dispatcher) {
    let tools = dispatcher.registry().list();
    eprintln!();
    eprintln!("  {} tools available:", tools.len());
    eprintln!();
    for tool in tools {
        eprintln!("    {:<28} {}", tool.name, tool.description);
    }
    eprintln!();
}

fn cmd_schema(dispatcher: &Dispatcher, name: &str) {
    if name.is_empty() {
        eprintln!("  Usage: /schema <tool>");
        return;
    }
    match dispatcher.registry().resolve(name) {
        Ok(tool) => match serde_json::to_string_pretty(&tool.descriptor.input_schema) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("  Error: {e}"),
        },
        Err(e) => eprintln!("  {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_input("/schema post_tweet"),
            ReplInput::Command {
                name: "schema".into(),
                args: "post_tweet".into()
            }
        );
        assert_eq!(parse_input("   "), ReplInput::Empty);
    }

    #[test]
    fn test_parse_call_with_json() {
        let parsed = parse_input(r#"post_tweet {"text": "hi"}"#);
        let expected = Request::new("post_tweet", json!({"text": "hi"}).as_object().cloned().unwrap());
        assert_eq!(parsed, ReplInput::Call(expected));
    }

    #[test]
    fn test_parse_call_without_input() {
        assert_eq!(
            parse_input("get_metrics"),
            ReplInput::Call(Request::new("get_metrics", Default::default()))
        );
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(parse_input("post_tweet [1]"), ReplInput::Invalid(_)));
        assert!(matches!(parse_input("post_tweet {oops"), ReplInput::Invalid(_)));
    }
}
