// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) for elo.
//!
//! Each input is compiled so that its top-level declarations become
//! globals, which keeps them visible to later inputs.

use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};
use elo_engine::lexer::{Scanner, Span, TokenKind};
use elo_engine::{Engine, Value};
use std::borrow::Cow;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::Config as EloConfig;

/// REPL configuration constants
const HISTORY_FILE: &str = "history";
const MAX_HISTORY_SIZE: usize = 1000;

const KEYWORDS: &[&str] = &[
    "break", "const", "continue", "else", "false", "finally", "for", "func", "if", "in", "nil",
    "not", "panic", "recover", "return", "this", "true", "try", "var",
];

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
}

impl ReplCommand {
    /// Parse a REPL command from input string
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let rest = input.trim().strip_prefix('.')?;

        let mut parts = rest.splitn(2, char::is_whitespace);
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match cmd.as_str() {
            "help" | "h" | "?" => Some((ReplCommand::Help, arg)),
            "exit" | "quit" | "q" => Some((ReplCommand::Exit, arg)),
            "clear" | "cls" => Some((ReplCommand::Clear, arg)),
            "version" | "v" => Some((ReplCommand::Version, arg)),
            "load" | "l" => Some((ReplCommand::Load, arg)),
            _ => None,
        }
    }

    /// Get all available commands for help/completion
    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
            (".version", "Show version information"),
            (".load <file>", "Load and execute an elo file"),
        ]
    }
}

/// Line editor helper: completion, hints, highlighting and multi-line
/// input.
struct EloHelper {
    /// Keywords, builtin names and commands, sorted
    words: Vec<String>,
}

impl EloHelper {
    fn new() -> Self {
        let builtins = elo_engine::builtins::BUILTINS.iter().map(|(name, _)| *name);
        let commands = ReplCommand::all_commands()
            .iter()
            .filter_map(|(usage, _)| usage.split_whitespace().next());
        let mut words: Vec<String> = KEYWORDS
            .iter()
            .copied()
            .chain(builtins)
            .chain(commands)
            .map(String::from)
            .collect();
        words.sort();

        Self { words }
    }

    /// Known words that extend `prefix`.
    fn candidates<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.words
            .iter()
            .map(String::as_str)
            .filter(move |word| word.len() > prefix.len() && word.starts_with(prefix))
    }
}

/// Byte offset where the word ending at `pos` starts.
fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
        .last()
        .map_or(pos, |(i, _)| i)
}

impl Completer for EloHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(line, pos);
        let prefix = &line[start..pos];
        if prefix.is_empty() {
            return Ok((start, Vec::new()));
        }
        let pairs = self
            .candidates(prefix)
            .map(|word| Pair {
                display: word.to_string(),
                replacement: word.to_string(),
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for EloHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        self.suffix_hint(line, pos)
    }
}

impl EloHelper {
    /// The dimmed rest of the first word completing the one at the end
    /// of `line`.
    fn suffix_hint(&self, line: &str, pos: usize) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        let prefix = &line[word_start(line, pos)..];
        if prefix.chars().count() < 2 {
            return None;
        }
        let word = self.candidates(prefix).next()?;
        Some(word[prefix.len()..].to_string().dimmed().to_string())
    }
}

impl Highlighter for EloHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('.') {
            return Cow::Owned(line.magenta().to_string());
        }

        let mut scanner = Scanner::new(line);
        let mut out = String::with_capacity(line.len() * 2);
        let mut copied = 0;

        loop {
            let token = scanner.next_token();
            if token.kind == TokenKind::Eof || token.span.start < copied {
                break;
            }
            let Span { start, end } = token.span;
            // whitespace and comments between tokens
            out.push_str(&line[copied..start]);
            out.push_str(&highlight_token(&token.kind, &line[start..end]));
            copied = end;
        }
        out.push_str(&line[copied..]);

        Cow::Owned(out)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_token(kind: &TokenKind, text: &str) -> String {
    use TokenKind::*;

    match kind {
        Nil | True | False => text.blue().to_string(),
        Var | Const | Func | If | Else | For | In | Break | Continue | Return | Not | Try
        | Recover | Finally | Panic => text.magenta().bold().to_string(),
        Number(_) => text.yellow().to_string(),
        String(_) => text.green().to_string(),
        Identifier(name) if is_builtin(name) => text.cyan().to_string(),
        Identifier(_) | Semicolon | Comma | Dot | Colon | Eof => text.to_string(),
        LeftBrace | RightBrace | LeftParen | RightParen | LeftBracket | RightBracket => {
            text.yellow().to_string()
        }
        Invalid(_) => text.red().to_string(),
        _ => text.cyan().to_string(),
    }
}

fn is_builtin(name: &str) -> bool {
    elo_engine::builtins::BUILTINS.iter().any(|(builtin, _)| *builtin == name)
}

impl Validator for EloHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        if is_open(input) || expects_more(input) {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

/// Whether the input ends in a binary operator or an open list.
fn expects_more(input: &str) -> bool {
    const CONTINUATIONS: &[&str] = &[
        "\\", "+", "-", "*", "/", "%", "=", "&&", "||", ",", "?", ":",
    ];

    let trimmed = input.trim_end();
    if trimmed.ends_with("++") || trimmed.ends_with("--") {
        return false;
    }
    CONTINUATIONS.iter().any(|suffix| trimmed.ends_with(suffix))
}

/// Whether the input stops inside a bracket, string or block comment.
///
/// Surplus closing brackets count as closed; the parser reports them.
fn is_open(input: &str) -> bool {
    let mut scanner = Scanner::new(input);
    let mut depth = 0i32;
    loop {
        match scanner.next_token().kind {
            TokenKind::LeftBrace | TokenKind::LeftParen | TokenKind::LeftBracket => depth += 1,
            TokenKind::RightBrace | TokenKind::RightParen | TokenKind::RightBracket => depth -= 1,
            TokenKind::Invalid(message) if message.ends_with("not terminated") => return true,
            TokenKind::Eof => return depth > 0,
            _ => {}
        }
    }
}

impl Helper for EloHelper {}

/// The interactive REPL
pub struct Repl {
    engine: Engine,
    editor: Editor<EloHelper, DefaultHistory>,
    history_path: Option<PathBuf>,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(settings: &EloConfig) -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(EloHelper::new()));

        let history_path = if settings.repl.history {
            history_path()
        } else {
            None
        };
        if let Some(path) = &history_path {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!("cannot create {}: {}", parent.display(), e);
                }
            }
            // a missing file just means a first session
            if editor.load_history(path).is_err() {
                debug!("no history at {}", path.display());
            }
        }

        Ok(Self {
            engine: Engine::with_config(settings.engine_config()),
            editor,
            history_path,
        })
    }

    /// Run the REPL main loop
    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            match self.editor.readline(&self.prompt()) {
                Ok(line) => {
                    let trimmed = line.trim();

                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    self.eval_and_print(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(path) = &self.history_path {
            if let Err(e) = self.editor.save_history(path) {
                warn!("cannot save history to {}: {}", path.display(), e);
            }
        }

        println!();
        Ok(())
    }

    fn print_banner(&self) {
        let version = env!("CARGO_PKG_VERSION");
        println!(
            "{} {} {}",
            "elo".bright_cyan().bold(),
            "v".dimmed(),
            version.bright_yellow()
        );
        println!(
            "{} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
    }

    fn prompt(&self) -> String {
        format!("{} ", "elo>".bright_green().bold())
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => {
                self.print_help();
                CommandResult::Continue
            }
            ReplCommand::Exit => CommandResult::Exit,
            ReplCommand::Clear => {
                print!("\x1B[2J\x1B[H");
                CommandResult::Continue
            }
            ReplCommand::Version => {
                println!("{} {}", "elo".bright_cyan().bold(), env!("CARGO_PKG_VERSION").yellow());
                CommandResult::Continue
            }
            ReplCommand::Load => {
                if let Some(path) = arg {
                    self.load_file(path);
                } else {
                    eprintln!(
                        "{}: {} {}",
                        "error".red().bold(),
                        ".load".cyan(),
                        "requires a file path".dimmed()
                    );
                }
                CommandResult::Continue
            }
        }
    }

    fn print_help(&self) {
        println!();
        println!("{}", "REPL Commands:".white().bold());
        println!();

        for (cmd, desc) in ReplCommand::all_commands() {
            println!("  {:16} {}", cmd.cyan(), desc.dimmed());
        }

        println!();
        println!("{}", "Keyboard Shortcuts:".white().bold());
        println!();
        println!("  {:16} {}", "Ctrl+C".yellow(), "Cancel current input".dimmed());
        println!("  {:16} {}", "Ctrl+D".yellow(), "Exit REPL".dimmed());
        println!("  {:16} {}", "Tab".yellow(), "Autocomplete".dimmed());
        println!();
        println!(
            "{}",
            "Input continues on the next line while brackets are open.".dimmed()
        );
        println!();
    }

    fn load_file(&mut self, path: &str) {
        match self.engine.eval_file(path) {
            Ok(value) => print_value(&value),
            Err(e) => print_error(&e),
        }
    }

    fn eval_and_print(&mut self, input: &str) {
        match self.engine.eval_repl(input) {
            Ok(value) => print_value(&value),
            Err(e) => print_error(&e),
        }
    }
}

/// Result of executing a REPL command
enum CommandResult {
    Continue,
    Exit,
}

fn history_path() -> Option<PathBuf> {
    Some(dirs::data_local_dir()?.join("elo").join(HISTORY_FILE))
}

fn print_value(value: &Value) {
    if !value.is_nil() {
        println!("{}", format_value(value));
    }
}

/// Format a value for display with syntax coloring
fn format_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".blue().dimmed().to_string(),
        Value::Bool(b) => b.to_string().yellow().to_string(),
        Value::Number(n) => n.to_string().yellow().to_string(),
        Value::String(s) => format!("{:?}", s).green().to_string(),
        Value::Function(_) | Value::Channel(_) => value.to_string().magenta().to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string().cyan().to_string(),
    }
}

/// Print a formatted error message
fn print_error(error: &elo_engine::Error) {
    eprintln!("{}: {}", "error".red().bold(), error);
}
