/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/repl.rs
 * Responsibility: Operator prompt, slash commands, and the chat transcript.
 */

use crate::agent_loop::{Conversation, SessionState, run_turn};
use crate::dispatch::Dispatcher;
use crate::llm::ResponsesClient;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

pub const PROMPT_PREFIX: &str = "❯ ";

pub const HELP_MESSAGE: &str = "Available commands:
  /exit : leave the chat
  /file <path> : load prompt from a file
  /help : print this help message
  /use_functions [0,1] : turn the ability to use functions on (1) or off (0)
  /unsafe [0,1] : allow (1) or forbid (0) shell, script and run functions for this session
  /verbose [0,1] : turn verbose mode on (1) or off (0)
  /wd <directory> : change the working directory
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Help,
    File(PathBuf),
    UseFunctions(bool),
    Unsafe(bool),
    Verbose(bool),
    WorkingDirectory(PathBuf),
    Query(String),
    Empty,
}

fn parse_flag(value: Option<&str>) -> Result<bool, String> {
    let value = value.ok_or_else(|| "expected 0 or 1".to_string())?;
    value
        .parse::<i64>()
        .map(|n| n != 0)
        .map_err(|e| format!("{:?}: {}", value, e))
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, String> {
    value.ok_or_else(|| format!("expected {}", what))
}

/// Parses one input line. `Err` carries the reason shown to the operator.
pub fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    if !line.starts_with('/') {
        return Ok(ReplCommand::Query(line.to_string()));
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let arg = parts.next();

    match command {
        "/exit" => Ok(ReplCommand::Exit),
        "/help" => Ok(ReplCommand::Help),
        "/file" => Ok(ReplCommand::File(PathBuf::from(required(arg, "a file path")?))),
        "/use_functions" => Ok(ReplCommand::UseFunctions(parse_flag(arg)?)),
        "/unsafe" => Ok(ReplCommand::Unsafe(parse_flag(arg)?)),
        "/verbose" => Ok(ReplCommand::Verbose(parse_flag(arg)?)),
        "/wd" => Ok(ReplCommand::WorkingDirectory(PathBuf::from(required(arg, "a directory")?))),
        other => Err(format!("unknown command {} (try /help)", other)),
    }
}

/// Plain-text record of the session.
pub struct Transcript {
    file: File,
}

impl Transcript {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open chat history {:?}", path))?;
        Ok(Self { file })
    }

    pub fn query(&mut self, query: &str) -> Result<()> {
        writeln!(self.file, "{}{}", PROMPT_PREFIX, query)?;
        Ok(())
    }

    pub fn answer(&mut self, answer: &str) -> Result<()> {
        write!(self.file, "\n{}\n\n", answer)?;
        Ok(())
    }
}

pub struct Repl {
    client: ResponsesClient,
    dispatcher: Dispatcher,
    conversation: Conversation,
    session: SessionState,
    transcript: Transcript,
    interactive: bool,
}

impl Repl {
    pub fn new(
        client: ResponsesClient,
        dispatcher: Dispatcher,
        conversation: Conversation,
        session: SessionState,
        transcript: Transcript,
    ) -> Self {
        Self {
            client,
            dispatcher,
            conversation,
            session,
            transcript,
            interactive: atty::is(atty::Stream::Stdin),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Applies an operator command. Returns `Some(query)` when the model should run.
    pub fn apply(&mut self, command: ReplCommand) -> Option<String> {
        match command {
            ReplCommand::Exit | ReplCommand::Empty => None,
            ReplCommand::Help => {
                println!("{}", HELP_MESSAGE);
                None
            }
            ReplCommand::File(path) => match fs::read_to_string(&path) {
                Ok(query) => Some(query),
                Err(e) => {
                    println!("→ Could not parse the query: {}", e);
                    None
                }
            },
            ReplCommand::UseFunctions(on) => {
                self.session.use_functions = on;
                println!("→ Ability to use functions {}", on);
                None
            }
            ReplCommand::Unsafe(on) => {
                self.session.allow_unsafe = on;
                tracing::info!(allow_unsafe = on, "operator changed unsafe permission");
                println!("→ Unsafe functions allowed {}", on);
                None
            }
            ReplCommand::Verbose(on) => {
                self.session.verbose = on;
                println!("→ Verbose mode {}", on);
                None
            }
            ReplCommand::WorkingDirectory(dir) => {
                if dir.is_dir() {
                    println!("→ New working directory: {}", dir.display());
                    self.session.working_directory = dir;
                } else {
                    println!("→ Could not parse the input: {:?} is not a directory", dir);
                }
                None
            }
            ReplCommand::Query(query) => Some(query),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        loop {
            if self.interactive {
                print!("{}", PROMPT_PREFIX);
                std::io::stdout().flush()?;
            }

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                return Ok(());
            }

            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(reason) => {
                    println!("→ Could not parse the input: {}", reason);
                    continue;
                }
            };
            if command == ReplCommand::Exit {
                return Ok(());
            }
            let Some(query) = self.apply(command) else {
                continue;
            };

            self.transcript.query(&query)?;
            match run_turn(
                &self.client,
                &mut self.dispatcher,
                &mut self.conversation,
                &self.session,
                &query,
            )
            .await
            {
                Ok(answer) => {
                    self.transcript.answer(&answer)?;
                    println!("\n{}\n", answer);
                }
                Err(e) => {
                    tracing::error!("model request failed: {:#}", e);
                    println!("ERROR: {:#}", e);
                }
            }
        }
    }
}
