/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/actions/mod.rs
 * Responsibility: Action catalogue, typed arguments, and the action error taxonomy.
 */

mod cargo;
mod files;
mod process;

use crate::config::ToolchainConfig;
use crate::guard::Workspace;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong inside an action.
///
/// The dispatcher renders these as `ERROR: <message>`; nothing here ever
/// reaches the conversation driver as a Rust error.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Cannot {verb} \"{path}\" as it is outside the permitted working directory {root}")]
    OutsideWorkingDirectory {
        verb: &'static str,
        path: String,
        root: String,
    },

    #[error("\"{0}\" is not a directory")]
    NotADirectory(String),

    #[error("File not found or is not a regular file: \"{0}\"")]
    NotAFile(String),

    #[error("\"{0}\" does not exist")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("see {log} for details")]
    ProcessFailed { log: String },

    #[error("Shell command execution failed: timed out after {secs}s; see {log} for partial output")]
    TimedOut { secs: u64, log: String },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ActionError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| ActionError::Io { context, source }
    }
}

pub type ActionResult = Result<String, ActionError>;

/// What an action gets to work with besides its own arguments.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub workspace: Workspace,
    pub toolchain: ToolchainConfig,
}

impl ActionContext {
    pub fn new(working_directory: impl Into<PathBuf>, toolchain: ToolchainConfig) -> Self {
        Self {
            workspace: Workspace::new(working_directory),
            toolchain,
        }
    }
}

/// Blast-radius class of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    Safe,
    Unsafe,
}

/// Handle for one registered action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    GetFilesInfo,
    GetFileContent,
    CreateDir,
    WriteFile,
    MoveFile,
    CompileCc,
    CompileCxx,
    NewRustProject,
    BuildRustProject,
    RunClippy,
    RunShCommand,
    RunPythonFile,
    RunRustProject,
}

impl ActionKind {
    pub const ALL: [ActionKind; 13] = [
        ActionKind::GetFilesInfo,
        ActionKind::GetFileContent,
        ActionKind::CreateDir,
        ActionKind::WriteFile,
        ActionKind::MoveFile,
        ActionKind::CompileCc,
        ActionKind::CompileCxx,
        ActionKind::NewRustProject,
        ActionKind::BuildRustProject,
        ActionKind::RunClippy,
        ActionKind::RunShCommand,
        ActionKind::RunPythonFile,
        ActionKind::RunRustProject,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::GetFilesInfo => "get_files_info",
            ActionKind::GetFileContent => "get_file_content",
            ActionKind::CreateDir => "create_dir",
            ActionKind::WriteFile => "write_file",
            ActionKind::MoveFile => "move_file",
            ActionKind::CompileCc => "compile_cc",
            ActionKind::CompileCxx => "compile_cxx",
            ActionKind::NewRustProject => "new_rust_project",
            ActionKind::BuildRustProject => "build_rust_project",
            ActionKind::RunClippy => "run_clippy",
            ActionKind::RunShCommand => "run_sh_command",
            ActionKind::RunPythonFile => "run_python_file",
            ActionKind::RunRustProject => "run_rust_project",
        }
    }

    pub fn safety(self) -> Safety {
        match self {
            ActionKind::RunShCommand | ActionKind::RunPythonFile | ActionKind::RunRustProject => {
                Safety::Unsafe
            }
            _ => Safety::Safe,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ActionKind::GetFilesInfo => {
                "Lists files in the specified directory along with their sizes, constrained to the working directory."
            }
            ActionKind::GetFileContent => {
                "Read the content of the specified file, constrained to the working directory."
            }
            ActionKind::CreateDir => "Create a new directory within the working directory.",
            ActionKind::WriteFile => {
                "Write content to a file within the working directory. Overwrites existing content and creates parent directories."
            }
            ActionKind::MoveFile => "Move or rename a file within the working directory.",
            ActionKind::CompileCc => {
                "Run the C compiler with the given arguments in a directory. Output goes to log.txt in that directory."
            }
            ActionKind::CompileCxx => {
                "Run the C++ compiler with the given arguments in a directory. Output goes to log.txt in that directory."
            }
            ActionKind::NewRustProject => {
                "Create a new Rust project with cargo. The cargo log goes to log.txt in dir_path."
            }
            ActionKind::BuildRustProject => {
                "Build an existing Rust project with cargo. The build log goes to log.txt in dir_path."
            }
            ActionKind::RunClippy => {
                "Run cargo clippy on an existing Rust project. The lint log goes to log.txt in dir_path."
            }
            ActionKind::RunShCommand => {
                "Run a shell command in a directory of the working directory, with a timeout. Output goes to log.txt in that directory."
            }
            ActionKind::RunPythonFile => {
                "Run a Python script located in the working directory. Output goes to log.txt in dir_path."
            }
            ActionKind::RunRustProject => {
                "Run an existing Rust project with cargo run. Output goes to log.txt in dir_path."
            }
        }
    }

    /// JSON schema for the action's parameters. Field names here are the
    /// same ones the typed argument structs deserialize.
    pub fn parameters(self) -> Value {
        const DIR_PATH: &str = "Directory to operate in, relative to the working directory. Defaults to '.'";
        const ARGS: &str = "Space-separated command-line arguments";
        const NAME: &str = "Name of the Rust project (its directory inside dir_path)";

        match self {
            ActionKind::GetFilesInfo => json!({
                "type": "object",
                "properties": {
                    "directory": { "type": "string", "description": "The directory to list files from, relative to the working directory. If not provided, lists files in the working directory itself." }
                },
                "required": ["directory"]
            }),
            ActionKind::GetFileContent => json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Path to the file whose content should be read, relative to the working directory." }
                },
                "required": ["file_path"]
            }),
            ActionKind::CreateDir => json!({
                "type": "object",
                "properties": {
                    "dir_path": { "type": "string", "description": "Path to the new directory, relative to the working directory." }
                },
                "required": ["dir_path"]
            }),
            ActionKind::WriteFile => json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Path to the file to write, relative to the working directory." },
                    "content": { "type": "string", "description": "The content to write" }
                },
                "required": ["file_path", "content"]
            }),
            ActionKind::MoveFile => json!({
                "type": "object",
                "properties": {
                    "source_path": { "type": "string", "description": "File to move, relative to the working directory." },
                    "dest_path": { "type": "string", "description": "Destination path, relative to the working directory." }
                },
                "required": ["source_path", "dest_path"]
            }),
            ActionKind::CompileCc | ActionKind::CompileCxx => json!({
                "type": "object",
                "properties": {
                    "args": { "type": "string", "description": ARGS },
                    "dir_path": { "type": "string", "description": DIR_PATH }
                },
                "required": ["args"]
            }),
            ActionKind::NewRustProject
            | ActionKind::BuildRustProject
            | ActionKind::RunClippy
            | ActionKind::RunRustProject => json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": NAME },
                    "dir_path": { "type": "string", "description": DIR_PATH },
                    "args": { "type": "string", "description": ARGS }
                },
                "required": ["name"]
            }),
            ActionKind::RunShCommand => json!({
                "type": "object",
                "properties": {
                    "cmd": { "type": "string", "description": "Shell command to execute" },
                    "dir_path": { "type": "string", "description": DIR_PATH }
                },
                "required": ["cmd"]
            }),
            ActionKind::RunPythonFile => json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Python file to run, relative to dir_path" },
                    "dir_path": { "type": "string", "description": DIR_PATH },
                    "args": { "type": "string", "description": ARGS }
                },
                "required": ["file_path"]
            }),
        }
    }

    /// Tool declaration in the OpenAI Responses `function` format.
    pub fn definition(self) -> Value {
        json!({
            "type": "function",
            "name": self.name(),
            "description": self.description(),
            "parameters": self.parameters(),
        })
    }

    /// Checks an argument mapping against this action's typed arguments.
    pub fn parse(self, args: Value) -> Result<ActionCall, serde_json::Error> {
        Ok(match self {
            ActionKind::GetFilesInfo => ActionCall::GetFilesInfo(from_args(args)?),
            ActionKind::GetFileContent => ActionCall::GetFileContent(from_args(args)?),
            ActionKind::CreateDir => ActionCall::CreateDir(from_args(args)?),
            ActionKind::WriteFile => ActionCall::WriteFile(from_args(args)?),
            ActionKind::MoveFile => ActionCall::MoveFile(from_args(args)?),
            ActionKind::CompileCc => ActionCall::CompileCc(from_args(args)?),
            ActionKind::CompileCxx => ActionCall::CompileCxx(from_args(args)?),
            ActionKind::NewRustProject => ActionCall::NewRustProject(from_args(args)?),
            ActionKind::BuildRustProject => ActionCall::BuildRustProject(from_args(args)?),
            ActionKind::RunClippy => ActionCall::RunClippy(from_args(args)?),
            ActionKind::RunShCommand => ActionCall::RunShCommand(from_args(args)?),
            ActionKind::RunPythonFile => ActionCall::RunPythonFile(from_args(args)?),
            ActionKind::RunRustProject => ActionCall::RunRustProject(from_args(args)?),
        })
    }
}

fn from_args<T: DeserializeOwned>(args: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(args)
}

fn default_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryArgs {
    #[serde(default = "default_dir")]
    pub directory: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadFileArgs {
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDirArgs {
    pub dir_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteFileArgs {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveFileArgs {
    pub source_path: String,
    pub dest_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileArgs {
    pub args: String,
    #[serde(default = "default_dir")]
    pub dir_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectArgs {
    pub name: String,
    #[serde(default = "default_dir")]
    pub dir_path: String,
    #[serde(default)]
    pub args: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellArgs {
    pub cmd: String,
    #[serde(default = "default_dir")]
    pub dir_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptArgs {
    pub file_path: String,
    #[serde(default = "default_dir")]
    pub dir_path: String,
    #[serde(default)]
    pub args: String,
}

/// A validated request: one variant per action, carrying its typed arguments.
#[derive(Debug, Clone)]
pub enum ActionCall {
    GetFilesInfo(DirectoryArgs),
    GetFileContent(ReadFileArgs),
    CreateDir(CreateDirArgs),
    WriteFile(WriteFileArgs),
    MoveFile(MoveFileArgs),
    CompileCc(CompileArgs),
    CompileCxx(CompileArgs),
    NewRustProject(ProjectArgs),
    BuildRustProject(ProjectArgs),
    RunClippy(ProjectArgs),
    RunShCommand(ShellArgs),
    RunPythonFile(ScriptArgs),
    RunRustProject(ProjectArgs),
}

impl ActionCall {
    pub async fn execute(&self, ctx: &ActionContext) -> ActionResult {
        match self {
            ActionCall::GetFilesInfo(args) => files::get_files_info(ctx, args),
            ActionCall::GetFileContent(args) => files::get_file_content(ctx, args),
            ActionCall::CreateDir(args) => files::create_dir(ctx, args),
            ActionCall::WriteFile(args) => files::write_file(ctx, args),
            ActionCall::MoveFile(args) => files::move_file(ctx, args),
            ActionCall::CompileCc(args) => {
                process::compile(ctx, &ctx.toolchain.cc, args).await
            }
            ActionCall::CompileCxx(args) => {
                process::compile(ctx, &ctx.toolchain.cxx, args).await
            }
            ActionCall::NewRustProject(args) => cargo::new_project(ctx, args).await,
            ActionCall::BuildRustProject(args) => {
                cargo::project_command(ctx, cargo::CargoStep::Build, args).await
            }
            ActionCall::RunClippy(args) => {
                cargo::project_command(ctx, cargo::CargoStep::Clippy, args).await
            }
            ActionCall::RunRustProject(args) => {
                cargo::project_command(ctx, cargo::CargoStep::Run, args).await
            }
            ActionCall::RunShCommand(args) => process::run_sh_command(ctx, args).await,
            ActionCall::RunPythonFile(args) => process::run_python_file(ctx, args).await,
        }
    }
}
