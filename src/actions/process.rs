/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/actions/process.rs
 * Responsibility: Spawn external programs with their output captured to log.txt.
 */

use super::{ActionContext, ActionError, ActionResult, CompileArgs, ScriptArgs, ShellArgs};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};

pub(super) const LOG_FILE: &str = "log.txt";

/// Where a child's combined output lands, and how to name it back to the model.
pub(super) struct ProcessLog {
    path: PathBuf,
    display: String,
}

impl ProcessLog {
    /// `dir_path/log.txt`, guarded like any other write: a pre-existing
    /// `log.txt` symlink pointing out of the root is refused.
    pub(super) fn in_dir(ctx: &ActionContext, dir_path: &str) -> Result<Self, ActionError> {
        let display = if dir_path.is_empty() || dir_path == "." {
            LOG_FILE.to_string()
        } else {
            format!("{}/{}", dir_path.trim_end_matches('/'), LOG_FILE)
        };
        let rel = Path::new(dir_path).join(LOG_FILE);
        let path = ctx.workspace.resolve(&rel.to_string_lossy(), "write")?;
        Ok(Self { path, display })
    }

    pub(super) fn display(&self) -> &str {
        &self.display
    }

    fn open(&self) -> Result<(Stdio, Stdio), ActionError> {
        let file = File::create(&self.path)
            .map_err(ActionError::io(format!("Error writing to {}", self.display)))?;
        let err_file = file
            .try_clone()
            .map_err(ActionError::io(format!("Error writing to {}", self.display)))?;
        Ok((Stdio::from(file), Stdio::from(err_file)))
    }
}

/// Resolves `dir_path` and insists it is an existing directory.
pub(super) fn existing_dir(ctx: &ActionContext, dir_path: &str) -> Result<PathBuf, ActionError> {
    let dir = ctx.workspace.resolve(dir_path, "write")?;
    if !dir.is_dir() {
        return Err(ActionError::NotADirectory(dir_path.to_string()));
    }
    Ok(dir)
}

/// Runs `program args...` in `cwd`, stdout and stderr both into `log`.
///
/// Blocks until the child exits. Only a non-`None` `timeout` bounds it; on
/// expiry the child is killed.
pub(super) async fn run_logged(
    program: &str,
    args: &[&str],
    cwd: &Path,
    log: &ProcessLog,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ActionError> {
    let (stdout, stderr) = log.open()?;

    tracing::debug!(program, ?args, cwd = %cwd.display(), "spawning child process");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);
    if timeout.is_some() {
        lead_own_group(&mut cmd);
    }

    let mut child = cmd.spawn().map_err(|source| ActionError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let waited = match timeout {
        Some(limit) => {
            let bounded = tokio::time::timeout(limit, child.wait()).await;
            match bounded {
                Ok(waited) => waited,
                Err(_) => {
                    kill_tree(&mut child, program).await;
                    return Err(ActionError::TimedOut {
                        secs: limit.as_secs(),
                        log: log.display().to_string(),
                    });
                }
            }
        }
        None => child.wait().await,
    };

    waited.map_err(ActionError::io(format!("Error waiting for {}", program)))
}

/// A timed child leads its own process group so expiry takes its descendants down too.
#[cfg(unix)]
fn lead_own_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn lead_own_group(_cmd: &mut Command) {}

#[cfg(unix)]
async fn kill_group(pid: u32, program: &str) {
    let group = format!("-{}", pid);
    let killed = Command::new("kill")
        .args(["-s", "KILL", "--", group.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = killed {
        tracing::warn!(program, "failed to kill process group {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
async fn kill_group(_pid: u32, _program: &str) {}

/// Kills the child's process group, then the child itself.
async fn kill_tree(child: &mut Child, program: &str) {
    if let Some(pid) = child.id() {
        kill_group(pid, program).await;
    }
    if let Err(e) = child.kill().await {
        tracing::warn!(program, "failed to kill timed out child: {}", e);
    }
}

fn split_args(args: &str) -> Vec<&str> {
    args.split_whitespace().collect()
}

pub(super) async fn compile(ctx: &ActionContext, compiler: &str, args: &CompileArgs) -> ActionResult {
    let dir = existing_dir(ctx, &args.dir_path)?;
    let log = ProcessLog::in_dir(ctx, &args.dir_path)?;

    let status = run_logged(compiler, &split_args(&args.args), &dir, &log, None).await?;
    if !status.success() {
        return Err(ActionError::ProcessFailed { log: log.display().to_string() });
    }
    Ok(format!(
        "Finished running the compiler; see {} for the log and potential warnings",
        log.display()
    ))
}

pub(super) async fn run_sh_command(ctx: &ActionContext, args: &ShellArgs) -> ActionResult {
    if args.cmd.trim().is_empty() {
        return Err(ActionError::InvalidArgument("`cmd` must not be empty".to_string()));
    }
    let dir = existing_dir(ctx, &args.dir_path)?;
    let log = ProcessLog::in_dir(ctx, &args.dir_path)?;
    let timeout = Duration::from_secs(ctx.toolchain.command_timeout_secs);

    let status = run_logged("sh", &["-c", args.cmd.as_str()], &dir, &log, Some(timeout)).await?;
    if !status.success() {
        return Err(ActionError::ProcessFailed { log: log.display().to_string() });
    }
    Ok(format!("Shell command finished; see {} for its output", log.display()))
}

pub(super) async fn run_python_file(ctx: &ActionContext, args: &ScriptArgs) -> ActionResult {
    let dir = existing_dir(ctx, &args.dir_path)?;
    let script_rel = Path::new(&args.dir_path).join(&args.file_path);
    let script = ctx
        .workspace
        .resolve(&script_rel.to_string_lossy(), "run")?;

    if script.extension().and_then(|ext| ext.to_str()) != Some("py") {
        return Err(ActionError::InvalidArgument(format!(
            "\"{}\" is not a Python file",
            args.file_path
        )));
    }
    if !script.is_file() {
        return Err(ActionError::NotAFile(args.file_path.clone()));
    }

    // The child runs inside `dir`, so a root-relative script path would resolve twice.
    let script = fs::canonicalize(&script)
        .map_err(ActionError::io(format!("Error resolving \"{}\"", args.file_path)))?;

    let log = ProcessLog::in_dir(ctx, &args.dir_path)?;
    let script_arg = script.to_string_lossy();
    let mut argv = vec![&*script_arg];
    argv.extend(split_args(&args.args));

    let status = run_logged(&ctx.toolchain.python, &argv, &dir, &log, None).await?;
    if !status.success() {
        return Err(ActionError::ProcessFailed { log: log.display().to_string() });
    }
    Ok(format!(
        "Ran \"{}\"; see {} for its output",
        args.file_path,
        log.display()
    ))
}
