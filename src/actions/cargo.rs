/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/actions/cargo.rs
 * Responsibility: Rust project lifecycle through cargo (new / build / clippy / run).
 */

use super::process::{ProcessLog, existing_dir, run_logged};
use super::{ActionContext, ActionError, ActionResult, ProjectArgs};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CargoStep {
    Build,
    Clippy,
    Run,
}

impl CargoStep {
    fn subcommand(self) -> &'static str {
        match self {
            CargoStep::Build => "build",
            CargoStep::Clippy => "clippy",
            CargoStep::Run => "run",
        }
    }

    fn done(self) -> &'static str {
        match self {
            CargoStep::Build => "Built Rust project",
            CargoStep::Clippy => "Ran Clippy for project",
            CargoStep::Run => "Ran Rust project",
        }
    }
}

/// `dir_path/name`, guarded. The name must be a single plain path segment.
fn project_path(ctx: &ActionContext, args: &ProjectArgs) -> Result<PathBuf, ActionError> {
    let name = args.name.trim();
    if name.is_empty() {
        return Err(ActionError::InvalidArgument("`name` must not be empty".to_string()));
    }
    let rel = Path::new(&args.dir_path).join(name);
    let project = ctx.workspace.resolve(&rel.to_string_lossy(), "write")?;

    let mut components = Path::new(name).components();
    if !matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) {
        return Err(ActionError::InvalidArgument(format!(
            "\"{}\" is not a valid project name; use dir_path for the parent directory",
            name
        )));
    }
    Ok(project)
}

fn cargo_argv<'a>(first: &'a str, extra: &'a str) -> Vec<&'a str> {
    let mut argv = vec![first];
    argv.extend(extra.split_whitespace());
    argv
}

pub(super) async fn new_project(ctx: &ActionContext, args: &ProjectArgs) -> ActionResult {
    let project = project_path(ctx, args)?;
    let dir = existing_dir(ctx, &args.dir_path)?;
    if project.exists() {
        return Err(ActionError::InvalidArgument(format!(
            "\"{}\" already exists in \"{}\"",
            args.name, args.dir_path
        )));
    }

    let log = ProcessLog::in_dir(ctx, &args.dir_path)?;
    let mut argv = cargo_argv("new", &args.args);
    argv.insert(1, args.name.trim());

    let status = run_logged(&ctx.toolchain.cargo, &argv, &dir, &log, None).await?;
    if !status.success() {
        return Err(ActionError::ProcessFailed { log: log.display().to_string() });
    }
    Ok(format!(
        "Created Rust project {} in directory {}; see {} for the log and potential errors",
        args.name.trim(),
        args.dir_path,
        log.display()
    ))
}

/// build / clippy / run on a project that must already exist.
pub(super) async fn project_command(
    ctx: &ActionContext,
    step: CargoStep,
    args: &ProjectArgs,
) -> ActionResult {
    let project = project_path(ctx, args)?;
    if !project.is_dir() {
        return Err(ActionError::NotADirectory(format!(
            "{}/{}",
            args.dir_path.trim_end_matches('/'),
            args.name.trim()
        )));
    }
    existing_dir(ctx, &args.dir_path)?;

    let log = ProcessLog::in_dir(ctx, &args.dir_path)?;
    let argv = cargo_argv(step.subcommand(), &args.args);

    let status = run_logged(&ctx.toolchain.cargo, &argv, &project, &log, None).await?;
    if !status.success() {
        return Err(ActionError::ProcessFailed { log: log.display().to_string() });
    }
    Ok(format!(
        "{} {} in directory {}; see {} for the log and potential errors",
        step.done(),
        args.name.trim(),
        args.dir_path,
        log.display()
    ))
}
