/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/actions/files.rs
 * Responsibility: Listing, reading, writing, moving files and creating directories.
 */

use super::{
    ActionContext, ActionError, ActionResult, CreateDirArgs, DirectoryArgs, MoveFileArgs,
    ReadFileArgs, WriteFileArgs,
};
use std::fs;

pub(super) fn get_files_info(ctx: &ActionContext, args: &DirectoryArgs) -> ActionResult {
    let target = ctx.workspace.resolve(&args.directory, "list")?;
    if !target.is_dir() {
        return Err(ActionError::NotADirectory(args.directory.clone()));
    }

    let mut entries: Vec<_> = fs::read_dir(&target)
        .map_err(ActionError::io(format!("Error listing \"{}\"", args.directory)))?
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    if entries.is_empty() {
        return Ok(format!("Directory \"{}\" is empty", args.directory));
    }

    let mut lines = Vec::with_capacity(entries.len());
    for entry in entries {
        let meta = entry
            .metadata()
            .map_err(ActionError::io(format!("Error reading metadata of {:?}", entry.file_name())))?;
        lines.push(format!(
            "- {}: file_size={} bytes, is_dir={}",
            entry.file_name().to_string_lossy(),
            meta.len(),
            meta.is_dir()
        ));
    }
    Ok(lines.join("\n"))
}

pub(super) fn get_file_content(ctx: &ActionContext, args: &ReadFileArgs) -> ActionResult {
    let target = ctx.workspace.resolve(&args.file_path, "read")?;
    if !target.is_file() {
        return Err(ActionError::NotAFile(args.file_path.clone()));
    }

    let content = fs::read_to_string(&target)
        .map_err(ActionError::io(format!("Error reading file \"{}\"", args.file_path)))?;

    let limit = ctx.toolchain.max_file_chars;
    if limit > 0 {
        if let Some((cut, _)) = content.char_indices().nth(limit) {
            return Ok(format!(
                "{}[...File \"{}\" truncated at {} characters]",
                &content[..cut],
                args.file_path,
                limit
            ));
        }
    }
    Ok(content)
}

pub(super) fn create_dir(ctx: &ActionContext, args: &CreateDirArgs) -> ActionResult {
    let target = ctx.workspace.resolve(&args.dir_path, "write")?;
    if target.is_file() {
        return Err(ActionError::InvalidArgument(format!(
            "\"{}\" already exists and is a file",
            args.dir_path
        )));
    }

    fs::create_dir_all(&target)
        .map_err(ActionError::io(format!("Error creating directory \"{}\"", args.dir_path)))?;
    Ok(format!("Created directory \"{}\"", args.dir_path))
}

pub(super) fn write_file(ctx: &ActionContext, args: &WriteFileArgs) -> ActionResult {
    let target = ctx.workspace.resolve(&args.file_path, "write")?;
    if target.is_dir() {
        return Err(ActionError::InvalidArgument(format!(
            "\"{}\" is a directory",
            args.file_path
        )));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(ActionError::io(format!("Error creating parent of \"{}\"", args.file_path)))?;
    }
    fs::write(&target, &args.content)
        .map_err(ActionError::io(format!("Error writing file \"{}\"", args.file_path)))?;

    Ok(format!(
        "Successfully wrote to \"{}\" ({} characters written)",
        args.file_path,
        args.content.chars().count()
    ))
}

pub(super) fn move_file(ctx: &ActionContext, args: &MoveFileArgs) -> ActionResult {
    let source = ctx.workspace.resolve(&args.source_path, "move")?;
    let dest = ctx.workspace.resolve(&args.dest_path, "move")?;

    if fs::symlink_metadata(&source).is_err() {
        return Err(ActionError::NotFound(args.source_path.clone()));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(ActionError::io(format!("Error creating parent of \"{}\"", args.dest_path)))?;
    }
    fs::rename(&source, &dest).map_err(ActionError::io(format!(
        "Error moving \"{}\" to \"{}\"",
        args.source_path, args.dest_path
    )))?;

    Ok(format!("Moved \"{}\" to \"{}\"", args.source_path, args.dest_path))
}
