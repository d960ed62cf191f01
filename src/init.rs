/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/init.rs
 * Responsibility: Start-up discovery: config path, working directory, system prompt
 */

use anyhow::{Context, Result};
use dirs::config_dir;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "kiln.yml";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful coding assistant. You can only touch files \
inside the working directory through the provided functions. Process output is written to \
log.txt in the directory an action ran in; read it with get_file_content when you need it.";

/// Resolve the config file path
/// Priority: CLI > ./kiln.yml > KILN_CONFIG > <config dir>/kiln/kiln.yml
/// Returns `None` when nothing exists, meaning defaults plus environment.
pub fn resolve_config_path(cli_config: Option<PathBuf>) -> Option<PathBuf> {
    // 1. CLI takes highest priority, even if missing (Config::load will say so)
    if let Some(path) = cli_config {
        return Some(path);
    }

    // 2. Local file in the current directory
    let local = PathBuf::from(CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    // 3. Environment variable
    if let Ok(env_path) = std::env::var("KILN_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 4. Per-user config directory
    config_dir()
        .map(|dir| dir.join("kiln").join(CONFIG_FILE))
        .filter(|path| path.is_file())
}

/// Make sure the working directory exists before the first action needs it.
pub fn initialize_working_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create working directory {:?}", path))?;
        tracing::info!(path = %path.display(), "created working directory");
    } else if !path.is_dir() {
        anyhow::bail!("Working directory {:?} exists but is not a directory", path);
    }
    Ok(())
}

/// The configured prompt file, or a built-in prompt when it is absent.
pub fn load_system_prompt(path: &Path) -> Result<String> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "system prompt not found, using built-in prompt");
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read system prompt {:?}", path))
}
