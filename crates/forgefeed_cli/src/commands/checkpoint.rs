use std::fs;
use std::path::Path;

use super::shared::CommandResult;

/// Pretty-print the checkpoint file.
pub(crate) fn handle_show(path: &Path) -> CommandResult {
    match render(path)? {
        Some(pretty) => println!("{}", pretty),
        None => println!("No checkpoint at {}", path.display()),
    }
    Ok(())
}

pub(crate) fn handle_reset(path: &Path) -> CommandResult {
    if remove(path)? {
        println!("Removed checkpoint {}", path.display());
    } else {
        println!("No checkpoint at {}", path.display());
    }
    Ok(())
}

fn render(path: &Path) -> CommandResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let checkpoint = forgefeed::Checkpoint::from_json(&fs::read_to_string(path)?)?;
    Ok(Some(serde_json::to_string_pretty(&checkpoint)?))
}

fn remove(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
