//! Command implementations and terminal rendering

pub mod forecast;
pub mod history;
pub mod setup;
pub mod templates;
pub mod ui;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes `value` as pretty-printed JSON to `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;
    tracing::info!("Exported results to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_json_creates_parent_dirs() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("out").join("result.json");

        write_json(&path, &serde_json::json!({"nominal": [1.0, 2.5]}))?;

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(written["nominal"][1], 2.5);
        Ok(())
    }
}
