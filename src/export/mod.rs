//! Read-only export of a history record: the renderable image plus a
//! Markdown insight sheet, and the share-sheet text. No session interaction.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::MediaAsset;

/// Writes `<id>.<ext>` and `<id>.md` into `dir`, returning the image path.
pub fn write_capture(record: &MediaAsset, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;

    let display = &record.display_payload;
    let image_path = dir.join(format!(
        "{}.{}",
        record.id,
        extension_for(&display.mime_type)
    ));
    fs::write(&image_path, &display.bytes)
        .with_context(|| format!("failed to write {}", image_path.display()))?;

    let sheet_path = dir.join(format!("{}.md", record.id));
    fs::write(&sheet_path, insight_sheet(record))
        .with_context(|| format!("failed to write {}", sheet_path.display()))?;

    Ok(image_path)
}

pub fn share_text(record: &MediaAsset) -> String {
    let mut text = String::new();
    if let Some(analysis) = &record.analysis {
        if let Some(description) = &analysis.description {
            text.push_str(description);
        }
        for point in &analysis.points {
            if !text.is_empty() {
                text.push('\n');
            }
            let _ = write!(text, "• {point}");
        }
    }
    if text.is_empty() {
        text.push_str("Captured with SnapSight");
    }
    text
}

fn insight_sheet(record: &MediaAsset) -> String {
    let mut sheet = format!(
        "# Capture {}\n\nTaken {}\n",
        record.id,
        record.created_at.to_rfc3339()
    );
    if let Some(analysis) = &record.analysis {
        if let Some(description) = &analysis.description {
            let _ = write!(sheet, "\n{description}\n");
        }
        if !analysis.points.is_empty() {
            sheet.push('\n');
            for point in &analysis.points {
                let _ = writeln!(sheet, "- {point}");
            }
        }
    }
    sheet
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}
