//! Save-slot orchestration: whole-file save/load transactions plus the
//! header-only summaries a slot menu would list.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use mirage_persist::{peek_summary, ClassRegistry, PersistStream, SaveSummary};

#[derive(Debug, Serialize, Deserialize)]
pub struct SlotSummary {
    pub format_major: u16,
    pub format_minor: u16,
    pub build_tag: String,
    pub timestamp: u64,
    pub description: String,
    pub has_thumbnail: bool,
}

impl From<&SaveSummary> for SlotSummary {
    fn from(summary: &SaveSummary) -> Self {
        SlotSummary {
            format_major: summary.major,
            format_minor: summary.minor,
            build_tag: summary.build_tag.clone(),
            timestamp: summary.timestamp,
            description: summary.description.clone(),
            has_thumbnail: summary.thumbnail.is_some(),
        }
    }
}

/// Serialize the registry's whole object graph into `path`.
pub fn save_world(registry: &ClassRegistry, path: &Path, description: &str) -> Result<SlotSummary> {
    let mut stream = PersistStream::for_save(description, None);
    registry
        .save_with_progress(&mut stream, &mut |done, total| {
            debug!("save progress {done}/{total}");
        })
        .with_context(|| format!("serializing object graph for {}", path.display()))?;
    stream
        .write_to(path)
        .with_context(|| format!("writing save slot {}", path.display()))?;
    info!(
        "saved {} byte(s) to {}",
        stream.len(),
        path.display()
    );
    Ok(SlotSummary::from(stream.summary()))
}

/// Rebuild the registry's object graph from `path`.
pub fn load_world(registry: &mut ClassRegistry, path: &Path) -> Result<SlotSummary> {
    let image = fs::read(path).with_context(|| format!("reading save slot {}", path.display()))?;
    let mut stream = PersistStream::for_load(image)
        .with_context(|| format!("opening save slot {}", path.display()))?;
    let summary = SlotSummary::from(stream.summary());
    registry
        .load_with_progress(&mut stream, &mut |done, total| {
            debug!("load progress {done}/{total}");
        })
        .with_context(|| format!("restoring object graph from {}", path.display()))?;
    Ok(summary)
}

/// Read a slot's header without touching its body or any live state.
pub fn inspect_slot(path: &Path) -> Result<SlotSummary> {
    let image = fs::read(path).with_context(|| format!("reading save slot {}", path.display()))?;
    let summary =
        peek_summary(&image).with_context(|| format!("parsing header of {}", path.display()))?;
    Ok(SlotSummary::from(&summary))
}
