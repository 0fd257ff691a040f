// src/review/mod.rs
//! Multi-image extraction and verification workflow.
//!
//! Leaf-first: [`normalize`] turns backend results into a [`grid::ReviewGrid`],
//! [`duplicates`] decorates it, [`queue`] owns per-image state and
//! [`verification`] drives commits and carousel navigation. The Bevy side
//! lives in [`plugin`], [`events`], [`resources`] and [`systems`].

pub mod client;
pub mod duplicates;
pub mod error;
pub mod events;
pub mod extraction;
pub mod files;
pub mod grid;
pub mod normalize;
pub mod payloads;
pub mod plugin;
pub mod queue;
pub mod resources;
pub mod systems;
pub mod verification;

pub use plugin::ReviewPlugin;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::extraction::{ExtractionPayload, ExtractionResult, RawPosition};
    use super::queue::{ImageId, ImageQueue, UploadedImage};

    /// Structured result with every serial at 90% confidence.
    pub fn sample_result(remote_id: &str, rows: &[&[&str]]) -> ExtractionResult {
        let mut cells: BTreeMap<u32, BTreeMap<u32, RawPosition>> = BTreeMap::new();
        let mut total = 0;
        for (r, row) in rows.iter().enumerate() {
            for (p, serial) in row.iter().enumerate() {
                total += 1;
                cells.entry(r as u32 + 1).or_default().insert(
                    p as u32 + 1,
                    RawPosition {
                        number: serial.to_string(),
                        confidence: "90%".into(),
                    },
                );
            }
        }
        ExtractionResult {
            remote_image_id: Some(remote_id.to_string()),
            image_name: None,
            total_containers: total,
            average_confidence: 90.0,
            payload: ExtractionPayload::Structured {
                rows: rows.len() as u32,
                columns: rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32,
                cells,
            },
        }
    }

    /// A queue where every image already completed with a 2×2 grid
    /// (`S1 S2 / S3 S1`) and remote id `remote-<name>`.
    pub fn completed_queue(names: &[&str]) -> (ImageQueue, Vec<ImageId>) {
        let uploads: Vec<UploadedImage> = names
            .iter()
            .map(|n| UploadedImage::from_bytes(*n, vec![1, 2, 3]))
            .collect();
        let ids: Vec<ImageId> = uploads.iter().map(|u| u.id).collect();
        let mut queue = ImageQueue::default();
        queue.enqueue_all(uploads);
        for (id, name) in ids.iter().zip(names) {
            queue.start(*id).unwrap();
            queue
                .complete(
                    *id,
                    Arc::new(sample_result(&format!("remote-{}", name), &[&["S1", "S2"], &["S3", "S1"]])),
                )
                .unwrap();
        }
        (queue, ids)
    }
}
