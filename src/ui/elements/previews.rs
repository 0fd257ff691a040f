// src/ui/elements/previews.rs
// Lazily decoded image previews, keyed by image id.

use bevy::prelude::*;
use bevy_egui::egui;
use std::collections::HashMap;

use crate::review::queue::{ImageId, UploadedImage};

// Large enough for the verification magnifier to show real detail.
const PREVIEW_MAX_SIDE: u32 = 1600;

enum Preview {
    Ready(egui::TextureHandle),
    Failed,
}

#[derive(Resource, Default)]
pub struct PreviewCache {
    textures: HashMap<ImageId, Preview>,
}

impl PreviewCache {
    /// Decodes on first use; undecodable images are remembered and skipped.
    pub fn texture(&mut self, ctx: &egui::Context, image: &UploadedImage) -> Option<&egui::TextureHandle> {
        let entry = self
            .textures
            .entry(image.id)
            .or_insert_with(|| match decode(ctx, image) {
                Ok(texture) => Preview::Ready(texture),
                Err(e) => {
                    warn!("Preview for '{}' unavailable: {}", image.file_name, e);
                    Preview::Failed
                }
            });
        match entry {
            Preview::Ready(texture) => Some(&*texture),
            Preview::Failed => None,
        }
    }

    /// Drops textures for images that are gone.
    pub fn retain(&mut self, live: impl Fn(ImageId) -> bool) {
        self.textures.retain(|id, _| live(*id));
    }
}

fn decode(ctx: &egui::Context, image: &UploadedImage) -> Result<egui::TextureHandle, image::ImageError> {
    let decoded = image::load_from_memory(&image.bytes)?;
    let thumbnail = decoded.thumbnail(PREVIEW_MAX_SIDE, PREVIEW_MAX_SIDE).to_rgba8();
    let size = [thumbnail.width() as usize, thumbnail.height() as usize];
    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, thumbnail.as_raw());
    Ok(ctx.load_texture(
        format!("preview-{}", image.id),
        color_image,
        egui::TextureOptions::LINEAR,
    ))
}
