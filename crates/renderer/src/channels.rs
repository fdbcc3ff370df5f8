use std::path::{Path, PathBuf};

use image::imageops::flip_vertical_in_place;
use image::GenericImageView;

use crate::error::RenderError;
use crate::types::{PassSlot, CHANNEL_COUNT};

/// What a configured channel binding string refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelTarget {
    /// Output of one of the four pass slots (previous frame for feedback).
    Pass(PassSlot),
    /// Static image on disk.
    Image(PathBuf),
    /// Nothing bound; samples read as zero.
    Unbound,
}

/// Resolves a binding string relative to the working directory.
///
/// Pass tokens win over the filesystem: `BUFFER_A` is always pass A even if a
/// file with that name exists.
pub fn resolve_binding(binding: &str) -> ChannelTarget {
    resolve_binding_from(binding, Path::new(""))
}

/// Same as [`resolve_binding`] with relative paths joined onto `base`.
pub fn resolve_binding_from(binding: &str, base: &Path) -> ChannelTarget {
    if let Some(slot) = PassSlot::from_token(binding) {
        return ChannelTarget::Pass(slot);
    }
    if binding.trim().is_empty() {
        return ChannelTarget::Unbound;
    }
    let path = base.join(binding);
    if path.is_file() {
        ChannelTarget::Image(path)
    } else {
        ChannelTarget::Unbound
    }
}

pub fn resolve_channels(bindings: &[String; CHANNEL_COUNT]) -> [ChannelTarget; CHANNEL_COUNT] {
    std::array::from_fn(|index| resolve_binding(&bindings[index]))
}

/// Decoded RGBA8 pixels, bottom row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn resolution(&self) -> [f32; 3] {
        [self.width as f32, self.height as f32, 0.0]
    }
}

/// Loads an image for a static channel.
///
/// Rows are flipped so the first row is the bottom of the picture, matching
/// the bottom-left origin shaders sample with.
pub fn load_image(path: &Path) -> Result<ImageData, RenderError> {
    let image = image::open(path).map_err(|err| {
        RenderError::Resource(format!("could not load image file {}: {err}", path.display()))
    })?;
    let (width, height) = image.dimensions();
    let mut rgba = image.to_rgba8();
    flip_vertical_in_place(&mut rgba);
    tracing::debug!(path = %path.display(), width, height, "loaded channel image");

    Ok(ImageData {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}
