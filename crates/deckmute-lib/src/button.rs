//! Base button widget — the generic redraw and compositing layer a deck key
//! widget delegates to.

use crate::error::Result;
use crate::icon::Bitmap;

/// Capabilities the host's generic widget layer offers to a specific widget.
pub trait BaseWidget: Send {
    /// True when something unrelated to the specific widget's own state
    /// (label, image, first frame) needs a redraw.
    fn requires_update(&self) -> bool;
    /// Composite the current image into the key's frame.
    fn update(&mut self) -> Result<()>;
    /// Replace the image shown on the next composite.
    fn set_image(&mut self, image: Bitmap);
}

/// In-memory button: label, displayed image and the last composited frame.
#[derive(Debug)]
pub struct ButtonWidget {
    key: u8,
    label: Option<String>,
    image: Option<Bitmap>,
    frame: Option<Bitmap>,
    dirty: bool,
    frames: u64,
}

impl ButtonWidget {
    /// A new button needs its first frame drawn.
    pub fn new(key: u8, label: Option<String>) -> Self {
        Self {
            key,
            label,
            image: None,
            frame: None,
            dirty: true,
            frames: 0,
        }
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        if self.label != label {
            self.label = label;
            self.dirty = true;
        }
    }

    /// Image that the next composite will use.
    pub fn image(&self) -> Option<&Bitmap> {
        self.image.as_ref()
    }

    /// Image from the last composite.
    pub fn frame(&self) -> Option<&Bitmap> {
        self.frame.as_ref()
    }

    /// Number of composites performed.
    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }
}

impl BaseWidget for ButtonWidget {
    fn requires_update(&self) -> bool {
        self.dirty
    }

    fn update(&mut self) -> Result<()> {
        self.frame = self.image.clone();
        self.dirty = false;
        self.frames += 1;
        Ok(())
    }

    fn set_image(&mut self, image: Bitmap) {
        self.image = Some(image);
        self.dirty = true;
    }
}
