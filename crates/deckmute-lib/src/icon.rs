//! Icon resources — decode image files into RGBA bitmaps for deck keys.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;

#[derive(Debug)]
pub enum IconError {
    /// The resolved path does not exist.
    NotFound(PathBuf),
    /// The file exists but could not be decoded.
    Decode { path: PathBuf, reason: String },
}

impl fmt::Display for IconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IconError::NotFound(p) => write!(f, "Icon not found: {}", p.display()),
            IconError::Decode { path, reason } => {
                write!(f, "Icon decode failed ({}): {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for IconError {}

pub type Result<T> = std::result::Result<T, IconError>;

/// Decoded RGBA8 pixel data. Cloning shares the pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    rgba: Arc<[u8]>,
}

impl Bitmap {
    /// Wrap raw RGBA8 pixels. Returns `None` if the buffer length does not
    /// match `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        if rgba.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba: rgba.into(),
        })
    }

    /// Single-color bitmap.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba: Vec<u8> = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            rgba: rgba.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Decodes an icon resource into a [`Bitmap`].
pub trait IconLoader {
    fn load_icon(&self, path: &str) -> Result<Bitmap>;
}

/// Loads icons from the filesystem.
///
/// Relative paths resolve against `base_dir` (normally the directory holding
/// the deck config). When `size` is set, icons are scaled to a square of that
/// many pixels to match the deck's key size.
#[derive(Debug, Clone, Default)]
pub struct FileIconLoader {
    base_dir: Option<PathBuf>,
    size: Option<u32>,
}

impl FileIconLoader {
    pub fn new(base_dir: Option<PathBuf>, size: Option<u32>) -> Self {
        Self { base_dir, size }
    }

    /// Resolve `path` against the base directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        match &self.base_dir {
            Some(base) if p.is_relative() => base.join(p),
            _ => p.to_path_buf(),
        }
    }
}

impl IconLoader for FileIconLoader {
    fn load_icon(&self, path: &str) -> Result<Bitmap> {
        let resolved = self.resolve(path);
        if !resolved.exists() {
            return Err(IconError::NotFound(resolved));
        }
        let img = image::open(&resolved).map_err(|e| IconError::Decode {
            path: resolved.clone(),
            reason: e.to_string(),
        })?;
        let img = match self.size {
            Some(s) if img.width() != s || img.height() != s => {
                img.resize_exact(s, s, FilterType::Triangle)
            }
            _ => img,
        };
        let rgba = img.into_rgba8();
        let (w, h) = rgba.dimensions();
        log::debug!("loaded icon {} ({w}x{h})", resolved.display());
        Bitmap::from_rgba(w, h, rgba.into_raw()).ok_or_else(|| IconError::Decode {
            path: resolved,
            reason: "pixel buffer size mismatch".into(),
        })
    }
}
