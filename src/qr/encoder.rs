use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgba, RgbaImage};
use qrcode::{Color, EcLevel, QrCode};
use thiserror::Error;
use tracing::debug;

use super::color::Rgb;

/// Largest raster edge `encode` will allocate.
pub const MAX_EDGE: u32 = 4096;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload of {len} bytes exceeds QR capacity")]
    CapacityExceeded { len: usize },
    #[error("qr encoding failed: {0}")]
    Qr(String),
    #[error("invalid render options: {0}")]
    InvalidOptions(String),
    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub size: u32,      // requested edge length in pixels
    pub margin: u32,    // quiet zone, in modules
    pub foreground: Rgb,
    pub background: Rgb,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            size: 256,
            margin: 2,
            foreground: Rgb(0x3C, 0x07, 0x1E),
            background: Rgb::WHITE,
        }
    }
}

/// Rendered code plus the payload it carries.
#[derive(Debug, Clone)]
pub struct QrSurface {
    pub payload: String,
    pub image: RgbaImage,
}

impl QrSurface {
    pub fn to_png(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}

pub fn suggested_filename(payload: &str) -> String {
    let safe: String = payload
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("emergency-assistance-qr-{}.png", safe)
}

/// Render `payload` as a square QR raster.
///
/// The edge is `opts.size` pixels unless the code plus margin needs more
/// modules than that, in which case each module gets one pixel. Sizes or
/// margins that would need an edge above [`MAX_EDGE`] are rejected.
pub fn encode(payload: &str, opts: &EncodeOptions) -> Result<QrSurface, EncodeError> {
    if opts.size > MAX_EDGE {
        return Err(EncodeError::InvalidOptions(format!(
            "size {} exceeds {} px",
            opts.size, MAX_EDGE
        )));
    }
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M).map_err(|e| {
        match e {
            qrcode::types::QrError::DataTooLong => EncodeError::CapacityExceeded { len: payload.len() },
            other => EncodeError::Qr(other.to_string()),
        }
    })?;

    let modules = code.width() as u32;
    let colors = code.to_colors();
    let total = opts
        .margin
        .checked_mul(2)
        .and_then(|m| m.checked_add(modules))
        .filter(|t| *t <= MAX_EDGE)
        .ok_or_else(|| {
            EncodeError::InvalidOptions(format!("margin {} does not fit {} px", opts.margin, MAX_EDGE))
        })?;
    // total <= MAX_EDGE and size <= MAX_EDGE keep every product below in range
    let scale = (opts.size / total).max(1);
    let edge = opts.size.max(total * scale);
    let offset = (edge - total * scale) / 2 + opts.margin * scale;

    let fg = Rgba(opts.foreground.rgba());
    let mut image = RgbaImage::from_pixel(edge, edge, Rgba(opts.background.rgba()));
    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let mx = i as u32 % modules;
        let my = i as u32 / modules;
        for dy in 0..scale {
            for dx in 0..scale {
                image.put_pixel(offset + mx * scale + dx, offset + my * scale + dy, fg);
            }
        }
    }

    debug!(len = payload.len(), modules, edge, "qr encoded");
    Ok(QrSurface {
        payload: payload.to_string(),
        image,
    })
}

/// Write the surface as a PNG. A directory `dest` receives the suggested filename.
pub fn export_png(surface: &QrSurface, dest: &Path) -> Result<PathBuf, EncodeError> {
    let path = if dest.is_dir() {
        dest.join(suggested_filename(&surface.payload))
    } else {
        dest.to_path_buf()
    };
    surface.image.save_with_format(&path, ImageFormat::Png)?;
    Ok(path)
}
