use std::io::Cursor;

use image::{imageops::FilterType, io::Reader as ImageReader, ImageFormat};

/// Thumbnail bounds, in terminal cells.
pub const THUMBNAIL_WIDTH: u32 = 64;
pub const THUMBNAIL_HEIGHT: u32 = 24;

/// Dimensions and a grayscale thumbnail of a returned image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePreview {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub thumbnail: Thumbnail,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    /// Row-major luma samples, `width * height` long.
    pub luma: Vec<u8>,
}

impl ImagePreview {
    /// Best-effort decode. Bytes that are not a supported image yield `None`;
    /// the service's content type is never trusted or required.
    pub fn inspect(bytes: &[u8]) -> Option<Self> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?;
        let format = reader.format()?;
        let image = reader.decode().ok()?;
        let small = if image.width() > THUMBNAIL_WIDTH || image.height() > THUMBNAIL_HEIGHT {
            image
                .resize(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Triangle)
                .to_luma8()
        } else {
            image.to_luma8()
        };
        Some(Self {
            width: image.width(),
            height: image.height(),
            format,
            thumbnail: Thumbnail {
                width: small.width(),
                height: small.height(),
                luma: small.into_raw(),
            },
        })
    }
}

impl Thumbnail {
    /// Renders the thumbnail as text rows, dark pixels as dense glyphs.
    pub fn to_ascii_rows(&self) -> Vec<String> {
        const RAMP: &[u8] = b"@%#*+=-:. ";
        if self.width == 0 {
            return Vec::new();
        }
        self.luma
            .chunks(self.width as usize)
            .map(|row| {
                row.iter()
                    .map(|&value| {
                        let idx = value as usize * (RAMP.len() - 1) / 255;
                        RAMP[idx] as char
                    })
                    .collect()
            })
            .collect()
    }
}
