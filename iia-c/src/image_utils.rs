use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Interleaved pixel bytes, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn expected_len(width: u32, height: u32, channels: u32) -> usize {
        width as usize * height as usize * channels as usize
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Expand to RGBA_8888 with an opaque alpha channel, the layout
    /// `Bitmap.copyPixelsFromBuffer` expects.
    pub fn to_rgba(&self) -> Result<Vec<u8>> {
        let pixels = self.width as usize * self.height as usize;
        if self.data.len() != Self::expected_len(self.width, self.height, self.channels) {
            return Err(anyhow!(
                "Buffer holds {} bytes, expected {}x{}x{}",
                self.data.len(),
                self.width,
                self.height,
                self.channels
            ));
        }

        let mut out = Vec::with_capacity(pixels * 4);
        match self.channels {
            4 => out.extend_from_slice(&self.data),
            3 => {
                for px in self.data.chunks_exact(3) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            1 => {
                for &g in &self.data {
                    out.extend_from_slice(&[g, g, g, 255]);
                }
            }
            n => return Err(anyhow!("Unsupported channel count: {}", n)),
        }
        Ok(out)
    }

    /// Write the image to disk. The format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        let color = match self.channels {
            1 => image::ColorType::L8,
            3 => image::ColorType::Rgb8,
            4 => image::ColorType::Rgba8,
            n => return Err(anyhow!("Unsupported channel count: {}", n)),
        };

        image::save_buffer(path, &self.data, self.width, self.height, color)
            .with_context(|| format!("Failed to save image to {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rgb(width: u32, height: u32) -> ImageData {
        ImageData {
            width,
            height,
            channels: 3,
            data: (0..width * height * 3).map(|i| (i % 251) as u8).collect(),
        }
    }

    #[test]
    fn test_to_rgba_adds_opaque_alpha() {
        let img = ImageData {
            width: 2,
            height: 1,
            channels: 3,
            data: vec![10, 20, 30, 40, 50, 60],
        };
        let rgba = img.to_rgba().unwrap();
        assert_eq!(rgba, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_to_rgba_expands_grey() {
        let img = ImageData {
            width: 1,
            height: 2,
            channels: 1,
            data: vec![7, 9],
        };
        assert_eq!(img.to_rgba().unwrap(), vec![7, 7, 7, 255, 9, 9, 9, 255]);
    }

    #[test]
    fn test_to_rgba_rejects_short_buffer() {
        let mut img = rgb(4, 4);
        img.data.truncate(10);
        assert!(img.to_rgba().is_err());
    }

    #[test]
    fn test_save_png() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.png");
        let img = rgb(8, 6);
        img.save(&path)?;

        let decoded = image::open(&path)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.into_raw(), img.data);
        Ok(())
    }
}
