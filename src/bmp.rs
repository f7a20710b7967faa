//! Minimal 24-bit BMP reader and writer.
//!
//! Only the plainest layout is understood: a 14-byte file header, a 40-byte
//! info header, and uncompressed 24-bit pixel data stored bottom-up with each
//! row padded to a multiple of 4 bytes. Anything else is rejected by
//! [`Image::decode`] returning `None`.

const FILE_HEADER_LEN: usize = 14;
const INFO_HEADER_LEN: usize = 40;

/// A 24-bit image held as a top-to-bottom grid of (blue, green, red) pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Image {
    /// Creates an image from top-down rows of (blue, green, red) pixel bytes.
    ///
    /// # Panics
    ///
    /// Panics if `pixels` is not exactly `width * height * 3` bytes long.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The pixel grid, top-down, 3 bytes per pixel in (blue, green, red)
    /// order.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Serializes the image as an uncompressed 24-bit BMP file.
    pub fn encode(&self) -> Vec<u8> {
        let row_len = self.width as usize * 3;
        let padding = (4 - row_len % 4) % 4;
        let image_size = (row_len + padding) * self.height as usize;
        let file_size = FILE_HEADER_LEN + INFO_HEADER_LEN + image_size;

        let mut out = Vec::with_capacity(file_size);
        out.extend_from_slice(b"BM");
        out.extend_from_slice(&(file_size as u32).to_le_bytes());
        out.extend_from_slice(&[0; 4]); // reserved
        out.extend_from_slice(&((FILE_HEADER_LEN + INFO_HEADER_LEN) as u32).to_le_bytes());

        out.extend_from_slice(&(INFO_HEADER_LEN as u32).to_le_bytes());
        out.extend_from_slice(&(self.width as i32).to_le_bytes());
        out.extend_from_slice(&(self.height as i32).to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // planes
        out.extend_from_slice(&24u16.to_le_bytes()); // bits per pixel
        out.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB, uncompressed
        out.extend_from_slice(&(image_size as u32).to_le_bytes());
        out.extend_from_slice(&[0; 16]); // resolution and palette fields

        // Scanlines are stored bottom-up.
        for row in self.pixels.chunks_exact(row_len.max(1)).rev() {
            out.extend_from_slice(row);
            out.extend_from_slice(&[0, 0, 0][..padding]);
        }
        out
    }

    /// Deserializes an uncompressed 24-bit BMP file.
    ///
    /// Returns `None` for anything that is not a single-plane, uncompressed
    /// 24-bit BMP with positive dimensions and enough pixel data at the
    /// declared offset.
    pub fn decode(data: &[u8]) -> Option<Image> {
        if data.len() < FILE_HEADER_LEN + INFO_HEADER_LEN {
            return None;
        }
        if &data[..2] != b"BM" {
            return None;
        }
        let data_offset = read_u32(data, 10)? as usize;

        let info_len = read_u32(data, 14)?;
        if info_len < INFO_HEADER_LEN as u32 {
            return None;
        }
        let width = read_i32(data, 18)?;
        let height = read_i32(data, 22)?;
        let planes = read_u16(data, 26)?;
        let bits_per_pixel = read_u16(data, 28)?;
        let compression = read_u32(data, 30)?;
        if planes != 1 || bits_per_pixel != 24 || compression != 0 {
            return None;
        }
        if width <= 0 || height <= 0 {
            return None;
        }
        let (width, height) = (width as u32, height as u32);

        let row_len = width as usize * 3;
        let padding = (4 - row_len % 4) % 4;
        let stride = row_len + padding;
        let pixel_data = data.get(data_offset..)?;
        if pixel_data.len() < stride.checked_mul(height as usize)? {
            return None;
        }

        // Rows are stored bottom-up; emit them top-down.
        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in pixel_data.chunks_exact(stride).take(height as usize).rev() {
            pixels.extend_from_slice(&row[..row_len]);
        }

        Some(Image {
            width,
            height,
            pixels,
        })
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(
        data.get(offset..offset + 2)?.try_into().ok()?,
    ))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(
        data.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

fn read_i32(data: &[u8], offset: usize) -> Option<i32> {
    Some(i32::from_le_bytes(
        data.get(offset..offset + 4)?.try_into().ok()?,
    ))
}
