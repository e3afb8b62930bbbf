use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PixelError {
    #[error("buffer holds {actual} bytes, {width}x{height}x{channels} needs {expected}")]
    SizeMismatch { width: usize, height: usize, channels: usize, expected: usize, actual: usize },
    #[error("image dimensions must be non-zero")]
    Empty,
}

/// Raw interleaved 8-bit pixels, rows top to bottom, channels innermost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelImage {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl PixelImage {
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Result<Self, PixelError> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(PixelError::Empty);
        }
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(PixelError::SizeMismatch { width, height, channels, expected, actual: data.len() });
        }
        Ok(Self { width, height, channels, data })
    }

    pub fn filled(width: usize, height: usize, channels: usize, value: u8) -> Result<Self, PixelError> {
        Self::new(width, height, channels, vec![value; width * height * channels])
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }
    pub fn channels(&self) -> usize { self.channels }
    pub fn as_bytes(&self) -> &[u8] { &self.data }
    pub fn as_bytes_mut(&mut self) -> &mut [u8] { &mut self.data }
    pub fn into_bytes(self) -> Vec<u8> { self.data }

    /// Channel bytes available for one-bit-per-byte embedding.
    pub fn capacity_bits(&self) -> usize { self.data.len() }

    /// SHA-256 of the raw pixel bytes, lowercase hex.
    pub fn pixel_hash(&self) -> String { pixel_hash(&self.data) }
}

pub fn pixel_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_checks_size() {
        assert!(PixelImage::new(2, 2, 3, vec![0; 12]).is_ok());
        assert_eq!(
            PixelImage::new(2, 2, 3, vec![0; 11]),
            Err(PixelError::SizeMismatch { width: 2, height: 2, channels: 3, expected: 12, actual: 11 })
        );
        assert_eq!(PixelImage::new(0, 2, 3, vec![]), Err(PixelError::Empty));
    }

    #[test]
    fn hash_of_empty_input() {
        assert_eq!(pixel_hash(b""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn single_byte_change_changes_hash() {
        let img = PixelImage::filled(16, 16, 3, 128).unwrap();
        let before = img.pixel_hash();
        let mut edited = img.clone();
        let last = edited.as_bytes().len() - 1;
        edited.as_bytes_mut()[last] ^= 0x80;
        assert_ne!(before, edited.pixel_hash());
    }
}
