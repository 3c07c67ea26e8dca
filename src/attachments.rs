use std::io::Cursor;
use std::path::PathBuf;

use base64::Engine;
use image::GenericImageView;
use thiserror::Error;

/// Most the backend will accept per message.
pub const MAX_PENDING: usize = 8;

/// Uploads larger than this are refused outright.
const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Images above this edge length are downscaled before upload.
const MAX_DIMENSION: u32 = 1120;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("not an image: {0}")]
    NotAnImage(String),
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("too many attachments (max {0})")]
    TooMany(usize),
    #[error("could not read file: {0}")]
    Io(String),
    #[error("could not decode image: {0}")]
    Image(String),
}

/// An image the user has attached to the next message. Owns the (possibly
/// downscaled) encoded bytes that both the preview and the upload use.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    /// Build an attachment from raw file bytes. Rejects anything that does
    /// not decode as a known image format; images larger than
    /// `MAX_DIMENSION` on either edge are downscaled and re-encoded as PNG.
    pub fn from_bytes(filename: &str, bytes: Vec<u8>) -> Result<Self, AttachmentError> {
        let format = image::guess_format(&bytes)
            .map_err(|_| AttachmentError::NotAnImage(filename.to_string()))?;
        let mime = match format {
            image::ImageFormat::Png => "image/png",
            image::ImageFormat::Jpeg => "image/jpeg",
            image::ImageFormat::Gif => "image/gif",
            image::ImageFormat::WebP => "image/webp",
            _ => return Err(AttachmentError::NotAnImage(filename.to_string())),
        };

        let img = image::load_from_memory(&bytes)
            .map_err(|e| AttachmentError::Image(e.to_string()))?;
        let (width, height) = img.dimensions();

        if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
            return Ok(ImageAttachment {
                filename: filename.to_string(),
                mime,
                bytes,
            });
        }

        // Scale to fit while keeping the aspect ratio.
        let width_ratio = MAX_DIMENSION as f32 / width as f32;
        let height_ratio = MAX_DIMENSION as f32 / height as f32;
        let scale = width_ratio.min(height_ratio);
        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);
        let mut buffer = Vec::new();
        resized
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .map_err(|e| AttachmentError::Image(e.to_string()))?;

        Ok(ImageAttachment {
            filename: filename.to_string(),
            mime: "image/png",
            bytes: buffer,
        })
    }

    /// Read and validate an image file.
    pub async fn load(path: PathBuf) -> Result<Self, AttachmentError> {
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AttachmentError::NotFound(path.display().to_string())
            } else {
                AttachmentError::Io(e.to_string())
            }
        })?;
        if metadata.len() > MAX_FILE_BYTES {
            return Err(AttachmentError::TooLarge {
                size: metadata.len(),
                max: MAX_FILE_BYTES,
            });
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AttachmentError::Io(e.to_string()))?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());

        Self::from_bytes(&filename, bytes)
    }

    #[allow(dead_code)]
    pub fn data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime, encoded)
    }
}

/// The attachments queued for the next send. Mutated only from the update
/// loop; drained when the message goes out.
#[derive(Debug, Default)]
pub struct PendingImages {
    images: Vec<ImageAttachment>,
}

impl PendingImages {
    pub fn add(&mut self, attachment: ImageAttachment) -> Result<(), AttachmentError> {
        if self.images.len() >= MAX_PENDING {
            return Err(AttachmentError::TooMany(MAX_PENDING));
        }
        self.images.push(attachment);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<ImageAttachment> {
        if index < self.images.len() {
            Some(self.images.remove(index))
        } else {
            None
        }
    }

    /// Hand the pending list to an outgoing request.
    pub fn drain(&mut self) -> Vec<ImageAttachment> {
        std::mem::take(&mut self.images)
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn as_slice(&self) -> &[ImageAttachment] {
        &self.images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |_, _| Rgba([200, 40, 40, 255]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn accepts_png_bytes() {
        let attachment = ImageAttachment::from_bytes("shot.png", png_bytes(10, 10)).unwrap();
        assert_eq!(attachment.mime, "image/png");
        assert_eq!(attachment.filename, "shot.png");
    }

    #[test]
    fn rejects_non_image_bytes() {
        let result = ImageAttachment::from_bytes("notes.txt", b"just some text".to_vec());
        assert!(matches!(result, Err(AttachmentError::NotAnImage(_))));
    }

    #[test]
    fn oversized_image_is_downscaled() {
        let attachment = ImageAttachment::from_bytes("wide.png", png_bytes(2000, 50)).unwrap();
        let img = image::load_from_memory(&attachment.bytes).unwrap();
        assert!(img.width() <= 1120 && img.height() <= 1120);
        assert_eq!(attachment.mime, "image/png");
    }

    #[test]
    fn data_uri_carries_mime_prefix() {
        let attachment = ImageAttachment::from_bytes("shot.png", png_bytes(2, 2)).unwrap();
        assert!(attachment.data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn remove_by_position() {
        let mut pending = PendingImages::default();
        for name in ["a.png", "b.png", "c.png"] {
            pending
                .add(ImageAttachment::from_bytes(name, png_bytes(2, 2)).unwrap())
                .unwrap();
        }

        let removed = pending.remove(1).unwrap();
        assert_eq!(removed.filename, "b.png");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.as_slice()[1].filename, "c.png");
        assert!(pending.remove(5).is_none());
    }

    #[test]
    fn drain_transfers_ownership() {
        let mut pending = PendingImages::default();
        pending
            .add(ImageAttachment::from_bytes("a.png", png_bytes(2, 2)).unwrap())
            .unwrap();

        let drained = pending.drain();
        assert_eq!(drained.len(), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn pending_list_is_capped() {
        let mut pending = PendingImages::default();
        let attachment = ImageAttachment::from_bytes("a.png", png_bytes(2, 2)).unwrap();
        for _ in 0..MAX_PENDING {
            pending.add(attachment.clone()).unwrap();
        }
        assert!(matches!(
            pending.add(attachment),
            Err(AttachmentError::TooMany(_))
        ));
    }

    #[tokio::test]
    async fn load_reads_and_validates_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, png_bytes(4, 4)).unwrap();

        let attachment = ImageAttachment::load(path).await.unwrap();
        assert_eq!(attachment.filename, "pic.png");
        assert_eq!(attachment.mime, "image/png");
    }

    #[tokio::test]
    async fn load_missing_file_is_not_found() {
        let result = ImageAttachment::load(PathBuf::from("/no/such/pic.png")).await;
        assert!(matches!(result, Err(AttachmentError::NotFound(_))));
    }
}
