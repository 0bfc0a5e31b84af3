use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use pixseek_application::{ApplicationError, PreviewStore};
use pixseek_domain::{PreviewImage, PreviewTicket, SelectedImage};

/// Decodes image bytes into straight RGBA via the image crate.
pub fn decode_rgba(bytes: &[u8]) -> Result<PreviewImage, ApplicationError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|error| ApplicationError::Decode(error.to_string()))?;
    let rgba = decoded.to_rgba8();
    Ok(PreviewImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

/// In-memory preview store: one decoded image per live ticket. The session
/// pairs every acquire with one release, so the map holds at most one entry
/// in normal operation.
#[derive(Default)]
pub struct DecodedPreviewStore {
    next_ticket: AtomicU64,
    live: Mutex<HashMap<u64, PreviewImage>>,
}

impl DecodedPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreviewStore for DecodedPreviewStore {
    fn acquire(&self, image: &SelectedImage) -> Result<PreviewTicket, ApplicationError> {
        let preview = decode_rgba(&image.bytes)?;
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let mut live = self
            .live
            .lock()
            .map_err(|_| ApplicationError::Io("preview store lock poisoned".to_string()))?;
        live.insert(ticket, preview);
        Ok(PreviewTicket::new(ticket))
    }

    fn release(&self, ticket: PreviewTicket) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&ticket.get());
        }
    }

    fn preview(&self, ticket: PreviewTicket) -> Option<PreviewImage> {
        self.live
            .lock()
            .ok()
            .and_then(|live| live.get(&ticket.get()).cloned())
    }

    fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use image::codecs::png::PngEncoder;
    use image::{ColorType, ImageEncoder};
    use pixseek_domain::ImageFormat;

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let raw = vec![200_u8; (width * height * 4) as usize];
        let mut encoded = Vec::new();
        PngEncoder::new(&mut encoded)
            .write_image(&raw, width, height, ColorType::Rgba8)
            .expect("encode png");
        encoded
    }

    #[test]
    fn acquire_decodes_and_release_forgets() {
        let store = DecodedPreviewStore::new();
        let image = SelectedImage::new("a.png", ImageFormat::Png, png_bytes(3, 2));

        let ticket = store.acquire(&image).expect("acquire");
        assert_eq!(store.live_count(), 1);

        let preview = store.preview(ticket).expect("preview is live");
        assert_eq!((preview.width, preview.height), (3, 2));
        assert_eq!(preview.rgba.len(), 3 * 2 * 4);

        store.release(ticket);
        assert_eq!(store.live_count(), 0);
        assert!(store.preview(ticket).is_none());
    }

    #[test]
    fn undecodable_bytes_do_not_acquire_a_ticket() {
        let store = DecodedPreviewStore::new();
        let image = SelectedImage::new("junk.png", ImageFormat::Png, vec![0, 1, 2, 3]);

        let result = store.acquire(&image);
        assert!(matches!(result, Err(ApplicationError::Decode(_))));
        assert_eq!(store.live_count(), 0);
    }
}
