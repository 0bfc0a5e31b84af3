/// Handle to one decoded preview held by a preview store. The session owns
/// at most one live ticket; every acquire is paired with exactly one release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewTicket(u64);

impl PreviewTicket {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Decoded RGBA pixels for on-screen preview, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}
