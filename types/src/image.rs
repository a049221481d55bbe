use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Pixel dimensions requested for a single card face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Raw image payload as delivered by a provider.
///
/// The bytes are carried opaquely; decoding and scaling belong to the
/// presentation layer. `size` records what the loader was asked for.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    size: ImageSize,
    bytes: Vec<u8>,
}

impl Bitmap {
    #[must_use]
    pub fn new(size: ImageSize, bytes: Vec<u8>) -> Self {
        Self { size, bytes }
    }

    #[must_use]
    pub fn size(&self) -> ImageSize {
        self.size
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// Image payloads can be large; log only their shape.
impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("size", &self.size)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Handle to something displayable on a card.
///
/// Equality is identity: two refs are the same image only if they point at the
/// same resource id or the same shared bitmap allocation. Cloning a ref keeps
/// its identity.
#[derive(Debug, Clone)]
pub enum ImageRef {
    /// A bundled asset addressed by id (e.g. the card back).
    Resource(u32),
    /// A loaded image shared by both cards of a pair.
    Bitmap(Arc<Bitmap>),
}

impl ImageRef {
    #[must_use]
    pub fn bitmap(bitmap: Bitmap) -> Self {
        Self::Bitmap(Arc::new(bitmap))
    }

    #[must_use]
    pub fn same_image(&self, other: &ImageRef) -> bool {
        match (self, other) {
            (ImageRef::Resource(a), ImageRef::Resource(b)) => a == b,
            (ImageRef::Bitmap(a), ImageRef::Bitmap(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
