//! Binary codec for module images

use super::{ByteOrder, CodecError, ImageCodec, ModuleImage};

/// Binary image codec in either word byte order
pub struct BinaryCodec {
    order: ByteOrder,
}

impl BinaryCodec {
    /// Create a binary codec
    pub fn new(order: ByteOrder) -> Self {
        Self { order }
    }
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Self::new(ByteOrder::Big)
    }
}

impl ImageCodec for BinaryCodec {
    fn decode(&self, input: &[u8]) -> Result<ModuleImage, CodecError> {
        let image = ModuleImage::from_bytes(input)?;
        match self.order {
            ByteOrder::Big => Ok(image),
            ByteOrder::Little => ModuleImage::from_bytes(&image.swapped_bytes()),
        }
    }

    fn encode(&self, image: &ModuleImage) -> Vec<u8> {
        match self.order {
            ByteOrder::Big => image.as_bytes().to_vec(),
            ByteOrder::Little => image.swapped_bytes().to_vec(),
        }
    }
}
