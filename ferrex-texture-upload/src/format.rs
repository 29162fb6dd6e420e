//! Client pixel formats and component types, and the per-pixel byte size the
//! graphics API assumes when it reads an unpack source.

use serde::{Deserialize, Serialize};

/// Layout of the components in client memory (the *unsized* format of a
/// sub-image call, not the texture's internal format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    RedInteger,
    RgInteger,
    RgbInteger,
    BgrInteger,
    RgbaInteger,
    BgraInteger,
    DepthComponent,
    DepthStencil,
    StencilIndex,
}

impl PixelFormat {
    /// Number of components one pixel of this format carries.
    pub fn components(self) -> u32 {
        match self {
            PixelFormat::Red
            | PixelFormat::RedInteger
            | PixelFormat::DepthComponent
            | PixelFormat::StencilIndex => 1,
            PixelFormat::Rg
            | PixelFormat::RgInteger
            | PixelFormat::DepthStencil => 2,
            PixelFormat::Rgb
            | PixelFormat::Bgr
            | PixelFormat::RgbInteger
            | PixelFormat::BgrInteger => 3,
            PixelFormat::Rgba
            | PixelFormat::Bgra
            | PixelFormat::RgbaInteger
            | PixelFormat::BgraInteger => 4,
        }
    }
}

/// Storage type of each component, or of the whole pixel for packed types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    UnsignedByte,
    Byte,
    UnsignedShort,
    Short,
    UnsignedInt,
    Int,
    HalfFloat,
    Float,
    UnsignedShort565,
    UnsignedShort4444,
    UnsignedShort5551,
    UnsignedInt8888,
    UnsignedInt1010102,
    UnsignedInt248,
    UnsignedInt10F11F11FRev,
    UnsignedInt5999Rev,
    Float32UnsignedInt248Rev,
}

impl PixelType {
    /// `Some((pixel_bytes, components))` when the type packs a whole pixel
    /// into one value.
    fn packed(self) -> Option<(u32, u32)> {
        match self {
            PixelType::UnsignedShort565 => Some((2, 3)),
            PixelType::UnsignedShort4444 | PixelType::UnsignedShort5551 => {
                Some((2, 4))
            }
            PixelType::UnsignedInt8888 | PixelType::UnsignedInt1010102 => {
                Some((4, 4))
            }
            PixelType::UnsignedInt248 => Some((4, 2)),
            PixelType::UnsignedInt10F11F11FRev
            | PixelType::UnsignedInt5999Rev => Some((4, 3)),
            PixelType::Float32UnsignedInt248Rev => Some((8, 2)),
            _ => None,
        }
    }

    /// Size of a single component for non-packed types.
    fn component_bytes(self) -> Option<u32> {
        match self {
            PixelType::UnsignedByte | PixelType::Byte => Some(1),
            PixelType::UnsignedShort
            | PixelType::Short
            | PixelType::HalfFloat => Some(2),
            PixelType::UnsignedInt | PixelType::Int | PixelType::Float => {
                Some(4)
            }
            _ => None,
        }
    }

    pub fn is_packed(self) -> bool {
        self.packed().is_some()
    }

    /// Whether a payload of 16-bit words can back this type.
    pub fn is_sixteen_bit(self) -> bool {
        matches!(
            self,
            PixelType::UnsignedShort
                | PixelType::Short
                | PixelType::HalfFloat
                | PixelType::UnsignedShort565
                | PixelType::UnsignedShort4444
                | PixelType::UnsignedShort5551
        )
    }
}

/// Bytes one pixel occupies in client memory, or `None` when the combination
/// is not a legal unpack layout (a packed type paired with a format whose
/// component count it does not encode).
pub fn bytes_per_pixel(format: PixelFormat, ty: PixelType) -> Option<u32> {
    if let Some((bytes, components)) = ty.packed() {
        return (format.components() == components).then_some(bytes);
    }
    ty.component_bytes().map(|size| size * format.components())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_types_scale_with_format() {
        assert_eq!(
            bytes_per_pixel(PixelFormat::Rgba, PixelType::UnsignedByte),
            Some(4)
        );
        assert_eq!(
            bytes_per_pixel(PixelFormat::Rgb, PixelType::Float),
            Some(12)
        );
        assert_eq!(
            bytes_per_pixel(PixelFormat::Rg, PixelType::HalfFloat),
            Some(4)
        );
        assert_eq!(
            bytes_per_pixel(PixelFormat::RedInteger, PixelType::Int),
            Some(4)
        );
    }

    #[test]
    fn packed_types_need_matching_component_count() {
        assert_eq!(
            bytes_per_pixel(PixelFormat::Rgb, PixelType::UnsignedShort565),
            Some(2)
        );
        assert_eq!(
            bytes_per_pixel(PixelFormat::Rgba, PixelType::UnsignedShort565),
            None
        );
        assert_eq!(
            bytes_per_pixel(
                PixelFormat::DepthStencil,
                PixelType::Float32UnsignedInt248Rev
            ),
            Some(8)
        );
        assert_eq!(
            bytes_per_pixel(PixelFormat::Bgra, PixelType::UnsignedInt8888),
            Some(4)
        );
    }
}
