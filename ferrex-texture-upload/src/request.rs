//! Upload requests as producers describe them, and the validated,
//! size-resolved form the render thread acts on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{PixelStoreParams, TextureId};
use crate::format::{PixelFormat, PixelType, bytes_per_pixel};

/// Largest byte count a single upload may resolve to. Graphics APIs take
/// signed 32-bit sizes for sub-image and buffer ranges.
pub const MAX_UPLOAD_BYTES: u64 = i32::MAX as u64;

/// Face of a cube map addressed by a 2D sub-image upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

/// Number of coordinates a sub-image call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimensionality {
    One,
    Two,
    Three,
}

/// Bind target of the destination texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureTarget {
    Texture1D,
    Texture1DArray,
    Texture2D,
    Rectangle,
    CubeMap(CubeFace),
    Texture2DArray,
    CubeMapArray,
    Texture3D,
}

impl TextureTarget {
    pub fn dimensionality(self) -> Dimensionality {
        match self {
            TextureTarget::Texture1D => Dimensionality::One,
            TextureTarget::Texture1DArray
            | TextureTarget::Texture2D
            | TextureTarget::Rectangle
            | TextureTarget::CubeMap(_) => Dimensionality::Two,
            TextureTarget::Texture2DArray
            | TextureTarget::CubeMapArray
            | TextureTarget::Texture3D => Dimensionality::Three,
        }
    }
}

/// Destination box inside one mip level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UploadRegion {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_level: u32,
}

impl UploadRegion {
    /// A full 2D region at the origin of mip 0.
    pub fn rect(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
            ..Self::default()
        }
    }

    pub fn at(mut self, x: u32, y: u32, z: u32) -> Self {
        self.x = x;
        self.y = y;
        self.z = z;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_mip_level(mut self, mip_level: u32) -> Self {
        self.mip_level = mip_level;
        self
    }
}

/// Client-memory layout of the payload. A zero row length or image height
/// means "tightly packed", i.e. the region's width / height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnpackParams {
    pub alignment: u32,
    pub row_length: u32,
    pub image_height: u32,
}

impl Default for UnpackParams {
    fn default() -> Self {
        Self {
            alignment: 4,
            row_length: 0,
            image_height: 0,
        }
    }
}

/// Element type of a [`PixelData`] payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Bytes,
    Shorts,
    Half,
    Float,
}

/// Pixel payload handed over by a producer thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Bytes(Vec<u8>),
    Shorts(Vec<u16>),
    /// IEEE 754 binary16 values stored as raw bits.
    Half(Vec<u16>),
    Float(Vec<f32>),
}

impl PixelData {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PixelData::Bytes(bytes) => bytes,
            PixelData::Shorts(words) | PixelData::Half(words) => {
                bytemuck::cast_slice(words)
            }
            PixelData::Float(floats) => bytemuck::cast_slice(floats),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            PixelData::Bytes(_) => PayloadKind::Bytes,
            PixelData::Shorts(_) => PayloadKind::Shorts,
            PixelData::Half(_) => PayloadKind::Half,
            PixelData::Float(_) => PayloadKind::Float,
        }
    }

    /// Raw bytes can back any type; typed payloads must agree with it.
    fn backs(&self, ty: PixelType) -> bool {
        match self.kind() {
            PayloadKind::Bytes => true,
            PayloadKind::Shorts => ty.is_sixteen_bit(),
            PayloadKind::Half => ty == PixelType::HalfFloat,
            PayloadKind::Float => ty == PixelType::Float,
        }
    }
}

impl From<Vec<u8>> for PixelData {
    fn from(bytes: Vec<u8>) -> Self {
        PixelData::Bytes(bytes)
    }
}

impl From<Vec<f32>> for PixelData {
    fn from(floats: Vec<f32>) -> Self {
        PixelData::Float(floats)
    }
}

/// One pending texture write.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub texture: TextureId,
    pub target: TextureTarget,
    pub region: UploadRegion,
    pub format: PixelFormat,
    pub ty: PixelType,
    pub data: PixelData,
    /// Number of payload bytes the producer declares valid. Defaults to the
    /// payload's full length.
    pub byte_len: usize,
    /// Higher values are uploaded first.
    pub priority: i32,
    pub unpack: UnpackParams,
}

impl UploadRequest {
    pub fn new(
        texture: TextureId,
        target: TextureTarget,
        region: UploadRegion,
        format: PixelFormat,
        ty: PixelType,
        data: impl Into<PixelData>,
    ) -> Self {
        let data = data.into();
        let byte_len = data.byte_len();
        Self {
            texture,
            target,
            region,
            format,
            ty,
            data,
            byte_len,
            priority: 0,
            unpack: UnpackParams::default(),
        }
    }

    /// Tightly packed RGBA8 upload covering `width`x`height` of mip 0.
    pub fn rgba8(
        texture: TextureId,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Self {
        Self::new(
            texture,
            TextureTarget::Texture2D,
            UploadRegion::rect(width, height),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            pixels,
        )
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_unpack(mut self, unpack: UnpackParams) -> Self {
        self.unpack = unpack;
        self
    }

    pub fn with_byte_len(mut self, byte_len: usize) -> Self {
        self.byte_len = byte_len;
        self
    }
}

/// Why a request was dropped before upload. Rejected requests are counted
/// and never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("texture id must be non-zero")]
    InvalidTexture,

    #[error("payload is empty")]
    EmptyData,

    #[error("declared length {declared} exceeds payload of {actual} bytes")]
    DeclaredLengthExceedsPayload { declared: usize, actual: usize },

    #[error("region {width}x{height}x{depth} has a zero extent")]
    EmptyRegion { width: u32, height: u32, depth: u32 },

    #[error("region extent does not fit a {0:?} target")]
    DimensionalityMismatch(TextureTarget),

    #[error("unpack alignment {0} is not one of 1, 2, 4, 8")]
    InvalidAlignment(u32),

    #[error("row length {row_length} is smaller than width {width}")]
    RowLengthTooSmall { row_length: u32, width: u32 },

    #[error("image height {image_height} is smaller than height {height}")]
    ImageHeightTooSmall { image_height: u32, height: u32 },

    #[error(
        "row stride of {row_bytes} bytes is not a multiple of unpack \
         alignment {alignment}"
    )]
    UnalignedRowStride { row_bytes: u64, alignment: u32 },

    #[error("{format:?}/{ty:?} is not a valid unpack layout")]
    UnsupportedFormat { format: PixelFormat, ty: PixelType },

    #[error("{payload:?} payload cannot back {ty:?} pixels")]
    PayloadTypeMismatch { payload: PayloadKind, ty: PixelType },

    #[error("upload of {0} bytes exceeds the 32-bit size limit")]
    TooLarge(u64),

    #[error("upload needs {required} bytes but only {available} supplied")]
    InsufficientData { required: u64, available: usize },

    #[error("upload of {required} bytes exceeds the {limit} byte frame cap")]
    ExceedsFrameBudget { required: u64, limit: u64 },
}

/// A request that passed validation, with its byte count resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedUpload {
    request: UploadRequest,
    byte_count: usize,
    row_length: u32,
    image_height: u32,
}

impl PreparedUpload {
    pub fn request(&self) -> &UploadRequest {
        &self.request
    }

    pub fn into_request(self) -> UploadRequest {
        self.request
    }

    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    pub fn row_length(&self) -> u32 {
        self.row_length
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    pub fn priority(&self) -> i32 {
        self.request.priority
    }

    /// Exactly the bytes the upload reads.
    pub fn bytes(&self) -> &[u8] {
        &self.request.data.as_bytes()[..self.byte_count]
    }

    /// Pixel-store state matching the resolved layout.
    pub fn pixel_store(&self) -> PixelStoreParams {
        PixelStoreParams {
            alignment: self.request.unpack.alignment,
            row_length: self.row_length,
            image_height: self.image_height,
        }
    }
}

/// Validate `request` and compute the number of bytes its upload reads:
/// `row_length * image_height * depth * bytes_per_pixel`.
pub fn prepare(request: UploadRequest) -> Result<PreparedUpload, RejectReason> {
    if request.texture.0 == 0 {
        return Err(RejectReason::InvalidTexture);
    }

    let available = request.data.byte_len();
    if available == 0 || request.byte_len == 0 {
        return Err(RejectReason::EmptyData);
    }
    if request.byte_len > available {
        return Err(RejectReason::DeclaredLengthExceedsPayload {
            declared: request.byte_len,
            actual: available,
        });
    }

    let region = request.region;
    if region.width == 0 || region.height == 0 || region.depth == 0 {
        return Err(RejectReason::EmptyRegion {
            width: region.width,
            height: region.height,
            depth: region.depth,
        });
    }

    let fits_target = match request.target.dimensionality() {
        Dimensionality::One => region.height == 1 && region.depth == 1,
        Dimensionality::Two => region.depth == 1,
        Dimensionality::Three => true,
    };
    if !fits_target {
        return Err(RejectReason::DimensionalityMismatch(request.target));
    }

    let unpack = request.unpack;
    if !matches!(unpack.alignment, 1 | 2 | 4 | 8) {
        return Err(RejectReason::InvalidAlignment(unpack.alignment));
    }

    let row_length = if unpack.row_length == 0 {
        region.width
    } else {
        unpack.row_length
    };
    if row_length < region.width {
        return Err(RejectReason::RowLengthTooSmall {
            row_length,
            width: region.width,
        });
    }

    let image_height = if unpack.image_height == 0 {
        region.height
    } else {
        unpack.image_height
    };
    if image_height < region.height {
        return Err(RejectReason::ImageHeightTooSmall {
            image_height,
            height: region.height,
        });
    }

    let pixel_bytes = bytes_per_pixel(request.format, request.ty).ok_or(
        RejectReason::UnsupportedFormat {
            format: request.format,
            ty: request.ty,
        },
    )?;

    if !request.data.backs(request.ty) {
        return Err(RejectReason::PayloadTypeMismatch {
            payload: request.data.kind(),
            ty: request.ty,
        });
    }

    // The driver pads every row to the unpack alignment. Only tightly
    // aligned strides keep the read inside the counted bytes.
    let row_bytes = u64::from(row_length) * u64::from(pixel_bytes);
    let multi_row = region.height > 1 || region.depth > 1;
    if multi_row && row_bytes % u64::from(unpack.alignment) != 0 {
        return Err(RejectReason::UnalignedRowStride {
            row_bytes,
            alignment: unpack.alignment,
        });
    }

    let required = u64::from(row_length)
        .checked_mul(u64::from(image_height))
        .and_then(|v| v.checked_mul(u64::from(region.depth)))
        .and_then(|v| v.checked_mul(u64::from(pixel_bytes)))
        .unwrap_or(u64::MAX);
    if required > MAX_UPLOAD_BYTES {
        return Err(RejectReason::TooLarge(required));
    }
    if required > request.byte_len as u64 {
        return Err(RejectReason::InsufficientData {
            required,
            available: request.byte_len,
        });
    }

    Ok(PreparedUpload {
        request,
        byte_count: required as usize,
        row_length,
        image_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(width: u32, height: u32, len: usize) -> UploadRequest {
        UploadRequest::rgba8(TextureId(7), width, height, vec![0u8; len])
    }

    #[test]
    fn byte_count_uses_resolved_layout() {
        let request = UploadRequest::new(
            TextureId(1),
            TextureTarget::Texture3D,
            UploadRegion::rect(4, 3).with_depth(2),
            PixelFormat::Rgb,
            PixelType::Float,
            vec![0f32; 6 * 5 * 2 * 3],
        )
        .with_unpack(UnpackParams {
            alignment: 4,
            row_length: 6,
            image_height: 5,
        });

        let prepared = prepare(request).expect("valid request");
        assert_eq!(prepared.byte_count(), 6 * 5 * 2 * 12);
        assert_eq!(prepared.row_length(), 6);
        assert_eq!(prepared.image_height(), 5);
        assert_eq!(prepared.bytes().len(), prepared.byte_count());
    }

    #[test]
    fn tight_packing_resolves_to_region() {
        let prepared = prepare(rgba(8, 2, 64)).expect("valid request");
        assert_eq!(prepared.byte_count(), 64);
        assert_eq!(prepared.pixel_store().row_length, 8);
        assert_eq!(prepared.pixel_store().image_height, 2);
    }

    #[test]
    fn short_payload_is_rejected() {
        assert_eq!(
            prepare(rgba(8, 2, 63)).unwrap_err(),
            RejectReason::InsufficientData {
                required: 64,
                available: 63
            }
        );
    }

    #[test]
    fn declared_length_limits_available_bytes() {
        let request = rgba(8, 2, 128).with_byte_len(32);
        assert!(matches!(
            prepare(request),
            Err(RejectReason::InsufficientData { required: 64, .. })
        ));
        let request = rgba(8, 2, 16).with_byte_len(32);
        assert!(matches!(
            prepare(request),
            Err(RejectReason::DeclaredLengthExceedsPayload { .. })
        ));
    }

    #[test]
    fn rejects_bad_ids_regions_and_layouts() {
        let mut request = rgba(4, 4, 64);
        request.texture = TextureId(0);
        assert_eq!(prepare(request).unwrap_err(), RejectReason::InvalidTexture);

        assert_eq!(
            prepare(rgba(4, 4, 0)).unwrap_err(),
            RejectReason::EmptyData
        );

        assert!(matches!(
            prepare(rgba(0, 4, 64)),
            Err(RejectReason::EmptyRegion { .. })
        ));

        let request = rgba(4, 4, 64).with_unpack(UnpackParams {
            alignment: 4,
            row_length: 2,
            image_height: 0,
        });
        assert!(matches!(
            prepare(request),
            Err(RejectReason::RowLengthTooSmall { .. })
        ));

        let request = rgba(4, 4, 64).with_unpack(UnpackParams {
            alignment: 3,
            ..UnpackParams::default()
        });
        assert_eq!(
            prepare(request).unwrap_err(),
            RejectReason::InvalidAlignment(3)
        );

        let mut request = rgba(4, 4, 64);
        request.region.depth = 2;
        assert!(matches!(
            prepare(request),
            Err(RejectReason::DimensionalityMismatch(TextureTarget::Texture2D))
        ));
    }

    fn rgb8(width: u32, height: u32, unpack: UnpackParams) -> UploadRequest {
        UploadRequest::new(
            TextureId(5),
            TextureTarget::Texture2D,
            UploadRegion::rect(width, height),
            PixelFormat::Rgb,
            PixelType::UnsignedByte,
            vec![0u8; (width * height * 3) as usize],
        )
        .with_unpack(unpack)
    }

    #[test]
    fn padded_rows_are_rejected() {
        assert_eq!(
            prepare(rgb8(3, 3, UnpackParams::default())).unwrap_err(),
            RejectReason::UnalignedRowStride {
                row_bytes: 9,
                alignment: 4,
            }
        );

        let byte_aligned = UnpackParams {
            alignment: 1,
            ..UnpackParams::default()
        };
        let prepared = prepare(rgb8(3, 3, byte_aligned)).expect("tight rows");
        assert_eq!(prepared.byte_count(), 27);
        assert_eq!(prepared.pixel_store().alignment, 1);

        // A single row never reaches the padding.
        let prepared = prepare(rgb8(3, 1, UnpackParams::default()))
            .expect("single row");
        assert_eq!(prepared.byte_count(), 9);

        // Four RGB8 pixels make a 12 byte stride, already 4-aligned.
        let prepared = prepare(rgb8(4, 2, UnpackParams::default()))
            .expect("aligned stride");
        assert_eq!(prepared.byte_count(), 24);
    }

    #[test]
    fn typed_payload_must_match_pixel_type() {
        let request = UploadRequest::new(
            TextureId(3),
            TextureTarget::Texture2D,
            UploadRegion::rect(2, 2),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            vec![0f32; 16],
        );
        assert!(matches!(
            prepare(request),
            Err(RejectReason::PayloadTypeMismatch { .. })
        ));

        let request = UploadRequest::new(
            TextureId(3),
            TextureTarget::Texture2D,
            UploadRegion::rect(2, 2),
            PixelFormat::Rgba,
            PixelType::HalfFloat,
            PixelData::Half(vec![0u16; 16]),
        );
        assert_eq!(prepare(request).expect("half payload").byte_count(), 32);
    }

    #[test]
    fn oversized_uploads_are_rejected() {
        let request = UploadRequest::new(
            TextureId(3),
            TextureTarget::Texture3D,
            UploadRegion::rect(65_536, 65_536).with_depth(2),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            vec![0u8; 16],
        );
        assert!(matches!(prepare(request), Err(RejectReason::TooLarge(_))));
    }
}
