//! Color types shared by the PPU and its palettes.

/// The size of an RGB pixel in bytes.
pub const RGB_SIZE: usize = 3;

/// The size of an RGBA pixel in bytes.
pub const RGBA_SIZE: usize = 4;

/// Defines the Game Boy pixel type as a buffer of the
/// 3 base RGB colors.
pub type Pixel = [u8; RGB_SIZE];

/// Defines the Game Boy pixel type as a buffer of the
/// 3 base RGB colors plus the alpha channel.
pub type PixelAlpha = [u8; RGBA_SIZE];
