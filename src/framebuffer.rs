//! Framebuffer capture: parse the fixed binary header the `framebuffer:`
//! service sends, read the raw pixel buffer, and decode it into an RGBA
//! image.

use crate::error::{AdbError, Result};
use crate::wire;
use image::RgbaImage;
use log::*;
use tokio::io::{AsyncRead, AsyncReadExt};

/// The only framebuffer protocol version this client understands.
const FRAMEBUFFER_VERSION: u32 = 2;

/// Bit offset and bit length of one color channel.
type Channel = (u32, u32);

/// Pixel geometry and channel layout, as sent on the wire.
#[derive(Debug, Clone)]
pub(crate) struct FramebufferHeader {
    pub bpp: u32,
    #[allow(dead_code)]
    pub colorspace: u32,
    pub size: u32,
    pub width: u32,
    pub height: u32,
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
    pub alpha: Channel,
}

impl FramebufferHeader {
    /// Read the header fields, all little-endian u32. The channel pairs
    /// arrive in wire order R, B, G, A.
    pub(crate) async fn read<S>(stream: &mut S) -> Result<Self>
    where
        S: AsyncRead + Unpin,
    {
        let version = stream.read_u32_le().await?;
        if version != FRAMEBUFFER_VERSION {
            return Err(AdbError::protocol(format!(
                "unsupported framebuffer version {} (expected {})",
                version, FRAMEBUFFER_VERSION
            )));
        }

        let bpp = stream.read_u32_le().await?;
        let colorspace = stream.read_u32_le().await?;
        let size = stream.read_u32_le().await?;
        let width = stream.read_u32_le().await?;
        let height = stream.read_u32_le().await?;
        let red = read_channel(stream).await?;
        let blue = read_channel(stream).await?;
        let green = read_channel(stream).await?;
        let alpha = read_channel(stream).await?;

        if width == 0 || height == 0 {
            return Err(AdbError::protocol(format!(
                "framebuffer has degenerate dimensions {}x{}",
                width, height
            )));
        }

        Ok(Self {
            bpp,
            colorspace,
            size,
            width,
            height,
            red,
            green,
            blue,
            alpha,
        })
    }
}

async fn read_channel<S>(stream: &mut S) -> Result<Channel>
where
    S: AsyncRead + Unpin,
{
    let offset = stream.read_u32_le().await?;
    let length = stream.read_u32_le().await?;
    Ok((offset, length))
}

/// The pixel formats the framebuffer service is known to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    Rgba8888,
    /// RGBA layout with no alpha bits on the wire; decoded alpha is forced
    /// fully opaque.
    Rgbx8888,
    Rgb888,
    Bgr565,
    Bgra8888,
}

impl PixelFormat {
    /// Fixed dispatch over the known (depth, channel layout) tuples. An
    /// unmatched tuple is rejected, never guessed at.
    fn detect(header: &FramebufferHeader) -> Result<Self> {
        let key = (
            header.bpp,
            header.red,
            header.green,
            header.blue,
            header.alpha,
        );
        match key {
            (32, (0, 8), (8, 8), (16, 8), (24, 8)) => Ok(PixelFormat::Rgba8888),
            (32, (0, 8), (8, 8), (16, 8), (24, 0)) => Ok(PixelFormat::Rgbx8888),
            (24, (0, 8), (8, 8), (16, 8), (0, 0)) => Ok(PixelFormat::Rgb888),
            (16, (11, 5), (5, 6), (0, 5), (0, 0)) => Ok(PixelFormat::Bgr565),
            (32, (16, 8), (8, 8), (0, 8), (24, 8)) => Ok(PixelFormat::Bgra8888),
            _ => Err(AdbError::protocol(format!(
                "unsupported framebuffer format: {} bpp, r{:?} g{:?} b{:?} a{:?}",
                header.bpp, header.red, header.green, header.blue, header.alpha
            ))),
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb888 => 3,
            PixelFormat::Bgr565 => 2,
            _ => 4,
        }
    }
}

/// Read one framebuffer capture and decode it.
pub(crate) async fn read_image<S>(stream: &mut S) -> Result<RgbaImage>
where
    S: AsyncRead + Unpin,
{
    let header = FramebufferHeader::read(stream).await?;
    let format = PixelFormat::detect(&header)?;
    debug!(
        "framebuffer: {}x{} at {} bpp, {:?}, {} bytes",
        header.width, header.height, header.bpp, format, header.size
    );
    let pixels = wire::read_exact(stream, header.size as usize).await?;
    decode(&header, format, &pixels)
}

fn decode(header: &FramebufferHeader, format: PixelFormat, pixels: &[u8]) -> Result<RgbaImage> {
    let (width, height) = (header.width, header.height);
    let expected = width as usize * height as usize * format.bytes_per_pixel();
    if pixels.len() < expected {
        return Err(AdbError::protocol(format!(
            "framebuffer truncated: {} bytes for {}x{} at {} bpp",
            pixels.len(),
            width,
            height,
            header.bpp
        )));
    }
    let pixels = &pixels[..expected];

    let data = match format {
        PixelFormat::Rgba8888 => pixels.to_vec(),
        PixelFormat::Rgbx8888 => {
            let mut data = pixels.to_vec();
            for px in data.chunks_exact_mut(4) {
                px[3] = 0xff;
            }
            data
        }
        PixelFormat::Rgb888 => {
            let mut data = Vec::with_capacity(expected / 3 * 4);
            for px in pixels.chunks_exact(3) {
                data.extend_from_slice(&[px[0], px[1], px[2], 0xff]);
            }
            data
        }
        PixelFormat::Bgra8888 => {
            let mut data = Vec::with_capacity(expected);
            for px in pixels.chunks_exact(4) {
                data.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
            }
            data
        }
        PixelFormat::Bgr565 => {
            let mut data = Vec::with_capacity(expected * 2);
            for px in pixels.chunks_exact(2) {
                let value = u16::from_le_bytes([px[0], px[1]]);
                let r = ((value >> 11) & 0x1f) as u8;
                let g = ((value >> 5) & 0x3f) as u8;
                let b = (value & 0x1f) as u8;
                data.extend_from_slice(&[
                    (r << 3) | (r >> 2),
                    (g << 2) | (g >> 4),
                    (b << 3) | (b >> 2),
                    0xff,
                ]);
            }
            data
        }
    };

    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| AdbError::protocol("framebuffer pixel buffer does not match its geometry"))
}
