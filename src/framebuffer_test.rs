use crate::error::AdbError;
use crate::framebuffer;
use tokio::io::AsyncWriteExt;

type Channel = (u32, u32);

/// Header bytes for one capture; channel pairs in wire order R, B, G, A.
fn header(
    version: u32,
    bpp: u32,
    size: u32,
    width: u32,
    height: u32,
    red: Channel,
    blue: Channel,
    green: Channel,
    alpha: Channel,
) -> Vec<u8> {
    let fields = [
        version, bpp, 0, size, width, height, red.0, red.1, blue.0, blue.1, green.0, green.1,
        alpha.0, alpha.1,
    ];
    fields.iter().flat_map(|v| v.to_le_bytes()).collect()
}

async fn decode(header_bytes: Vec<u8>, pixels: Vec<u8>) -> crate::Result<image::RgbaImage> {
    let (mut near, mut server) = tokio::io::duplex(1 << 16);
    server.write_all(&header_bytes).await.unwrap();
    server.write_all(&pixels).await.unwrap();
    drop(server);
    framebuffer::read_image(&mut near).await
}

#[tokio::test]
async fn decodes_rgba_8888() {
    let bytes = header(2, 32, 8, 2, 1, (0, 8), (16, 8), (8, 8), (24, 8));
    let image = decode(bytes, vec![10, 20, 30, 40, 50, 60, 70, 80]).await.unwrap();

    assert_eq!(image.dimensions(), (2, 1));
    assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 40]);
    assert_eq!(image.get_pixel(1, 0).0, [50, 60, 70, 80]);
}

#[tokio::test]
async fn rgbx_8888_forces_opaque_alpha() {
    let bytes = header(2, 32, 4, 1, 1, (0, 8), (16, 8), (8, 8), (24, 0));
    let image = decode(bytes, vec![10, 20, 30, 7]).await.unwrap();

    assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 255]);
}

#[tokio::test]
async fn decodes_rgb_888() {
    let bytes = header(2, 24, 6, 2, 1, (0, 8), (16, 8), (8, 8), (0, 0));
    let image = decode(bytes, vec![1, 2, 3, 4, 5, 6]).await.unwrap();

    assert_eq!(image.get_pixel(0, 0).0, [1, 2, 3, 255]);
    assert_eq!(image.get_pixel(1, 0).0, [4, 5, 6, 255]);
}

#[tokio::test]
async fn decodes_bgr_565() {
    let bytes = header(2, 16, 4, 2, 1, (11, 5), (0, 5), (5, 6), (0, 0));
    // 0xF800 is pure red, 0x07E0 pure green, little-endian on the wire.
    let image = decode(bytes, vec![0x00, 0xF8, 0xE0, 0x07]).await.unwrap();

    assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
    assert_eq!(image.get_pixel(1, 0).0, [0, 255, 0, 255]);
}

#[tokio::test]
async fn decodes_bgra_8888() {
    let bytes = header(2, 32, 4, 1, 1, (16, 8), (0, 8), (8, 8), (24, 8));
    let image = decode(bytes, vec![10, 20, 30, 40]).await.unwrap();

    // Wire order blue, green, red, alpha.
    assert_eq!(image.get_pixel(0, 0).0, [30, 20, 10, 40]);
}

#[tokio::test]
async fn unknown_channel_layout_is_rejected() {
    let bytes = header(2, 32, 4, 1, 1, (3, 7), (16, 8), (8, 8), (24, 8));

    match decode(bytes, vec![0; 4]).await {
        Err(AdbError::Protocol(message)) => {
            assert!(message.contains("unsupported framebuffer format"))
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn unsupported_version_is_rejected() {
    let bytes = header(1, 32, 4, 1, 1, (0, 8), (16, 8), (8, 8), (24, 8));

    match decode(bytes, vec![0; 4]).await {
        Err(AdbError::Protocol(message)) => assert!(message.contains("version")),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn truncated_pixel_buffer_is_rejected() {
    // Declares a 2x1 RGBA image but only ships 4 of the 8 bytes.
    let bytes = header(2, 32, 4, 2, 1, (0, 8), (16, 8), (8, 8), (24, 8));

    match decode(bytes, vec![0; 4]).await {
        Err(AdbError::Protocol(message)) => assert!(message.contains("truncated")),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn degenerate_dimensions_are_rejected() {
    let bytes = header(2, 32, 0, 0, 1, (0, 8), (16, 8), (8, 8), (24, 8));

    assert!(matches!(
        decode(bytes, Vec::new()).await,
        Err(AdbError::Protocol(_))
    ));
}
