//! Optional remote matting service.
//!
//! The service is consumed as encode -> send -> decode: the frame goes out as
//! PNG and comes back as an image whose alpha channel is the matte.

use crate::error::{MatteError, Result};
use crate::raster::{AlphaMatte, RasterBuffer};
use image::ImageFormat;
use std::io::Cursor;

/// Request/response contract of an external background-removal service.
/// Transport and authentication live entirely in the implementation.
pub trait RemoteMatting: Send + Sync {
    /// Whether the service is currently reachable.
    fn is_available(&self) -> bool;

    /// Send a PNG-encoded frame, receive an encoded image carrying alpha.
    fn remove_background(&self, png: &[u8]) -> Result<Vec<u8>>;
}

pub fn encode_png(frame: &RasterBuffer) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    frame
        .to_straight()
        .to_rgba_image()
        .write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Decode the service response and take its alpha channel as a matte of
/// `width` x `height`.
pub fn decode_matte(encoded: &[u8], width: u32, height: u32) -> Result<AlphaMatte> {
    let decoded = image::load_from_memory(encoded)?;
    if !decoded.color().has_alpha() {
        return Err(MatteError::RemoteFallbackFailure(
            "response image carries no alpha channel".into(),
        ));
    }
    let rgba = decoded.into_rgba8();
    let (w, h) = rgba.dimensions();
    let alpha: Vec<u8> = rgba.pixels().map(|p| p[3]).collect();
    let matte = AlphaMatte::from_raw(w, h, alpha)?;
    Ok(matte.resize_to(width, height))
}

/// Full round trip through `service`. Every failure is reported as
/// `RemoteFallbackFailure`.
pub fn remote_matte(service: &dyn RemoteMatting, frame: &RasterBuffer) -> Result<AlphaMatte> {
    let _span = tracing::debug_span!("remote_fallback").entered();

    let round_trip = || -> Result<AlphaMatte> {
        let request = encode_png(frame)?;
        let response = service.remove_background(&request)?;
        decode_matte(&response, frame.width(), frame.height())
    };

    round_trip().map_err(|err| match err {
        MatteError::RemoteFallbackFailure(_) => err,
        other => MatteError::RemoteFallbackFailure(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelFormat;

    #[test]
    fn alpha_channel_round_trips() {
        let mut frame = RasterBuffer::new(6, 4, PixelFormat::Rgba8);
        frame.set_rgba(2, 1, [10, 20, 30, 200]);
        let png = encode_png(&frame).unwrap();
        let matte = decode_matte(&png, 6, 4).unwrap();
        assert_eq!(matte.get(2, 1), 200);
        assert_eq!(matte.get(0, 0), 0);
    }

    #[test]
    fn opaque_response_is_rejected() {
        let frame = RasterBuffer::new(3, 3, PixelFormat::Rgb8);
        let mut bytes = Cursor::new(Vec::new());
        frame.to_rgb_image().write_to(&mut bytes, ImageFormat::Png).unwrap();
        let err = decode_matte(bytes.get_ref(), 3, 3).unwrap_err();
        assert!(matches!(err, MatteError::RemoteFallbackFailure(_)));
    }

    #[test]
    fn garbage_response_is_a_remote_failure() {
        struct Garbage;
        impl RemoteMatting for Garbage {
            fn is_available(&self) -> bool {
                true
            }
            fn remove_background(&self, _png: &[u8]) -> Result<Vec<u8>> {
                Ok(vec![1, 2, 3])
            }
        }
        let frame = RasterBuffer::new(3, 3, PixelFormat::Rgb8);
        let err = remote_matte(&Garbage, &frame).unwrap_err();
        assert!(matches!(err, MatteError::RemoteFallbackFailure(_)));
    }
}
