use boothmatte::{PixelFormat, RasterBuffer};

/// Square frame of `bg` with a centered `block` x `block` square of `fg`.
pub fn center_block(size: u32, block: u32, fg: [u8; 3], bg: [u8; 3]) -> RasterBuffer {
    assert!(block <= size, "block must fit inside the frame");
    let mut frame = RasterBuffer::filled(size, size, PixelFormat::Rgb8, [bg[0], bg[1], bg[2], 255]);
    let start = (size - block) / 2;
    for y in start..start + block {
        for x in start..start + block {
            frame.set_rgba(x, y, [fg[0], fg[1], fg[2], 255]);
        }
    }
    frame
}

/// Bounds of the centered block as (start, end) exclusive.
pub fn block_bounds(size: u32, block: u32) -> (u32, u32) {
    let start = (size - block) / 2;
    (start, start + block)
}

pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RasterBuffer {
    RasterBuffer::filled(width, height, PixelFormat::Rgb8, [rgb[0], rgb[1], rgb[2], 255])
}
