// crates/voicetuner-media/src/helpers/yuv.rs
//
// YUV420P canvas operations used by the muxer's letterbox step.
//
// The scaler produces the fitted picture; the encoder wants a full
// render-size frame. `fill_black` paints the canvas, `blit` copies the fitted
// picture onto it at an offset, plane by plane, respecting both strides.
// Offsets and sizes must be even so the half-resolution chroma planes line up.

use ffmpeg_the_third::util::frame::video::Video as VideoFrame;

/// Video-range black.
const Y_BLACK:  u8 = 16;
const UV_BLACK: u8 = 128;

/// Paint every visible pixel of a YUV420P frame black.
pub fn fill_black(frame: &mut VideoFrame) {
    let w = frame.width()  as usize;
    let h = frame.height() as usize;
    for (plane, value, pw, ph) in [
        (0, Y_BLACK,  w,     h),
        (1, UV_BLACK, w / 2, h / 2),
        (2, UV_BLACK, w / 2, h / 2),
    ] {
        let stride = frame.stride(plane);
        let data   = frame.data_mut(plane);
        for row in 0..ph {
            data[row * stride .. row * stride + pw].fill(value);
        }
    }
}

/// Copy the top-left `w × h` of `src` into `dst` at `(x, y)`.
///
/// Both frames must be YUV420P; `x`, `y`, `w`, `h` must be even and the
/// rectangle must lie inside `dst`.
pub fn blit(src: &VideoFrame, dst: &mut VideoFrame, w: usize, h: usize, x: usize, y: usize) {
    debug_assert!(x % 2 == 0 && y % 2 == 0 && w % 2 == 0 && h % 2 == 0);
    debug_assert!(x + w <= dst.width() as usize && y + h <= dst.height() as usize);

    for (plane, pw, ph, px, py) in [
        (0, w,     h,     x,     y),
        (1, w / 2, h / 2, x / 2, y / 2),
        (2, w / 2, h / 2, x / 2, y / 2),
    ] {
        let s_stride = src.stride(plane);
        let d_stride = dst.stride(plane);
        let s_data   = src.data(plane);
        let d_data   = dst.data_mut(plane);
        for row in 0..ph {
            let s = row * s_stride;
            let d = (py + row) * d_stride + px;
            d_data[d .. d + pw].copy_from_slice(&s_data[s .. s + pw]);
        }
    }
}
