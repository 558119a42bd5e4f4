// crates/voicetuner-core/src/helpers/geometry.rs
//
// Output frame sizing for the muxer.
//
// The configured render size is the size of the *displayed* frame. When the
// source carries a quarter-turn display matrix the players rotate the coded
// frame before showing it, so the coded size must be the configured size with
// width and height swapped.

use crate::timeline::VideoTransform;

/// Coded (encoder) size for a displayed `width × height` box under `transform`.
///
/// ```
/// use voicetuner_core::timeline::VideoTransform;
/// use voicetuner_core::helpers::geometry::coded_size;
/// assert_eq!(coded_size(480, 640, &VideoTransform::IDENTITY), (480, 640));
/// assert_eq!(coded_size(480, 640, &VideoTransform::from_rotation(90.0)), (640, 480));
/// ```
pub fn coded_size(width: u32, height: u32, transform: &VideoTransform) -> (u32, u32) {
    if transform.is_quarter_turn() { (height, width) } else { (width, height) }
}

/// Round down to the nearest even value; yuv420p needs even dimensions.
pub fn even(v: u32) -> u32 { (v & !1).max(2) }

/// Scale `src_w × src_h` to fit inside `dst_w × dst_h` preserving aspect,
/// returning the fitted size and the top-left offset that centres it.
/// The remaining border is letterbox/pillarbox padding.
pub fn fit_inside(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32, u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (dst_w, dst_h, 0, 0);
    }
    let scale = (dst_w as f64 / src_w as f64).min(dst_h as f64 / src_h as f64);
    let w = even(((src_w as f64 * scale).round() as u32).min(dst_w));
    let h = even(((src_h as f64 * scale).round() as u32).min(dst_h));
    let x = ((dst_w - w) / 2) & !1;
    let y = ((dst_h - h) / 2) & !1;
    (w, h, x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_source_is_letterboxed_into_portrait_box() {
        let (w, h, x, y) = fit_inside(1920, 1080, 480, 640);
        assert_eq!((w, h), (480, 270));
        assert_eq!(x, 0);
        assert_eq!(y, 184);
    }

    #[test]
    fn matching_aspect_fills_the_box() {
        assert_eq!(fit_inside(960, 1280, 480, 640), (480, 640, 0, 0));
    }

    #[test]
    fn half_turn_keeps_size() {
        assert_eq!(coded_size(480, 640, &VideoTransform::from_rotation(180.0)), (480, 640));
    }
}
