//! Alpha compositing for preview images.

use image::{Rgba, RgbaImage};

/// Composite `top` over `base` ("source over"), both the same size.
///
/// Pixels outside the overlap are left untouched.
pub fn alpha_over(base: &mut RgbaImage, top: &RgbaImage) {
    let width = base.width().min(top.width());
    let height = base.height().min(top.height());
    for y in 0..height {
        for x in 0..width {
            let src = top.get_pixel(x, y);
            if src[3] == 0 {
                continue;
            }
            let dst = base.get_pixel(x, y);
            let out = over(src, dst);
            base.put_pixel(x, y, out);
        }
    }
}

/// Porter-Duff source over destination.
pub fn over(src: &Rgba<u8>, dst: &Rgba<u8>) -> Rgba<u8> {
    let src_alpha = src[3] as f32 / 255.0;
    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);
    if out_alpha == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |s: u8, d: u8| -> u8 {
        let s = s as f32 / 255.0;
        let d = d as f32 / 255.0;
        let result = (s * src_alpha + d * dst_alpha * (1.0 - src_alpha)) / out_alpha;
        (result.clamp(0.0, 1.0) * 255.0).round() as u8
    };

    Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}
