//! Local pixel work: cropping the top layer and flattening a stack for export.

use std::io::Cursor;

use image::{
    DynamicImage, ImageOutputFormat, Rgba, RgbaImage,
    imageops::{self, FilterType},
};
use thiserror::Error;

use crate::{
    layer::{Layer, MAX_OPACITY},
    types::{CropRect, ImageBlob},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("could not encode image: {0}")]
    Encode(String),
    #[error("crop rectangle {0:?} does not overlap the image")]
    EmptyCrop(CropRect),
    #[error("nothing to flatten")]
    NoLayers,
}

/// Crops `blob` to `rect`, clamped to the image bounds, and re-encodes as PNG.
pub fn crop(blob: &ImageBlob, rect: CropRect) -> Result<ImageBlob, RasterError> {
    let src = decode(blob)?;
    let (w, h) = src.dimensions();

    let x = rect.x.min(w);
    let y = rect.y.min(h);
    let width = rect.width.min(w - x);
    let height = rect.height.min(h - y);
    if width == 0 || height == 0 {
        return Err(RasterError::EmptyCrop(rect));
    }

    let out = imageops::crop_imm(&src, x, y, width, height).to_image();
    encode_png(out)
}

/// Composites visible layers bottom-to-top onto a canvas sized like layer 0.
///
/// Layers of a different size are stretched to the canvas, matching how the
/// editor previews them.
pub fn flatten(layers: &[Layer]) -> Result<ImageBlob, RasterError> {
    let base = layers.first().ok_or(RasterError::NoLayers)?;
    let base_img = decode(&base.image)?;
    let (w, h) = base_img.dimensions();
    let mut canvas = RgbaImage::new(w, h);

    for (idx, layer) in layers.iter().enumerate() {
        if !layer.is_visible || layer.opacity == 0 {
            continue;
        }

        let mut img = if idx == 0 {
            base_img.clone()
        } else {
            decode(&layer.image)?
        };
        if img.dimensions() != (w, h) {
            img = imageops::resize(&img, w, h, FilterType::Triangle);
        }

        let opacity = f32::from(layer.opacity) / f32::from(MAX_OPACITY);
        for (dst, src) in canvas.pixels_mut().zip(img.pixels()) {
            *dst = blend_over(*dst, *src, opacity);
        }
    }

    encode_png(canvas)
}

fn decode(blob: &ImageBlob) -> Result<RgbaImage, RasterError> {
    image::load_from_memory(&blob.bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| RasterError::Decode(e.to_string()))
}

fn encode_png(img: RgbaImage) -> Result<ImageBlob, RasterError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .map_err(|e| RasterError::Encode(e.to_string()))?;
    Ok(ImageBlob::png(buf))
}

/// Straight-alpha source-over.
fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let top_a = f32::from(top[3]) / 255.0 * opacity.clamp(0.0, 1.0);
    if top_a <= 0.0 {
        return base;
    }

    let base_a = f32::from(base[3]) / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);

    let mut out = [0u8; 4];
    for c in 0..3 {
        let t = f32::from(top[c]) / 255.0;
        let b = f32::from(base[c]) / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerKind;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> ImageBlob {
        encode_png(RgbaImage::from_pixel(w, h, Rgba(px))).unwrap()
    }

    fn pixel(blob: &ImageBlob, x: u32, y: u32) -> [u8; 4] {
        decode(blob).unwrap().get_pixel(x, y).0
    }

    fn overlay(image: ImageBlob) -> Layer {
        Layer::new(
            "overlay",
            image,
            LayerKind::Filter {
                prompt: "overlay".to_string(),
            },
        )
    }

    #[test]
    fn crop_cuts_the_requested_region() {
        let src = solid(8, 6, [10, 20, 30, 255]);
        let out = crop(&src, CropRect::new(2, 1, 4, 3)).unwrap();
        let img = decode(&out).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(out.mime, "image/png");
    }

    #[test]
    fn crop_clamps_to_bounds() {
        let src = solid(8, 6, [10, 20, 30, 255]);
        let out = crop(&src, CropRect::new(6, 4, 100, 100)).unwrap();
        assert_eq!(decode(&out).unwrap().dimensions(), (2, 2));

        let rect = CropRect::new(8, 0, 5, 5);
        assert_eq!(crop(&src, rect).unwrap_err(), RasterError::EmptyCrop(rect));
    }

    #[test]
    fn crop_rejects_garbage_bytes() {
        let err = crop(&ImageBlob::png(vec![1, 2, 3]), CropRect::new(0, 0, 1, 1)).unwrap_err();
        assert!(matches!(err, RasterError::Decode(_)));
    }

    #[test]
    fn flatten_respects_opacity_and_visibility() {
        let base = Layer::original(solid(4, 4, [255, 0, 0, 255]));
        let half_blue = overlay(solid(4, 4, [0, 0, 255, 255])).with_opacity(50);
        let hidden_green = overlay(solid(4, 4, [0, 255, 0, 255])).with_visibility(false);

        let out = flatten(&[base, half_blue, hidden_green]).unwrap();
        assert_eq!(pixel(&out, 1, 1), [128, 0, 128, 255]);
    }

    #[test]
    fn flatten_stretches_mismatched_layers() {
        let base = Layer::original(solid(4, 4, [255, 0, 0, 255]));
        let small = overlay(solid(2, 2, [0, 0, 255, 255]));

        let out = flatten(&[base, small]).unwrap();
        let img = decode(&out).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
        let [r, g, b, a] = img.get_pixel(3, 3).0;
        assert!(r <= 1 && g == 0 && b >= 254 && a == 255);
    }

    #[test]
    fn flatten_needs_layers() {
        assert_eq!(flatten(&[]).unwrap_err(), RasterError::NoLayers);
    }
}
