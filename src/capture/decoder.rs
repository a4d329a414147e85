use jpeg_decoder::Decoder;

use super::frame::PixelFormat;
use super::source::CaptureError;

/// Raw pixels produced from a device buffer, grayscale or BGR
#[derive(Debug)]
pub struct Decoded {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Decode a device buffer into 1-channel gray or 3-channel BGR pixels.
///
/// `width` and `height` are the negotiated stream geometry; MJPEG frames
/// carry their own and ignore them.
pub fn decode(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Decoded, CaptureError> {
    let pixel_count = width as usize * height as usize;

    match format {
        PixelFormat::Mjpeg => decode_mjpeg(data),
        PixelFormat::Bgr24 => {
            let bytes = expect_len(data, pixel_count * 3)?;
            Ok(Decoded {
                pixels: bytes.to_vec(),
                width,
                height,
                channels: 3,
            })
        }
        PixelFormat::Rgb24 => {
            let mut pixels = expect_len(data, pixel_count * 3)?.to_vec();
            swap_red_blue(&mut pixels);
            Ok(Decoded {
                pixels,
                width,
                height,
                channels: 3,
            })
        }
        PixelFormat::Yuyv4 => {
            let bytes = expect_len(data, pixel_count * 2)?;
            let mut pixels = Vec::with_capacity(pixel_count * 3);
            for chunk in bytes.chunks_exact(4) {
                let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
                pixels.extend_from_slice(&yuv_to_bgr(y0, u, v));
                pixels.extend_from_slice(&yuv_to_bgr(y1, u, v));
            }
            Ok(Decoded {
                pixels,
                width,
                height,
                channels: 3,
            })
        }
        PixelFormat::Nv12 => {
            if width % 2 != 0 || height % 2 != 0 {
                return Err(CaptureError::UnsupportedFormat(format!(
                    "NV12 with odd geometry {}x{}",
                    width, height
                )));
            }
            let bytes = expect_len(data, pixel_count + pixel_count / 2)?;
            let (luma, chroma) = bytes.split_at(pixel_count);
            let w = width as usize;

            let mut pixels = Vec::with_capacity(pixel_count * 3);
            for row in 0..height as usize {
                let uv_row = &chroma[(row / 2) * w..(row / 2) * w + w];
                for col in 0..w {
                    let y = luma[row * w + col];
                    let u = uv_row[col & !1];
                    let v = uv_row[(col & !1) + 1];
                    pixels.extend_from_slice(&yuv_to_bgr(y, u, v));
                }
            }
            Ok(Decoded {
                pixels,
                width,
                height,
                channels: 3,
            })
        }
    }
}

fn decode_mjpeg(data: &[u8]) -> Result<Decoded, CaptureError> {
    let mut decoder = Decoder::new(data);
    let mut pixels = decoder
        .decode()
        .map_err(|e| CaptureError::Decode(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::Decode("missing JPEG header".into()))?;

    let channels = match info.pixel_format {
        jpeg_decoder::PixelFormat::L8 => 1,
        jpeg_decoder::PixelFormat::RGB24 => {
            swap_red_blue(&mut pixels);
            3
        }
        other => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "JPEG pixel format {:?}",
                other
            )))
        }
    };

    Ok(Decoded {
        pixels,
        width: info.width as u32,
        height: info.height as u32,
        channels,
    })
}

fn expect_len(data: &[u8], len: usize) -> Result<&[u8], CaptureError> {
    // Drivers may pad the buffer; anything short is a torn frame
    data.get(..len).ok_or_else(|| {
        CaptureError::Decode(format!("buffer holds {} bytes, need {}", data.len(), len))
    })
}

fn swap_red_blue(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

/// BT.601 limited-range conversion, integer approximation
fn yuv_to_bgr(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [clamp(b), clamp(g), clamp(r)]
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageEncoder;

    #[test]
    fn test_rgb24_becomes_bgr() {
        let data = [10, 20, 30, 40, 50, 60];
        let decoded = decode(&data, PixelFormat::Rgb24, 2, 1).unwrap();
        assert_eq!(decoded.channels, 3);
        assert_eq!(decoded.pixels, vec![30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // Two pixels sharing U/V = 128
        let data = [128, 128, 235, 128];
        let decoded = decode(&data, PixelFormat::Yuyv4, 2, 1).unwrap();
        assert_eq!(decoded.pixels, vec![130, 130, 130, 255, 255, 255]);
    }

    #[test]
    fn test_nv12_geometry() {
        let mut data = vec![16u8; 4 * 2 + 4];
        // Neutral chroma plane
        data[8..].fill(128);
        let decoded = decode(&data, PixelFormat::Nv12, 4, 2).unwrap();
        assert_eq!(decoded.pixels.len(), 4 * 2 * 3);
        assert!(decoded.pixels.iter().all(|&p| p == 0));

        assert!(matches!(
            decode(&[0u8; 6], PixelFormat::Nv12, 3, 1),
            Err(CaptureError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_short_buffer_is_decode_error() {
        let result = decode(&[0u8; 5], PixelFormat::Bgr24, 2, 1);
        assert!(matches!(result, Err(CaptureError::Decode(_))));
    }

    #[test]
    fn test_mjpeg_grayscale_and_color() {
        let mut jpeg = Vec::new();
        let gray = image::GrayImage::from_fn(8, 8, |x, y| image::Luma([((x + y) * 8) as u8]));
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .write_image(gray.as_raw(), 8, 8, image::ExtendedColorType::L8)
            .unwrap();

        let decoded = decode(&jpeg, PixelFormat::Mjpeg, 0, 0).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.channels), (8, 8, 1));
        assert_eq!(decoded.pixels.len(), 64);

        let mut jpeg = Vec::new();
        let color = image::RgbImage::from_pixel(16, 8, image::Rgb([255, 0, 0]));
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .write_image(color.as_raw(), 16, 8, image::ExtendedColorType::Rgb8)
            .unwrap();

        let decoded = decode(&jpeg, PixelFormat::Mjpeg, 0, 0).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.channels), (16, 8, 3));
        // Pure red comes back with the blue slot low and the red slot high
        assert!(decoded.pixels[2] > 200);
        assert!(decoded.pixels[0] < 60);
    }

    #[test]
    fn test_garbage_mjpeg() {
        assert!(matches!(
            decode(b"not a jpeg", PixelFormat::Mjpeg, 0, 0),
            Err(CaptureError::Decode(_))
        ));
    }
}
