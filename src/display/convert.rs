//! Frame to display-image conversion

use image::RgbImage;

use crate::Frame;

/// Make an owned RGB copy of `frame` for the display.
///
/// Gray frames are expanded to three channels and BGR frames are reordered.
/// Empty frames and anything that is neither 1 nor 3 channels yield `None`.
pub fn to_display(frame: &Frame) -> Option<RgbImage> {
    if frame.is_empty() || !matches!(frame.channels, 1 | 3) {
        return None;
    }

    let pixels = &frame.data[..];
    let rgb: Vec<u8> = match frame.channels {
        1 => pixels.iter().flat_map(|&v| [v, v, v]).collect(),
        3 => pixels
            .chunks_exact(3)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .collect(),
        n => {
            if cfg!(debug_assertions) {
                unreachable!("no display conversion for {} channels", n);
            }
            return None;
        }
    };

    RgbImage::from_raw(frame.width, frame.height, rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_is_expanded() {
        let frame = Frame::new(vec![0u8, 64, 128, 255], 2, 2, 1, 0).unwrap();
        let image = to_display(&frame).unwrap();

        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 0).0, [64, 64, 64]);
        assert_eq!(image.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn test_bgr_is_reordered() {
        let frame = Frame::new(vec![1u8, 2, 3, 4, 5, 6], 1, 2, 3, 0).unwrap();
        let image = to_display(&frame).unwrap();

        assert_eq!(image.dimensions(), (1, 2));
        assert_eq!(image.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(image.get_pixel(0, 1).0, [6, 5, 4]);
    }

    #[test]
    fn test_source_frame_untouched() {
        let frame = Frame::new(vec![9u8, 8, 7], 1, 1, 3, 0).unwrap();
        let _ = to_display(&frame);
        assert_eq!(&frame.data[..], &[9, 8, 7]);
    }

    #[test]
    fn test_unsupported_shapes_dropped() {
        assert!(to_display(&Frame::empty(0)).is_none());

        let two_channel = Frame::new(vec![0u8; 8], 2, 2, 2, 0).unwrap();
        assert!(to_display(&two_channel).is_none());

        let four_channel = Frame::new(vec![0u8; 4], 1, 1, 4, 0).unwrap();
        assert!(to_display(&four_channel).is_none());
    }
}
