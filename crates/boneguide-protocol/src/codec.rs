//! Frame → `TrackingRequest` encoding and `TrackingResponse` → pose decoding.

use std::io::Cursor;

use boneguide_geometry::Mat4;
use boneguide_types::{DepthMap, Frame, RgbImage};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};

use crate::error::ProtocolError;
use crate::messages::{TrackingRequest, TrackingResponse};

/// Turns camera planes into the byte payloads carried by a request.
///
/// The engine only ever talks to this trait so a host can swap in a
/// hardware encoder.
pub trait FrameEncoder: Send + Sync {
    fn encode_rgb(&self, image: &RgbImage) -> Result<Vec<u8>, ProtocolError>;
    fn encode_depth(&self, depth: &DepthMap) -> Result<Vec<u8>, ProtocolError>;
}

/// PNG encoder: RGB8 for colour, 16-bit grayscale millimeters for depth.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngFrameEncoder;

impl FrameEncoder for PngFrameEncoder {
    fn encode_rgb(&self, image: &RgbImage) -> Result<Vec<u8>, ProtocolError> {
        let expected = image.width as usize * image.height as usize * 3;
        if image.pixels.len() != expected {
            return Err(ProtocolError::Encode(format!(
                "rgb {}x{} needs {expected} bytes, got {}",
                image.width,
                image.height,
                image.pixels.len()
            )));
        }
        let buf = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(
            image.width,
            image.height,
            image.pixels.clone(),
        )
        .ok_or_else(|| ProtocolError::Encode("rgb buffer rejected".into()))?;
        write_png(DynamicImage::ImageRgb8(buf))
    }

    fn encode_depth(&self, depth: &DepthMap) -> Result<Vec<u8>, ProtocolError> {
        let expected = depth.width as usize * depth.height as usize;
        if depth.meters.len() != expected {
            return Err(ProtocolError::Encode(format!(
                "depth {}x{} needs {expected} samples, got {}",
                depth.width,
                depth.height,
                depth.meters.len()
            )));
        }
        let mm: Vec<u16> = depth.meters.iter().copied().map(meters_to_millimeters).collect();
        let buf = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(depth.width, depth.height, mm)
            .ok_or_else(|| ProtocolError::Encode("depth buffer rejected".into()))?;
        write_png(DynamicImage::ImageLuma16(buf))
    }
}

fn write_png(img: DynamicImage) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Invalid or non-positive readings become 0 (no depth); far readings saturate.
fn meters_to_millimeters(m: f32) -> u16 {
    if !m.is_finite() || m <= 0.0 {
        return 0;
    }
    (m * 1000.0).round().min(u16::MAX as f32) as u16
}

/// Decodes an RGB PNG produced by [`PngFrameEncoder`].
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ProtocolError> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_rgb8();
    Ok(RgbImage {
        width: img.width(),
        height: img.height(),
        pixels: img.into_raw(),
    })
}

/// Decodes a 16-bit millimeter PNG back into meters.
pub fn decode_depth(bytes: &[u8]) -> Result<DepthMap, ProtocolError> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_luma16();
    Ok(DepthMap {
        width: img.width(),
        height: img.height(),
        meters: img.into_raw().into_iter().map(|mm| mm as f32 / 1000.0).collect(),
    })
}

/// Builds the outbound request for one frame.
pub fn build_tracking_request(
    frame: &Frame,
    session_id: &str,
    optimize_for_speed: bool,
    encoder: &dyn FrameEncoder,
) -> Result<TrackingRequest, ProtocolError> {
    let depth = frame.depth.as_ref().ok_or(ProtocolError::MissingDepthData)?;
    Ok(TrackingRequest {
        session_id: session_id.to_owned(),
        depth_map: encoder.encode_depth(depth)?,
        rgb_image: encoder.encode_rgb(&frame.rgb)?,
        intrinsics: frame.intrinsics.to_vec(),
        transform: frame.camera_transform.to_row_major().to_vec(),
        optimize_for_speed,
    })
}

/// Reads the object-in-camera pose out of a response.
pub fn parse_pose(response: &TrackingResponse) -> Result<Mat4, ProtocolError> {
    let values = &response.transform;
    if values.len() != 16 {
        return Err(ProtocolError::InvalidTransform { len: values.len() });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ProtocolError::NonFiniteTransform);
    }
    Ok(Mat4::from_row_major(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boneguide_geometry::Vec3;

    fn frame(depth: Option<DepthMap>) -> Frame {
        Frame {
            timestamp: 1.5,
            rgb: RgbImage {
                width: 2,
                height: 2,
                pixels: vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 10, 20, 30],
            },
            depth,
            intrinsics: [500.0, 0.0, 1.0, 0.0, 500.0, 1.0, 0.0, 0.0, 1.0],
            camera_transform: Mat4::from_translation(Vec3::new(0.1, 0.2, 0.3)),
        }
    }

    fn depth() -> DepthMap {
        DepthMap {
            width: 2,
            height: 2,
            meters: vec![0.5, 1.234, f32::NAN, -1.0],
        }
    }

    #[test]
    fn missing_depth_is_rejected() {
        let err = build_tracking_request(&frame(None), "s1", false, &PngFrameEncoder).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingDepthData));
    }

    #[test]
    fn request_carries_row_major_camera_transform() {
        let req =
            build_tracking_request(&frame(Some(depth())), "s1", true, &PngFrameEncoder).unwrap();
        assert_eq!(req.session_id, "s1");
        assert!(req.optimize_for_speed);
        assert_eq!(req.intrinsics.len(), 9);
        assert_eq!(req.transform.len(), 16);
        // Translation sits in the last column of each row.
        assert!((req.transform[3] - 0.1).abs() < 1e-6);
        assert!((req.transform[7] - 0.2).abs() < 1e-6);
        assert!((req.transform[11] - 0.3).abs() < 1e-6);
        assert_eq!(req.transform[15], 1.0);
        assert_eq!(&req.rgb_image[1..4], b"PNG");
        assert_eq!(&req.depth_map[1..4], b"PNG");
    }

    #[test]
    fn depth_is_stored_as_millimeters() {
        let png = PngFrameEncoder.encode_depth(&depth()).unwrap();
        let back = decode_depth(&png).unwrap();
        assert_eq!((back.width, back.height), (2, 2));
        assert!((back.meters[0] - 0.5).abs() < 1e-6);
        assert!((back.meters[1] - 1.234).abs() < 1e-6);
        // NaN and negative readings carry no depth.
        assert_eq!(back.meters[2], 0.0);
        assert_eq!(back.meters[3], 0.0);
    }

    #[test]
    fn far_depth_saturates() {
        assert_eq!(meters_to_millimeters(100.0), u16::MAX);
        assert_eq!(meters_to_millimeters(f32::INFINITY), 0);
    }

    #[test]
    fn rgb_png_decodes_to_same_pixels() {
        let f = frame(None);
        let png = PngFrameEncoder.encode_rgb(&f.rgb).unwrap();
        assert_eq!(decode_rgb(&png).unwrap(), f.rgb);
    }

    #[test]
    fn short_pixel_buffer_is_an_encode_error() {
        let img = RgbImage {
            width: 4,
            height: 4,
            pixels: vec![0; 3],
        };
        assert!(matches!(
            PngFrameEncoder.encode_rgb(&img),
            Err(ProtocolError::Encode(_))
        ));
    }

    #[test]
    fn parse_pose_requires_sixteen_values() {
        let resp = TrackingResponse {
            transform: vec![1.0; 12],
        };
        assert!(matches!(
            parse_pose(&resp),
            Err(ProtocolError::InvalidTransform { len: 12 })
        ));
    }

    #[test]
    fn parse_pose_reads_row_major() {
        let mut values = Mat4::identity().to_row_major().to_vec();
        values[11] = -0.3;
        let pose = parse_pose(&TrackingResponse { transform: values }).unwrap();
        assert!((pose.translation().z + 0.3).abs() < 1e-6);
    }

    #[test]
    fn parse_pose_rejects_nan() {
        let mut values = Mat4::identity().to_row_major().to_vec();
        values[0] = f32::NAN;
        assert!(matches!(
            parse_pose(&TrackingResponse { transform: values }),
            Err(ProtocolError::NonFiniteTransform)
        ));
    }
}
