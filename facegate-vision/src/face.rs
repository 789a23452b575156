use crate::yunet;
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array1, Array4};
use ort::{session::Session, value::Value};

/// Square input side of the YuNet detector.
pub const DETECTOR_INPUT_SIZE: u32 = 640;
/// Square input side of the SFace recognizer.
pub const ENCODER_INPUT_SIZE: u32 = 112;

/// Detection result from YuNet, in source image pixels
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,x2,y2,...,x5,y5
}

/// Face embedding (SFace output), L2-normalised
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from_vec(values),
        }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }
}

/// Pack an RGB image into planar CHW floats in B, G, R plane order.
///
/// Both ONNX models take `[1, 3, H, W]` BGR input with values in `[0, 255]`.
pub fn to_bgr_planar(img: &RgbImage) -> Vec<f32> {
    let pixel_count = (img.width() * img.height()) as usize;
    let mut data = vec![0.0f32; 3 * pixel_count];
    let (b_plane, rest) = data.split_at_mut(pixel_count);
    let (g_plane, r_plane) = rest.split_at_mut(pixel_count);

    for (i, px) in img.as_raw().chunks_exact(3).enumerate() {
        r_plane[i] = px[0] as f32;
        g_plane[i] = px[1] as f32;
        b_plane[i] = px[2] as f32;
    }
    data
}

/// Image pasted centred on a square canvas, plus the mapping back to source pixels.
pub struct Letterbox {
    pub canvas: RgbImage,
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    pub fn new(img: &DynamicImage, target_size: u32) -> Self {
        let (orig_width, orig_height) = img.dimensions();
        let max_dim = orig_width.max(orig_height).max(1);
        let scale = target_size as f32 / max_dim as f32;
        let new_width = ((orig_width as f32 * scale) as u32).clamp(1, target_size);
        let new_height = ((orig_height as f32 * scale) as u32).clamp(1, target_size);

        let resized =
            img.resize_exact(new_width, new_height, image::imageops::FilterType::Triangle);

        let mut canvas = DynamicImage::new_rgb8(target_size, target_size);
        let offset_x = (target_size - new_width) / 2;
        let offset_y = (target_size - new_height) / 2;
        image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

        Self {
            canvas: canvas.to_rgb8(),
            scale,
            offset_x,
            offset_y,
        }
    }

    /// Map a normalised canvas coordinate back to source image pixels.
    fn unmap(&self, norm: f32, offset: u32) -> f32 {
        let px = norm * self.canvas.width() as f32;
        (px - offset as f32) / self.scale
    }

    fn unmap_detection(&self, d: yunet::RawDetection) -> Detection {
        let mut landmarks = [0.0f32; 10];
        for i in 0..5 {
            landmarks[i * 2] = self.unmap(d.landmarks[i * 2], self.offset_x);
            landmarks[i * 2 + 1] = self.unmap(d.landmarks[i * 2 + 1], self.offset_y);
        }
        let side = self.canvas.width() as f32;
        Detection {
            bbox: [
                self.unmap(d.bbox[0], self.offset_x),
                self.unmap(d.bbox[1], self.offset_y),
                d.bbox[2] * side / self.scale,
                d.bbox[3] * side / self.scale,
            ],
            score: d.score,
            landmarks,
        }
    }
}

/// Detect faces in an image using YuNet detector
///
/// Returned detections are sorted by descending score.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let target_size = DETECTOR_INPUT_SIZE;
    let letterbox = Letterbox::new(img, target_size);

    let input_array = Array4::from_shape_vec(
        (1, 3, target_size as usize, target_size as usize),
        to_bgr_planar(&letterbox.canvas),
    )?;
    let input_tensor = Value::from_array(input_array)?;

    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        output_data.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let output_refs: Vec<(&[i64], &[f32])> = output_data
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let (mut cls_scores, bbox_preds, landmark_preds) =
        yunet::parse_yunet_outputs(&output_refs, target_size as usize)
            .context("parsing detector outputs")?;
    yunet::apply_sigmoid_to_scores(&mut cls_scores);

    let raw_detections = yunet::decode_detections(
        cls_scores,
        bbox_preds,
        landmark_preds,
        score_threshold,
        target_size as usize,
    )?;

    let mut detections: Vec<Detection> = raw_detections
        .into_iter()
        .map(|d| letterbox.unmap_detection(d))
        .collect();

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    } else {
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    Ok(detections)
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    let area_a = a[2] * a[3];
    let area_b = b[2] * b[3];
    inter / (area_a + area_b - inter)
}

/// Align and crop face using the eye landmarks.
///
/// Rotates the eye line level and scales the inter-ocular distance to the
/// ArcFace 112x112 reference, then samples bilinearly. Pixels that fall
/// outside the source stay black.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
    const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

    let left_eye = (detection.landmarks[0], detection.landmarks[1]);
    let right_eye = (detection.landmarks[2], detection.landmarks[3]);

    let eye_dx = right_eye.0 - left_eye.0;
    let eye_dy = right_eye.1 - left_eye.1;
    let actual_eye_dist = (eye_dx * eye_dx + eye_dy * eye_dy).sqrt();
    if actual_eye_dist <= f32::EPSILON {
        anyhow::bail!("degenerate landmarks: eyes coincide");
    }
    let eye_angle = eye_dy.atan2(eye_dx);

    let ref_eye_dist = ((REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).powi(2)
        + (REF_RIGHT_EYE.1 - REF_LEFT_EYE.1).powi(2))
    .sqrt();
    let unit = size as f32 / ENCODER_INPUT_SIZE as f32;
    let scale = unit * (ref_eye_dist / actual_eye_dist);

    let eye_center = (
        (left_eye.0 + right_eye.0) / 2.0,
        (left_eye.1 + right_eye.1) / 2.0,
    );
    let ref_center = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * unit,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * unit,
    );

    // output = [a b; c d] * input + [tx ty]
    let (sin_angle, cos_angle) = eye_angle.sin_cos();
    let a = scale * cos_angle;
    let b = scale * sin_angle;
    let c = -scale * sin_angle;
    let d = scale * cos_angle;
    let tx = ref_center.0 - (a * eye_center.0 + b * eye_center.1);
    let ty = ref_center.1 - (c * eye_center.0 + d * eye_center.1);
    let det = a * d - b * c;

    let src = img.to_rgb8();
    let (img_w, img_h) = src.dimensions();
    let mut output = RgbImage::new(size, size);

    for out_y in 0..size {
        for out_x in 0..size {
            let tmp_x = out_x as f32 - tx;
            let tmp_y = out_y as f32 - ty;
            let in_x = (d * tmp_x - b * tmp_y) / det;
            let in_y = (-c * tmp_x + a * tmp_y) / det;

            if in_x < 0.0 || in_y < 0.0 || in_x >= img_w as f32 || in_y >= img_h as f32 {
                continue;
            }

            let x0 = in_x.floor() as u32;
            let y0 = in_y.floor() as u32;
            let x1 = (x0 + 1).min(img_w - 1);
            let y1 = (y0 + 1).min(img_h - 1);
            let fx = in_x - x0 as f32;
            let fy = in_y - y0 as f32;

            let p00 = src.get_pixel(x0, y0);
            let p10 = src.get_pixel(x1, y0);
            let p01 = src.get_pixel(x0, y1);
            let p11 = src.get_pixel(x1, y1);

            let w00 = (1.0 - fx) * (1.0 - fy);
            let w10 = fx * (1.0 - fy);
            let w01 = (1.0 - fx) * fy;
            let w11 = fx * fy;

            let mut px = [0u8; 3];
            for (ch, out) in px.iter_mut().enumerate() {
                *out = (p00[ch] as f32 * w00
                    + p10[ch] as f32 * w10
                    + p01[ch] as f32 * w01
                    + p11[ch] as f32 * w11) as u8;
            }
            output.put_pixel(out_x, out_y, image::Rgb(px));
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

/// Encode face image to embedding using SFace
///
/// The image is resized to 112x112 whatever its size, so an unaligned whole
/// frame is accepted too.
pub fn encode_face(session: &mut Session, face_img: &DynamicImage) -> Result<Embedding> {
    let size = ENCODER_INPUT_SIZE;
    let face_rgb = face_img
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let input_array =
        Array4::from_shape_vec((1, 3, size as usize, size as usize), to_bgr_planar(&face_rgb))?;
    let input_tensor = Value::from_array(input_array)?;

    let outputs = session.run(ort::inputs![input_tensor])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // Expecting shape [1, 128]
    let embedding_size = if shape.len() == 2 {
        shape[1] as usize
    } else {
        data.len()
    };
    if embedding_size == 0 || embedding_size > data.len() {
        anyhow::bail!("recognizer returned unexpected output shape {:?}", &shape[..]);
    }

    Ok(Embedding::from_vec(l2_normalize(&data[..embedding_size])))
}

fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| x / norm).collect()
    } else {
        values.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], score: f32) -> Detection {
        Detection {
            bbox,
            score,
            landmarks: [0.0; 10],
        }
    }

    #[test]
    fn test_iou() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [15.0, 15.0, 20.0, 20.0];
        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);

        let c = [100.0, 100.0, 10.0, 10.0];
        assert_eq!(compute_iou(&a, &c), 0.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_per_cluster_in_score_order() {
        let detections = vec![
            det([12.0, 12.0, 20.0, 20.0], 0.8),
            det([10.0, 10.0, 20.0, 20.0], 0.9),
            det([100.0, 100.0, 20.0, 20.0], 0.85),
        ];

        let result = nms(&detections, 0.3);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.85);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(&[], 0.3).is_empty());
    }

    #[test]
    fn test_bgr_planar_order() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        img.put_pixel(1, 0, image::Rgb([40, 50, 60]));

        let planar = to_bgr_planar(&img);
        assert_eq!(planar, vec![30.0, 60.0, 20.0, 50.0, 10.0, 40.0]);
    }

    #[test]
    fn test_letterbox_pads_wide_image_vertically() {
        let img = DynamicImage::new_rgb8(200, 100);
        let lb = Letterbox::new(&img, 640);
        assert_eq!(lb.canvas.dimensions(), (640, 640));
        assert_eq!(lb.offset_x, 0);
        assert_eq!(lb.offset_y, 160);
        assert!((lb.scale - 3.2).abs() < 1e-6);

        // canvas centre maps back to the source centre
        let raw = yunet::RawDetection {
            bbox: [0.5, 0.5, 0.1, 0.1],
            score: 0.9,
            landmarks: [0.5; 10],
        };
        let d = lb.unmap_detection(raw);
        assert!((d.bbox[0] - 100.0).abs() < 1e-3);
        assert!((d.bbox[1] - 50.0).abs() < 1e-3);
        assert!((d.bbox[2] - 20.0).abs() < 1e-3);
        assert!((d.landmarks[1] - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_align_face_level_eyes_hit_reference() {
        // Paint a bright pixel at each eye; after alignment they must land at
        // the reference eye positions.
        let mut img = RgbImage::new(224, 224);
        img.put_pixel(76, 103, image::Rgb([255, 255, 255]));
        img.put_pixel(147, 103, image::Rgb([255, 255, 255]));
        let img = DynamicImage::ImageRgb8(img);

        let mut landmarks = [0.0f32; 10];
        landmarks[0] = 76.0;
        landmarks[1] = 103.0;
        landmarks[2] = 147.0;
        landmarks[3] = 103.0;
        let detection = Detection {
            bbox: [0.0, 0.0, 224.0, 224.0],
            score: 1.0,
            landmarks,
        };

        let aligned = align_face(&img, &detection, 112).unwrap().to_rgb8();
        assert_eq!(aligned.dimensions(), (112, 112));
        let brightest = aligned
            .enumerate_pixels()
            .filter(|(x, _, _)| *x < 56)
            .max_by_key(|(_, _, p)| p[0])
            .map(|(x, y, _)| (x, y))
            .unwrap();
        assert!((brightest.0 as f32 - 38.3).abs() <= 2.0, "{:?}", brightest);
        assert!((brightest.1 as f32 - 51.6).abs() <= 2.0, "{:?}", brightest);
    }

    #[test]
    fn test_align_face_rejects_degenerate_landmarks() {
        let img = DynamicImage::new_rgb8(64, 64);
        let detection = det([0.0, 0.0, 64.0, 64.0], 1.0);
        assert!(align_face(&img, &detection, 112).is_err());
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
