//! YuNet detector post-processing.
//!
//! YuNet is anchor-free. For each stride (8, 16, 32) it emits four heads over
//! an `(input / stride)^2` grid: `cls [1, N, 1]`, `obj [1, N, 1]`,
//! `bbox [1, N, 4]` and `kps [1, N, 10]`. Output order is all `cls`, then all
//! `obj`, then all `bbox`, then all `kps`, each in stride order.
//!
//! Decoding maps a grid cell `(i, j)` straight to pixels:
//! `cx = (j + dx) * stride`, `cy = (i + dy) * stride`, `w = dw * stride`,
//! `h = dh * stride`, then normalises by the input size.

use anyhow::Result;
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h (normalized [0,1])
    pub score: f32,
    pub landmarks: [f32; 10], // normalized [0,1]
}

/// Per-stride tensors after parsing: scores, box deltas, landmark deltas.
pub type YunetHeads = (Vec<Array2<f32>>, Vec<Array2<f32>>, Vec<Array2<f32>>);

fn grid_cells(input_size: usize, stride: usize) -> usize {
    let side = input_size / stride;
    side * side
}

/// Decode per-stride head tensors into detections above `score_threshold`.
pub fn decode_detections(
    cls_scores: Vec<Array2<f32>>,
    bbox_preds: Vec<Array2<f32>>,
    landmark_preds: Vec<Array2<f32>>,
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<RawDetection>> {
    if cls_scores.len() != STRIDES.len()
        || bbox_preds.len() != STRIDES.len()
        || landmark_preds.len() != STRIDES.len()
    {
        anyhow::bail!("expected {} scales of detector heads", STRIDES.len());
    }

    let size = input_size as f32;
    let mut detections = Vec::new();

    for (scale_idx, &stride) in STRIDES.iter().enumerate() {
        let scores = &cls_scores[scale_idx];
        let bboxes = &bbox_preds[scale_idx];
        let landmarks = &landmark_preds[scale_idx];

        let feature_size = input_size / stride;
        let num_boxes = scores.shape()[0];
        if num_boxes != feature_size * feature_size {
            anyhow::bail!(
                "Expected {} boxes for stride {} ({}x{} grid), got {}",
                feature_size * feature_size,
                stride,
                feature_size,
                feature_size,
                num_boxes
            );
        }

        let stride = stride as f32;
        for i in 0..feature_size {
            for j in 0..feature_size {
                let idx = i * feature_size + j;
                let score = scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let cx = (j as f32 + bboxes[[idx, 0]]) * stride / size;
                let cy = (i as f32 + bboxes[[idx, 1]]) * stride / size;
                let w = bboxes[[idx, 2]] * stride / size;
                let h = bboxes[[idx, 3]] * stride / size;

                let mut lms = [0.0f32; 10];
                for k in 0..5 {
                    lms[k * 2] = (j as f32 + landmarks[[idx, k * 2]]) * stride / size;
                    lms[k * 2 + 1] = (i as f32 + landmarks[[idx, k * 2 + 1]]) * stride / size;
                }

                detections.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                    landmarks: lms,
                });
            }
        }
    }

    Ok(detections)
}

/// Read one head group (`cls`, `obj`, `bbox` or `kps`) starting at `first`.
fn parse_head(
    outputs: &[(&[i64], &[f32])],
    first: usize,
    name: &str,
    channels: usize,
    input_size: usize,
) -> Result<Vec<Array2<f32>>> {
    STRIDES
        .iter()
        .enumerate()
        .map(|(scale_idx, &stride)| -> Result<Array2<f32>> {
            let idx = first + scale_idx;
            let expected = grid_cells(input_size, stride);
            let Some((shape, data)) = outputs.get(idx) else {
                anyhow::bail!("Missing {} output at index {}", name, idx);
            };
            if shape.len() != 3
                || shape[0] != 1
                || shape[1] as usize != expected
                || shape[2] as usize != channels
            {
                anyhow::bail!(
                    "Unexpected {} shape at index {}: {:?}, expected [1, {}, {}]",
                    name,
                    idx,
                    shape,
                    expected,
                    channels
                );
            }
            Ok(Array2::from_shape_vec((expected, channels), data.to_vec())?)
        })
        .collect()
}

/// Parse the 12 raw YuNet outputs into per-stride heads.
///
/// Classification and objectness are multiplied into a single score map.
pub fn parse_yunet_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<YunetHeads> {
    let cls = parse_head(outputs, 0, "cls", 1, input_size)?;
    let obj = parse_head(outputs, 3, "obj", 1, input_size)?;
    let bbox = parse_head(outputs, 6, "bbox", 4, input_size)?;
    let kps = parse_head(outputs, 9, "kps", 10, input_size)?;

    let scores = cls.iter().zip(obj.iter()).map(|(c, o)| c * o).collect();
    Ok((scores, bbox, kps))
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn apply_sigmoid_to_scores(scores: &mut [Array2<f32>]) {
    for score_map in scores {
        score_map.mapv_inplace(sigmoid);
    }
}
