use facegate_vision::cosine_similarity;
use serde_json::Value;

/// Outcome of comparing a probe against a stored embedding set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub is_match: bool,
    pub confidence: f32,
    /// Candidates that passed the shape check and were scored.
    pub compared: usize,
}

/// Interpret one stored candidate as a vector of exactly `dim` numbers.
pub fn parse_candidate(value: &Value, dim: usize) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    if items.is_empty() || items.len() != dim {
        return None;
    }
    items
        .iter()
        .map(|v| v.as_f64().map(|x| x as f32))
        .collect()
}

/// Whether `v` has a finite, non-zero magnitude, the precondition for cosine.
pub fn has_magnitude(v: &[f32]) -> bool {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    norm > 0.0 && norm.is_finite()
}

/// Highest cosine similarity between `probe` and the well-formed candidates.
///
/// Returns the best score and how many candidates were scored, or `None`
/// when no candidate was usable.
pub fn best_score(probe: &[f32], candidates: &[Value], dim: usize) -> Option<(f32, usize)> {
    let mut best: Option<f32> = None;
    let mut compared = 0;

    for (idx, candidate) in candidates.iter().enumerate() {
        let Some(vector) = parse_candidate(candidate, dim) else {
            log::debug!("skipping stored embedding {}: not a {}-d vector", idx, dim);
            continue;
        };
        let Some(score) = cosine_similarity(probe, &vector) else {
            log::debug!("skipping stored embedding {}: zero magnitude", idx);
            continue;
        };
        compared += 1;
        best = Some(best.map_or(score, |b| b.max(score)));
    }

    best.map(|score| (score, compared))
}

/// Score `probe` against `candidates` and apply `threshold` (inclusive).
pub fn verify(probe: &[f32], candidates: &[Value], dim: usize, threshold: f32) -> Option<Verification> {
    best_score(probe, candidates, dim).map(|(confidence, compared)| Verification {
        is_match: confidence >= threshold,
        confidence,
        compared,
    })
}

/// Compare two embeddings directly. Both must be `dim` long with non-zero
/// magnitude.
pub fn compare(a: &[f32], b: &[f32], dim: usize, threshold: f32) -> Option<Verification> {
    if a.len() != dim || b.len() != dim {
        return None;
    }
    let confidence = cosine_similarity(a, b)?;
    Some(Verification {
        is_match: confidence >= threshold,
        confidence,
        compared: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn basis(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn parse_candidate_shapes() {
        assert_eq!(parse_candidate(&json!([1.0, 2, 3.5]), 3), Some(vec![1.0, 2.0, 3.5]));
        assert_eq!(parse_candidate(&json!([]), 3), None);
        assert_eq!(parse_candidate(&json!([1.0, 2.0]), 3), None);
        assert_eq!(parse_candidate(&json!([1.0, "x", 3.0]), 3), None);
        assert_eq!(parse_candidate(&json!({"a": 1}), 3), None);
        assert_eq!(parse_candidate(&json!(null), 3), None);
    }

    #[test]
    fn identical_embedding_matches() {
        let probe = basis(128, 5);
        let candidates = vec![json!(probe)];
        let v = verify(&probe, &candidates, 128, 0.7).unwrap();
        assert!(v.is_match);
        assert!((v.confidence - 1.0).abs() < 1e-6);
        assert_eq!(v.compared, 1);
    }

    #[test]
    fn orthogonal_embedding_does_not_match() {
        let probe = basis(128, 0);
        let candidates = vec![json!(basis(128, 1))];
        let v = verify(&probe, &candidates, 128, 0.7).unwrap();
        assert!(!v.is_match);
        assert!(v.confidence.abs() < 1e-6);
    }

    #[test]
    fn takes_best_and_skips_malformed() {
        let probe = basis(4, 0);
        let candidates = vec![
            json!([]),
            json!([1.0, 0.0]),
            json!([0.0, 0.0, 0.0, 0.0]),
            json!([0.0, 1.0, 0.0, 0.0]),
            json!([1.0, 1.0, 0.0, 0.0]),
        ];
        let (best, compared) = best_score(&probe, &candidates, 4).unwrap();
        assert!((best - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(compared, 2);
    }

    #[test]
    fn negative_best_is_reported() {
        let probe = basis(2, 0);
        let candidates = vec![json!([-1.0, 0.0])];
        let v = verify(&probe, &candidates, 2, 0.7).unwrap();
        assert!(!v.is_match);
        assert!((v.confidence + 1.0).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_inclusive() {
        let probe = vec![1.0, 0.0];
        let candidates = vec![json!([1.0, 0.0])];
        assert!(verify(&probe, &candidates, 2, 1.0).unwrap().is_match);
    }

    #[test]
    fn nothing_usable() {
        let probe = basis(128, 0);
        let candidates = vec![json!([]), json!(basis(64, 0))];
        assert_eq!(verify(&probe, &candidates, 128, 0.7), None);
    }

    #[test]
    fn magnitude_check() {
        assert!(has_magnitude(&basis(128, 7)));
        assert!(!has_magnitude(&[0.0; 128]));
        assert!(!has_magnitude(&[]));
        assert!(!has_magnitude(&[f32::NAN, 1.0]));
        assert!(!has_magnitude(&[f32::INFINITY, 0.0]));
    }

    #[test]
    fn compare_pair() {
        let v = compare(&basis(4, 0), &[1.0, 1.0, 0.0, 0.0], 4, 0.7).unwrap();
        assert!(v.is_match);
        assert!((v.confidence - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(v.compared, 1);

        let v = compare(&basis(4, 0), &basis(4, 2), 4, 0.7).unwrap();
        assert!(!v.is_match);
    }

    #[test]
    fn compare_rejects_wrong_dim_and_zero_vectors() {
        assert_eq!(compare(&basis(4, 0), &basis(4, 0), 128, 0.7), None);
        assert_eq!(compare(&basis(4, 0), &basis(3, 0), 4, 0.7), None);
        assert_eq!(compare(&basis(4, 0), &[0.0; 4], 4, 0.7), None);
    }
}
