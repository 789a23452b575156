use crate::face::Embedding;

/// Cosine similarity of two equal-length vectors, clamped to `[-1, 1]`.
///
/// Returns `None` when lengths differ, either vector is empty, or either has
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f64, 0.0f64, 0.0f64), |(dot, na, nb), (&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !sim.is_finite() {
        return None;
    }
    Some(sim.clamp(-1.0, 1.0) as f32)
}

/// Cosine similarity between two embeddings; `None` on shape mismatch.
pub fn match_embedding(a: &Embedding, b: &Embedding) -> Option<f32> {
    cosine_similarity(&a.to_vec(), &b.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.3, -1.2, 4.0, 0.0];
        let s = cosine_similarity(&v, &v).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]).unwrap().abs() < 1e-6);
        let s = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap();
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn scale_invariant() {
        let s = cosine_similarity(&[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0]).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn undefined_cases() {
        assert_eq!(cosine_similarity(&[], &[]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn embeddings() {
        let a = Embedding::from_vec(vec![0.6, 0.8]);
        let b = Embedding::from_vec(vec![0.8, 0.6]);
        let s = match_embedding(&a, &b).unwrap();
        assert!((s - 0.96).abs() < 1e-6);
    }
}
