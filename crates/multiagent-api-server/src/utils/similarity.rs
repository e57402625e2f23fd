use anyhow::Result;

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in [-1, 1]. A zero-magnitude vector scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.is_empty() {
        anyhow::bail!("Cannot compare empty embeddings");
    }
    if a.len() != b.len() {
        anyhow::bail!("Embedding dimension mismatch: {} vs {}", a.len(), b.len());
    }

    let (norm_a, norm_b) = (norm(a), norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Highest similarity between `candidate` and any vector in `pool` (0.0 for an empty pool).
pub fn max_similarity<'a, I>(candidate: &[f32], pool: I) -> Result<f32>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut best: Option<f32> = None;
    for other in pool {
        let sim = cosine_similarity(candidate, other)?;
        best = Some(best.map_or(sim, |b: f32| b.max(sim)));
    }
    Ok(best.unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_and_opposite() {
        let a = [0.5, 1.0, -2.0];
        let scaled = [1.0, 2.0, -4.0];
        let flipped = [-0.5, -1.0, 2.0];
        assert!((cosine_similarity(&a, &scaled).unwrap() - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &flipped).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[3.0, 4.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        assert!(cosine_similarity(&[], &[]).is_err());
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_max_similarity_over_pool() {
        let pool: Vec<Vec<f32>> = vec![vec![0.0, 1.0], vec![1.0, 0.1]];
        let best = max_similarity(&[1.0, 0.0], pool.iter().map(|v| v.as_slice())).unwrap();
        assert!(best > 0.99);
        assert_eq!(max_similarity(&[1.0, 0.0], std::iter::empty()).unwrap(), 0.0);
    }
}
