//! Vector helpers for signal embeddings stored as JSON arrays.

use serde_json::Value;

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Element-wise mean. None for no vectors or mismatched dimensions.
pub fn average(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let mut sum = vec![0.0f32; dim];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    Some(sum.into_iter().map(|x| x / n).collect())
}

/// Read an embedding column. None unless it is a non-empty array of numbers.
pub fn from_json(v: &Value) -> Option<Vec<f32>> {
    let items = v.as_array()?;
    if items.is_empty() {
        return None;
    }
    items.iter().map(|x| x.as_f64().map(|f| f as f32)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cosine_similarity() {
        let vec1 = vec![1.0, 0.0, 0.0];
        let vec2 = vec![1.0, 0.0, 0.0];
        let vec3 = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&vec1, &vec2) - 1.0).abs() < 0.01);
        assert!((cosine_similarity(&vec1, &vec3) - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_average() {
        let avg = average(&[vec![1.0, 3.0], vec![3.0, 5.0]]).unwrap();
        assert_eq!(avg, vec![2.0, 4.0]);
        assert!(average(&[]).is_none());
        assert!(average(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(from_json(&json!([0.5, 1])), Some(vec![0.5, 1.0]));
        assert_eq!(from_json(&json!([0.5, "x"])), None);
        assert_eq!(from_json(&json!([])), None);
        assert_eq!(from_json(&json!({"a": 1})), None);
    }
}
