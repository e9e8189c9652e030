/// Cosine similarity of two vectors, accumulated in f64.
///
/// Returns 0.0 when either vector has zero norm, when the lengths differ, or
/// when the result is not a number. Otherwise the result is clipped to [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    if cos.is_nan() {
        return 0.0;
    }
    cos.clamp(-1.0, 1.0)
}
