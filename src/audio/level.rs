/// RMS energy of a sample window, scaled to 0-100 so thresholds read as
/// whole numbers in configuration.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sq_sum: f32 = samples.iter().map(|&x| x * x).sum();
    let rms = (sq_sum / samples.len() as f32).sqrt();
    (rms * 100.0).clamp(0.0, 100.0)
}
