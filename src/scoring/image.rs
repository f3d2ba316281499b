use anyhow::{anyhow, Context, Result};
use base64::Engine;
use image::imageops::FilterType;
use tracing::warn;

use crate::models::ReportImage;
use crate::TARGET_SCORING;

/// RGB histogram layout: 8 bins per channel.
pub const HISTOGRAM_BINS: usize = 24;
const HASH_BITS: f64 = 64.0;

const WEIGHT_FINGERPRINT: f64 = 0.6;
const WEIGHT_HISTOGRAM: f64 = 0.4;

/// Fixed-size visual summary of one image: a 64-bit average hash (robust to
/// resizing and recompression) plus a coarse color distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSignature {
    pub fingerprint: u64,
    pub histogram: Vec<f32>,
}

/// Reduce raw image bytes to a signature. Fails only on undecodable data;
/// callers treat that as data-unavailable for the image, never as fatal for
/// the pair.
pub fn signature_from_bytes(bytes: &[u8]) -> Result<ImageSignature> {
    let decoded = image::load_from_memory(bytes).context("Failed to decode image data")?;

    // Average hash over an 8x8 grayscale reduction
    let gray = decoded.resize_exact(8, 8, FilterType::Triangle).to_luma8();
    let mean = gray.pixels().map(|p| p.0[0] as f64).sum::<f64>() / HASH_BITS;
    let mut fingerprint: u64 = 0;
    for (i, pixel) in gray.pixels().enumerate() {
        if (pixel.0[0] as f64) > mean {
            fingerprint |= 1u64 << i;
        }
    }

    // 8-bin-per-channel histogram over a 64x64 reduction
    let small = decoded.resize_exact(64, 64, FilterType::Triangle).to_rgb8();
    let mut histogram = vec![0f32; HISTOGRAM_BINS];
    for pixel in small.pixels() {
        histogram[(pixel.0[0] / 32) as usize] += 1.0;
        histogram[8 + (pixel.0[1] / 32) as usize] += 1.0;
        histogram[16 + (pixel.0[2] / 32) as usize] += 1.0;
    }
    let total = (64 * 64) as f32;
    for value in histogram.iter_mut() {
        *value /= total;
    }

    Ok(ImageSignature {
        fingerprint,
        histogram,
    })
}

/// Hamming-distance-derived similarity between two fingerprints.
pub fn fingerprint_similarity(a: u64, b: u64) -> f64 {
    1.0 - (a ^ b).count_ones() as f64 / HASH_BITS
}

/// Cosine similarity between two color distributions.
pub fn histogram_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Similarity of two individual images, or `None` when neither signature
/// component is comparable (unenriched or unreadable images are skipped).
pub fn image_pair_similarity(a: &ReportImage, b: &ReportImage) -> Option<f64> {
    // The same stored object is trivially a perfect match
    if a.image_url == b.image_url {
        return Some(1.0);
    }

    let fingerprint = match (a.fingerprint, b.fingerprint) {
        (Some(x), Some(y)) => Some(fingerprint_similarity(x, y)),
        _ => None,
    };
    let histogram = match (&a.histogram, &b.histogram) {
        (Some(x), Some(y)) => Some(histogram_similarity(x, y)),
        _ => None,
    };

    match (fingerprint, histogram) {
        (Some(f), Some(h)) => Some(WEIGHT_FINGERPRINT * f + WEIGHT_HISTOGRAM * h),
        (Some(f), None) => Some(f),
        (None, Some(h)) => Some(h),
        (None, None) => None,
    }
}

/// Set-to-set reduction: the single best-matching photo pair dominates. A
/// lost item usually has one clear photo while found items carry unrelated
/// background shots, so the maximum beats the average here.
pub fn compare_image_sets(
    a: &[ReportImage],
    b: &[ReportImage],
    max_per_set: usize,
) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let mut best: Option<f64> = None;
    for image_a in a.iter().take(max_per_set) {
        for image_b in b.iter().take(max_per_set) {
            if let Some(score) = image_pair_similarity(image_a, image_b) {
                best = Some(best.map_or(score, |current: f64| current.max(score)));
            }
        }
    }
    best
}

/// Fetch the raw bytes behind an image reference: inline `data:` URIs are
/// decoded locally, http(s) URLs are fetched.
pub async fn load_image_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    if let Some(data_uri) = url.strip_prefix("data:") {
        let payload = data_uri
            .split_once(',')
            .map(|(_, payload)| payload)
            .ok_or_else(|| anyhow!("Malformed data URI"))?;
        return base64::engine::general_purpose::STANDARD
            .decode(payload)
            .context("Failed to decode data URI payload");
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        let response = client.get(url).send().await?.error_for_status()?;
        return Ok(response.bytes().await?.to_vec());
    }

    warn!(target: TARGET_SCORING, "Unsupported image url scheme: {}", url);
    Err(anyhow!("Unsupported image url scheme"))
}
