use candle_core::{DType, Tensor};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::CoreResult;
use crate::model::SamplingParams;

/// Build the RNG for one generation call.
pub fn rng_for(params: &SamplingParams) -> StdRng {
    match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Sample the next token id from logits.
///
/// ## Pipeline
///
/// 1. Single device→CPU transfer (`to_vec1`).
/// 2. Repetition penalty over `token_history`, in place.
/// 3. Temperature scaling.
/// 4. Top-K mask.
/// 5. Softmax, top-P nucleus, weighted draw.
///
/// A non-positive temperature falls back to argmax.
pub fn sample_token(
    logits: &Tensor,
    params: &SamplingParams,
    token_history: &[u32],
    rng: &mut StdRng,
) -> CoreResult<u32> {
    let mut logits_vec: Vec<f32> = logits.to_dtype(DType::F32)?.to_vec1()?;

    if (params.repetition_penalty - 1.0).abs() > f64::EPSILON {
        apply_repetition_penalty(&mut logits_vec, token_history, params.repetition_penalty);
    }

    if params.temperature <= 0.0 {
        return Ok(argmax(&logits_vec));
    }
    apply_temperature(&mut logits_vec, params.temperature);

    if let Some(k) = params.top_k {
        top_k_filter(&mut logits_vec, k);
    }

    let probs = nucleus_probs(&logits_vec, params.top_p);
    match WeightedIndex::new(&probs) {
        Ok(dist) => Ok(dist.sample(rng) as u32),
        // All weights zero or non-finite: nothing sensible to draw from.
        Err(_) => Ok(argmax(&logits_vec)),
    }
}

fn argmax(logits: &[f32]) -> u32 {
    logits
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0 as u32
}

fn apply_temperature(logits: &mut [f32], temperature: f64) {
    if (temperature - 1.0).abs() < f64::EPSILON {
        return;
    }
    let t = temperature as f32;
    for v in logits.iter_mut() {
        *v /= t;
    }
}

/// Push every token already in `history` toward zero logit.
///
/// Each distinct id is penalized once no matter how often it occurs.
fn apply_repetition_penalty(logits: &mut [f32], history: &[u32], penalty: f64) {
    if penalty <= 0.0 {
        return;
    }
    let p = penalty as f32;
    let mut seen = std::collections::HashSet::with_capacity(history.len());
    for &id in history {
        let idx = id as usize;
        if idx >= logits.len() || !seen.insert(id) {
            continue;
        }
        if logits[idx] >= 0.0 {
            logits[idx] /= p;
        } else {
            logits[idx] *= p;
        }
    }
}

/// Keep only the top-`k` logits; set all others to `-∞`.
fn top_k_filter(logits: &mut [f32], k: usize) {
    if k == 0 || k >= logits.len() {
        return;
    }
    let mut sorted: Vec<f32> = logits.to_vec();
    sorted.select_nth_unstable_by(k - 1, |a, b| b.total_cmp(a));
    let threshold = sorted[k - 1];
    for v in logits.iter_mut() {
        if *v < threshold {
            *v = f32::NEG_INFINITY;
        }
    }
}

/// Softmax, then zero everything outside the smallest set of tokens whose
/// cumulative probability reaches `top_p`.
fn nucleus_probs(logits: &[f32], top_p: f64) -> Vec<f32> {
    let max_logit = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<f32> = logits.iter().map(|&v| (v - max_logit).exp()).collect();
    let sum: f32 = probs.iter().sum();
    if sum > 0.0 {
        probs.iter_mut().for_each(|p| *p /= sum);
    }

    if top_p >= 1.0 {
        return probs;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_unstable_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut cumsum = 0.0f64;
    let mut keep = vec![false; probs.len()];
    for idx in order {
        keep[idx] = true;
        cumsum += f64::from(probs[idx]);
        if cumsum >= top_p {
            break;
        }
    }
    for (p, kept) in probs.iter_mut().zip(keep) {
        if !kept {
            *p = 0.0;
        }
    }
    probs
}
