//! # SIMD-Accelerated Distance Kernels
//!
//! Vector arithmetic using CPU intrinsics, dispatched at runtime:
//! AVX2+FMA > AVX > SSE > Scalar on x86_64, NEON on aarch64.
//!
//! ## Supported Operations
//! - Dot product
//! - Squared L2 distance
//! - Fused dot product + squared norm of the candidate (cosine in one pass)

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

/// Compute dot product of two vectors using best available SIMD
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return unsafe { dot_product_avx2_fma(a, b) };
        }
        if is_x86_feature_detected!("avx") {
            return unsafe { dot_product_avx(a, b) };
        }
        if is_x86_feature_detected!("sse3") {
            return unsafe { dot_product_sse(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { dot_product_neon(a, b) };
    }

    #[allow(unreachable_code)]
    dot_product_scalar(a, b)
}

/// Compute L2 (Euclidean) distance squared
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return unsafe { l2_squared_avx2_fma(a, b) };
        }
        if is_x86_feature_detected!("avx") {
            return unsafe { l2_squared_avx(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { l2_squared_neon(a, b) };
    }

    #[allow(unreachable_code)]
    l2_squared_scalar(a, b)
}

/// Compute L2 distance (with sqrt)
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// Returns `(dot(a, b), dot(b, b))` in a single pass over both vectors.
///
/// The query side norm is computed once per query, so only the candidate
/// norm is needed per comparison.
#[inline]
pub fn dot_and_norm_squared(a: &[f32], b: &[f32]) -> (f32, f32) {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return unsafe { dot_and_norm_avx2_fma(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { dot_and_norm_neon(a, b) };
    }

    #[allow(unreachable_code)]
    dot_and_norm_scalar(a, b)
}

/// Compute vector norm (magnitude)
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// Normalize vector in-place. Zero vectors are left untouched.
#[inline]
pub fn normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        let inv_n = 1.0 / n;
        for x in v.iter_mut() {
            *x *= inv_n;
        }
    }
}

// ============================================================================
// Scalar implementations (fallback)
// ============================================================================

#[inline]
pub(crate) fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub(crate) fn l2_squared_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
fn dot_and_norm_scalar(a: &[f32], b: &[f32]) -> (f32, f32) {
    let mut dot = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_b += y * y;
    }
    (dot, norm_b)
}

// ============================================================================
// AVX2 + FMA implementations (256-bit, 8 floats at a time)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn dot_product_avx2_fma(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let chunks = n / 8;
    let remainder = n % 8;

    let mut sum = _mm256_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 8;
        let va = _mm256_loadu_ps(a_ptr.add(offset));
        let vb = _mm256_loadu_ps(b_ptr.add(offset));
        sum = _mm256_fmadd_ps(va, vb, sum);
    }

    let mut result = hsum256_ps(sum);
    let base = chunks * 8;
    for i in 0..remainder {
        result += a[base + i] * b[base + i];
    }
    result
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn l2_squared_avx2_fma(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let chunks = n / 8;
    let remainder = n % 8;

    let mut sum = _mm256_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 8;
        let va = _mm256_loadu_ps(a_ptr.add(offset));
        let vb = _mm256_loadu_ps(b_ptr.add(offset));
        let diff = _mm256_sub_ps(va, vb);
        sum = _mm256_fmadd_ps(diff, diff, sum);
    }

    let mut result = hsum256_ps(sum);
    let base = chunks * 8;
    for i in 0..remainder {
        let d = a[base + i] - b[base + i];
        result += d * d;
    }
    result
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn dot_and_norm_avx2_fma(a: &[f32], b: &[f32]) -> (f32, f32) {
    let n = a.len();
    let chunks = n / 8;
    let remainder = n % 8;

    let mut dot_sum = _mm256_setzero_ps();
    let mut norm_b_sum = _mm256_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 8;
        let va = _mm256_loadu_ps(a_ptr.add(offset));
        let vb = _mm256_loadu_ps(b_ptr.add(offset));
        dot_sum = _mm256_fmadd_ps(va, vb, dot_sum);
        norm_b_sum = _mm256_fmadd_ps(vb, vb, norm_b_sum);
    }

    let mut dot = hsum256_ps(dot_sum);
    let mut norm_b = hsum256_ps(norm_b_sum);
    let base = chunks * 8;
    for i in 0..remainder {
        let x = a[base + i];
        let y = b[base + i];
        dot += x * y;
        norm_b += y * y;
    }
    (dot, norm_b)
}

// ============================================================================
// AVX implementations (256-bit, no FMA)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn dot_product_avx(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let chunks = n / 8;
    let remainder = n % 8;

    let mut sum = _mm256_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 8;
        let va = _mm256_loadu_ps(a_ptr.add(offset));
        let vb = _mm256_loadu_ps(b_ptr.add(offset));
        sum = _mm256_add_ps(sum, _mm256_mul_ps(va, vb));
    }

    let mut result = hsum256_ps(sum);
    let base = chunks * 8;
    for i in 0..remainder {
        result += a[base + i] * b[base + i];
    }
    result
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn l2_squared_avx(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let chunks = n / 8;
    let remainder = n % 8;

    let mut sum = _mm256_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 8;
        let va = _mm256_loadu_ps(a_ptr.add(offset));
        let vb = _mm256_loadu_ps(b_ptr.add(offset));
        let diff = _mm256_sub_ps(va, vb);
        sum = _mm256_add_ps(sum, _mm256_mul_ps(diff, diff));
    }

    let mut result = hsum256_ps(sum);
    let base = chunks * 8;
    for i in 0..remainder {
        let d = a[base + i] - b[base + i];
        result += d * d;
    }
    result
}

// ============================================================================
// SSE implementations (128-bit, 4 floats at a time)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse3")]
unsafe fn dot_product_sse(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let chunks = n / 4;
    let remainder = n % 4;

    let mut sum = _mm_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 4;
        let va = _mm_loadu_ps(a_ptr.add(offset));
        let vb = _mm_loadu_ps(b_ptr.add(offset));
        sum = _mm_add_ps(sum, _mm_mul_ps(va, vb));
    }

    let mut result = hsum128_ps(sum);
    let base = chunks * 4;
    for i in 0..remainder {
        result += a[base + i] * b[base + i];
    }
    result
}

// ============================================================================
// Horizontal sums
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
#[inline]
unsafe fn hsum256_ps(v: __m256) -> f32 {
    let high = _mm256_extractf128_ps(v, 1);
    let low = _mm256_castps256_ps128(v);
    hsum128_ps(_mm_add_ps(high, low))
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse3")]
#[inline]
unsafe fn hsum128_ps(v: __m128) -> f32 {
    let shuf = _mm_movehdup_ps(v); // [1,1,3,3]
    let sums = _mm_add_ps(v, shuf);
    let shuf = _mm_movehl_ps(sums, sums);
    let sums = _mm_add_ss(sums, shuf);
    _mm_cvtss_f32(sums)
}

// ============================================================================
// ARM NEON implementations (128-bit, 4 floats at a time)
// ============================================================================

#[cfg(target_arch = "aarch64")]
#[inline]
unsafe fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let chunks = n / 4;
    let remainder = n % 4;

    let mut sum = vdupq_n_f32(0.0);
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 4;
        let va = vld1q_f32(a_ptr.add(offset));
        let vb = vld1q_f32(b_ptr.add(offset));
        sum = vfmaq_f32(sum, va, vb);
    }

    let mut result = vaddvq_f32(sum);
    let base = chunks * 4;
    for i in 0..remainder {
        result += a[base + i] * b[base + i];
    }
    result
}

#[cfg(target_arch = "aarch64")]
#[inline]
unsafe fn l2_squared_neon(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let chunks = n / 4;
    let remainder = n % 4;

    let mut sum = vdupq_n_f32(0.0);
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 4;
        let va = vld1q_f32(a_ptr.add(offset));
        let vb = vld1q_f32(b_ptr.add(offset));
        let diff = vsubq_f32(va, vb);
        sum = vfmaq_f32(sum, diff, diff);
    }

    let mut result = vaddvq_f32(sum);
    let base = chunks * 4;
    for i in 0..remainder {
        let d = a[base + i] - b[base + i];
        result += d * d;
    }
    result
}

#[cfg(target_arch = "aarch64")]
#[inline]
unsafe fn dot_and_norm_neon(a: &[f32], b: &[f32]) -> (f32, f32) {
    let n = a.len();
    let chunks = n / 4;
    let remainder = n % 4;

    let mut dot_sum = vdupq_n_f32(0.0);
    let mut norm_b_sum = vdupq_n_f32(0.0);
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 4;
        let va = vld1q_f32(a_ptr.add(offset));
        let vb = vld1q_f32(b_ptr.add(offset));
        dot_sum = vfmaq_f32(dot_sum, va, vb);
        norm_b_sum = vfmaq_f32(norm_b_sum, vb, vb);
    }

    let mut dot = vaddvq_f32(dot_sum);
    let mut norm_b = vaddvq_f32(norm_b_sum);
    let base = chunks * 4;
    for i in 0..remainder {
        let x = a[base + i];
        let y = b[base + i];
        dot += x * y;
        norm_b += y * y;
    }
    (dot, norm_b)
}
