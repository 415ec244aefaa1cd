//! 全局显著性（look-elsewhere 修正）与分位数
//!
//! 全局 p 值 = 伪实验中最小局部 p 值 ≤ 真实数据最小局部 p 值的比例。
//! 没有任何伪实验达到真实数据时，只能给出 p < 1/n 的上界（显著性为下界），不报告 0。
use serde::Serialize;
use statrs::function::erf::{erfc, erfc_inv};

use crate::types::PseudoExperimentSet;

/// ln p 低于该值时 exp 已进入次正规区，改用渐近展开求 Z
pub const LN_P_UNDERFLOW: f64 = -700.0;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// 单侧 p 值 → 显著性 Z（标准差），Z = Φ⁻¹(1 - p)
/// - p = 1 记为 0（与原工具一致），p = 0 记为 +∞
/// - ln p < LN_P_UNDERFLOW 时使用尾部渐近式 ln p ≈ -z²/2 - ln z - ln√(2π)
pub fn z_from_ln_p(ln_p: f64) -> f64 {
    if ln_p.is_nan() {
        return f64::NAN;
    }
    if ln_p >= 0.0 {
        return 0.0;
    }
    if ln_p == f64::NEG_INFINITY {
        return f64::INFINITY;
    }
    if ln_p < LN_P_UNDERFLOW {
        let mut z = (-2.0 * ln_p).sqrt();
        for _ in 0..8 {
            z = (-2.0 * (ln_p + z.ln() + LN_SQRT_2PI)).sqrt();
        }
        return z;
    }
    std::f64::consts::SQRT_2 * erfc_inv(2.0 * ln_p.exp())
}

/// 显著性 Z → 单侧 p 值
pub fn p_from_z(z: f64) -> f64 {
    0.5 * erfc(z / std::f64::consts::SQRT_2)
}

/// n 个伪实验能给出的最大全局显著性，即界 p = 1/n 对应的 Z
pub fn significance_ceiling(n_pseudo: usize) -> f64 {
    if n_pseudo == 0 {
        return 0.0;
    }
    z_from_ln_p((1.0 / n_pseudo as f64).ln())
}

/// 全局结果是精确值还是界
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceBound {
    Exact,
    /// p 值为上界、显著性为下界（受伪实验数量分辨率限制）
    AtLeast,
}

/// 全局显著性
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalSignificance {
    pub p_value: f64,
    pub significance: f64,
    pub bound: SignificanceBound,
    /// 最小局部 p 值 ≤ 真实值的伪实验个数
    pub n_beyond: usize,
    pub n_pseudo: usize,
    /// 伪实验集合被截断（提前终止）
    pub truncated: bool,
}

impl GlobalSignificance {
    /// 由计数构造；n_pseudo 为 0 时无法给出结果
    pub fn from_counts(n_beyond: usize, n_pseudo: usize, truncated: bool) -> Option<Self> {
        if n_pseudo == 0 {
            return None;
        }
        let (p_value, bound) = if n_beyond == 0 {
            (1.0 / n_pseudo as f64, SignificanceBound::AtLeast)
        } else {
            (n_beyond as f64 / n_pseudo as f64, SignificanceBound::Exact)
        };
        Some(Self {
            p_value,
            significance: z_from_ln_p(p_value.ln()),
            bound,
            n_beyond,
            n_pseudo,
            truncated,
        })
    }

    pub fn is_bounded(&self) -> bool {
        self.bound == SignificanceBound::AtLeast
    }
}

/// 背景伪实验的零假设分布：各伪实验最小 ln p 升序排列
#[derive(Debug, Clone)]
pub struct NullDistribution {
    sorted_ln_p: Vec<f64>,
    truncated: bool,
}

impl NullDistribution {
    pub fn from_set(set: &PseudoExperimentSet) -> Self {
        let mut sorted_ln_p: Vec<f64> = set.best_ln_pvalues().collect();
        sorted_ln_p.sort_by(|a, b| a.total_cmp(b));
        Self { sorted_ln_p, truncated: set.is_truncated() }
    }

    pub fn len(&self) -> usize {
        self.sorted_ln_p.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_ln_p.is_empty()
    }

    /// 对给定的最小 ln p 计算全局显著性
    pub fn rank(&self, ln_p: f64) -> Option<GlobalSignificance> {
        let n_beyond = self.sorted_ln_p.partition_point(|v| *v <= ln_p);
        GlobalSignificance::from_counts(n_beyond, self.sorted_ln_p.len(), self.truncated)
    }
}

/// 升序序列的线性插值分位数
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 1.0 {
        return sorted[n - 1];
    }
    let idx = p * ((n - 1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let w = idx - (lo as f64);
    sorted[lo] + w * (sorted[hi] - sorted[lo])
}
