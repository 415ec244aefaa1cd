//! 局部评分：窗口内观测数 O 相对本底期望 B 的单侧 Poisson p 值
//!
//! - Excess：p = P(X ≥ O | B) = P(O, B)（正则化下不完全 Gamma）
//! - Deficit：p = P(X ≤ O | B) = Q(O + 1, B)
//! 非整数 O（加权数据）使用连续延拓；全部以 ln p 表示。
use crate::histogram::Histogram;
use crate::options::ScanMode;
use crate::special::{ln_gamma_p, ln_gamma_q};
use crate::types::{LocalScore, ScanResult, Window};
use tracing::warn;

/// 单窗口 ln p 值
/// - Excess：O = 0 → p = 1；B = 0 → O > 0 时 p = 0，否则 p = 1
/// - Deficit：B = 0 → p = 1
pub fn local_ln_pvalue(observed: f64, expected: f64, mode: ScanMode) -> f64 {
    let ln_p = match mode {
        ScanMode::Excess => {
            if observed <= 0.0 {
                0.0
            } else if expected <= 0.0 {
                f64::NEG_INFINITY
            } else {
                ln_gamma_p(observed, expected)
            }
        }
        ScanMode::Deficit => {
            if expected <= 0.0 {
                0.0
            } else {
                ln_gamma_q(observed.max(0.0) + 1.0, expected)
            }
        }
    };
    // 非法输入（NaN、无穷计数）按“无偏离”处理
    if ln_p.is_nan() {
        warn!(observed, expected, ?mode, "local p-value is not a number, window treated as p = 1");
        0.0
    } else {
        ln_p
    }
}

/// 单窗口 p 值，范围 [0, 1]
pub fn local_pvalue(observed: f64, expected: f64, mode: ScanMode) -> f64 {
    local_ln_pvalue(observed, expected, mode).exp()
}

/// 前缀和：prefix[i] = Σ_{j<i} counts[j]
pub(crate) fn prefix_sums(counts: &[f64], prefix: &mut Vec<f64>) {
    prefix.clear();
    prefix.reserve(counts.len() + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for c in counts {
        acc += c;
        prefix.push(acc);
    }
}

/// 固定分箱上的窗口评分器
/// 窗口列表与本底窗口和只计算一次，真实数据与全部伪实验共享
#[derive(Debug, Clone)]
pub struct WindowScorer {
    windows: Vec<Window>,
    bkg_sums: Vec<f64>,
    bkg_total: f64,
    mode: ScanMode,
    use_sideband: bool,
}

impl WindowScorer {
    pub fn new(background: &Histogram, windows: Vec<Window>, mode: ScanMode, use_sideband: bool) -> Self {
        let mut prefix = Vec::new();
        prefix_sums(background.contents(), &mut prefix);
        let bkg_sums = windows.iter().map(|w| prefix[w.end()] - prefix[w.start]).collect();
        Self { windows, bkg_sums, bkg_total: prefix[prefix.len() - 1], mode, use_sideband }
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// 本底期望为 0 的窗口数（数值上退化，单独记录）
    pub fn zero_background_windows(&self) -> usize {
        self.bkg_sums.iter().filter(|b| **b <= 0.0).count()
    }

    /// 窗口 k 的本底期望；启用 sideband 时按窗口外区域的数据/本底比例重新归一化
    fn expected_for(&self, k: usize, observed: f64, data_total: f64) -> f64 {
        let b = self.bkg_sums[k];
        if !self.use_sideband {
            return b;
        }
        let data_out = data_total - observed;
        let bkg_out = self.bkg_total - b;
        if data_out > 0.0 && bkg_out > 0.0 {
            b * data_out / bkg_out
        } else {
            b
        }
    }

    /// 全部窗口的局部评分（窗口枚举顺序），用于层析图
    pub fn score_all(&self, counts: &[f64]) -> Vec<LocalScore> {
        let mut prefix = Vec::new();
        prefix_sums(counts, &mut prefix);
        let total = prefix[prefix.len() - 1];
        self.windows
            .iter()
            .enumerate()
            .map(|(k, w)| {
                let observed = prefix[w.end()] - prefix[w.start];
                let expected = self.expected_for(k, observed, total);
                LocalScore { window: *w, observed, expected, ln_pvalue: local_ln_pvalue(observed, expected, self.mode) }
            })
            .collect()
    }

    /// 最小局部 p 值的窗口；并列时取枚举顺序中的第一个
    /// `prefix` 为调用方复用的缓冲
    pub fn best(&self, counts: &[f64], prefix: &mut Vec<f64>) -> Option<ScanResult> {
        prefix_sums(counts, prefix);
        let total = prefix[prefix.len() - 1];
        let mut best: Option<ScanResult> = None;
        for (k, w) in self.windows.iter().enumerate() {
            let observed = prefix[w.end()] - prefix[w.start];
            let expected = self.expected_for(k, observed, total);
            let ln_pvalue = local_ln_pvalue(observed, expected, self.mode);
            match best {
                Some(b) if b.ln_pvalue <= ln_pvalue => {}
                _ => best = Some(ScanResult { window: *w, observed, expected, ln_pvalue }),
            }
        }
        best
    }
}
