//! 公共类型（对外暴露）
use serde::Serialize;

use crate::significance::z_from_ln_p;

/// 连续分箱窗口 [start, start + width)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Window {
    pub start: usize,
    pub width: usize,
}

impl Window {
    pub fn end(&self) -> usize {
        self.start + self.width
    }
}

/// 单个窗口的局部评分
/// p 值以自然对数形式保存，避免极小尾概率下溢为 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalScore {
    pub window: Window,
    pub observed: f64,
    pub expected: f64,
    pub ln_pvalue: f64,
}

impl LocalScore {
    pub fn p_value(&self) -> f64 {
        self.ln_pvalue.exp()
    }

    /// 单侧局部显著性（标准差）
    pub fn significance(&self) -> f64 {
        z_from_ln_p(self.ln_pvalue)
    }
}

/// 单个数据集（真实或伪实验）的最显著窗口
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanResult {
    pub window: Window,
    pub observed: f64,
    pub expected: f64,
    pub ln_pvalue: f64,
}

impl ScanResult {
    pub fn p_value(&self) -> f64 {
        self.ln_pvalue.exp()
    }

    /// 检验统计量 t = -ln(p)
    pub fn test_statistic(&self) -> f64 {
        -self.ln_pvalue
    }

    pub fn significance(&self) -> f64 {
        z_from_ln_p(self.ln_pvalue)
    }
}

impl From<LocalScore> for ScanResult {
    fn from(s: LocalScore) -> Self {
        Self { window: s.window, observed: s.observed, expected: s.expected, ln_pvalue: s.ln_pvalue }
    }
}

/// 伪实验集合：按实验序号排列，构建后只读
/// 若被提前终止，`results.len() < requested`，必须按截断结果对待
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PseudoExperimentSet {
    requested: usize,
    results: Vec<ScanResult>,
}

impl PseudoExperimentSet {
    pub(crate) fn new(requested: usize, results: Vec<ScanResult>) -> Self {
        Self { requested, results }
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.results.len() < self.requested
    }

    pub fn results(&self) -> &[ScanResult] {
        &self.results
    }

    /// 各伪实验的最小局部 p 值（对数形式），按实验序号排列
    pub fn best_ln_pvalues(&self) -> impl Iterator<Item = f64> + '_ {
        self.results.iter().map(|r| r.ln_pvalue)
    }
}
