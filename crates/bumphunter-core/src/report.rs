//! 报告数据契约（供外部绘图/持久化使用）
use serde::Serialize;
use std::fmt;

use crate::histogram::Histogram;
use crate::options::ScanStats;
use crate::scan::BumpScan;
use crate::significance::{GlobalSignificance, SignificanceBound};
use crate::types::Window;

/// 层析图的一个点：窗口物理区间及其局部 p 值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TomographyPoint {
    pub lo: f64,
    pub hi: f64,
    pub p_value: f64,
}

/// 鼓包扫描报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BumpReport {
    pub window: Window,
    /// 物理区间 [lo, hi)
    pub lo: f64,
    pub hi: f64,
    pub mean: f64,
    pub width: f64,
    pub observed: f64,
    pub expected: f64,
    /// 窗口内观测减本底（信号事例数估计）
    pub signal_estimate: f64,
    pub local_p_value: f64,
    /// t = -ln(p_local)，p 值下溢时仍然有限
    pub local_test_statistic: f64,
    pub local_significance: f64,
    pub global: Option<GlobalSignificance>,
    pub tomography: Vec<TomographyPoint>,
    /// 伪实验检验统计量 t = -ln(p_min)，按实验序号
    pub null_test_statistics: Vec<f64>,
    pub pseudo_truncated: bool,
    pub stats: ScanStats,
}

impl BumpReport {
    /// 由扫描结果与其所用分箱构造报告
    pub fn new(scan: &BumpScan, binning: &Histogram) -> Self {
        let (lo, hi) = binning.range_of(&scan.real.window);
        let tomography = scan
            .tomography
            .iter()
            .map(|s| {
                let (lo, hi) = binning.range_of(&s.window);
                TomographyPoint { lo, hi, p_value: s.p_value() }
            })
            .collect();
        Self {
            window: scan.real.window,
            lo,
            hi,
            mean: 0.5 * (lo + hi),
            width: hi - lo,
            observed: scan.real.observed,
            expected: scan.real.expected,
            signal_estimate: scan.real.observed - scan.real.expected,
            local_p_value: scan.real.p_value(),
            local_test_statistic: scan.real.test_statistic(),
            local_significance: scan.real.significance(),
            global: scan.global,
            tomography,
            null_test_statistics: scan.pseudo.results().iter().map(|r| r.test_statistic()).collect(),
            pseudo_truncated: scan.pseudo.is_truncated(),
            stats: scan.stats.clone(),
        }
    }
}

impl fmt::Display for BumpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BUMP WINDOW")?;
        writeln!(f, "   loc = {} (bins [{}, {}))", self.window.start, self.window.start, self.window.end())?;
        writeln!(f, "   width = {}", self.window.width)?;
        writeln!(f, "   edges = [{}, {}]", self.lo, self.hi)?;
        writeln!(f, "BUMP POSITION")?;
        writeln!(f, "   min : {:.3}", self.lo)?;
        writeln!(f, "   max : {:.3}", self.hi)?;
        writeln!(f, "   mean : {:.3}", self.mean)?;
        writeln!(f, "   width : {:.3}", self.width)?;
        writeln!(f, "   number of signal events : {:.1}", self.signal_estimate)?;
        writeln!(f, "   local p-value | t = {:.5e} | {:.5}", self.local_p_value, self.local_test_statistic)?;
        writeln!(f, "   local significance = {:.5}", self.local_significance)?;
        match &self.global {
            Some(g) => {
                let rel = match g.bound {
                    SignificanceBound::Exact => "=",
                    SignificanceBound::AtLeast => "<",
                };
                writeln!(f, "   global p-value {rel} {:.8} ({} / {} pseudo-experiments)", g.p_value, g.n_beyond, g.n_pseudo)?;
                let rel = match g.bound {
                    SignificanceBound::Exact => "=",
                    SignificanceBound::AtLeast => ">",
                };
                write!(f, "   global significance {rel} {:.3}", g.significance)?;
                if g.truncated {
                    write!(f, " (TRUNCATED pseudo-experiment set)")?;
                }
                writeln!(f)
            }
            None => writeln!(f, "   global significance unavailable: no pseudo-experiment completed"),
        }
    }
}
