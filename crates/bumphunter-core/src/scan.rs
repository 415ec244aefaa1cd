//! 扫描主流程（真实数据 + 背景伪实验校准）
//!
//! 1) 校验配置与分箱一致性（失败即返回配置错误）
//! 2) 窗口只枚举一次，本底窗口和只计算一次，所有实验共享
//! 3) 真实数据全窗口评分，记录最小 p 值窗口与层析图
//! 4) 生成 npe 个伪实验并逐个扫描，按实验序号收集最小 p 值
//! 5) 以真实值在伪实验分布中的排名给出全局显著性
use tracing::{debug, info, warn};

use crate::error::{BumpError, Result};
use crate::histogram::{Histogram, InputData};
use crate::options::{ScanConfig, ScanStats};
use crate::pool::{run_ordered, CancelToken};
use crate::pseudo::PseudoExperimentGenerator;
use crate::scorer::WindowScorer;
use crate::significance::{GlobalSignificance, NullDistribution, LN_P_UNDERFLOW};
use crate::types::{LocalScore, PseudoExperimentSet, ScanResult};
use crate::windows::enumerate_windows;

/// 一次 `bump_scan` 的完整结果（调用结束后归调用方所有）
#[derive(Debug, Clone)]
pub struct BumpScan {
    /// 真实数据的最显著窗口
    pub real: ScanResult,
    /// 真实数据全部窗口的局部评分（窗口枚举顺序）
    pub tomography: Vec<LocalScore>,
    pub pseudo: PseudoExperimentSet,
    /// 没有任何伪实验完成（提前取消）时为 None
    pub global: Option<GlobalSignificance>,
    pub stats: ScanStats,
}

/// 将外部输入归一化为同分箱的数据/本底直方图
pub fn normalize_inputs(data: InputData, background: InputData, cfg: &ScanConfig) -> Result<(Histogram, Histogram)> {
    cfg.validate()?;
    let edges = cfg.edges();
    let data = data.into_histogram(&edges)?;
    let background = background.into_histogram(&edges)?;
    Ok((data, background))
}

/// 扫描计划：校验后的窗口评分器（只读共享）
pub(crate) struct ScanPlan {
    pub(crate) scorer: WindowScorer,
}

impl ScanPlan {
    pub(crate) fn new(background: &Histogram, cfg: &ScanConfig) -> Result<Self> {
        cfg.validate()?;
        let nbins = background.nbins();
        let windows = enumerate_windows(nbins, cfg.width_min, cfg.width_max, cfg.width_step, cfg.scan_step);
        if windows.is_empty() {
            return Err(BumpError::config(format!(
                "no window fits: width_min = {} but histogram has {} bins",
                cfg.width_min, nbins
            )));
        }
        let scorer = WindowScorer::new(background, windows, cfg.mode, cfg.use_sideband);
        let zero = scorer.zero_background_windows();
        if zero > 0 {
            warn!(
                windows = zero,
                "windows with zero expected background: local p-value fixed to 0 (excess with observed > 0) or 1"
            );
        }
        Ok(Self { scorer })
    }

    pub(crate) fn check_binning(&self, what: &str, hist: &Histogram, background: &Histogram) -> Result<()> {
        if !hist.same_binning(background) {
            return Err(BumpError::config(format!(
                "{what} binning ({} bins, [{}, {}]) differs from background binning ({} bins, [{}, {}])",
                hist.nbins(),
                hist.edges()[0],
                hist.edges()[hist.nbins()],
                background.nbins(),
                background.edges()[0],
                background.edges()[background.nbins()],
            )));
        }
        Ok(())
    }

    /// 单个数据集的最显著窗口
    pub(crate) fn best(&self, counts: &[f64]) -> Result<ScanResult> {
        self.scorer
            .best(counts, &mut Vec::with_capacity(counts.len() + 1))
            .ok_or_else(|| BumpError::config("window list is empty"))
    }

    /// 生成并扫描背景伪实验，按实验序号返回（可能被截断）
    pub(crate) fn null_set(&self, background: &Histogram, cfg: &ScanConfig, cancel: &CancelToken) -> Result<PseudoExperimentSet> {
        let generator = PseudoExperimentGenerator::new(background, cfg.seed);
        let results = run_ordered(cfg.npe, cfg.nworker, cancel, |k| {
            let mut counts = Vec::with_capacity(background.nbins());
            generator.fill_replica(k, &mut counts);
            self.scorer.best(&counts, &mut Vec::with_capacity(counts.len() + 1))
        })?;
        let results = results
            .into_iter()
            .collect::<Option<Vec<ScanResult>>>()
            .ok_or_else(|| BumpError::config("window list is empty"))?;
        let set = PseudoExperimentSet::new(cfg.npe, results);
        if set.is_truncated() {
            warn!(completed = set.len(), requested = cfg.npe, "pseudo-experiment set truncated by cancellation");
        }
        Ok(set)
    }
}

/// 扫描真实数据并以背景伪实验校准全局显著性
pub fn bump_scan(data: &Histogram, background: &Histogram, cfg: &ScanConfig) -> Result<BumpScan> {
    bump_scan_with_cancel(data, background, cfg, &CancelToken::new())
}

/// 同 `bump_scan`，支持在伪实验单元边界处尽力取消
pub fn bump_scan_with_cancel(
    data: &Histogram,
    background: &Histogram,
    cfg: &ScanConfig,
    cancel: &CancelToken,
) -> Result<BumpScan> {
    let plan = ScanPlan::new(background, cfg)?;
    plan.check_binning("data", data, background)?;

    let windows = plan.scorer.windows().len();
    info!(nbins = background.nbins(), windows, npe = cfg.npe, nworker = cfg.nworker, seed = cfg.seed, "starting bump scan");

    let tomography = plan.scorer.score_all(data.contents());
    let real = plan.best(data.contents())?;
    if real.ln_pvalue < LN_P_UNDERFLOW {
        warn!(ln_pvalue = real.ln_pvalue, "local p-value below double precision, significance uses tail asymptotics");
    }
    debug!(start = real.window.start, width = real.window.width, ln_pvalue = real.ln_pvalue, "data scanned");

    let pseudo = plan.null_set(background, cfg, cancel)?;
    let global = NullDistribution::from_set(&pseudo).rank(real.ln_pvalue);

    let stats = ScanStats {
        windows,
        zero_background_windows: plan.scorer.zero_background_windows(),
        pseudo_requested: cfg.npe,
        pseudo_completed: pseudo.len(),
    };

    match &global {
        Some(g) => info!(
            global_p = g.p_value,
            significance = g.significance,
            bounded = g.is_bounded(),
            truncated = g.truncated,
            "bump scan finished"
        ),
        None => warn!("bump scan cancelled before any pseudo-experiment completed"),
    }

    Ok(BumpScan { real, tomography, pseudo, global, stats })
}
