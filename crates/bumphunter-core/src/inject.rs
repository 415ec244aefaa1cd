//! 信号注入灵敏度扫描
//!
//! 在扫描引擎外再套一层强度循环：
//! - 背景伪实验集合只生成一次，作为每个强度共享的零假设分布
//! - 每个强度做 npe_inject 次试验：Poisson(本底) + Poisson(强度 × 信号模板)，扫描后对零假设分布排名
//! - 试验 t 在所有强度下使用同一随机子流（公共随机数），强度之间的差异只来自注入量
//! - 中位显著性达到 sigma_limit 时提前停止
//! - 全部试验都只能给出下界（p = 1/npe）时曲线饱和，继续增大强度没有新信息，同样停止
//! 信号与本底模板只借用，不做任何修改。
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{BumpError, Result};
use crate::histogram::Histogram;
use crate::options::{InjectionConfig, ScanConfig};
use crate::pool::{run_ordered, CancelToken};
use crate::pseudo::{derive_rng, poisson_fluctuate, STREAM_INJECT_BACKGROUND, STREAM_INJECT_SIGNAL};
use crate::scan::ScanPlan;
use crate::significance::{quantile_sorted, significance_ceiling, NullDistribution};

const Q_1SIGMA_LOW: f64 = 0.158_655_253_931_457_05;
const Q_1SIGMA_HIGH: f64 = 0.841_344_746_068_542_9;
const Q_2SIGMA_LOW: f64 = 0.022_750_131_948_179_2;
const Q_2SIGMA_HIGH: f64 = 0.977_249_868_051_820_8;

/// 单个注入强度下的显著性分布
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrengthPoint {
    pub step: usize,
    pub strength: f64,
    /// 注入的期望信号事例数
    pub injected_events: f64,
    pub median: f64,
    pub low_1sigma: f64,
    pub high_1sigma: f64,
    pub low_2sigma: f64,
    pub high_2sigma: f64,
    /// 显著性只能给出下界（无伪实验达到）的试验数
    pub n_bounded: usize,
    /// 全部试验的全局显著性（升序）
    pub significances: Vec<f64>,
}

/// 灵敏度曲线：强度 → 显著性分布
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityCurve {
    pub points: Vec<StrengthPoint>,
    /// 零假设分布中的伪实验个数
    pub null_size: usize,
    /// 中位显著性达到 sigma_limit
    pub reached_limit: bool,
    /// 某个强度下全部试验都达到零假设分布的分辨率上限
    pub saturated: bool,
    /// 零假设分布能给出的最大显著性 Z(1/null_size)
    pub ceiling: f64,
    /// 零假设集合或某个强度的试验被取消截断
    pub truncated: bool,
}

impl SensitivityCurve {
    /// 第一个中位显著性达到 `sigma` 的强度
    pub fn strength_at(&self, sigma: f64) -> Option<f64> {
        self.points.iter().find(|p| p.median >= sigma).map(|p| p.strength)
    }
}

pub fn signal_inject(
    signal: &Histogram,
    background: &Histogram,
    cfg: &ScanConfig,
    inj: &InjectionConfig,
) -> Result<SensitivityCurve> {
    signal_inject_with_cancel(signal, background, cfg, inj, &CancelToken::new())
}

pub fn signal_inject_with_cancel(
    signal: &Histogram,
    background: &Histogram,
    cfg: &ScanConfig,
    inj: &InjectionConfig,
    cancel: &CancelToken,
) -> Result<SensitivityCurve> {
    inj.validate()?;
    let plan = ScanPlan::new(background, cfg)?;
    if let Some(limit) = inj.sigma_limit {
        let ceiling = significance_ceiling(cfg.npe);
        if limit > ceiling {
            return Err(BumpError::config(format!(
                "sigma_limit = {limit} cannot be reached: npe = {} background pseudo-experiments resolve global \
                 significances up to {ceiling:.3}; raise npe or lower sigma_limit",
                cfg.npe
            )));
        }
    }
    plan.check_binning("signal", signal, background)?;
    let template = normalized_template(signal, inj.signal_exp)?;
    let template_total: f64 = template.iter().sum();

    info!(
        npe = cfg.npe,
        npe_inject = inj.npe_inject,
        max_steps = inj.schedule.max_steps,
        signal_events = template_total,
        "starting signal injection"
    );

    let null_set = plan.null_set(background, cfg, cancel)?;
    let null = NullDistribution::from_set(&null_set);
    let mut curve = SensitivityCurve {
        points: Vec::new(),
        null_size: null.len(),
        reached_limit: false,
        saturated: false,
        ceiling: significance_ceiling(null.len()),
        truncated: null_set.is_truncated(),
    };
    if null.is_empty() {
        warn!("signal injection cancelled before the background null distribution was built");
        return Ok(curve);
    }

    let bkg = background.contents();
    for step in 0..inj.schedule.max_steps {
        if cancel.is_cancelled() {
            curve.truncated = true;
            break;
        }
        let strength = inj.schedule.strength(step);
        let injected: Vec<f64> = template.iter().map(|s| s * strength).collect();

        let trials = run_ordered(inj.npe_inject, cfg.nworker, cancel, |t| {
            let mut counts = Vec::with_capacity(bkg.len());
            let mut sig = Vec::with_capacity(bkg.len());
            poisson_fluctuate(bkg, &mut derive_rng(cfg.seed, STREAM_INJECT_BACKGROUND, t as u64), &mut counts);
            poisson_fluctuate(&injected, &mut derive_rng(cfg.seed, STREAM_INJECT_SIGNAL, t as u64), &mut sig);
            for (c, s) in counts.iter_mut().zip(&sig) {
                *c += s;
            }
            plan.best(&counts).ok().and_then(|best| null.rank(best.ln_pvalue))
        })?;

        if trials.len() < inj.npe_inject {
            // 截断的强度点不计入曲线
            warn!(step, completed = trials.len(), requested = inj.npe_inject, "injection trials truncated by cancellation");
            curve.truncated = true;
            break;
        }
        let trials = trials
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| BumpError::config("window list is empty"))?;

        let n_bounded = trials.iter().filter(|g| g.is_bounded()).count();
        let mut significances: Vec<f64> = trials.iter().map(|g| g.significance).collect();
        significances.sort_by(|a, b| a.total_cmp(b));

        let point = StrengthPoint {
            step,
            strength,
            injected_events: strength * template_total,
            median: quantile_sorted(&significances, 0.5),
            low_1sigma: quantile_sorted(&significances, Q_1SIGMA_LOW),
            high_1sigma: quantile_sorted(&significances, Q_1SIGMA_HIGH),
            low_2sigma: quantile_sorted(&significances, Q_2SIGMA_LOW),
            high_2sigma: quantile_sorted(&significances, Q_2SIGMA_HIGH),
            n_bounded,
            significances,
        };
        debug!(step, strength, median = point.median, n_bounded, "strength done");

        let reached = inj.sigma_limit.is_some_and(|limit| point.median >= limit);
        let saturated = n_bounded == inj.npe_inject;
        curve.points.push(point);
        if reached {
            curve.reached_limit = true;
            break;
        }
        if saturated {
            warn!(
                step,
                strength,
                ceiling = curve.ceiling,
                "every injection trial is beyond the null distribution, stopping at the resolution limit"
            );
            curve.saturated = true;
            break;
        }
    }

    info!(
        points = curve.points.len(),
        reached_limit = curve.reached_limit,
        saturated = curve.saturated,
        "signal injection finished"
    );
    Ok(curve)
}

/// 信号模板归一化到 signal_exp 个事例；未给定时按原样复制
fn normalized_template(signal: &Histogram, signal_exp: Option<f64>) -> Result<Vec<f64>> {
    match signal_exp {
        None => Ok(signal.contents().to_vec()),
        Some(n) => {
            let total = signal.total();
            if total <= 0.0 {
                return Err(BumpError::config("signal template is empty, cannot normalise to signal_exp"));
            }
            Ok(signal.scaled(n / total)?.contents().to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{BinningSpec, ScanMode, ScanStep, StrengthScale, StrengthSchedule};

    fn edges(n: usize) -> Vec<f64> {
        (0..=n).map(|i| i as f64).collect()
    }

    fn scan_config() -> ScanConfig {
        ScanConfig {
            range: [0.0, 20.0],
            bins: BinningSpec::Count(20),
            width_min: 1,
            width_max: 3,
            width_step: 1,
            scan_step: ScanStep::Fixed(1),
            npe: 200,
            nworker: 2,
            seed: 11,
            mode: ScanMode::Excess,
            use_sideband: false,
        }
    }

    fn inject_config(max_steps: usize, sigma_limit: Option<f64>) -> InjectionConfig {
        InjectionConfig {
            schedule: StrengthSchedule { scale: StrengthScale::Lin, min: 0.0, step: 1.0, max_steps },
            signal_exp: Some(40.0),
            npe_inject: 30,
            sigma_limit,
        }
    }

    fn templates() -> (Histogram, Histogram) {
        let bkg = Histogram::new(edges(20), vec![100.0; 20]).unwrap();
        let mut s = vec![0.0; 20];
        s[9] = 1.0;
        s[10] = 2.0;
        s[11] = 1.0;
        (Histogram::new(edges(20), s).unwrap(), bkg)
    }

    #[test]
    fn templates_are_left_untouched() {
        let (sig, bkg) = templates();
        let (sig0, bkg0) = (sig.clone(), bkg.clone());
        signal_inject(&sig, &bkg, &scan_config(), &inject_config(2, None)).unwrap();
        assert_eq!(sig, sig0);
        assert_eq!(bkg, bkg0);
    }

    #[test]
    fn sigma_limit_stops_early() {
        let (sig, bkg) = templates();
        let curve = signal_inject(&sig, &bkg, &scan_config(), &inject_config(10, Some(2.0))).unwrap();
        assert!(curve.reached_limit);
        assert!(curve.points.len() < 10);
        assert!(curve.points.last().unwrap().median >= 2.0);
        assert_eq!(curve.strength_at(2.0), Some(curve.points.last().unwrap().strength));
    }

    #[test]
    fn injected_events_follow_signal_exp() {
        let (sig, bkg) = templates();
        let curve = signal_inject(&sig, &bkg, &scan_config(), &inject_config(3, None)).unwrap();
        let ev: Vec<f64> = curve.points.iter().map(|p| p.injected_events).collect();
        assert_eq!(ev, vec![0.0, 40.0, 80.0]);
        assert!(curve.points.iter().all(|p| p.significances.len() == 30));
        assert_eq!(curve.null_size, 200);
    }

    #[test]
    fn curve_stops_once_every_trial_is_bounded() {
        let (sig, bkg) = templates();
        let inj = InjectionConfig {
            schedule: StrengthSchedule { scale: StrengthScale::Log, min: -1.0, step: 0.5, max_steps: 8 },
            signal_exp: Some(40.0),
            npe_inject: 30,
            sigma_limit: None,
        };
        let curve = signal_inject(&sig, &bkg, &scan_config(), &inj).unwrap();
        assert!(curve.saturated);
        assert!(!curve.reached_limit);
        assert!(curve.points.len() < 8);
        let last = curve.points.last().unwrap();
        assert_eq!(last.n_bounded, 30);
        assert_eq!(last.median, curve.ceiling);
        assert!(curve.points[..curve.points.len() - 1].iter().all(|p| p.n_bounded < 30));
    }

    #[test]
    fn unreachable_sigma_limit_is_rejected() {
        let (sig, bkg) = templates();
        // npe = 200 时最大可分辨显著性约为 2.576
        let err = signal_inject(&sig, &bkg, &scan_config(), &inject_config(3, Some(5.0))).unwrap_err();
        assert!(err.is_configuration());
        let at_ceiling = inject_config(10, Some(significance_ceiling(200)));
        assert!(signal_inject(&sig, &bkg, &scan_config(), &at_ceiling).is_ok());
    }

    #[test]
    fn signal_binning_mismatch_is_rejected() {
        let (_, bkg) = templates();
        let sig = Histogram::new(edges(10), vec![1.0; 10]).unwrap();
        let err = signal_inject(&sig, &bkg, &scan_config(), &inject_config(2, None)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn cancelled_injection_is_flagged() {
        let (sig, bkg) = templates();
        let cancel = CancelToken::new();
        cancel.cancel();
        let curve = signal_inject_with_cancel(&sig, &bkg, &scan_config(), &inject_config(3, None), &cancel).unwrap();
        assert!(curve.truncated);
        assert!(curve.points.is_empty());
    }
}
