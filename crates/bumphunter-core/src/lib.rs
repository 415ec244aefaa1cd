//! 一维鼓包搜索核心库
//!
//! 设计要点：
//! - 滑动窗口扫描：窗口只枚举一次，真实数据与全部伪实验共享同一窗口表与本底窗口和。
//! - 局部评分为单侧 Poisson 尾概率，全程以 ln p 表示，极小 p 值不下溢。
//! - 以背景伪实验的“最小局部 p 值”分布校准全局显著性（look-elsewhere 修正）。
//! - 每个伪实验/注入试验的随机子流由序号派生，结果与线程数和调度顺序无关。
//! - 配置为不可变值，每次调用显式传入；引擎不持有全局可变状态。

mod error;
mod histogram;
mod inject;
mod options;
mod pool;
mod pseudo;
mod report;
mod scan;
mod scorer;
mod significance;
mod special;
mod types;
mod windows;

pub use error::{BumpError, Result};
pub use histogram::{Histogram, InputData};
pub use inject::{signal_inject, signal_inject_with_cancel, SensitivityCurve, StrengthPoint};
pub use options::{
    load_config, BinningSpec, ConfigFile, InjectionConfig, ScanConfig, ScanMode, ScanStats, ScanStep,
    StrengthScale, StrengthSchedule,
};
pub use pool::CancelToken;
pub use pseudo::{derive_rng, poisson_fluctuate, PseudoExperimentGenerator};
pub use report::{BumpReport, TomographyPoint};
pub use scan::{bump_scan, bump_scan_with_cancel, normalize_inputs, BumpScan};
pub use scorer::{local_ln_pvalue, local_pvalue, WindowScorer};
pub use significance::{
    p_from_z, quantile_sorted, significance_ceiling, z_from_ln_p, GlobalSignificance, NullDistribution,
    SignificanceBound,
};
pub use special::{ln_gamma_p, ln_gamma_q};
pub use types::{LocalScore, PseudoExperimentSet, ScanResult, Window};
pub use windows::{enumerate_windows, window_count};
