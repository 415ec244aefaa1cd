//! 扫描配置与统计信息（模块）
//!
//! 配置是不可变值：每次调用 `bump_scan` / `signal_inject` 时显式传入，引擎内部不保存全局状态。
//! 配置文件为 TOML，结构为 `[scan]` 必选表 + `[inject]` 可选表。
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BumpError, Result};

/// 扫描方向
/// - Excess：寻找超出本底的局部过量（默认）
/// - Deficit：寻找低于本底的局部缺失
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Excess,
    Deficit,
}

/// 窗口起点步长
/// - Fixed(n)：固定步长
/// - Full：步长等于窗口宽度（窗口互不重叠）
/// - Half：步长为宽度的一半（至少为 1）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScanStepRepr", into = "ScanStepRepr")]
pub enum ScanStep {
    Fixed(usize),
    Full,
    Half,
}

impl ScanStep {
    /// 给定窗口宽度下的实际步长
    pub fn stride(&self, width: usize) -> usize {
        match *self {
            ScanStep::Fixed(n) => n,
            ScanStep::Full => width,
            ScanStep::Half => (width / 2).max(1),
        }
    }
}

/// TOML 中 scan_step 既可写整数，也可写 "full" / "half"
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ScanStepRepr {
    Fixed(usize),
    Named(String),
}

impl TryFrom<ScanStepRepr> for ScanStep {
    type Error = String;

    fn try_from(r: ScanStepRepr) -> std::result::Result<Self, Self::Error> {
        match r {
            ScanStepRepr::Fixed(n) => Ok(ScanStep::Fixed(n)),
            ScanStepRepr::Named(s) => match s.to_ascii_lowercase().as_str() {
                "full" => Ok(ScanStep::Full),
                "half" => Ok(ScanStep::Half),
                other => Err(format!("unknown scan_step '{other}' (expected integer, \"full\" or \"half\")")),
            },
        }
    }
}

impl From<ScanStep> for ScanStepRepr {
    fn from(s: ScanStep) -> Self {
        match s {
            ScanStep::Fixed(n) => ScanStepRepr::Fixed(n),
            ScanStep::Full => ScanStepRepr::Named("full".to_string()),
            ScanStep::Half => ScanStepRepr::Named("half".to_string()),
        }
    }
}

/// 分箱规格：等宽分箱数（配合 range）或显式边界
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinningSpec {
    Count(usize),
    Edges(Vec<f64>),
}

/// 扫描配置（全部字段在扫描前必须给定）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// 观测量范围 [lo, hi]；等宽分箱时决定边界
    pub range: [f64; 2],
    /// 原始样本重新分箱所用的分箱
    pub bins: BinningSpec,
    pub width_min: usize,
    pub width_max: usize,
    pub width_step: usize,
    pub scan_step: ScanStep,
    /// 伪实验数量
    pub npe: usize,
    /// 工作线程数；1 走串行
    pub nworker: usize,
    pub seed: u64,
    #[serde(default)]
    pub mode: ScanMode,
    /// 以窗口外区域重新归一化本底
    #[serde(default)]
    pub use_sideband: bool,
}

impl ScanConfig {
    /// 校验配置；任何非法值都是致命的配置错误
    pub fn validate(&self) -> Result<()> {
        let [lo, hi] = self.range;
        if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
            return Err(BumpError::config(format!("range must satisfy lo < hi, got [{lo}, {hi}]")));
        }
        match &self.bins {
            BinningSpec::Count(0) => return Err(BumpError::config("bins must be >= 1")),
            BinningSpec::Count(_) => {}
            BinningSpec::Edges(e) => {
                if e.len() < 2 {
                    return Err(BumpError::config("bin edge list needs at least 2 entries"));
                }
                if e.iter().any(|x| !x.is_finite()) || e.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(BumpError::config("bin edges must be finite and strictly increasing"));
                }
            }
        }
        if self.width_min == 0 {
            return Err(BumpError::config("width_min must be >= 1"));
        }
        if self.width_max < self.width_min {
            return Err(BumpError::config(format!(
                "width_max ({}) must be >= width_min ({})",
                self.width_max, self.width_min
            )));
        }
        if self.width_step == 0 {
            return Err(BumpError::config("width_step must be >= 1"));
        }
        if let ScanStep::Fixed(0) = self.scan_step {
            return Err(BumpError::config("scan_step must be >= 1"));
        }
        if self.npe == 0 {
            return Err(BumpError::config("npe must be >= 1"));
        }
        if self.nworker == 0 {
            return Err(BumpError::config("nworker must be >= 1"));
        }
        Ok(())
    }

    /// 由分箱规格得到边界序列
    pub fn edges(&self) -> Vec<f64> {
        match &self.bins {
            BinningSpec::Edges(e) => e.clone(),
            BinningSpec::Count(n) => {
                let [lo, hi] = self.range;
                let w = (hi - lo) / *n as f64;
                (0..=*n)
                    .map(|i| if i == *n { hi } else { lo + w * i as f64 })
                    .collect()
            }
        }
    }
}

/// 注入强度刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthScale {
    #[default]
    Lin,
    Log,
}

/// 注入强度序列：Lin → min + k*step；Log → 10^(min + k*step)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthSchedule {
    #[serde(default)]
    pub scale: StrengthScale,
    pub min: f64,
    pub step: f64,
    pub max_steps: usize,
}

impl StrengthSchedule {
    pub fn strength(&self, k: usize) -> f64 {
        let x = self.min + self.step * k as f64;
        match self.scale {
            StrengthScale::Lin => x,
            StrengthScale::Log => 10f64.powf(x),
        }
    }
}

/// 信号注入配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionConfig {
    pub schedule: StrengthSchedule,
    /// 信号模板归一化后的事例数；为空则按模板原样使用
    #[serde(default)]
    pub signal_exp: Option<f64>,
    /// 每个强度下的注入试验次数
    pub npe_inject: usize,
    /// 中位显著性达到该值后提前停止
    #[serde(default)]
    pub sigma_limit: Option<f64>,
}

impl InjectionConfig {
    pub fn validate(&self) -> Result<()> {
        let s = &self.schedule;
        if !(s.min.is_finite() && s.step.is_finite()) || s.step <= 0.0 {
            return Err(BumpError::config("strength schedule needs finite min and step > 0"));
        }
        if s.scale == StrengthScale::Lin && s.min < 0.0 {
            return Err(BumpError::config("linear strength schedule must start at min >= 0"));
        }
        if s.max_steps == 0 {
            return Err(BumpError::config("max_steps must be >= 1"));
        }
        if self.npe_inject == 0 {
            return Err(BumpError::config("npe_inject must be >= 1"));
        }
        if let Some(n) = self.signal_exp {
            if !n.is_finite() || n <= 0.0 {
                return Err(BumpError::config("signal_exp must be finite and > 0"));
            }
        }
        if let Some(l) = self.sigma_limit {
            if !l.is_finite() {
                return Err(BumpError::config("sigma_limit must be finite"));
            }
        }
        Ok(())
    }
}

/// 配置文件顶层结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub scan: ScanConfig,
    #[serde(default)]
    pub inject: Option<InjectionConfig>,
}

impl ConfigFile {
    /// 解析并校验 TOML 文本
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let parsed: ConfigFile = toml::from_str(txt)?;
        parsed.scan.validate()?;
        if let Some(inj) = &parsed.inject {
            inj.validate()?;
        }
        Ok(parsed)
    }
}

/// 从 TOML 文件加载配置
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let txt = std::fs::read_to_string(path)?;
    ConfigFile::from_toml_str(&txt)
}

/// 扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub windows: usize,
    pub zero_background_windows: usize,
    pub pseudo_requested: usize,
    pub pseudo_completed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[scan]
range = [0.0, 20.0]
bins = 60
width_min = 2
width_max = 6
width_step = 1
scan_step = 1
npe = 10000
nworker = 1
seed = 666

[inject]
npe_inject = 200
signal_exp = 150.0
sigma_limit = 3.0

[inject.schedule]
scale = "log"
min = -1.0
step = 0.25
max_steps = 12
"#;

    #[test]
    fn parses_full_config_file() {
        let cfg = ConfigFile::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.scan.bins, BinningSpec::Count(60));
        assert_eq!(cfg.scan.scan_step, ScanStep::Fixed(1));
        assert_eq!(cfg.scan.mode, ScanMode::Excess);
        assert!(!cfg.scan.use_sideband);
        let inj = cfg.inject.unwrap();
        assert_eq!(inj.schedule.scale, StrengthScale::Log);
        assert!((inj.schedule.strength(4) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn named_scan_steps_parse() {
        let txt = SAMPLE.replace("scan_step = 1", "scan_step = \"half\"");
        let cfg = ConfigFile::from_toml_str(&txt).unwrap();
        assert_eq!(cfg.scan.scan_step, ScanStep::Half);
        assert_eq!(cfg.scan.scan_step.stride(5), 2);
        assert_eq!(cfg.scan.scan_step.stride(1), 1);
        assert_eq!(ScanStep::Full.stride(4), 4);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let txt = SAMPLE.replace("npe = 10000\n", "");
        assert!(matches!(ConfigFile::from_toml_str(&txt), Err(BumpError::Toml(_))));
    }

    #[test]
    fn zero_npe_is_configuration_error() {
        let txt = SAMPLE.replace("npe = 10000", "npe = 0");
        let err = ConfigFile::from_toml_str(&txt).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn inverted_widths_are_rejected() {
        let txt = SAMPLE.replace("width_max = 6", "width_max = 1");
        assert!(ConfigFile::from_toml_str(&txt).unwrap_err().is_configuration());
    }

    #[test]
    fn uniform_edges_cover_range_exactly() {
        let cfg = ConfigFile::from_toml_str(SAMPLE).unwrap().scan;
        let e = cfg.edges();
        assert_eq!(e.len(), 61);
        assert_eq!(e[0], 0.0);
        assert_eq!(e[60], 20.0);
        assert!(e.windows(2).all(|w| w[1] > w[0]));
    }
}
