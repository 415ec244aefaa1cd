//! 直方图模型与输入归一化（模块）
//!
//! 外部输入既可以是已分箱的直方图，也可以是逐事例的原始坐标序列；
//! 二者在进入引擎前统一归一化为 `Histogram`，引擎内部只读。
use serde::{Deserialize, Serialize};

use crate::error::{BumpError, Result};
use crate::types::Window;

/// 一维分箱直方图（只读）
/// 不变量：边界有限且严格递增；内容长度 = 边界长度 - 1；内容有限且非负
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    edges: Vec<f64>,
    contents: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<f64>>,
}

impl Histogram {
    pub fn new(edges: Vec<f64>, contents: Vec<f64>) -> Result<Self> {
        Self::build(edges, contents, None)
    }

    /// 带逐箱不确定度的构造
    pub fn with_errors(edges: Vec<f64>, contents: Vec<f64>, errors: Vec<f64>) -> Result<Self> {
        Self::build(edges, contents, Some(errors))
    }

    fn build(edges: Vec<f64>, contents: Vec<f64>, errors: Option<Vec<f64>>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(BumpError::InvalidHistogram(format!("need at least 2 edges, got {}", edges.len())));
        }
        if let Some(i) = edges.iter().position(|e| !e.is_finite()) {
            return Err(BumpError::InvalidHistogram(format!("edge {i} is not finite")));
        }
        if let Some(i) = edges.windows(2).position(|w| w[1] <= w[0]) {
            return Err(BumpError::InvalidHistogram(format!(
                "edges must be strictly increasing (edge {} = {} >= edge {} = {})",
                i,
                edges[i],
                i + 1,
                edges[i + 1]
            )));
        }
        if contents.len() != edges.len() - 1 {
            return Err(BumpError::InvalidHistogram(format!(
                "{} contents for {} edges (expected {})",
                contents.len(),
                edges.len(),
                edges.len() - 1
            )));
        }
        if let Some(i) = contents.iter().position(|c| !c.is_finite() || *c < 0.0) {
            return Err(BumpError::InvalidHistogram(format!(
                "bin {i} content {} is negative or not finite",
                contents[i]
            )));
        }
        let total: f64 = contents.iter().sum();
        if !total.is_finite() {
            // 窗口和由前缀和相减得到，总和溢出会产生 inf - inf
            return Err(BumpError::InvalidHistogram("sum of bin contents overflows f64".to_string()));
        }
        if let Some(err) = &errors {
            if err.len() != contents.len() {
                return Err(BumpError::InvalidHistogram(format!(
                    "{} errors for {} bins",
                    err.len(),
                    contents.len()
                )));
            }
            if err.iter().any(|e| !e.is_finite() || *e < 0.0) {
                return Err(BumpError::InvalidHistogram("bin errors must be finite and >= 0".to_string()));
            }
        }
        Ok(Self { edges, contents, errors })
    }

    pub fn nbins(&self) -> usize {
        self.contents.len()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    pub fn errors(&self) -> Option<&[f64]> {
        self.errors.as_deref()
    }

    pub fn total(&self) -> f64 {
        self.contents.iter().sum()
    }

    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    /// 分箱完全一致（逐个边界精确相等）
    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.edges == other.edges
    }

    /// 窗口对应的物理区间 [lo, hi)
    pub fn range_of(&self, window: &Window) -> (f64, f64) {
        (self.edges[window.start], self.edges[window.end()])
    }

    /// 按比例缩放内容（不确定度同比缩放），返回新直方图
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        let contents = self.contents.iter().map(|c| c * factor).collect();
        let errors = self
            .errors
            .as_ref()
            .map(|e| e.iter().map(|x| x * factor.abs()).collect());
        Self::build(self.edges.clone(), contents, errors)
    }
}

/// 引擎输入：已分箱直方图或原始事例序列
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputData {
    Histogram {
        edges: Vec<f64>,
        contents: Vec<f64>,
        #[serde(default)]
        errors: Option<Vec<f64>>,
    },
    #[serde(rename = "samples")]
    RawSamples {
        values: Vec<f64>,
        #[serde(default)]
        weights: Option<Vec<f64>>,
    },
}

impl From<Histogram> for InputData {
    fn from(h: Histogram) -> Self {
        InputData::Histogram { edges: h.edges, contents: h.contents, errors: h.errors }
    }
}

impl InputData {
    /// 归一化为直方图
    /// - 直方图输入：按原边界校验后直接使用
    /// - 原始样本：按给定边界分箱；超出 [edges[0], edges[n]] 的样本丢弃，最后一个边界闭合
    pub fn into_histogram(self, edges: &[f64]) -> Result<Histogram> {
        match self {
            InputData::Histogram { edges, contents, errors } => Histogram::build(edges, contents, errors),
            InputData::RawSamples { values, weights } => bin_samples(&values, weights.as_deref(), edges),
        }
    }
}

fn bin_samples(values: &[f64], weights: Option<&[f64]>, edges: &[f64]) -> Result<Histogram> {
    if edges.len() < 2 {
        return Err(BumpError::InvalidHistogram("binning needs at least 2 edges".to_string()));
    }
    if let Some(w) = weights {
        if w.len() != values.len() {
            return Err(BumpError::InvalidHistogram(format!(
                "{} weights for {} samples",
                w.len(),
                values.len()
            )));
        }
    }
    let nbins = edges.len() - 1;
    let lo = edges[0];
    let hi = edges[nbins];
    let mut contents = vec![0.0; nbins];
    let mut sumw2 = vec![0.0; nbins];

    for (i, &x) in values.iter().enumerate() {
        // NaN 与区间外样本直接丢弃
        if !(x >= lo && x <= hi) {
            continue;
        }
        let bin = if x == hi {
            nbins - 1
        } else {
            // edges 严格递增，partition_point 给出第一个 > x 的边界
            edges.partition_point(|e| *e <= x) - 1
        };
        let w = weights.map_or(1.0, |w| w[i]);
        contents[bin] += w;
        sumw2[bin] += w * w;
    }

    let errors = sumw2.into_iter().map(f64::sqrt).collect();
    Histogram::build(edges.to_vec(), contents, Some(errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_monotonic_edges() {
        let err = Histogram::new(vec![0.0, 2.0, 1.0], vec![1.0, 1.0]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_length_mismatch_and_negative_content() {
        assert!(Histogram::new(vec![0.0, 1.0, 2.0], vec![1.0]).is_err());
        assert!(Histogram::new(vec![0.0, 1.0], vec![-1.0]).is_err());
        assert!(Histogram::with_errors(vec![0.0, 1.0], vec![1.0], vec![]).is_err());
    }

    #[test]
    fn rejects_contents_whose_sum_overflows() {
        let err = Histogram::new(vec![0.0, 1.0, 2.0, 3.0], vec![f64::MAX, f64::MAX, 1.0]).unwrap_err();
        assert!(matches!(err, BumpError::InvalidHistogram(_)));
        assert!(Histogram::new(vec![0.0, 1.0], vec![f64::MAX]).is_ok());
    }

    #[test]
    fn raw_samples_are_binned_with_closed_last_edge() {
        let input = InputData::RawSamples { values: vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, -1.0, f64::NAN], weights: None };
        let h = input.into_histogram(&[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(h.contents(), &[2.0, 3.0]);
        assert_eq!(h.errors().unwrap(), &[2f64.sqrt(), 3f64.sqrt()]);
    }

    #[test]
    fn weighted_samples_sum_weights() {
        let input = InputData::RawSamples { values: vec![0.2, 0.4, 1.2], weights: Some(vec![2.0, 0.5, 3.0]) };
        let h = input.into_histogram(&[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(h.contents(), &[2.5, 3.0]);
        assert!((h.errors().unwrap()[0] - (4.25f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn histogram_input_keeps_its_own_edges() {
        let input = InputData::Histogram { edges: vec![0.0, 3.0, 4.0], contents: vec![1.0, 2.0], errors: None };
        let h = input.into_histogram(&[0.0, 1.0]).unwrap();
        assert_eq!(h.edges(), &[0.0, 3.0, 4.0]);
        assert_eq!(h.range_of(&Window { start: 0, width: 2 }), (0.0, 4.0));
        assert_eq!(h.bin_center(0), 1.5);
    }

    #[test]
    fn input_deserializes_from_tagged_json() {
        let j = r#"{"kind":"samples","values":[1.0,2.0]}"#;
        let d: InputData = serde_json::from_str(j).unwrap();
        assert!(matches!(d, InputData::RawSamples { .. }));
        let j = r#"{"kind":"histogram","edges":[0,1],"contents":[4]}"#;
        let d: InputData = serde_json::from_str(j).unwrap();
        assert!(matches!(d, InputData::Histogram { .. }));
    }
}
