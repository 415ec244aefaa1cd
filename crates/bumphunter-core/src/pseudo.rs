//! 伪实验生成（仅本底假设下的 Poisson 涨落）
//!
//! 可复现性：每个实验序号 k 拥有独立的随机子流 `derive_rng(seed, stream, k)`，
//! 与工作线程编号及调度顺序无关，因此 1 个线程与 N 个线程得到逐位相同的结果。
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};

use crate::histogram::Histogram;

/// 子流编号：本底伪实验
pub const STREAM_BACKGROUND: u64 = 0;
/// 子流编号：注入试验中的本底部分
pub const STREAM_INJECT_BACKGROUND: u64 = 1;
/// 子流编号：注入试验中的信号部分
pub const STREAM_INJECT_SIGNAL: u64 = 2;

const INDEX_BITS: u32 = 48;

/// 种子派生：(base_seed, stream, index) → 独立随机子流
/// ChaCha 的 64 位 stream 字段高 16 位放 stream，低 48 位放实验序号
pub fn derive_rng(base_seed: u64, stream: u64, index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(base_seed);
    rng.set_stream((stream << INDEX_BITS) | (index & ((1u64 << INDEX_BITS) - 1)));
    rng
}

/// 对期望值逐箱做 Poisson 抽样，写入 `out`
/// 期望值非有限或 ≤ 0 时该箱为 0
pub fn poisson_fluctuate<R: rand::Rng + ?Sized>(expected: &[f64], rng: &mut R, out: &mut Vec<f64>) {
    out.clear();
    out.extend(expected.iter().map(|&lam| {
        if !lam.is_finite() || lam <= 0.0 {
            return 0.0;
        }
        match Poisson::new(lam) {
            Ok(p) => p.sample(rng),
            // 超出 Poisson 采样器支持的极大均值时，相对涨落可以忽略
            Err(_) => lam.round(),
        }
    }));
}

/// 伪实验生成器：借用只读的本底期望
#[derive(Debug, Clone, Copy)]
pub struct PseudoExperimentGenerator<'a> {
    expected: &'a [f64],
    seed: u64,
    stream: u64,
}

impl<'a> PseudoExperimentGenerator<'a> {
    pub fn new(background: &'a Histogram, seed: u64) -> Self {
        Self { expected: background.contents(), seed, stream: STREAM_BACKGROUND }
    }

    pub fn with_stream(mut self, stream: u64) -> Self {
        self.stream = stream;
        self
    }

    /// 生成第 `index` 个伪实验的计数，复用 `out` 的缓冲
    pub fn fill_replica(&self, index: usize, out: &mut Vec<f64>) {
        let mut rng = derive_rng(self.seed, self.stream, index as u64);
        poisson_fluctuate(self.expected, &mut rng, out);
    }

    pub fn replica(&self, index: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.expected.len());
        self.fill_replica(index, &mut out);
        out
    }

    /// 按序号顺序生成前 n 个伪实验
    pub fn replicas(&self, n: usize) -> impl Iterator<Item = Vec<f64>> + '_ {
        (0..n).map(move |i| self.replica(i))
    }
}
