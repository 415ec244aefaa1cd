//! 有序并行调度与取消
//!
//! - 每个工作单元（一次伪实验扫描或一次注入试验）由序号唯一确定，随机子流也由序号派生
//! - 工作线程在 Rayon 线程池中并行执行，结果经通道送回调用线程
//! - 收集端按序号重排（BTreeMap 缓冲 + next_idx），只输出从 0 开始的连续前缀
//!
//! 取消后新单元不再启动；已完成但不连续的结果被丢弃，返回的前缀长度即截断后的规模。
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{BumpError, Result};

/// 尽力而为的取消标记（可跨线程克隆共享）
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求在下一个单元边界处停止
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// 运行 `n_units` 个单元并按序号返回结果
/// nworker == 1 时走串行路径；否则建立 nworker 线程的 Rayon 池
pub(crate) fn run_ordered<T, F>(n_units: usize, nworker: usize, cancel: &CancelToken, unit: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let mut out: Vec<T> = Vec::new();
    out.try_reserve_exact(n_units).map_err(|e| BumpError::ResourceExhaustion {
        requested: n_units,
        nworker,
        reason: e.to_string(),
    })?;

    if nworker <= 1 || n_units <= 1 {
        for idx in 0..n_units {
            if cancel.is_cancelled() {
                break;
            }
            out.push(unit(idx));
        }
        return Ok(out);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nworker)
        .build()
        .map_err(|e| BumpError::ResourceExhaustion { requested: n_units, nworker, reason: e.to_string() })?;

    collect_parallel(&pool, n_units, cancel, &unit, &mut out);
    Ok(out)
}

fn collect_parallel<T, F>(pool: &rayon::ThreadPool, n_units: usize, cancel: &CancelToken, unit: &F, out: &mut Vec<T>)
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    use crossbeam_channel as channel;
    use rayon::prelude::*;

    // 通道用于 worker → 收集端传递 (idx, 结果)
    let (tx, rx) = channel::bounded::<(usize, T)>(256);

    std::thread::scope(|s| {
        // 计算在后台线程内进入线程池；收集端留在当前线程
        s.spawn(move || {
            pool.install(|| {
                (0..n_units).into_par_iter().for_each_with(tx, |tx, idx| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let r = unit(idx);
                    let _ = tx.send((idx, r));
                });
            });
            // 结束后 Sender 全部被丢弃，Receiver 将收到关闭信号
        });

        let mut next_idx: usize = 0;
        let mut buffer: BTreeMap<usize, T> = BTreeMap::new();
        while let Ok((idx, r)) = rx.recv() {
            buffer.insert(idx, r);
            // 从 next_idx 开始顺序冲刷
            while let Some(r) = buffer.remove(&next_idx) {
                out.push(r);
                next_idx += 1;
            }
        }
        if !buffer.is_empty() {
            debug!(dropped = buffer.len(), kept = next_idx, "discarding out-of-order units after cancellation");
        }
    });
}
