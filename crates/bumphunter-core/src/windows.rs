//! 窗口枚举（纯函数，无随机性）
use crate::options::ScanStep;
use crate::types::Window;

/// 枚举全部合法窗口：宽度升序（外层）→ 起点升序（内层）
/// 宽度超过分箱数时跳过；没有任何窗口时返回空序列，由扫描引擎报配置错误
pub fn enumerate_windows(
    nbins: usize,
    width_min: usize,
    width_max: usize,
    width_step: usize,
    scan_step: ScanStep,
) -> Vec<Window> {
    let mut out = Vec::with_capacity(window_count(nbins, width_min, width_max, width_step, scan_step));
    if width_min == 0 || width_step == 0 {
        return out;
    }
    for width in (width_min..=width_max).step_by(width_step) {
        if width > nbins {
            break;
        }
        let stride = scan_step.stride(width);
        if stride == 0 {
            return Vec::new();
        }
        out.extend((0..=nbins - width).step_by(stride).map(|start| Window { start, width }));
    }
    out
}

/// 窗口数量的闭式解：Σ_w (⌊(nbins - w) / stride(w)⌋ + 1)
pub fn window_count(
    nbins: usize,
    width_min: usize,
    width_max: usize,
    width_step: usize,
    scan_step: ScanStep,
) -> usize {
    if width_min == 0 || width_step == 0 {
        return 0;
    }
    (width_min..=width_max)
        .step_by(width_step)
        .take_while(|w| *w <= nbins)
        .map(|w| match scan_step.stride(w) {
            0 => 0,
            s => (nbins - w) / s + 1,
        })
        .sum()
}
