//! 窗口枚举与局部评分的性质测试（proptest）

use bumphunter_core::{enumerate_windows, ln_gamma_p, ln_gamma_q, local_ln_pvalue, window_count, ScanMode, ScanStep};
use proptest::prelude::*;

/// ln 域比较容差
const LN_TOL: f64 = 1e-9;

fn scan_step() -> impl Strategy<Value = ScanStep> {
    prop_oneof![
        (1usize..6).prop_map(ScanStep::Fixed),
        Just(ScanStep::Full),
        Just(ScanStep::Half),
    ]
}

/// 逐个 (width, start) 组合直接计数
fn brute_force_count(nbins: usize, wmin: usize, wmax: usize, wstep: usize, step: ScanStep) -> usize {
    let mut n = 0;
    let mut w = wmin;
    while w <= wmax {
        let stride = step.stride(w);
        for start in 0..nbins {
            if start % stride == 0 && start + w <= nbins {
                n += 1;
            }
        }
        w += wstep;
    }
    n
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn window_count_matches_closed_form(
        nbins in 1usize..80,
        wmin in 1usize..10,
        extra in 0usize..10,
        wstep in 1usize..4,
        step in scan_step(),
    ) {
        let wmax = wmin + extra;
        let windows = enumerate_windows(nbins, wmin, wmax, wstep, step);
        prop_assert_eq!(windows.len(), window_count(nbins, wmin, wmax, wstep, step));
        prop_assert_eq!(windows.len(), brute_force_count(nbins, wmin, wmax, wstep, step));
    }

    #[test]
    fn windows_are_in_bounds_and_deterministic(
        nbins in 1usize..60,
        wmin in 1usize..8,
        extra in 0usize..8,
        step in scan_step(),
    ) {
        let a = enumerate_windows(nbins, wmin, wmin + extra, 1, step);
        let b = enumerate_windows(nbins, wmin, wmin + extra, 1, step);
        prop_assert_eq!(&a, &b);
        for w in &a {
            prop_assert!(w.end() <= nbins);
            prop_assert!(w.width >= wmin && w.width <= wmin + extra);
            prop_assert_eq!(w.start % step.stride(w.width), 0);
        }
    }

    #[test]
    fn pvalue_is_a_probability(obs in 0u32..2000, bkg in 0.0f64..2000.0, deficit in any::<bool>()) {
        let mode = if deficit { ScanMode::Deficit } else { ScanMode::Excess };
        let ln_p = local_ln_pvalue(obs as f64, bkg, mode);
        prop_assert!(!ln_p.is_nan());
        prop_assert!(ln_p <= 0.0);
        let p = ln_p.exp();
        prop_assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn excess_pvalue_non_increasing_in_observed(obs in 0u32..1500, bkg in 0.01f64..1500.0) {
        let a = local_ln_pvalue(obs as f64, bkg, ScanMode::Excess);
        let b = local_ln_pvalue(obs as f64 + 1.0, bkg, ScanMode::Excess);
        prop_assert!(b <= a + LN_TOL, "O={} B={} ln p: {} -> {}", obs, bkg, a, b);
    }

    #[test]
    fn excess_pvalue_non_decreasing_in_background(obs in 0u32..1500, bkg in 0.01f64..1500.0, d in 0.01f64..50.0) {
        let a = local_ln_pvalue(obs as f64, bkg, ScanMode::Excess);
        let b = local_ln_pvalue(obs as f64, bkg + d, ScanMode::Excess);
        prop_assert!(b >= a - LN_TOL, "O={} B={}+{} ln p: {} -> {}", obs, bkg, d, a, b);
    }

    #[test]
    fn deficit_pvalue_mirrors_excess(obs in 0u32..1500, bkg in 0.01f64..1500.0) {
        let a = local_ln_pvalue(obs as f64, bkg, ScanMode::Deficit);
        let b = local_ln_pvalue(obs as f64 + 1.0, bkg, ScanMode::Deficit);
        prop_assert!(b >= a - LN_TOL);
    }

    #[test]
    fn incomplete_gamma_complements(a in 0.1f64..3000.0, x in 0.01f64..3000.0) {
        let s = ln_gamma_p(a, x).exp() + ln_gamma_q(a, x).exp();
        prop_assert!((s - 1.0).abs() < 1e-8, "a={} x={} P+Q={}", a, x, s);
    }
}
