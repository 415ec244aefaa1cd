use anyhow::{bail, Context, Result};
use bumphunter_core::{
    bump_scan, load_config, normalize_inputs, signal_inject, BumpReport, ConfigFile, InputData,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "bumphunter", version, about = "1-D bump hunter with pseudo-experiment calibration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描数据并给出局部/全局显著性
    Scan {
        #[command(flatten)]
        common: CommonArgs,

        /// 输出报告（JSON）
        #[arg(long, default_value = "./bump.json")]
        output: PathBuf,
    },
    /// 信号注入灵敏度扫描（需要配置文件中的 [inject] 表与输入中的 signal）
    Inject {
        #[command(flatten)]
        common: CommonArgs,

        /// 输出灵敏度曲线（JSON）
        #[arg(long, default_value = "./inject.json")]
        output: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// 输入文件（JSON：data / background / 可选 signal）
    #[arg(long)]
    input: PathBuf,

    /// 扫描配置（TOML）
    #[arg(long)]
    config: PathBuf,

    /// 覆盖配置中的线程数（"auto"=CPU 核心数）
    #[arg(long)]
    threads: Option<String>,

    /// 覆盖配置中的随机种子
    #[arg(long)]
    seed: Option<u64>,

    /// 覆盖配置中的伪实验数量
    #[arg(long)]
    npe: Option<usize>,
}

/// 输入文件结构
#[derive(Debug, Deserialize)]
struct Job {
    data: Option<InputData>,
    background: InputData,
    #[serde(default)]
    signal: Option<InputData>,
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { common, output } => {
            let (cfg, job) = load_inputs(&common)?;
            let data = job.data.context("input has no 'data' entry")?;
            let (data, background) = normalize_inputs(data, job.background, &cfg.scan).context("normalize inputs")?;

            info!(input = ?common.input, ?output, "starting scan");
            let scan = bump_scan(&data, &background, &cfg.scan).context("bump scan failed")?;
            let report = BumpReport::new(&scan, &data);
            println!("{report}");

            write_json(&output, &report)?;
            info!(windows = scan.stats.windows, pseudo = scan.stats.pseudo_completed, "scan finished");
        }
        Commands::Inject { common, output } => {
            let (cfg, job) = load_inputs(&common)?;
            let Some(inj) = cfg.inject.as_ref() else {
                bail!("config {} has no [inject] table", common.config.display());
            };
            let signal = job.signal.context("input has no 'signal' entry")?;
            let edges = cfg.scan.edges();
            let background = job.background.into_histogram(&edges).context("background")?;
            let signal = signal.into_histogram(&edges).context("signal")?;

            info!(input = ?common.input, ?output, "starting signal injection");
            let curve = signal_inject(&signal, &background, &cfg.scan, inj).context("signal injection failed")?;
            for p in &curve.points {
                println!(
                    "strength {:>10.4}  events {:>10.2}  median {:>6.3}  [-1s {:>6.3}, +1s {:>6.3}]",
                    p.strength, p.injected_events, p.median, p.low_1sigma, p.high_1sigma
                );
            }

            if curve.saturated {
                println!("curve saturated at the pseudo-experiment resolution limit Z = {:.3}", curve.ceiling);
            }

            write_json(&output, &curve)?;
            info!(
                points = curve.points.len(),
                reached_limit = curve.reached_limit,
                saturated = curve.saturated,
                "injection finished"
            );
        }
    }

    Ok(())
}

/// 读取配置与输入，并应用命令行覆盖项
fn load_inputs(common: &CommonArgs) -> Result<(ConfigFile, Job)> {
    let mut cfg = load_config(&common.config)
        .with_context(|| format!("load config {}", common.config.display()))?;
    if let Some(t) = &common.threads {
        cfg.scan.nworker = parse_threads(t)?;
    }
    if let Some(seed) = common.seed {
        cfg.scan.seed = seed;
    }
    if let Some(npe) = common.npe {
        cfg.scan.npe = npe;
    }
    cfg.scan.validate().context("invalid scan configuration")?;

    let file = File::open(&common.input).with_context(|| format!("open input {}", common.input.display()))?;
    let job: Job = serde_json::from_reader(BufReader::new(file)).context("parse input JSON")?;
    Ok((cfg, job))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut out = BufWriter::new(File::create(path).context("create output file")?);
    serde_json::to_writer_pretty(&mut out, value).context("write output")?;
    out.flush().context("flush output")?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 支持通过环境变量 RUST_LOG 控制日志等级，如：RUST_LOG=debug
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数："auto" 表示 CPU 核心数
fn parse_threads(s: &str) -> Result<usize> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get());
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => bail!("--threads must be 'auto' or a positive integer, got '{s}'"),
    }
}
