//! isoc-stream - 等时音频输出流
//!
//! 在模拟传输上运行完整的输出链路：
//! 生产者线程 → lock-free ring buffer → 帧列表轮转 → 传输完成回调

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use isoc_stream::audio::AudioFormat;
use isoc_stream::engine::{Engine, EngineConfig};

/// isoc-stream - Isochronous audio output streaming
#[derive(Parser)]
#[command(name = "isoc-stream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value = "48000", global = true)]
    sample_rate: u32,

    /// Channel count
    #[arg(short, long, default_value = "2", global = true)]
    channels: u16,

    /// Bits per sample (16, 24 or 32)
    #[arg(long, default_value = "24", global = true)]
    bits: u16,

    /// Buffer size in milliseconds
    #[arg(short, long, default_value = "200", global = true)]
    buffer_ms: u32,

    /// Endpoint polling interval exponent (1-16)
    #[arg(long, default_value = "1", global = true)]
    b_interval: u8,

    /// Transfer frames per frame list
    #[arg(long, default_value = "64", global = true)]
    frames_per_list: u32,

    /// Frame lists kept in flight
    #[arg(long, default_value = "4", global = true)]
    frame_lists: u32,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the scheduling parameters derived from the options
    Info,

    /// Stream a test tone through the simulated transport
    Simulate {
        /// Run time in seconds
        #[arg(short, long, default_value = "5")]
        seconds: f64,

        /// Test tone frequency in Hz
        #[arg(long, default_value = "1000")]
        tone: f64,

        /// Probability that a transfer frame fails (0.0-1.0)
        #[arg(long, default_value = "0")]
        error_rate: f64,

        /// Maximum random completion delay in microseconds
        #[arg(long, default_value = "0")]
        jitter_us: u64,

        /// Lock the audio buffer into memory
        #[arg(long)]
        lock_memory: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    match cli.command {
        Some(Commands::Info) => show_schedule_info(&cli)?,
        Some(Commands::Simulate {
            seconds,
            tone,
            error_rate,
            jitter_us,
            lock_memory,
        }) => {
            let mut config = create_engine_config(&cli);
            config.tone_hz = tone;
            config.frame_error_rate = error_rate;
            config.jitter_us = jitter_us;
            config.lock_memory = lock_memory;
            simulate(config, seconds)?;
        }
        None => {
            println!("isoc-stream - Isochronous audio output streaming\n");
            println!("Usage: isoc-stream [OPTIONS] info");
            println!("       isoc-stream [OPTIONS] simulate [--seconds N]");
            println!("\nRun with --help for all options.");
        }
    }

    Ok(())
}

/// 创建引擎配置
fn create_engine_config(cli: &Cli) -> EngineConfig {
    EngineConfig {
        format: AudioFormat::new(cli.sample_rate, cli.channels, cli.bits),
        buffer_ms: cli.buffer_ms,
        b_interval: cli.b_interval,
        frames_per_list: cli.frames_per_list,
        frame_lists: cli.frame_lists,
        ..Default::default()
    }
}

/// 显示调度参数
fn show_schedule_info(cli: &Cli) -> anyhow::Result<()> {
    let config = create_engine_config(cli);
    let schedule = config
        .schedule()
        .context("Options do not describe a runnable stream")?;

    println!("=== Stream Schedule ===\n");
    println!(
        "Format: {}Hz {}ch {}bit",
        config.format.sample_rate, config.format.channels, config.format.bits_per_sample
    );
    println!(
        "Rotation: {} lists x {} transfer frames",
        config.frame_lists, config.frames_per_list
    );
    println!("{}", schedule);

    Ok(())
}

/// 模拟运行
fn simulate(config: EngineConfig, seconds: f64) -> anyhow::Result<()> {
    if !(seconds.is_finite() && seconds > 0.0) {
        anyhow::bail!("--seconds must be a positive number");
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    let mut engine = Engine::new(config).context("Failed to set up engine")?;

    println!("isoc-stream - Simulated Transport");
    println!("Streaming for {:.1}s, press Ctrl+C to stop.\n", seconds);

    engine
        .run_for(Duration::from_secs_f64(seconds), &interrupted)
        .context("Stream failed")?;

    if interrupted.load(Ordering::SeqCst) {
        println!("Interrupted.\n");
    }
    println!("{}", engine.stats());

    Ok(())
}
