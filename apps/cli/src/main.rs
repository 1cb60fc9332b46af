//! # Kobuki CLI
//!
//! Kobuki 串口抓包的回放与检查工具。
//!
//! ```bash
//! # 回放二进制抓包，打印事件、指标和通道内省
//! kobuki-cli replay capture.bin
//!
//! # 十六进制文本抓包，按 7 字节分片喂入
//! kobuki-cli replay capture.hex --hex --chunk 7
//!
//! # 打印某个命名空间下的固定通道
//! kobuki-cli channels --namespace /mobile_base
//!
//! # 检查并打印生效的驱动配置
//! kobuki-cli config --config kobuki.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ChannelsCommand, ConfigCommand, ReplayCommand};

/// Kobuki CLI - 抓包回放与通道检查
#[derive(Parser, Debug)]
#[command(name = "kobuki-cli")]
#[command(about = "Replay and inspection tool for Kobuki serial captures", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 回放抓包文件
    Replay {
        #[command(flatten)]
        args: ReplayCommand,
    },

    /// 打印固定通道约定
    Channels {
        #[command(flatten)]
        args: ChannelsCommand,
    },

    /// 校验并打印驱动配置
    Config {
        #[command(flatten)]
        args: ConfigCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kobuki_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { args } => args.execute(),
        Commands::Channels { args } => args.execute(),
        Commands::Config { args } => args.execute(),
    }
}
