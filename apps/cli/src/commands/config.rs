//! 驱动配置加载
//!
//! TOML 文件中的字段与 `DriverConfig` 一一对应，缺省字段取默认值：
//!
//! ```toml
//! namespace = "/mobile_base"
//! firmware_requirement = ">=1.2.0"
//! offline_timeout_ms = 300
//!
//! [battery]
//! low_dv = 142
//! critical_dv = 134
//! ```

use anyhow::{Context, Result};
use clap::Args;
use kobuki_driver::DriverConfig;
use std::fs;
use std::path::Path;

/// 读取配置文件；未指定路径时使用默认配置
pub fn load_config(path: Option<&Path>) -> Result<DriverConfig> {
    let Some(path) = path else {
        return Ok(DriverConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
    let config: DriverConfig =
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))?;
    Ok(config)
}

/// config 命令参数
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// 配置文件（TOML）
    #[arg(short, long)]
    pub config: Option<std::path::PathBuf>,

    /// 覆盖命名空间
    #[arg(short, long)]
    pub namespace: Option<String>,
}

impl ConfigCommand {
    pub fn execute(&self) -> Result<()> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        let requirement = config.validate().context("配置无效")?;

        print!("{}", toml::to_string_pretty(&config)?);
        println!();
        println!("# firmware requirement parsed as: {}", requirement);
        Ok(())
    }
}
