//! channels 命令
//!
//! 打印命名空间下的固定通道约定，以及驱动注册后的内省结果。

use anyhow::Result;
use clap::Args;
use kobuki_driver::{EventBus, KobukiBuilder, Signal, channel_name};

/// channels 命令参数
#[derive(Args, Debug)]
pub struct ChannelsCommand {
    /// 通道命名空间
    #[arg(short, long, default_value = kobuki_driver::DEFAULT_NAMESPACE)]
    pub namespace: String,
}

/// `{name}  {kind}` 对齐后的通道表
pub fn contract_table(namespace: &str) -> Vec<String> {
    let names: Vec<_> = Signal::ALL
        .iter()
        .map(|s| (channel_name(namespace, *s), s.kind()))
        .collect();
    let width = names.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
    names
        .into_iter()
        .map(|(name, kind)| format!("{name:<width$}  {kind}"))
        .collect()
}

impl ChannelsCommand {
    pub fn execute(&self) -> Result<()> {
        for line in contract_table(&self.namespace) {
            println!("{line}");
        }

        let bus = EventBus::new();
        let _kobuki = KobukiBuilder::new()
            .bus(bus.clone())
            .namespace(self.namespace.clone())
            .build()?;
        println!();
        print!("{}", bus.introspect());
        Ok(())
    }
}
