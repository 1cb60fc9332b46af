//! 命令定义和实现

pub mod channels;
pub mod config;
pub mod replay;

pub use channels::ChannelsCommand;
pub use config::ConfigCommand;
pub use replay::ReplayCommand;
