//! ne500 - NE-500 syringe pump network bridge
//!
//! Drives a network of NE-500 syringe pumps through a TCP-to-serial gateway.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `ne500-core`: Addresses, commands, command sets, status codes and errors
//! - `ne500-transport`: Polled TCP gateway transport, scoped connections
//! - `ne500-session`: Frame reader (STX/ETX and newline) and command codec
//! - `ne500-client`: Device session, command-set sequencer, configuration
//!
//! # Implementation Status
//!
//! ## ✅ 已完成
//! - 传输层（TCP 网关，超时轮询 + 重试）
//! - 帧读取（STX/ETX、换行、重同步）
//! - 命令编解码（单条命令、网络命令串、回复分类）
//! - 设备会话（注液、抽液、停止、复位、查询与设置）
//! - 命令集序列器（单泵、双泵组、多周期）
//! - 配置（TOML 文件 + 环境变量）
//!
//! ## 📋 待实现
//! - 串口直连（不经网关）
//!
//! # Usage
//!
//! ```no_run
//! use ne500::client::{ConnectionBuilder, PumpGroup, SequencePlan};
//! use ne500::CommandSet;
//!
//! # async fn demo() -> ne500::PumpResult<()> {
//! let training = CommandSet::from_pairs(
//!     "training",
//!     [("DIR", "INF"), ("VOL", "0.02"), ("RAT", "100.0")],
//! )?;
//!
//! let mut network = ConnectionBuilder::new().tcp("192.168.0.2", 100).build()?;
//! network.open().await?;
//! let report = network
//!     .run_sequence(&SequencePlan::new(PumpGroup::Single(1), training, 3))
//!     .await?;
//! println!("last ack: {}", report.final_ack);
//! network.close().await?;
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use ne500_core::{
    Address, AlarmCode, Command, CommandErrorKind, CommandSet, CommandStep, Direction, DispensedVolume, PumpAddress,
    PumpError, PumpResult, PumpStatus, Verb, VolumeUnits,
};

// Re-export transport API
pub mod transport {
    pub use ne500_transport::*;
}

// Re-export session layer
pub mod session {
    pub use ne500_session::*;
}

// Re-export client API
pub mod client {
    pub use ne500_client::*;
}
