//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量出题和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 出题流水线
//! - 启动时构造一次，持有技能目录和出题流程
//! - 解析技能代码（未知代码直接失败）
//! - 按代码、按数量组织 `QuestionBatch`
//! - 批内重新生成与删除，缓存统计与清理
//!
//! ### `app` - 命令行前端
//! - 解析子命令
//! - 打印结果、导出文件
//!
//! ## 层次关系
//!
//! ```text
//! app (命令行)
//!     ↓
//! pipeline (处理 Vec<code>)
//!     ↓
//! workflow::QuestionFlow (处理单道题)
//!     ↓
//! services (能力层：generator / validator / cache / catalog)
//! ```

pub mod app;
pub mod pipeline;

pub use app::{App, Cli, Command};
pub use pipeline::Pipeline;
