//! # BNCC Question Gen
//!
//! 为巴西 BNCC 4 年级技能代码生成并审核选择题 / 判断题
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 数据模型层（Models）
//! - `models/` - 学科、技能、题目、审核结果、批次
//! - `models/loaders` - 读取 BNCC 参考数据 JSON
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单道题
//! - `QuestionGenerator` - 按学科路由的出题能力
//! - `QuestionValidator` - LLM 审核能力
//! - `CacheStore` - SQLite 缓存与查重
//! - `Catalog` - 技能目录查询
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整处理流程
//! - `QuestionCtx` - 上下文封装（code + 题目序号）
//! - `QuestionFlow` - 流程编排（cache → generate → dedup → validate → cache）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 出题流水线，批量处理与缓存维护
//! - `orchestrator/app` - 命令行前端

pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{GenerationRequest, Question, QuestionBatch, QuestionType, ValidationResult};
pub use orchestrator::{App, Pipeline};
pub use workflow::{FlowSettings, QuestionCtx, QuestionFlow};
