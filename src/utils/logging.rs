//! 日志工具模块
//!
//! 提供日志初始化和流水线各阶段的输出辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::QuestionBatch;

/// 初始化 tracing 日志
///
/// `RUST_LOG` 优先；未设置时 verbose 模式为 debug，否则为 info。
/// 重复调用时静默忽略。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(model_name: &str, skill_count: usize, cache_db_path: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - BNCC 题目生成");
    info!("🤖 模型: {}", model_name);
    info!("📚 技能数量: {}", skill_count);
    info!("💾 缓存数据库: {}", cache_db_path);
    info!("{}", "=".repeat(60));
}

/// 记录单个技能代码的批次开始
///
/// # 参数
/// - `index`: 当前代码序号（从1开始）
/// - `total`: 代码总数
/// - `code`: 技能代码
/// - `quantity`: 每个代码的题目数量
pub fn log_batch_start(index: usize, total: usize, code: &str, quantity: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 个代码: {}", index, total, code);
    info!("📄 本批题目数量: {}", quantity);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(batch: &QuestionBatch) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ {} 完成: 通过 {}/{}",
        batch.request().code,
        batch.total_approved(),
        batch.total_generated()
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(batches: &[QuestionBatch]) {
    let generated: usize = batches.iter().map(QuestionBatch::total_generated).sum();
    let approved: usize = batches.iter().map(QuestionBatch::total_approved).sum();

    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📚 技能代码: {}", batches.len());
    info!("✅ 审核通过: {}/{}", approved, generated);
    info!("❌ 未通过: {}", generated - approved);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
