use anyhow::Result;
use clap::Parser;

use bncc_question_gen::orchestrator::{App, Cli};
use bncc_question_gen::utils::logging;
use bncc_question_gen::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(cli.verbose || config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run(cli.command).await?;

    Ok(())
}
