//! 命令行前端 - 编排层
//!
//! 解析子命令，持有 `Pipeline`，把结果打印到标准输出

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{GenerationRequest, QuestionType, QuestionWithValidation, Subject};
use crate::orchestrator::pipeline::Pipeline;
use crate::utils::logging::truncate_text;

#[derive(Parser, Debug)]
#[command(
    name = "bncc-question-gen",
    version,
    about = "Gera e valida questões alinhadas à BNCC (4º ano)"
)]
pub struct Cli {
    /// 输出 debug 级别日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 列出所有学科
    Subjects,
    /// 列出某学科的技能代码
    Skills {
        /// 学科名或简码（Matemática / MA ...）
        subject: String,
    },
    /// 批量出题
    Generate(GenerateArgs),
    /// 重新生成一道题（不读缓存）
    Regenerate {
        code: String,
        /// 需要避开的原题干
        #[arg(long)]
        avoid: Option<String>,
        #[arg(short = 't', long = "type", value_enum, default_value_t = TypeArg::MultipleChoice)]
        question_type: TypeArg,
        /// 把新题按单题格式导出到该目录
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// 查看缓存历史
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// 把列出的历史题目导出到该目录
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// 缓存统计
    Stats,
    /// 清理早于 N 天的缓存
    Clear {
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// 技能代码，可重复或逗号分隔
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub codes: Vec<String>,
    /// 每个代码的题目数量
    #[arg(short, long, default_value_t = 1)]
    pub quantity: usize,
    #[arg(short = 't', long = "type", value_enum, default_value_t = TypeArg::MultipleChoice)]
    pub question_type: TypeArg,
    /// 选择题比例（0~1），其余为判断题
    #[arg(long, conflicts_with = "question_type")]
    pub mc_ratio: Option<f64>,
    /// 不读写缓存
    #[arg(long)]
    pub no_cache: bool,
    /// 导出通过审核的题目到 JSON 文件
    #[arg(long)]
    pub export: Option<PathBuf>,
    /// 把全部题目按单题格式导出到该目录
    #[arg(long)]
    pub export_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    MultipleChoice,
    TrueFalse,
}

impl From<TypeArg> for QuestionType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::MultipleChoice => QuestionType::MultipleChoice,
            TypeArg::TrueFalse => QuestionType::TrueFalse,
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    pipeline: Pipeline,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let pipeline = Pipeline::initialize(&config).await?;
        Ok(Self { config, pipeline })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// 执行一个子命令
    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Subjects => self.print_subjects(),
            Command::Skills { subject } => self.print_skills(&subject),
            Command::Generate(args) => {
                self.config.require_llm_credentials()?;
                self.generate(args).await?;
            }
            Command::Regenerate {
                code,
                avoid,
                question_type,
                export_dir,
            } => {
                self.config.require_llm_credentials()?;
                let skill = self.pipeline.catalog().require_skill(&code)?;
                let request = GenerationRequest::for_skill(skill, question_type.into());
                let item = self
                    .pipeline
                    .regenerate_question(&request, avoid.as_deref())
                    .await;
                print_item(1, &item);
                if let Some(dir) = export_dir {
                    let written = self.pipeline.export_single(&item, &dir)?;
                    info!("📁 已导出: {}", written.display());
                }
            }
            Command::History { limit, export_dir } => {
                self.print_history(limit)?;
                if let Some(dir) = export_dir {
                    let written = self.pipeline.export_history(limit, &dir)?;
                    info!("📁 已导出: {}", written.display());
                }
            }
            Command::Stats => self.print_stats()?,
            Command::Clear { days } => {
                let deleted = self.pipeline.clear_cache(days);
                println!("{} entradas removidas", deleted);
            }
        }
        Ok(())
    }

    async fn generate(&self, args: GenerateArgs) -> Result<()> {
        let use_cache = !args.no_cache;
        let batches = match args.mc_ratio {
            Some(ratio) => {
                self.pipeline
                    .generate_custom_distribution(&args.codes, args.quantity, ratio, use_cache)
                    .await?
            }
            None => {
                self.pipeline
                    .generate_questions(
                        &args.codes,
                        args.quantity,
                        args.question_type.into(),
                        use_cache,
                    )
                    .await?
            }
        };

        for batch in &batches {
            let request = batch.request();
            println!("\n{}", "=".repeat(60));
            println!(
                "{} - {} ({})",
                request.code, request.knowledge_object, request.subject
            );
            println!(
                "Aprovadas: {}/{}",
                batch.total_approved(),
                batch.total_generated()
            );
            println!("{}", "=".repeat(60));
            for (idx, item) in batch.questions().iter().enumerate() {
                print_item(idx + 1, item);
            }
        }

        if let Some(path) = args.export {
            let written = self.pipeline.export_batches(&batches, &path)?;
            info!("📁 已导出: {}", written.display());
        }
        if let Some(dir) = args.export_dir {
            let written = self.pipeline.export_questions(&batches, &dir)?;
            info!("📁 已导出: {}", written.display());
        }
        Ok(())
    }

    fn print_subjects(&self) {
        let subjects = self.pipeline.list_subjects();
        if subjects.is_empty() {
            warn!("⚠️ 技能目录为空，请检查 BNCC_DATA_PATH");
        }
        for subject in subjects {
            println!(
                "{} ({}) - {} habilidades",
                subject,
                subject.short_code(),
                self.pipeline.list_skills(subject).len()
            );
        }
    }

    fn print_skills(&self, subject: &str) {
        let Some(subject) = Subject::find(subject) else {
            warn!("⚠️ 未知学科: {}", subject);
            return;
        };
        for skill in self.pipeline.list_skills(subject) {
            println!("{}", skill);
        }
    }

    fn print_history(&self, limit: usize) -> Result<()> {
        let entries = self.pipeline.history()?;
        println!("{} questões em cache", entries.len());
        for entry in entries.iter().take(limit) {
            let mark = if entry.validation.is_approved() { "✅" } else { "❌" };
            println!(
                "{} {} [{}] {}",
                mark,
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.question.code,
                truncate_text(&entry.question.statement, 80)
            );
        }
        Ok(())
    }

    fn print_stats(&self) -> Result<()> {
        let stats = self.pipeline.cache_stats()?;
        println!("Total de entradas: {}", stats.total_entries);
        for pattern in &stats.top_cached_patterns {
            println!("  {}  {}", pattern.pattern, pattern.count);
        }
        Ok(())
    }
}

fn print_item(index: usize, item: &QuestionWithValidation) {
    let validation = &item.validation;
    println!("\n--- Questão {} ---", index);
    println!("{}", item.question.format_question());
    println!(
        "{} Confiança: {:.2} | {}",
        if item.is_approved() { "✅" } else { "❌" },
        validation.confidence_score,
        validation.feedback
    );
    if let Some(suggestions) = &validation.suggestions {
        println!("Sugestões: {}", suggestions);
    }
}
