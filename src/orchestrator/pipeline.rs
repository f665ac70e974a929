//! 出题流水线 - 编排层
//!
//! ## 职责
//!
//! 进程内唯一的编排对象，启动时构造一次，以引用传给所有前端。
//!
//! 1. **初始化**：加载技能目录、打开缓存库、构造 LLM 出题与审核服务
//! 2. **批量出题**：先解析全部技能代码，再按题型计划逐个代码、逐道题执行 GVC 流程
//! 3. **批内编辑**：重新生成 / 删除批次中的某道题，计数随之重算
//! 4. **缓存维护**：统计、历史、按天清理
//! 5. **导出**：批次汇总、题目列表、单题、缓存历史
//!
//! 不做具体业务判断，出题细节全部委托给 `workflow::QuestionFlow`。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    CacheEntry, GenerationRequest, QuestionBatch, QuestionType, QuestionWithValidation,
    SkillDescriptor, Subject,
};
use crate::services::{
    export, CacheStats, CacheStore, Catalog, LlmQuestionGenerator, LlmQuestionValidator,
    LlmService, QuestionGenerator, QuestionValidator,
};
use crate::utils::logging;
use crate::workflow::{FlowSettings, QuestionCtx, QuestionFlow};

/// 出题流水线
pub struct Pipeline {
    catalog: Catalog,
    flow: QuestionFlow,
}

impl Pipeline {
    /// 由已构造好的组件组装流水线
    pub fn new(
        catalog: Catalog,
        cache: CacheStore,
        generator: Arc<dyn QuestionGenerator>,
        validator: Arc<dyn QuestionValidator>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            catalog,
            flow: QuestionFlow::new(generator, validator, cache, settings),
        }
    }

    /// 按配置初始化：加载目录、打开缓存、构造 LLM 服务
    ///
    /// 目录缺失或格式错误时以空目录继续运行；缓存库无法打开则返回错误。
    pub async fn initialize(config: &Config) -> AppResult<Self> {
        let catalog = Catalog::load(Path::new(&config.catalog_path)).await;
        let cache = CacheStore::open(&config.cache_db_path)?;

        let llm = LlmService::new(config);
        let generator = Arc::new(LlmQuestionGenerator::new(
            llm.clone(),
            config.generation_temperature,
        ));
        let validator = Arc::new(LlmQuestionValidator::new(llm, config.validation_temperature));

        logging::log_startup(
            &config.llm_model_name,
            catalog.skill_count(),
            &config.cache_db_path,
        );

        Ok(Self::new(
            catalog,
            cache,
            generator,
            validator,
            settings_from(config),
        ))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> &CacheStore {
        self.flow.cache()
    }

    pub fn list_subjects(&self) -> Vec<Subject> {
        self.catalog.list_subjects()
    }

    pub fn list_skills(&self, subject: Subject) -> &[SkillDescriptor] {
        self.catalog.list_skills(subject)
    }

    pub fn find_skill(&self, code: &str) -> Option<&SkillDescriptor> {
        self.catalog.find_skill(code)
    }

    /// 为一组技能代码批量出题，每道题使用同一题型
    ///
    /// 所有代码先全部解析，任一未知代码直接返回错误，不会生成任何题目。
    pub async fn generate_questions(
        &self,
        codes: &[String],
        quantity: usize,
        question_type: QuestionType,
        use_cache: bool,
    ) -> AppResult<Vec<QuestionBatch>> {
        self.generate_with_plan(codes, &vec![question_type; quantity], use_cache)
            .await
    }

    /// 按选择题比例混合题型出题：每个代码前 `floor(quantity × mc_ratio)` 道为选择题，其余为判断题
    pub async fn generate_custom_distribution(
        &self,
        codes: &[String],
        quantity: usize,
        mc_ratio: f64,
        use_cache: bool,
    ) -> AppResult<Vec<QuestionBatch>> {
        let plan = QuestionType::distribution(quantity, mc_ratio);
        self.generate_with_plan(codes, &plan, use_cache).await
    }

    async fn generate_with_plan(
        &self,
        codes: &[String],
        plan: &[QuestionType],
        use_cache: bool,
    ) -> AppResult<Vec<QuestionBatch>> {
        let skills = codes
            .iter()
            .map(|code| self.catalog.require_skill(code))
            .collect::<AppResult<Vec<_>>>()?;

        let mut batches = Vec::with_capacity(skills.len());
        for (idx, skill) in skills.iter().enumerate() {
            logging::log_batch_start(idx + 1, skills.len(), &skill.code, plan.len());
            let batch = self.run_batch(skill, plan, use_cache).await;
            logging::log_batch_complete(&batch);
            batches.push(batch);
        }

        logging::print_final_stats(&batches);
        Ok(batches)
    }

    /// 为单个技能代码出题
    pub async fn generate_questions_batch(
        &self,
        code: &str,
        quantity: usize,
        question_type: QuestionType,
        use_cache: bool,
    ) -> AppResult<QuestionBatch> {
        let skill = self.catalog.require_skill(code)?;
        Ok(self
            .run_batch(skill, &vec![question_type; quantity], use_cache)
            .await)
    }

    /// 按题型计划逐道出题；批次的请求取第一道题的题型作为代表
    async fn run_batch(
        &self,
        skill: &SkillDescriptor,
        plan: &[QuestionType],
        use_cache: bool,
    ) -> QuestionBatch {
        let representative = plan.first().copied().unwrap_or_default();
        let request = GenerationRequest::for_skill(skill, representative).with_quantity(plan.len());

        let mut questions = Vec::with_capacity(plan.len());
        for (idx, &question_type) in plan.iter().enumerate() {
            let unit = GenerationRequest::for_skill(skill, question_type);
            let ctx = QuestionCtx::new(skill.code.clone(), idx + 1, plan.len());
            questions.push(self.flow.run(&unit, &ctx, use_cache).await);
        }
        QuestionBatch::new(request, questions)
    }

    /// 重新生成一道题（不读缓存）
    pub async fn regenerate_question(
        &self,
        request: &GenerationRequest,
        avoid_text: Option<&str>,
    ) -> QuestionWithValidation {
        self.flow
            .regenerate_question_with_variety(request, avoid_text)
            .await
    }

    /// 用新题替换批次中的第 `index` 道题，新题避开当前题干
    ///
    /// 下标越界时返回 `None`，批次不变。
    pub async fn regenerate_in_batch(
        &self,
        batch: &mut QuestionBatch,
        index: usize,
    ) -> Option<QuestionWithValidation> {
        let current = &batch.questions().get(index)?.question;
        let avoid = current.statement.clone();
        let mut request = batch.request().clone().with_quantity(1);
        request.question_type = current.question_type;
        let replacement = self.regenerate_question(&request, Some(&avoid)).await;
        info!(
            "🔄 {} 第 {} 道题已重新生成 (置信度: {:.2})",
            request.code,
            index + 1,
            replacement.validation.confidence_score
        );
        batch.replace_at(index, replacement)
    }

    /// 丢弃批次中的第 `index` 道题，同时从缓存中删除相同题干的条目
    pub fn discard_from_batch(
        &self,
        batch: &mut QuestionBatch,
        index: usize,
    ) -> Option<QuestionWithValidation> {
        let statement = &batch.questions().get(index)?.question.statement;
        if !self.cache().remove_by_content(statement) {
            warn!("⚠️ 缓存中没有找到要删除的题目");
        }
        batch.remove_at(index)
    }

    pub fn cache_stats(&self) -> AppResult<CacheStats> {
        Ok(self.cache().get_cache_stats()?)
    }

    /// 删除早于 `older_than_days` 天的缓存，返回删除数量
    pub fn clear_cache(&self, older_than_days: u32) -> usize {
        let deleted = self.cache().clear_cache(older_than_days);
        info!("🧹 已清理 {} 条缓存", deleted);
        deleted
    }

    /// 缓存历史（最新在前）
    pub fn history(&self) -> AppResult<Vec<CacheEntry>> {
        Ok(self.cache().get_all_entries()?)
    }

    /// 把批次汇总导出为 JSON 文件（只含审核通过的题目）
    pub fn export_batches(
        &self,
        batches: &[QuestionBatch],
        output_path: &Path,
    ) -> AppResult<PathBuf> {
        export::export_batches_to_file(batches, output_path).map_err(export_error)
    }

    /// 把批次中的全部题目按单题格式导出到目录，文件名由涉及的技能代码生成
    pub fn export_questions(&self, batches: &[QuestionBatch], dir: &Path) -> AppResult<PathBuf> {
        let list = export::export_list_from_batches(batches);
        let (json_data, filename) = export::export_questions_list_json(&list, "questoes_selecionadas")
            .map_err(export_error)?;
        export::write_export_file(dir, &filename, &json_data).map_err(export_error)
    }

    /// 把缓存历史（最新在前，最多 `limit` 条）按单题格式导出到目录
    pub fn export_history(&self, limit: usize, dir: &Path) -> AppResult<PathBuf> {
        let list: Vec<_> = self
            .history()?
            .iter()
            .take(limit)
            .map(export::ExportedQuestion::from_cache_entry)
            .collect();
        let (json_data, filename) =
            export::export_questions_list_json(&list, "historico").map_err(export_error)?;
        export::write_export_file(dir, &filename, &json_data).map_err(export_error)
    }

    /// 导出单道题
    pub fn export_single(&self, item: &QuestionWithValidation, dir: &Path) -> AppResult<PathBuf> {
        let exported = export::ExportedQuestion::from_question(&item.question, &item.question.code);
        let (json_data, filename) =
            export::export_question_json(&exported, "").map_err(export_error)?;
        export::write_export_file(dir, &filename, &json_data).map_err(export_error)
    }
}

fn export_error(e: anyhow::Error) -> AppError {
    AppError::Other(format!("{:#}", e))
}

fn settings_from(config: &Config) -> FlowSettings {
    FlowSettings {
        max_attempts: config.max_attempts,
        max_regeneration_attempts: config.max_regeneration_attempts,
        similarity_threshold: config.similarity_threshold,
    }
}
