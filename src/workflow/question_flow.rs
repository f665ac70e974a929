//! 出题流程 - 流程层
//!
//! 核心职责：定义"一道题"的完整处理流程
//!
//! 首次生成（GVC：Generate-Validate-Cache）：
//! 1. 查缓存，命中则直接返回最新一条
//! 2. 出题 → 查重 → 审核 → 审核对齐则写缓存
//! 3. 重试耗尽 → 兜底题目
//!
//! 重新生成（用户主动要求换一道）：
//! - 不读缓存，最多尝试更多次，保留置信度最高的候选
//! - 遇到审核通过的题目立即停止

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::models::{GenerationRequest, Question, QuestionWithValidation, ValidationResult};
use crate::services::{CacheStore, QuestionGenerator, QuestionValidator};
use crate::utils::logging::truncate_text;
use crate::workflow::question_ctx::QuestionCtx;

/// 命中缓存时读取的条目数
const CACHE_LOOKUP_LIMIT: usize = 5;

const GENERATION_FALLBACK_STATEMENT: &str = "Erro na geração da questão";
const GENERATION_FALLBACK_SUGGESTION: &str = "Tentar novamente ou revisar parâmetros";
const REGENERATION_FALLBACK_STATEMENT: &str = "Erro na regeneração da questão";
const REGENERATION_FALLBACK_FEEDBACK: &str =
    "Não foi possível gerar uma questão válida após várias tentativas";
const REGENERATION_FALLBACK_SUGGESTION: &str = "Tentar novamente com parâmetros diferentes";
const VALIDATION_ERROR_FEEDBACK: &str = "Erro durante o processo de validação";
const VALIDATION_ERROR_SUGGESTION: &str = "Revisar a questão manualmente";

/// 流程参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSettings {
    /// 首次生成的最大尝试次数
    pub max_attempts: usize,
    /// 重新生成的最大尝试次数
    pub max_regeneration_attempts: usize,
    /// 查重阈值
    pub similarity_threshold: f64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_regeneration_attempts: 8,
            similarity_threshold: crate::services::cache_store::DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// 出题流程
///
/// - 决定何时查缓存、何时出题、何时兜底
/// - 任何协作方失败都不会向上抛出，最终总能返回一道可展示的题目
pub struct QuestionFlow {
    generator: Arc<dyn QuestionGenerator>,
    validator: Arc<dyn QuestionValidator>,
    cache: CacheStore,
    settings: FlowSettings,
}

impl QuestionFlow {
    pub fn new(
        generator: Arc<dyn QuestionGenerator>,
        validator: Arc<dyn QuestionValidator>,
        cache: CacheStore,
        settings: FlowSettings,
    ) -> Self {
        Self {
            generator,
            validator,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// 生成单道题目
    pub async fn generate_single_question(
        &self,
        request: &GenerationRequest,
        use_cache: bool,
    ) -> QuestionWithValidation {
        self.run(request, &QuestionCtx::single(request), use_cache)
            .await
    }

    /// 执行 GVC 流程
    pub async fn run(
        &self,
        request: &GenerationRequest,
        ctx: &QuestionCtx,
        use_cache: bool,
    ) -> QuestionWithValidation {
        // ========== 1. 查缓存 ==========
        if use_cache {
            if let Some(cached) = self.lookup_cache(request, ctx) {
                return cached;
            }
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_failure = String::from("nenhuma tentativa executada");

        for attempt in 1..=max_attempts {
            debug!("{} 第 {}/{} 次尝试", ctx, attempt, max_attempts);

            // ========== 2. 出题 ==========
            let question = match self.generator.generate(request).await {
                Ok(question) => question,
                Err(e) => {
                    warn!("{} ⚠️ 出题失败 (尝试 {}/{}): {}", ctx, attempt, max_attempts, e);
                    last_failure = e.to_string();
                    continue;
                }
            };

            // ========== 3. 查重 ==========
            if use_cache && self.is_duplicate(request, &question, ctx) {
                info!(
                    "{} 🔁 与缓存题目重复，重新生成 (尝试 {}/{})",
                    ctx, attempt, max_attempts
                );
                last_failure = format!(
                    "questão duplicada: {}",
                    truncate_text(&question.statement, 60)
                );
                continue;
            }

            // ========== 4. 审核 ==========
            let validation = self.validate_or_reject(&question, request, ctx).await;

            // ========== 5. 写缓存 ==========
            if use_cache && validation.is_aligned {
                match self.cache.cache_question(request, &question, &validation) {
                    Ok(key) => debug!("{} 💾 已缓存: {}", ctx, key),
                    Err(e) => warn!("{} ⚠️ 写入缓存失败: {}", ctx, e),
                }
            }

            log_result(ctx, &validation);
            return QuestionWithValidation::new(question, validation);
        }

        error!(
            "{} ❌ 已尝试 {} 次仍未生成题目: {}",
            ctx, max_attempts, last_failure
        );
        QuestionWithValidation::new(
            Question::fallback(request, GENERATION_FALLBACK_STATEMENT),
            ValidationResult::rejected(
                format!("Erro na geração: {}", last_failure),
                Some(GENERATION_FALLBACK_SUGGESTION.to_string()),
            ),
        )
    }

    /// 重新生成题目
    ///
    /// 不读缓存；`avoid_text` 与新题干（去除首尾空白后）完全相同时丢弃并重试。
    pub async fn regenerate_question_with_variety(
        &self,
        request: &GenerationRequest,
        avoid_text: Option<&str>,
    ) -> QuestionWithValidation {
        let ctx = QuestionCtx::single(request);
        let avoid = avoid_text.map(str::trim).filter(|text| !text.is_empty());
        let max_attempts = self.settings.max_regeneration_attempts.max(1);
        let mut best: Option<QuestionWithValidation> = None;

        for attempt in 1..=max_attempts {
            let question = match self.generator.generate(request).await {
                Ok(question) => question,
                Err(e) => {
                    warn!("{} ⚠️ 重新出题失败 (尝试 {}/{}): {}", ctx, attempt, max_attempts, e);
                    continue;
                }
            };

            if avoid.is_some_and(|text| question.statement.trim() == text) {
                info!("{} 🔁 与原题相同，跳过 (尝试 {}/{})", ctx, attempt, max_attempts);
                continue;
            }

            let validation = match self.validator.validate(&question, request).await {
                Ok(validation) => validation,
                Err(e) => {
                    warn!("{} ⚠️ 审核失败 (尝试 {}/{}): {}", ctx, attempt, max_attempts, e);
                    continue;
                }
            };

            let approved = validation.is_approved();
            let best_score = best
                .as_ref()
                .map_or(0.0, |current| current.validation.confidence_score);
            let better = approved || validation.confidence_score > best_score;

            if better {
                debug!(
                    "{} 当前最佳候选置信度: {:.2}",
                    ctx, validation.confidence_score
                );
                best = Some(QuestionWithValidation::new(question, validation));
            }

            if approved {
                info!("{} ✓ 第 {} 次尝试得到通过审核的题目", ctx, attempt);
                break;
            }
        }

        match best {
            Some(best) => {
                log_result(&ctx, &best.validation);
                best
            }
            None => {
                error!("{} ❌ 重新生成 {} 次均失败", ctx, max_attempts);
                QuestionWithValidation::new(
                    Question::fallback(request, REGENERATION_FALLBACK_STATEMENT),
                    ValidationResult::rejected(
                        REGENERATION_FALLBACK_FEEDBACK,
                        Some(REGENERATION_FALLBACK_SUGGESTION.to_string()),
                    ),
                )
            }
        }
    }

    fn lookup_cache(
        &self,
        request: &GenerationRequest,
        ctx: &QuestionCtx,
    ) -> Option<QuestionWithValidation> {
        match self.cache.get_cached_questions(request, CACHE_LOOKUP_LIMIT) {
            Ok(entries) => {
                let entry = entries.into_iter().next()?;
                info!("{} ⚡ 命中缓存: {}", ctx, entry.cache_key);
                Some(entry.into_question_with_validation())
            }
            Err(e) => {
                warn!("{} ⚠️ 读取缓存失败，直接生成: {}", ctx, e);
                None
            }
        }
    }

    fn is_duplicate(&self, request: &GenerationRequest, question: &Question, ctx: &QuestionCtx) -> bool {
        self.cache
            .is_duplicate(request, question, self.settings.similarity_threshold)
            .unwrap_or_else(|e| {
                warn!("{} ⚠️ 查重失败，视为不重复: {}", ctx, e);
                false
            })
    }

    /// 审核失败时降级为零置信度的拒绝结果
    async fn validate_or_reject(
        &self,
        question: &Question,
        request: &GenerationRequest,
        ctx: &QuestionCtx,
    ) -> ValidationResult {
        match self.validator.validate(question, request).await {
            Ok(validation) => validation,
            Err(e) => {
                warn!("{} ⚠️ 审核失败，按未通过处理: {}", ctx, e);
                ValidationResult::rejected(
                    VALIDATION_ERROR_FEEDBACK,
                    Some(VALIDATION_ERROR_SUGGESTION.to_string()),
                )
            }
        }
    }
}

fn log_result(ctx: &QuestionCtx, validation: &ValidationResult) {
    if validation.is_approved() {
        info!(
            "{} ✅ 审核通过 (置信度: {:.2})",
            ctx, validation.confidence_score
        );
    } else {
        info!(
            "{} ❌ 审核未通过 (对齐: {}, 置信度: {:.2})",
            ctx, validation.is_aligned, validation.confidence_score
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionType, Subject};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 按脚本依次返回结果的出题器；脚本用完后一直失败
    struct ScriptedGenerator {
        script: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<&str>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuestionGenerator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Question> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")));
            next.map(|statement| question(request, &statement))
        }
    }

    /// 根据题干中的关键字给出置信度：包含 "boa" → 0.9 通过，"media" → 0.5，"nula" → 0.0，否则 0.3
    struct KeywordValidator {
        calls: AtomicUsize,
        fail: bool,
    }

    impl KeywordValidator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl QuestionValidator for KeywordValidator {
        async fn validate(
            &self,
            question: &Question,
            _request: &GenerationRequest,
        ) -> Result<ValidationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("validator offline"));
            }
            let (is_aligned, confidence_score) = if question.statement.contains("boa") {
                (true, 0.9)
            } else if question.statement.contains("media") {
                (false, 0.5)
            } else if question.statement.contains("nula") {
                (false, 0.0)
            } else {
                (false, 0.3)
            };
            Ok(ValidationResult {
                is_aligned,
                confidence_score,
                feedback: "stub".to_string(),
                suggestions: None,
            })
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            code: "EF04MA01".to_string(),
            knowledge_object: "Sistema de numeração decimal".to_string(),
            thematic_unit: "Números".to_string(),
            subject: Subject::Math,
            question_type: QuestionType::MultipleChoice,
            quantity: 1,
        }
    }

    fn question(request: &GenerationRequest, statement: &str) -> Question {
        Question {
            code: request.code.clone(),
            statement: statement.to_string(),
            options: Some(vec!["1".into(), "2".into(), "3".into(), "4".into()]),
            correct_answer: "A".to_string(),
            question_type: request.question_type,
            subject: Some(request.subject),
        }
    }

    fn flow(
        generator: Arc<ScriptedGenerator>,
        validator: Arc<KeywordValidator>,
    ) -> (TempDir, QuestionFlow) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path().join("cache.db")).unwrap();
        let flow = QuestionFlow::new(generator, validator, cache, FlowSettings::default());
        (dir, flow)
    }

    #[tokio::test]
    async fn test_generator_always_failing_returns_fallback() {
        let generator = ScriptedGenerator::new(vec![]);
        let validator = KeywordValidator::new();
        let (_dir, flow) = flow(generator.clone(), validator.clone());

        let result = flow.generate_single_question(&request(), true).await;

        assert_eq!(result.question.correct_answer, "N/A");
        assert!(result.question.options.is_none());
        assert_eq!(result.question.statement, GENERATION_FALLBACK_STATEMENT);
        assert!(!result.validation.is_aligned);
        assert_eq!(result.validation.confidence_score, 0.0);
        assert!(result.validation.feedback.contains("script exhausted"));
        assert_eq!(generator.calls(), 3);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let generator = ScriptedGenerator::new(vec![Err(anyhow!("timeout")), Ok("questão boa")]);
        let (_dir, flow) = flow(generator.clone(), KeywordValidator::new());

        let result = flow.generate_single_question(&request(), false).await;

        assert_eq!(result.question.statement, "questão boa");
        assert!(result.is_approved());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_aligned_result_is_cached_and_reused() {
        let generator = ScriptedGenerator::new(vec![Ok("uma questão boa sobre dezenas")]);
        let (_dir, flow) = flow(generator.clone(), KeywordValidator::new());

        let first = flow.generate_single_question(&request(), true).await;
        assert_eq!(flow.cache().get_all_entries().unwrap().len(), 1);

        let second = flow.generate_single_question(&request(), true).await;
        assert_eq!(second, first);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_result_is_returned_but_not_cached() {
        let generator = ScriptedGenerator::new(vec![Ok("questão fraca")]);
        let (_dir, flow) = flow(generator, KeywordValidator::new());

        let result = flow.generate_single_question(&request(), true).await;

        assert_eq!(result.question.statement, "questão fraca");
        assert!(!result.validation.is_aligned);
        assert!(flow.cache().get_all_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validator_failure_degrades_to_reject() {
        let generator = ScriptedGenerator::new(vec![Ok("questão boa")]);
        let (_dir, flow) = flow(generator, KeywordValidator::failing());

        let result = flow.generate_single_question(&request(), true).await;

        assert_eq!(result.question.statement, "questão boa");
        assert!(!result.validation.is_aligned);
        assert_eq!(result.validation.confidence_score, 0.0);
        assert_eq!(result.validation.feedback, VALIDATION_ERROR_FEEDBACK);
        assert!(flow.cache().get_all_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_lookup_is_scoped_by_question_type() {
        let generator = ScriptedGenerator::new(vec![Ok("quantas dezenas tem o número cem")]);
        let (_dir, flow) = flow(generator.clone(), KeywordValidator::new());

        let mut tf_request = request();
        tf_request.question_type = QuestionType::TrueFalse;
        let mut seeded = question(&tf_request, "quantas dezenas tem o número cem");
        seeded.options = None;
        flow.cache()
            .cache_question(&tf_request, &seeded, &ValidationResult::rejected("x", None))
            .unwrap();

        // 同题型：直接命中缓存
        let result = flow.generate_single_question(&tf_request, true).await;
        assert_eq!(result.question.question_type, QuestionType::TrueFalse);
        assert_eq!(generator.calls(), 0);

        // 选择题：缓存中没有同题型条目，查重也不会与判断题比较
        let result = flow.generate_single_question(&request(), true).await;
        assert_eq!(result.question.question_type, QuestionType::MultipleChoice);
        assert_eq!(result.question.statement, "quantas dezenas tem o número cem");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_exhaust_attempts_and_fall_back() {
        let statement = "quantas dezenas tem o número cem";
        let generator = ScriptedGenerator::new(vec![Ok(statement), Ok(statement), Ok(statement)]);
        let validator = KeywordValidator::new();
        let (_dir, flow) = flow(generator.clone(), validator.clone());

        // 旧条目被其他代码的 60 条新条目挤出缓存查找窗口，但仍在查重窗口内
        let yesterday = chrono::Utc::now() - chrono::Duration::days(1);
        flow.cache()
            .cache_question_at(
                &request(),
                &question(&request(), statement),
                &ValidationResult::rejected("x", None),
                yesterday,
            )
            .unwrap();
        let mut other = request();
        other.code = "EF04MA02".to_string();
        for i in 0..60 {
            flow.cache()
                .cache_question(
                    &other,
                    &question(&other, &format!("outra questão {}", i)),
                    &ValidationResult::rejected("x", None),
                )
                .unwrap();
        }

        let result = flow.generate_single_question(&request(), true).await;

        assert_eq!(generator.calls(), 3);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.question.statement, GENERATION_FALLBACK_STATEMENT);
        assert_eq!(result.question.correct_answer, "N/A");
        assert!(result
            .validation
            .feedback
            .starts_with("Erro na geração: questão duplicada"));
        assert_eq!(result.validation.confidence_score, 0.0);
    }

    #[tokio::test]
    async fn test_cache_disabled_never_reads_or_writes() {
        let generator = ScriptedGenerator::new(vec![Ok("questão boa"), Ok("questão boa")]);
        let (_dir, flow) = flow(generator.clone(), KeywordValidator::new());

        flow.generate_single_question(&request(), false).await;
        flow.generate_single_question(&request(), false).await;

        assert_eq!(generator.calls(), 2);
        assert!(flow.cache().get_all_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_regeneration_skips_avoided_text() {
        let generator = ScriptedGenerator::new(vec![
            Ok("questão original boa"),
            Ok("  questão original boa  "),
            Ok("nova questão boa"),
        ]);
        let validator = KeywordValidator::new();
        let (_dir, flow) = flow(generator.clone(), validator.clone());

        let result = flow
            .regenerate_question_with_variety(&request(), Some("questão original boa"))
            .await;

        assert_eq!(result.question.statement, "nova questão boa");
        assert!(result.is_approved());
        assert_eq!(generator.calls(), 3);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_regeneration_keeps_best_candidate() {
        let generator = ScriptedGenerator::new(vec![
            Ok("questão fraca"),
            Ok("questão media"),
            Ok("outra fraca"),
        ]);
        let (_dir, flow) = flow(generator.clone(), KeywordValidator::new());

        let result = flow.regenerate_question_with_variety(&request(), None).await;

        assert_eq!(result.question.statement, "questão media");
        assert_eq!(result.validation.confidence_score, 0.5);
        // 3 次成功 + 5 次脚本耗尽失败
        assert_eq!(generator.calls(), 8);
    }

    #[tokio::test]
    async fn test_regeneration_stops_early_and_ignores_cache() {
        let generator = ScriptedGenerator::new(vec![Ok("questão boa"), Ok("questão boa 2")]);
        let (_dir, flow) = flow(generator.clone(), KeywordValidator::new());
        flow.cache()
            .cache_question(
                &request(),
                &question(&request(), "questão em cache"),
                &ValidationResult {
                    is_aligned: true,
                    confidence_score: 1.0,
                    feedback: String::new(),
                    suggestions: None,
                },
            )
            .unwrap();

        let result = flow.regenerate_question_with_variety(&request(), None).await;

        assert_eq!(result.question.statement, "questão boa");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_regeneration_ignores_zero_confidence_candidates() {
        let generator = ScriptedGenerator::new(vec![Ok("questão nula"), Ok("outra questão nula")]);
        let validator = KeywordValidator::new();
        let (_dir, flow) = flow(generator.clone(), validator.clone());

        let result = flow.regenerate_question_with_variety(&request(), None).await;

        assert_eq!(validator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.question.statement, REGENERATION_FALLBACK_STATEMENT);
        assert_eq!(result.validation.feedback, REGENERATION_FALLBACK_FEEDBACK);
    }

    #[tokio::test]
    async fn test_regeneration_exhausted_returns_fallback() {
        let generator = ScriptedGenerator::new(vec![Ok("mesma"), Ok("mesma")]);
        let (_dir, flow) = flow(generator.clone(), KeywordValidator::new());

        let result = flow
            .regenerate_question_with_variety(&request(), Some("mesma"))
            .await;

        assert_eq!(result.question.statement, REGENERATION_FALLBACK_STATEMENT);
        assert_eq!(result.question.correct_answer, "N/A");
        assert_eq!(result.validation.confidence_score, 0.0);
        assert_eq!(generator.calls(), 8);
    }
}
