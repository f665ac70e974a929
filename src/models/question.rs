use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::skill::SkillDescriptor;
use super::subject::Subject;

/// 审核通过阈值：`is_aligned` 且置信度不低于该值才算通过
pub const APPROVAL_THRESHOLD: f64 = 0.7;

/// 选择题最多选项数
pub const MAX_OPTIONS: usize = 4;

/// 兜底题目的答案
pub const FALLBACK_ANSWER: &str = "N/A";

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum QuestionType {
    /// 选择题
    #[default]
    #[serde(rename = "multipla_escolha")]
    MultipleChoice,
    /// 判断题
    #[serde(rename = "verdadeiro_falso")]
    TrueFalse,
}

impl QuestionType {
    /// 序列化用的值（参与缓存键计算）
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multipla_escolha",
            QuestionType::TrueFalse => "verdadeiro_falso",
        }
    }

    /// 按选择题比例展开一个代码下各题的题型：前 `floor(quantity × ratio)` 道为选择题，其余为判断题
    ///
    /// 比例截断到 [0, 1]；非有限值按全部选择题处理。
    pub fn distribution(quantity: usize, mc_ratio: f64) -> Vec<QuestionType> {
        let ratio = if mc_ratio.is_finite() {
            mc_ratio.clamp(0.0, 1.0)
        } else {
            1.0
        };
        let mc_count = ((quantity as f64 * ratio).floor() as usize).min(quantity);

        let mut types = vec![QuestionType::MultipleChoice; mc_count];
        types.resize(quantity, QuestionType::TrueFalse);
        types
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 生成请求
///
/// 每个生成单元临时构造，不直接持久化（只有派生字段进入缓存键）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub code: String,
    pub knowledge_object: String,
    pub thematic_unit: String,
    pub subject: Subject,
    pub question_type: QuestionType,
    pub quantity: usize,
}

impl GenerationRequest {
    /// 从技能描述构造单题请求
    pub fn for_skill(skill: &SkillDescriptor, question_type: QuestionType) -> Self {
        Self {
            code: skill.code.clone(),
            knowledge_object: skill.knowledge_object.clone(),
            thematic_unit: skill.thematic_unit.clone(),
            subject: skill.subject,
            question_type,
            quantity: 1,
        }
    }

    pub fn with_quantity(mut self, quantity: usize) -> Self {
        self.quantity = quantity;
        self
    }
}

/// 生成的题目
///
/// 字段名与历史缓存记录保持一致（葡语字段名），未知字段在反序列化时忽略。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "enunciado")]
    pub statement: String,
    #[serde(rename = "opcoes", default)]
    pub options: Option<Vec<String>>,
    #[serde(rename = "gabarito")]
    pub correct_answer: String,
    #[serde(default)]
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
}

impl Question {
    /// 构造兜底题目（所有重试耗尽时返回）
    pub fn fallback(request: &GenerationRequest, statement: impl Into<String>) -> Self {
        Self {
            code: request.code.clone(),
            statement: statement.into(),
            options: None,
            correct_answer: FALLBACK_ANSWER.to_string(),
            question_type: request.question_type,
            subject: Some(request.subject),
        }
    }

    /// 格式化为可打印文本
    pub fn format_question(&self) -> String {
        match self.question_type {
            QuestionType::MultipleChoice => {
                let options_text = self
                    .options
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .zip('A'..='Z')
                    .map(|(option, letter)| format!("{}) {}", letter, option))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "[{}] QUESTÃO: {}\n{}\n\nGabarito: {}",
                    self.code, self.statement, options_text, self.correct_answer
                )
            }
            QuestionType::TrueFalse => format!(
                "[{}] QUESTÃO: {}\n( ) Verdadeiro\n( ) Falso\n\nGabarito: {}",
                self.code, self.statement, self.correct_answer
            ),
        }
    }
}

/// 审核结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_aligned: bool,
    pub confidence_score: f64,
    pub feedback: String,
    #[serde(default)]
    pub suggestions: Option<String>,
}

impl ValidationResult {
    /// 零置信度的拒绝结果
    pub fn rejected(feedback: impl Into<String>, suggestions: Option<String>) -> Self {
        Self {
            is_aligned: false,
            confidence_score: 0.0,
            feedback: feedback.into(),
            suggestions,
        }
    }

    /// 是否审核通过（两个条件缺一不可）
    pub fn is_approved(&self) -> bool {
        self.is_aligned && self.confidence_score >= APPROVAL_THRESHOLD
    }
}

/// 题目 + 审核结果，缓存与返回的最小单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionWithValidation {
    pub question: Question,
    pub validation: ValidationResult,
}

impl QuestionWithValidation {
    pub fn new(question: Question, validation: ValidationResult) -> Self {
        Self {
            question,
            validation,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.validation.is_approved()
    }
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub question: Question,
    pub validation: ValidationResult,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn into_question_with_validation(self) -> QuestionWithValidation {
        QuestionWithValidation::new(self.question, self.validation)
    }
}

/// 单个技能代码的一批题目
///
/// 字段私有：只能通过 `replace_at` / `remove_at` 修改，
/// 每次修改后立即重算 `total_generated` 与 `total_approved`。
#[derive(Debug, Clone, Serialize)]
pub struct QuestionBatch {
    request: GenerationRequest,
    questions: Vec<QuestionWithValidation>,
    total_generated: usize,
    total_approved: usize,
}

impl QuestionBatch {
    pub fn new(request: GenerationRequest, questions: Vec<QuestionWithValidation>) -> Self {
        let mut batch = Self {
            request,
            questions,
            total_generated: 0,
            total_approved: 0,
        };
        batch.recompute();
        batch
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn questions(&self) -> &[QuestionWithValidation] {
        &self.questions
    }

    pub fn total_generated(&self) -> usize {
        self.total_generated
    }

    pub fn total_approved(&self) -> usize {
        self.total_approved
    }

    /// 通过审核的题目
    pub fn approved(&self) -> impl Iterator<Item = &QuestionWithValidation> {
        self.questions.iter().filter(|q| q.is_approved())
    }

    /// 替换指定位置的题目，返回被替换的旧题目；越界时返回 `None` 且不做修改
    pub fn replace_at(
        &mut self,
        index: usize,
        item: QuestionWithValidation,
    ) -> Option<QuestionWithValidation> {
        let slot = self.questions.get_mut(index)?;
        let old = std::mem::replace(slot, item);
        self.recompute();
        Some(old)
    }

    /// 删除指定位置的题目
    pub fn remove_at(&mut self, index: usize) -> Option<QuestionWithValidation> {
        if index >= self.questions.len() {
            return None;
        }
        let removed = self.questions.remove(index);
        self.recompute();
        Some(removed)
    }

    fn recompute(&mut self) {
        self.total_generated = self.questions.len();
        self.total_approved = self.questions.iter().filter(|q| q.is_approved()).count();
        self.request.quantity = self.total_generated;
    }
}
