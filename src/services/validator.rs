//! 审核服务 - 业务能力层
//!
//! 只负责"判断一道题是否符合技能代码与年龄要求"，调用一次 LLM

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{GenerationRequest, Question, ValidationResult};
use crate::services::llm_service::LlmService;

/// LLM 判定为对齐所需的最低置信度
const ALIGNMENT_MIN_CONFIDENCE: f64 = 0.6;

const SYSTEM_PROMPT: &str = "Você é um especialista em avaliação educacional e BNCC (Base Nacional Comum Curricular).

Sua missão é VALIDAR se uma questão está adequadamente alinhada com um código de habilidade específico.

CRITÉRIOS DE AVALIAÇÃO:
1. ALINHAMENTO: a questão aborda exatamente o que o código de habilidade especifica?
2. ADEQUAÇÃO COGNITIVA (4º ano, 9-10 anos): linguagem, complexidade e contextos apropriados.
3. QUALIDADE PEDAGÓGICA: enunciado claro, alternativas bem formuladas, gabarito correto.
4. CONFORMIDADE BNCC: competências, unidades temáticas e campos de atuação respeitados.

INSTRUÇÕES:
- Seja rigoroso
- Confiança alta (0.8-1.0) apenas para questões excelentes
- Confiança média (0.5-0.7) para questões adequadas com pequenos problemas
- Confiança baixa (0-0.4) para questões com problemas significativos

Responda APENAS com um objeto JSON:
{\"is_aligned\": true|false, \"confidence_score\": 0.0-1.0, \"feedback\": \"...\", \"suggestions\": \"...\", \"cognitive_level_appropriate\": true|false, \"bncc_compliance\": true|false}";

/// 审核能力
#[async_trait]
pub trait QuestionValidator: Send + Sync {
    async fn validate(
        &self,
        question: &Question,
        request: &GenerationRequest,
    ) -> Result<ValidationResult>;
}

/// LLM 审核的结构化输出
#[derive(Debug, Deserialize)]
struct ValidationOutput {
    is_aligned: bool,
    confidence_score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    suggestions: Option<String>,
    #[serde(default = "default_true")]
    cognitive_level_appropriate: bool,
    #[serde(default = "default_true")]
    bncc_compliance: bool,
}

fn default_true() -> bool {
    true
}

impl From<ValidationOutput> for ValidationResult {
    /// 综合各项判定得出最终结果；建议只在未通过时保留
    fn from(output: ValidationOutput) -> Self {
        let confidence_score = if output.confidence_score.is_finite() {
            output.confidence_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let is_aligned = output.is_aligned
            && output.cognitive_level_appropriate
            && output.bncc_compliance
            && confidence_score >= ALIGNMENT_MIN_CONFIDENCE;

        ValidationResult {
            is_aligned,
            confidence_score,
            feedback: output.feedback,
            suggestions: if is_aligned {
                None
            } else {
                output.suggestions.filter(|s| !s.trim().is_empty())
            },
        }
    }
}

/// 基于 LLM 的审核服务
pub struct LlmQuestionValidator {
    llm: LlmService,
    temperature: f32,
}

impl LlmQuestionValidator {
    pub fn new(llm: LlmService, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    fn build_user_message(question: &Question, request: &GenerationRequest) -> String {
        let options = question
            .options
            .as_ref()
            .filter(|options| !options.is_empty())
            .map(|options| options.join(" | "))
            .unwrap_or_else(|| "N/A (Verdadeiro/Falso)".to_string());

        format!(
            "Avalie a seguinte questão:

=== CÓDIGO DE HABILIDADE ===
Código: {}
Objeto de Conhecimento: {}
Unidade Temática: {}
Matéria: {}

=== QUESTÃO GERADA ===
Enunciado: {}
Opções: {}
Gabarito: {}
Tipo: {}

Analise se esta questão está alinhada com o código de habilidade e apropriada para alunos do 4º ano.",
            request.code,
            request.knowledge_object,
            request.thematic_unit,
            request.subject,
            question.statement,
            options,
            question.correct_answer,
            question.question_type,
        )
    }
}

#[async_trait]
impl QuestionValidator for LlmQuestionValidator {
    async fn validate(
        &self,
        question: &Question,
        request: &GenerationRequest,
    ) -> Result<ValidationResult> {
        let user_message = Self::build_user_message(question, request);
        let output: ValidationOutput = self
            .llm
            .send_for_json(&user_message, Some(SYSTEM_PROMPT), self.temperature)
            .await?;
        Ok(output.into())
    }
}
