//! 出题服务 - 业务能力层
//!
//! 按学科路由到对应的出题链，每次只调用一次 LLM、只产出一道题

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::LlmError;
use crate::models::question::MAX_OPTIONS;
use crate::models::{GenerationRequest, Question, QuestionType, Subject};
use crate::services::llm_service::LlmService;

/// 出题能力
///
/// 任何失败（网络、格式错误）都由流程层视为可重试的临时错误。
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Question>;
}

/// 学科出题链
///
/// 新增学科时新增一个变体，提供自己的系统提示词即可。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectChain {
    Math,
    Portuguese,
    Science,
}

impl From<Subject> for SubjectChain {
    fn from(subject: Subject) -> Self {
        match subject {
            Subject::Math => SubjectChain::Math,
            Subject::Portuguese => SubjectChain::Portuguese,
            Subject::Science => SubjectChain::Science,
        }
    }
}

impl SubjectChain {
    /// 学科专属的系统提示词
    fn system_prompt(self) -> &'static str {
        match self {
            SubjectChain::Math => {
                "Você é um professor de MATEMÁTICA do 4º ano do ensino fundamental.\n\
                 Crie questões alinhadas à BNCC.\n\n\
                 REGRAS:\n\
                 - Linguagem simples (crianças de 9-10 anos)\n\
                 - Contexto cotidiano infantil\n\
                 - Siga exatamente o código BNCC informado"
            }
            SubjectChain::Portuguese => {
                "Você é um professor especialista em LÍNGUA PORTUGUESA do 4º ano do ensino fundamental.\n\
                 Crie questões alinhadas à BNCC.\n\n\
                 REGRAS:\n\
                 - Vocabulário apropriado para crianças de 9-10 anos\n\
                 - Textos adequados à idade (histórias, músicas, quadrinhos simples)\n\
                 - Foque em leitura, análise linguística e produção textual\n\
                 - Respeite o campo de atuação da habilidade"
            }
            SubjectChain::Science => {
                "Você é um professor de CIÊNCIAS do 4º ano do ensino fundamental.\n\
                 Crie questões alinhadas à BNCC.\n\n\
                 REGRAS:\n\
                 - Linguagem simples (crianças de 9-10 anos)\n\
                 - Fenômenos observáveis no dia a dia\n\
                 - Conceitos científicos corretos e acessíveis"
            }
        }
    }

    /// 题型相关的输出格式要求
    fn format_instructions(question_type: QuestionType) -> &'static str {
        match question_type {
            QuestionType::MultipleChoice => {
                "Crie UMA questão de MÚLTIPLA ESCOLHA com 4 alternativas, apenas 1 correta.\n\
                 Responda APENAS com um objeto JSON:\n\
                 {\"enunciado\": \"...\", \"opcoes\": [\"...\", \"...\", \"...\", \"...\"], \
                 \"gabarito\": \"A|B|C|D\", \"explicacao\": \"...\"}"
            }
            QuestionType::TrueFalse => {
                "Crie UMA afirmação para julgar como VERDADEIRO ou FALSO.\n\
                 Responda APENAS com um objeto JSON:\n\
                 {\"enunciado\": \"...\", \"opcoes\": [], \
                 \"gabarito\": \"Verdadeiro|Falso\", \"explicacao\": \"...\"}"
            }
        }
    }

    fn build_messages(self, request: &GenerationRequest) -> (String, String) {
        let system_message = format!(
            "{}\n\n{}",
            self.system_prompt(),
            Self::format_instructions(request.question_type)
        );
        let user_message = format!(
            "Código: {}\nObjeto de conhecimento: {}\nUnidade temática: {}",
            request.code, request.knowledge_object, request.thematic_unit
        );
        (user_message, system_message)
    }

    /// 调用一次 LLM 生成题目
    pub async fn generate(
        self,
        llm: &LlmService,
        request: &GenerationRequest,
        temperature: f32,
    ) -> Result<Question> {
        debug!("出题链 {:?} 处理 {}", self, request.code);
        let (user_message, system_message) = self.build_messages(request);
        let output: GeneratedQuestionOutput = llm
            .send_for_json(&user_message, Some(&system_message), temperature)
            .await?;
        Ok(output.into_question(request)?)
    }
}

/// LLM 出题的结构化输出
#[derive(Debug, Deserialize)]
struct GeneratedQuestionOutput {
    enunciado: String,
    #[serde(default)]
    opcoes: Vec<String>,
    gabarito: String,
    #[serde(default)]
    #[allow(dead_code)]
    explicacao: Option<String>,
}

impl GeneratedQuestionOutput {
    fn into_question(self, request: &GenerationRequest) -> Result<Question, LlmError> {
        let statement = self.enunciado.trim().to_string();
        if statement.is_empty() {
            return Err(LlmError::MalformedOutput {
                reason: "enunciado vazio".to_string(),
            });
        }

        let correct_answer = self.gabarito.trim().to_string();
        if correct_answer.is_empty() {
            return Err(LlmError::MalformedOutput {
                reason: "gabarito vazio".to_string(),
            });
        }

        let options = match request.question_type {
            QuestionType::MultipleChoice => {
                let options: Vec<String> = self
                    .opcoes
                    .into_iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .take(MAX_OPTIONS)
                    .collect();
                if options.len() < 2 {
                    return Err(LlmError::MalformedOutput {
                        reason: format!("alternativas insuficientes: {}", options.len()),
                    });
                }
                Some(options)
            }
            QuestionType::TrueFalse => None,
        };

        Ok(Question {
            code: request.code.clone(),
            statement,
            options,
            correct_answer,
            question_type: request.question_type,
            subject: Some(request.subject),
        })
    }
}

/// 基于 LLM 的出题服务
pub struct LlmQuestionGenerator {
    llm: LlmService,
    temperature: f32,
}

impl LlmQuestionGenerator {
    pub fn new(llm: LlmService, temperature: f32) -> Self {
        Self { llm, temperature }
    }
}

#[async_trait]
impl QuestionGenerator for LlmQuestionGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Question> {
        SubjectChain::from(request.subject)
            .generate(&self.llm, request, self.temperature)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(question_type: QuestionType) -> GenerationRequest {
        GenerationRequest {
            code: "EF04CI01".to_string(),
            knowledge_object: "Misturas".to_string(),
            thematic_unit: "Matéria e energia".to_string(),
            subject: Subject::Science,
            question_type,
            quantity: 1,
        }
    }

    fn output(opcoes: Vec<&str>) -> GeneratedQuestionOutput {
        GeneratedQuestionOutput {
            enunciado: "  Qual mistura é homogênea?  ".to_string(),
            opcoes: opcoes.into_iter().map(String::from).collect(),
            gabarito: "B".to_string(),
            explicacao: None,
        }
    }

    #[test]
    fn test_routing_is_exhaustive() {
        assert_eq!(SubjectChain::from(Subject::Math), SubjectChain::Math);
        assert_eq!(SubjectChain::from(Subject::Portuguese), SubjectChain::Portuguese);
        assert_eq!(SubjectChain::from(Subject::Science), SubjectChain::Science);
    }

    #[test]
    fn test_build_messages_contains_skill() {
        let (user, system) =
            SubjectChain::Science.build_messages(&request(QuestionType::MultipleChoice));
        assert!(user.contains("EF04CI01"));
        assert!(user.contains("Misturas"));
        assert!(system.contains("CIÊNCIAS"));
        assert!(system.contains("MÚLTIPLA ESCOLHA"));
    }

    #[test]
    fn test_into_question_truncates_options() {
        let q = output(vec!["Água e sal", "Água e óleo", "Areia", "Pedra", "Extra"])
            .into_question(&request(QuestionType::MultipleChoice))
            .unwrap();
        assert_eq!(q.statement, "Qual mistura é homogênea?");
        assert_eq!(q.options.as_ref().unwrap().len(), 4);
        assert_eq!(q.subject, Some(Subject::Science));
    }

    #[test]
    fn test_into_question_rejects_missing_options() {
        let err = output(vec![])
            .into_question(&request(QuestionType::MultipleChoice))
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput { .. }));

        let tf = output(vec![])
            .into_question(&request(QuestionType::TrueFalse))
            .unwrap();
        assert!(tf.options.is_none());
    }
}
