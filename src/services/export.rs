//! 导出服务 - 业务能力层
//!
//! 把题目转换成对外交付的 JSON 格式

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{CacheEntry, Question, QuestionBatch, Subject};

/// 默认年级
pub const DEFAULT_GRADE: u32 = 4;

const OPTION_LETTERS: [&str; 4] = ["A", "B", "C", "D"];

/// 单题导出格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedQuestion {
    pub disciplina: Option<String>,
    pub ano: u32,
    pub codigo: String,
    pub questao: ExportedBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedBody {
    pub enunciado: String,
    pub alternativas: BTreeMap<String, String>,
    pub gabarito: String,
    pub url: Option<String>,
}

impl ExportedQuestion {
    /// 从题目构造导出对象
    pub fn from_question(question: &Question, code: &str) -> Self {
        let disciplina = normalize_subject(question.subject.map(Subject::name), code);

        let alternativas = question
            .options
            .as_deref()
            .unwrap_or_default()
            .iter()
            .zip(OPTION_LETTERS)
            .map(|(option, letter)| (letter.to_string(), clean_option(option)))
            .collect();

        Self {
            disciplina,
            ano: DEFAULT_GRADE,
            codigo: code.to_string(),
            questao: ExportedBody {
                enunciado: question.statement.clone(),
                alternativas,
                gabarito: question.correct_answer.clone(),
                url: None,
            },
        }
    }

    pub fn from_cache_entry(entry: &CacheEntry) -> Self {
        Self::from_question(&entry.question, &entry.question.code)
    }
}

/// 学科名 → 导出简码（MA / LP / CI）
///
/// 已知名称和简码直接映射，其他非空字符串原样保留；
/// 学科缺失时根据技能代码推断。
pub fn normalize_subject(subject: Option<&str>, code: &str) -> Option<String> {
    match subject.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            Subject::parse_name(raw)
                .map(|s| s.short_code().to_string())
                .unwrap_or_else(|| raw.to_string()),
        ),
        None => Subject::infer_from_code(code).map(|s| s.short_code().to_string()),
    }
}

/// 去掉 `"A) "` 之类的前缀
fn clean_option(option: &str) -> String {
    let trimmed = option.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 3 && matches!(bytes[0], b'A'..=b'D') && bytes[1] == b')' && bytes[2] == b' ' {
        trimmed[3..].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// 导出单题，返回 (JSON, 文件名)
pub fn export_question_json(
    exported: &ExportedQuestion,
    filename_suffix: &str,
) -> Result<(String, String)> {
    let json_data = serde_json::to_string_pretty(exported)?;
    let filename = format!(
        "{}{}_questao_individual.json",
        exported.codigo, filename_suffix
    );
    Ok((json_data, filename))
}

/// 导出题目列表，文件名由涉及的技能代码排序拼接而成
pub fn export_questions_list_json(
    export_list: &[ExportedQuestion],
    filename_prefix: &str,
) -> Result<(String, String)> {
    let codes: BTreeSet<&str> = export_list.iter().map(|q| q.codigo.as_str()).collect();
    let codes_str = if codes.is_empty() {
        "export".to_string()
    } else {
        codes.into_iter().collect::<Vec<_>>().join("_")
    };

    let json_data = serde_json::to_string_pretty(export_list)?;
    Ok((json_data, format!("{}_{}.json", codes_str, filename_prefix)))
}

/// 批次中所有题目的导出列表
pub fn export_list_from_batches(batches: &[QuestionBatch]) -> Vec<ExportedQuestion> {
    batches
        .iter()
        .flat_map(|batch| {
            batch
                .questions()
                .iter()
                .map(|item| ExportedQuestion::from_question(&item.question, &batch.request().code))
        })
        .collect()
}

/// 单个批次的汇总导出（只包含审核通过的题目）
pub fn batch_export_value(batch: &QuestionBatch) -> serde_json::Value {
    let request = batch.request();
    let questions: Vec<_> = batch
        .approved()
        .map(|item| {
            json!({
                "enunciado": item.question.statement,
                "opcoes": item.question.options,
                "gabarito": item.question.correct_answer,
                "tipo": item.question.question_type.as_str(),
                "validacao": {
                    "alinhada": item.validation.is_aligned,
                    "confianca": item.validation.confidence_score,
                    "feedback": item.validation.feedback,
                }
            })
        })
        .collect();

    json!({
        "codigo_habilidade": request.code,
        "objeto_conhecimento": request.knowledge_object,
        "unidade_tematica": request.thematic_unit,
        "materia": request.subject.name(),
        "total_questoes": batch.total_approved(),
        "questoes": questions,
    })
}

/// 把多个批次写入 JSON 文件，返回文件的绝对路径
pub fn export_batches_to_file(batches: &[QuestionBatch], output_path: &Path) -> Result<PathBuf> {
    let export_data = json!({
        "metadata": {
            "total_batches": batches.len(),
            "total_questions": batches.iter().map(QuestionBatch::total_approved).sum::<usize>(),
            "generated_at": chrono::Local::now().to_rfc3339(),
        },
        "questoes_por_codigo": batches.iter().map(batch_export_value).collect::<Vec<_>>(),
    });

    std::fs::write(output_path, serde_json::to_string_pretty(&export_data)?)
        .with_context(|| format!("无法写入导出文件: {}", output_path.display()))?;

    Ok(std::fs::canonicalize(output_path).unwrap_or_else(|_| output_path.to_path_buf()))
}

/// 把导出内容写入目录下的指定文件，目录不存在时自动创建
pub fn write_export_file(dir: &Path, filename: &str, json_data: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("无法创建导出目录: {}", dir.display()))?;
    let path = dir.join(filename);
    std::fs::write(&path, json_data)
        .with_context(|| format!("无法写入导出文件: {}", path.display()))?;
    Ok(path)
}
