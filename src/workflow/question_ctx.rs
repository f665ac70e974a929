//! 出题单元上下文
//!
//! 封装"我正在为哪个技能代码生成第几道题"这一信息，仅用于日志

use std::fmt::Display;

use crate::models::GenerationRequest;

/// 出题单元上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionCtx {
    /// 技能代码
    pub code: String,

    /// 单元序号（从1开始）
    pub unit_index: usize,

    /// 该代码下的单元总数
    pub unit_total: usize,
}

impl QuestionCtx {
    pub fn new(code: impl Into<String>, unit_index: usize, unit_total: usize) -> Self {
        Self {
            code: code.into(),
            unit_index,
            unit_total,
        }
    }

    /// 单独一道题的上下文
    pub fn single(request: &GenerationRequest) -> Self {
        Self::new(request.code.clone(), 1, 1)
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} 题目#{}/{}]", self.code, self.unit_index, self.unit_total)
    }
}
