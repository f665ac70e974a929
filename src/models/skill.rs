use serde::{Deserialize, Serialize};

use super::subject::Subject;

/// 参考数据文件中的原始技能条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    pub codigo: String,
    pub objeto_conhecimento: String,
    pub unidade_tematica: String,
}

/// 技能描述（BNCC 技能代码 + 知识对象 + 主题单元）
///
/// 加载后不可变，只能通过 `Catalog` 按代码查找或按学科列出。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub code: String,
    pub knowledge_object: String,
    pub thematic_unit: String,
    pub subject: Subject,
}

impl SkillDescriptor {
    pub fn from_record(record: SkillRecord, subject: Subject) -> Self {
        Self {
            code: record.codigo,
            knowledge_object: record.objeto_conhecimento,
            thematic_unit: record.unidade_tematica,
            subject,
        }
    }
}

impl std::fmt::Display for SkillDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.code, self.knowledge_object)
    }
}
