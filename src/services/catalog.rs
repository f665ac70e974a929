//! 技能目录服务 - 业务能力层
//!
//! 只负责"查技能"能力：加载后只读，无任何副作用

use std::path::Path;

use tracing::error;

use crate::error::{AppError, AppResult, CatalogError};
use crate::models::loaders::{self, catalog_loader::SkillsBySubject};
use crate::models::{SkillDescriptor, Subject};

/// 技能目录
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    skills: SkillsBySubject,
}

impl Catalog {
    pub fn new(skills: SkillsBySubject) -> Self {
        Self { skills }
    }

    /// 从 JSON 字符串构建目录
    pub fn from_json_str(content: &str) -> AppResult<Self> {
        Ok(Self::new(loaders::parse_catalog(content, "<inline>")?))
    }

    /// 加载参考数据文件，失败时返回错误
    pub async fn try_load(path: &Path) -> Result<Self, CatalogError> {
        Ok(Self::new(loaders::load_catalog_file(path).await?))
    }

    /// 加载参考数据文件
    ///
    /// 文件缺失或格式错误时报告错误并返回空目录，不会让进程崩溃。
    pub async fn load(path: &Path) -> Self {
        match Self::try_load(path).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("❌ 加载 BNCC 参考数据失败: {}", e);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn skill_count(&self) -> usize {
        self.skills.values().map(Vec::len).sum()
    }

    /// 所有可用学科
    pub fn list_subjects(&self) -> Vec<Subject> {
        self.skills.keys().copied().collect()
    }

    /// 某学科的全部技能（未知学科返回空列表）
    pub fn list_skills(&self, subject: Subject) -> &[SkillDescriptor] {
        self.skills
            .get(&subject)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// 按代码查找技能（线性扫描全部学科）
    pub fn find_skill(&self, code: &str) -> Option<&SkillDescriptor> {
        self.skills
            .values()
            .flat_map(|skills| skills.iter())
            .find(|skill| skill.code == code)
    }

    /// 按代码查找技能，找不到时返回配置错误
    pub fn require_skill(&self, code: &str) -> AppResult<&SkillDescriptor> {
        self.find_skill(code)
            .ok_or_else(|| AppError::unknown_skill_code(code))
    }
}
