use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::CatalogError;
use crate::models::skill::{SkillDescriptor, SkillRecord};
use crate::models::subject::Subject;

/// 按学科分组的技能列表（学科有序，技能保持文件中的顺序）
pub type SkillsBySubject = BTreeMap<Subject, Vec<SkillDescriptor>>;

/// 解析参考数据 JSON：`{ "学科名": [{codigo, objeto_conhecimento, unidade_tematica}, ...] }`
///
/// 无法识别的学科名会被跳过并记录警告。
pub fn parse_catalog(content: &str, path: &str) -> Result<SkillsBySubject, CatalogError> {
    let raw: BTreeMap<String, Vec<SkillRecord>> =
        serde_json::from_str(content).map_err(|source| CatalogError::ParseFailed {
            path: path.to_string(),
            source,
        })?;

    let mut skills = SkillsBySubject::new();
    for (subject_name, records) in raw {
        let Some(subject) = Subject::find(&subject_name) else {
            tracing::warn!("⚠️ 未知学科，已跳过: {}", subject_name);
            continue;
        };
        skills.entry(subject).or_default().extend(
            records
                .into_iter()
                .map(|record| SkillDescriptor::from_record(record, subject)),
        );
    }

    Ok(skills)
}

/// 从文件加载参考数据
///
/// 主路径不存在时尝试上一级目录下的同名路径（从子目录启动时使用）。
pub async fn load_catalog_file(path: &Path) -> Result<SkillsBySubject, CatalogError> {
    let resolved = resolve_path(path).ok_or_else(|| CatalogError::NotFound {
        path: path.display().to_string(),
    })?;
    let shown = resolved.display().to_string();

    tracing::info!("正在加载参考数据: {}", shown);

    let content = fs::read_to_string(&resolved)
        .await
        .map_err(|source| CatalogError::ReadFailed {
            path: shown.clone(),
            source,
        })?;

    let skills = parse_catalog(&content, &shown)?;
    let total: usize = skills.values().map(Vec::len).sum();
    tracing::info!("成功加载 {} 个学科, {} 个技能代码", skills.len(), total);

    Ok(skills)
}

fn resolve_path(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }
    if path.is_relative() {
        let alt = Path::new("..").join(path);
        if alt.exists() {
            return Some(alt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Matemática": [
            {"codigo": "EF04MA01", "objeto_conhecimento": "Sistema de numeração decimal", "unidade_tematica": "Números"},
            {"codigo": "EF04MA02", "objeto_conhecimento": "Composição e decomposição", "unidade_tematica": "Números"}
        ],
        "Geografia": [
            {"codigo": "EF04GE01", "objeto_conhecimento": "Território", "unidade_tematica": "O sujeito e seu lugar"}
        ]
    }"#;

    #[test]
    fn test_parse_catalog_keeps_order_and_skips_unknown_subjects() {
        let skills = parse_catalog(SAMPLE, "sample.json").unwrap();
        assert_eq!(skills.len(), 1);
        let math = &skills[&Subject::Math];
        assert_eq!(math[0].code, "EF04MA01");
        assert_eq!(math[1].code, "EF04MA02");
        assert_eq!(math[1].subject, Subject::Math);
    }

    #[test]
    fn test_parse_catalog_malformed() {
        let err = parse_catalog("{\"Matemática\": [{\"codigo\": 1}]}", "bad.json").unwrap_err();
        assert!(matches!(err, CatalogError::ParseFailed { .. }));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_catalog_file(Path::new("/nonexistent/bncc.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bncc.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let skills = load_catalog_file(&path).await.unwrap();
        assert_eq!(skills[&Subject::Math].len(), 2);

        std::fs::write(&path, "não é json").unwrap();
        let err = load_catalog_file(&path).await.unwrap_err();
        match err {
            CatalogError::ParseFailed { path: shown, .. } => assert!(shown.ends_with("bncc.json")),
            other => panic!("unexpected error: {}", other),
        }
    }
}
