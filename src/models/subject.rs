use serde::{Deserialize, Serialize};

/// 学科枚举（BNCC 四年级）
///
/// 序列化为参考数据文件中的学科全名，例如 `"Matemática"`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// 数学
    #[serde(rename = "Matemática")]
    Math,
    /// 葡萄牙语
    #[serde(rename = "Português")]
    Portuguese,
    /// 科学
    #[serde(rename = "Ciências")]
    Science,
}

impl Subject {
    /// 全部学科
    pub const ALL: [Subject; 3] = [Subject::Math, Subject::Portuguese, Subject::Science];

    /// 获取标准名称（与参考数据文件中的键一致）
    pub fn name(self) -> &'static str {
        match self {
            Subject::Math => "Matemática",
            Subject::Portuguese => "Português",
            Subject::Science => "Ciências",
        }
    }

    /// 获取导出用的学科简码
    pub fn short_code(self) -> &'static str {
        match self {
            Subject::Math => "MA",
            Subject::Portuguese => "LP",
            Subject::Science => "CI",
        }
    }

    /// 尝试从字符串解析学科（精确匹配全名或简码）
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.trim() {
            "Matemática" | "MA" => Some(Subject::Math),
            "Português" | "LP" => Some(Subject::Portuguese),
            "Ciências" | "CI" => Some(Subject::Science),
            _ => None,
        }
    }

    /// 智能查找学科（支持去重音、大小写不敏感）
    pub fn find(s: &str) -> Option<Self> {
        if let Some(subject) = Self::parse_name(s) {
            return Some(subject);
        }

        let s_lower = s.trim().to_lowercase();
        if s_lower.starts_with("matem") {
            return Some(Subject::Math);
        }
        if s_lower.starts_with("portug") || s_lower == "lp" {
            return Some(Subject::Portuguese);
        }
        if s_lower.starts_with("ci") {
            return Some(Subject::Science);
        }

        None
    }

    /// 从技能代码推断学科（例如 `EF04MA01` → 数学）
    pub fn infer_from_code(code: &str) -> Option<Self> {
        let code_upper = code.to_uppercase();
        if code_upper.contains("MA") {
            return Some(Subject::Math);
        }
        if code_upper.contains("CI") {
            return Some(Subject::Science);
        }
        if code_upper.contains("PT") || code_upper.contains("PORT") || code_upper.contains("LP") {
            return Some(Subject::Portuguese);
        }
        None
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_and_find() {
        assert_eq!(Subject::parse_name("Matemática"), Some(Subject::Math));
        assert_eq!(Subject::parse_name("LP"), Some(Subject::Portuguese));
        assert_eq!(Subject::parse_name("Geografia"), None);

        assert_eq!(Subject::find("matematica"), Some(Subject::Math));
        assert_eq!(Subject::find("Ciencias"), Some(Subject::Science));
        assert_eq!(Subject::find("História"), None);
    }

    #[test]
    fn test_infer_from_code() {
        assert_eq!(Subject::infer_from_code("EF04MA01"), Some(Subject::Math));
        assert_eq!(Subject::infer_from_code("ef04ci02"), Some(Subject::Science));
        assert_eq!(Subject::infer_from_code("EF04LP10"), Some(Subject::Portuguese));
        assert_eq!(Subject::infer_from_code("EF04GE01"), None);
    }

    #[test]
    fn test_serde_uses_full_name() {
        let json = serde_json::to_string(&Subject::Science).unwrap();
        assert_eq!(json, "\"Ciências\"");
        let parsed: Subject = serde_json::from_str("\"Português\"").unwrap();
        assert_eq!(parsed, Subject::Portuguese);
    }
}
