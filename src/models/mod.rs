pub mod loaders;
pub mod question;
pub mod skill;
pub mod subject;

pub use loaders::{load_catalog_file, parse_catalog};
pub use question::{
    CacheEntry, GenerationRequest, Question, QuestionBatch, QuestionType, QuestionWithValidation,
    ValidationResult, APPROVAL_THRESHOLD,
};
pub use skill::{SkillDescriptor, SkillRecord};
pub use subject::Subject;
