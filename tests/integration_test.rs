use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use bncc_question_gen::models::{GenerationRequest, Question, QuestionType, ValidationResult};
use bncc_question_gen::services::{CacheStore, Catalog, QuestionGenerator, QuestionValidator};
use bncc_question_gen::{AppError, Config, FlowSettings, Pipeline};

const CATALOG: &str = r#"{
    "Matemática": [
        {"codigo": "EF04MA01", "objeto_conhecimento": "Sistema de numeração decimal", "unidade_tematica": "Números"}
    ]
}"#;

struct StubGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl QuestionGenerator for StubGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Question> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Question {
            code: request.code.clone(),
            statement: "Qual número tem 3 centenas, 2 dezenas e 5 unidades?".to_string(),
            options: Some(vec![
                "235".to_string(),
                "325".to_string(),
                "352".to_string(),
                "532".to_string(),
            ]),
            correct_answer: "B".to_string(),
            question_type: request.question_type,
            subject: Some(request.subject),
        })
    }
}

struct StubValidator {
    calls: AtomicUsize,
    result: ValidationResult,
}

#[async_trait]
impl QuestionValidator for StubValidator {
    async fn validate(
        &self,
        _question: &Question,
        _request: &GenerationRequest,
    ) -> Result<ValidationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

struct FailingGenerator;

#[async_trait]
impl QuestionGenerator for FailingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Question> {
        Err(anyhow!("modelo indisponível"))
    }
}

fn aligned(confidence_score: f64) -> ValidationResult {
    ValidationResult {
        is_aligned: true,
        confidence_score,
        feedback: "Questão alinhada".to_string(),
        suggestions: None,
    }
}

fn build(
    dir: &tempfile::TempDir,
    generator: Arc<dyn QuestionGenerator>,
    validator: Arc<dyn QuestionValidator>,
) -> Pipeline {
    Pipeline::new(
        Catalog::from_json_str(CATALOG).unwrap(),
        CacheStore::open(dir.path().join("db").join("questions_cache.db")).unwrap(),
        generator,
        validator,
        FlowSettings::default(),
    )
}

#[tokio::test]
async fn test_end_to_end_single_code_without_cache() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(StubGenerator {
        calls: AtomicUsize::new(0),
    });
    let validator = Arc::new(StubValidator {
        calls: AtomicUsize::new(0),
        result: aligned(0.9),
    });
    let pipeline = build(&dir, generator.clone(), validator.clone());

    let batches = pipeline
        .generate_questions(
            &["EF04MA01".to_string()],
            1,
            QuestionType::MultipleChoice,
            false,
        )
        .await
        .unwrap();

    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].total_generated(), 1);
    assert_eq!(batches[0].total_approved(), 1);
    assert!(pipeline.history().unwrap().is_empty());
}

#[tokio::test]
async fn test_aligned_but_low_confidence_is_not_approved() {
    let dir = tempfile::tempdir().unwrap();
    let validator = Arc::new(StubValidator {
        calls: AtomicUsize::new(0),
        result: aligned(0.65),
    });
    let pipeline = build(
        &dir,
        Arc::new(StubGenerator {
            calls: AtomicUsize::new(0),
        }),
        validator,
    );

    let batch = pipeline
        .generate_questions_batch("EF04MA01", 2, QuestionType::MultipleChoice, false)
        .await
        .unwrap();

    assert_eq!(batch.total_generated(), 2);
    assert_eq!(batch.total_approved(), 0);
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(StubGenerator {
        calls: AtomicUsize::new(0),
    });
    let validator = Arc::new(StubValidator {
        calls: AtomicUsize::new(0),
        result: aligned(0.9),
    });
    let pipeline = build(&dir, generator.clone(), validator.clone());
    let codes = ["EF04MA01".to_string()];

    let first = pipeline
        .generate_questions(&codes, 1, QuestionType::MultipleChoice, true)
        .await
        .unwrap();
    let second = pipeline
        .generate_questions(&codes, 1, QuestionType::MultipleChoice, true)
        .await
        .unwrap();

    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first[0].questions(), second[0].questions());
    assert_eq!(pipeline.cache_stats().unwrap().total_entries, 1);
}

#[tokio::test]
async fn test_unknown_code_is_a_catalog_error() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(StubGenerator {
        calls: AtomicUsize::new(0),
    });
    let pipeline = build(
        &dir,
        generator.clone(),
        Arc::new(StubValidator {
            calls: AtomicUsize::new(0),
            result: aligned(0.9),
        }),
    );

    let result = pipeline
        .generate_questions(
            &["EF04MA01".to_string(), "EF04XX99".to_string()],
            1,
            QuestionType::MultipleChoice,
            false,
        )
        .await;

    assert!(matches!(result, Err(AppError::Catalog(_))));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_generator_outage_still_yields_batch() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build(
        &dir,
        Arc::new(FailingGenerator),
        Arc::new(StubValidator {
            calls: AtomicUsize::new(0),
            result: aligned(0.9),
        }),
    );

    let batch = pipeline
        .generate_questions_batch("EF04MA01", 1, QuestionType::TrueFalse, true)
        .await
        .unwrap();

    let item = &batch.questions()[0];
    assert_eq!(item.question.correct_answer, "N/A");
    assert!(!item.validation.is_aligned);
    assert_eq!(item.validation.confidence_score, 0.0);
    assert_eq!(batch.total_approved(), 0);
    assert!(pipeline.history().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_catalog_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        catalog_path: dir.path().join("nao_existe.json").display().to_string(),
        cache_db_path: dir.path().join("cache.db").display().to_string(),
        ..Config::default()
    };

    let pipeline = Pipeline::initialize(&config).await.unwrap();

    assert!(pipeline.list_subjects().is_empty());
    assert!(pipeline.find_skill("EF04MA01").is_none());
}
