//! Behavior-driven tests for answering pharmacy questions end to end.
//!
//! A real `DuckDB` catalog on disk supplies the grounding records; the
//! generation backend is a recording fake so prompts can be inspected.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use pharmabot_core::{
    open_catalog_source, AnswerError, ApiKey, Catalog, CatalogConfig, Credential, CredentialPool,
    GenerationError, GenerationRequest, MedicineRecord, MedicineSource, Pharmabot, PoolConfig,
    RetrievalError, TextGenerator,
};
use tempfile::{tempdir, TempDir};

/// Records every prompt; fails the keys listed in `failing` with quota errors.
#[derive(Default)]
struct RecordingGenerator {
    failing: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn failing(keys: &[&str]) -> Self {
        Self {
            failing: keys.iter().map(|key| (*key).to_string()).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

impl TextGenerator for RecordingGenerator {
    fn generate<'a>(
        &'a self,
        credential: &'a Credential,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(request.prompt.clone());
        let reply = if self.failing.iter().any(|key| key == credential.key_name()) {
            Err(GenerationError::quota_exceeded("HTTP 429: quota exceeded"))
        } else {
            Ok(String::from("Paracetamol is used to relieve pain and fever."))
        };
        Box::pin(async move { reply })
    }
}

struct UnavailableSource;

impl MedicineSource for UnavailableSource {
    fn search(&self, _keyword: &str, _limit: usize) -> Result<Vec<MedicineRecord>, RetrievalError> {
        Err(RetrievalError::DataSourceUnavailable(String::from(
            "database file is locked",
        )))
    }
}

fn medicine(id: i64, name: &str, category: &str, dosage_form: &str) -> MedicineRecord {
    MedicineRecord {
        id,
        name: name.to_string(),
        category: category.to_string(),
        dosage_form: dosage_form.to_string(),
        strength: Some(String::from("500mg")),
        manufacturer: Some(String::from("Acme Pharma")),
        requires_prescription: false,
        is_active: true,
    }
}

fn seeded_catalog() -> (TempDir, Catalog) {
    let temp = tempdir().expect("tempdir");
    let catalog = Catalog::open(CatalogConfig::at_path(temp.path().join("medicines.duckdb")))
        .expect("catalog open");
    catalog
        .import_medicines(&[
            medicine(1, "Paracetamol", "Antipyretic", "Tablet"),
            medicine(2, "Ibuprofen", "NSAID", "Tablet"),
            medicine(3, "Amoxicillin", "Antibiotic", "Capsule"),
        ])
        .expect("seed catalog");
    (temp, catalog)
}

fn pool(names: &[&str]) -> Arc<CredentialPool> {
    let credentials = names
        .iter()
        .map(|name| Credential::new(*name, ApiKey::new("secret"), "gemini-2.0-flash"))
        .collect();
    Arc::new(CredentialPool::new(credentials, PoolConfig::default()).expect("pool"))
}

fn bot(
    source: Arc<dyn MedicineSource>,
    generator: Arc<RecordingGenerator>,
    names: &[&str],
) -> Pharmabot {
    Pharmabot::from_parts(pool(names), source, generator, 5, 0.3, 500)
}

#[tokio::test]
async fn when_user_asks_about_a_catalogued_medicine_then_the_prompt_is_grounded_on_it() {
    // Given: A catalog with paracetamol and a working credential
    let (_temp, catalog) = seeded_catalog();
    let generator = Arc::new(RecordingGenerator::default());
    let bot = bot(Arc::new(catalog), Arc::clone(&generator), &["key_1"]);

    // When: The user asks about paracetamol
    let answer = bot
        .answer("What is paracetamol used for?")
        .await
        .expect("answer");

    // Then: The answer carries the matched record and the prompt quotes it
    assert_eq!(answer.text, "Paracetamol is used to relieve pain and fever.");
    assert_eq!(answer.medicines.len(), 1);
    assert_eq!(answer.medicines[0].name, "Paracetamol");
    assert!(!answer.degraded);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("1. Paracetamol"));
    assert!(prompts[0].contains("Category: Antipyretic"));
    assert!(prompts[0].contains("QUESTION: What is paracetamol used for?"));
    assert!(!prompts[0].contains("Ibuprofen"));
}

#[tokio::test]
async fn when_nothing_in_the_catalog_matches_then_the_model_is_told_to_express_uncertainty() {
    // Given: A catalog without any antiviral medicines
    let (_temp, catalog) = seeded_catalog();
    let generator = Arc::new(RecordingGenerator::default());
    let bot = bot(Arc::new(catalog), Arc::clone(&generator), &["key_1"]);

    // When: The user asks about something the catalog does not stock
    let answer = bot
        .answer("Do you stock oseltamivir?")
        .await
        .expect("answer despite no matches");

    // Then: Generation still ran, with an explicit no-match instruction
    assert!(answer.medicines.is_empty());
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("No matching medicines were found in the catalog."));
    assert!(prompts[0].contains("Say that you are not certain"));
}

#[tokio::test]
async fn when_the_question_is_blank_then_it_is_rejected_before_any_work() {
    // Given: A wired assistant
    let (_temp, catalog) = seeded_catalog();
    let generator = Arc::new(RecordingGenerator::default());
    let bot = bot(Arc::new(catalog), Arc::clone(&generator), &["key_1"]);

    // When: The user submits only whitespace
    let error = bot.answer("   \n").await.expect_err("blank question");

    // Then: No generation call was made
    assert!(matches!(error, AnswerError::EmptyQuestion));
    assert!(generator.prompts().is_empty());
    assert_eq!(bot.pool_status().counters.total_requests, 0);
}

#[tokio::test]
async fn when_the_first_credential_is_out_of_quota_then_the_answer_is_marked_degraded() {
    // Given: Two credentials where the first has no quota left
    let (_temp, catalog) = seeded_catalog();
    let generator = Arc::new(RecordingGenerator::failing(&["key_1"]));
    let bot = bot(Arc::new(catalog), Arc::clone(&generator), &["key_1", "key_2"]);

    // When: The user asks a question
    let answer = bot.answer("Tell me about ibuprofen").await.expect("answer");

    // Then: The second credential answered and the rotation is visible
    assert_eq!(answer.credential_id, "key_2/gemini-2.0-flash");
    assert!(answer.degraded);
    assert_eq!(answer.attempts.len(), 2);
    assert_eq!(answer.warnings.len(), 1);
    assert_eq!(answer.medicines[0].name, "Ibuprofen");

    // And: Status reporting reflects the failed credential
    let snapshot = bot.pool_status();
    let first = snapshot
        .credential("key_1/gemini-2.0-flash")
        .expect("first credential");
    assert_eq!(first.failure_count, 1);
    assert!(first.in_cooldown);
}

#[tokio::test]
async fn when_the_catalog_is_unavailable_then_the_error_is_reported_without_generating() {
    // Given: A data source that cannot be queried
    let generator = Arc::new(RecordingGenerator::default());
    let bot = bot(Arc::new(UnavailableSource), Arc::clone(&generator), &["key_1"]);

    // When: The user asks a question
    let error = bot
        .answer("What is amoxicillin?")
        .await
        .expect_err("retrieval fails");

    // Then: The retrieval failure surfaces and no credential was spent
    assert!(matches!(
        error,
        AnswerError::Retrieval(RetrievalError::DataSourceUnavailable(_))
    ));
    assert!(error.to_string().contains("database file is locked"));
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn when_a_medicine_is_deactivated_then_it_is_no_longer_used_for_grounding() {
    // Given: Amoxicillin re-imported as inactive
    let (_temp, catalog) = seeded_catalog();
    let mut inactive = medicine(3, "Amoxicillin", "Antibiotic", "Capsule");
    inactive.is_active = false;
    catalog.import_medicines(&[inactive]).expect("update record");
    let generator = Arc::new(RecordingGenerator::default());
    let bot = bot(Arc::new(catalog), Arc::clone(&generator), &["key_1"]);

    // When: The user asks about antibiotics
    let answer = bot.answer("Which antibiotic do you have?").await.expect("answer");

    // Then: The inactive record is not part of the context
    assert!(answer.medicines.is_empty());
    assert!(!generator.prompts()[0].contains("Amoxicillin"));
}

#[tokio::test]
async fn when_the_catalog_path_is_mistyped_then_answering_reports_it_unavailable() {
    // Given: A seeded catalog and a path with a typo next to it
    let (temp, writer) = seeded_catalog();
    drop(writer);
    let mistyped = temp.path().join("medicnes.duckdb");

    // When: The answering side opens both paths
    let error = open_catalog_source(CatalogConfig::at_path(&mistyped))
        .err()
        .expect("mistyped path");
    let catalog = open_catalog_source(CatalogConfig::at_path(temp.path().join("medicines.duckdb")))
        .expect("seeded path");

    // Then: The typo is a retrieval failure and no empty catalog was left behind
    assert!(matches!(error, RetrievalError::DataSourceUnavailable(_)));
    assert!(error.to_string().contains("medicnes.duckdb"));
    assert!(!mistyped.exists());

    // And: The real catalog still grounds answers
    let generator = Arc::new(RecordingGenerator::default());
    let bot = bot(Arc::new(catalog), Arc::clone(&generator), &["key_1"]);
    let answer = bot.answer("What is paracetamol used for?").await.expect("answer");
    assert_eq!(answer.medicines[0].name, "Paracetamol");
}
