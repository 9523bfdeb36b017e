//! Retrieval-grounded answering.

use std::fmt::Write as _;

use pharmabot_catalog::MedicineRecord;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::credential::CallAttempt;
use crate::failover::{FailoverClient, FailoverError};
use crate::generation::GenerationRequest;
use crate::retrieval::{MedicineRetriever, RetrievalError};

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] FailoverError),
}

/// Generated answer with the records it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub medicines: Vec<MedicineRecord>,
    pub credential_id: String,
    pub model: String,
    pub degraded: bool,
    pub attempts: Vec<CallAttempt>,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
}

/// Question in, catalog-grounded text out.
#[derive(Clone)]
pub struct ResponseGenerator {
    retriever: MedicineRetriever,
    client: FailoverClient,
    temperature: f32,
    max_output_tokens: u32,
}

impl ResponseGenerator {
    pub fn new(retriever: MedicineRetriever, client: FailoverClient) -> Self {
        let defaults = GenerationRequest::new(String::new());
        Self {
            retriever,
            client,
            temperature: defaults.temperature,
            max_output_tokens: defaults.max_output_tokens,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn retriever(&self) -> &MedicineRetriever {
        &self.retriever
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, AnswerError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AnswerError::EmptyQuestion);
        }

        // DuckDB calls block; keep them off the async workers.
        let retriever = self.retriever.clone();
        let owned_question = question.to_string();
        let medicines = tokio::task::spawn_blocking(move || retriever.fetch_relevant(&owned_question))
            .await
            .map_err(|error| {
                RetrievalError::DataSourceUnavailable(format!("retrieval task failed: {error}"))
            })??;
        let request = GenerationRequest::new(build_prompt(question, &medicines))
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens);

        let outcome = self.client.generate(&request).await?;
        info!(
            credential = %outcome.credential_id,
            records = medicines.len(),
            degraded = outcome.degraded,
            latency_ms = outcome.latency_ms,
            "answered question"
        );

        Ok(Answer {
            text: outcome.text,
            medicines,
            credential_id: outcome.credential_id,
            model: outcome.model,
            degraded: outcome.degraded,
            attempts: outcome.attempts,
            warnings: outcome.warnings,
            latency_ms: outcome.latency_ms,
        })
    }
}

/// Numbered context block describing `medicines`.
pub fn format_context(medicines: &[MedicineRecord]) -> String {
    if medicines.is_empty() {
        return String::from("No matching medicines were found in the catalog.\n");
    }

    let mut context = format!("Available medicines ({}):\n\n", medicines.len());
    for (index, medicine) in medicines.iter().enumerate() {
        let _ = write!(
            context,
            "{}. {}\n   Category: {}\n   Form: {}\n   Strength: {}\n   Manufacturer: {}\n   Prescription required: {}\n\n",
            index + 1,
            medicine.name,
            medicine.category,
            medicine.dosage_form,
            medicine.strength.as_deref().unwrap_or("not listed"),
            medicine.manufacturer.as_deref().unwrap_or("not listed"),
            if medicine.requires_prescription { "Yes" } else { "No" },
        );
    }
    context
}

/// Full prompt: grounding context followed by the question.
pub fn build_prompt(question: &str, medicines: &[MedicineRecord]) -> String {
    let instruction = if medicines.is_empty() {
        "The catalog had no matching records. Say that you are not certain, \
         suggest asking a pharmacist, and do not invent medicine details."
    } else {
        "Provide a helpful, natural answer based on the database facts above."
    };

    format!(
        "You are a pharmacy assistant. Answer this question using ONLY the database information below.\n\n\
         DATABASE:\n{}\n\
         QUESTION: {}\n\n\
         {}\n\n\
         ANSWER:",
        format_context(medicines),
        question,
        instruction
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paracetamol() -> MedicineRecord {
        MedicineRecord {
            id: 1,
            name: String::from("Paracetamol"),
            category: String::from("Antipyretic"),
            dosage_form: String::from("Tablet"),
            strength: Some(String::from("500mg")),
            manufacturer: None,
            requires_prescription: true,
            is_active: true,
        }
    }

    #[test]
    fn context_numbers_each_medicine() {
        let context = format_context(&[paracetamol()]);

        assert!(context.starts_with("Available medicines (1):"));
        assert!(context.contains("1. Paracetamol\n   Category: Antipyretic"));
        assert!(context.contains("Manufacturer: not listed"));
        assert!(context.contains("Prescription required: Yes"));
    }

    #[test]
    fn prompt_without_records_asks_for_uncertainty() {
        let prompt = build_prompt("What treats gout?", &[]);

        assert!(prompt.contains("No matching medicines were found"));
        assert!(prompt.contains("not certain"));
        assert!(prompt.contains("QUESTION: What treats gout?"));
        assert!(prompt.ends_with("ANSWER:"));
    }

    #[test]
    fn prompt_with_records_grounds_on_them() {
        let prompt = build_prompt("Is paracetamol a tablet?", &[paracetamol()]);

        assert!(prompt.contains("DATABASE:\nAvailable medicines (1):"));
        assert!(prompt.contains("based on the database facts above"));
        assert!(!prompt.contains("not certain"));
    }
}
