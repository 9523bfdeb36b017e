use std::sync::Arc;

use crate::answer::{Answer, AnswerError, ResponseGenerator};
use crate::config::{AppConfig, ConfigError};
use crate::failover::FailoverClient;
use crate::generation::{GeminiGenerator, TextGenerator};
use crate::http_client::HttpClient;
use crate::pool::CredentialPool;
use crate::retrieval::{MedicineRetriever, MedicineSource};
use crate::status::{PoolSnapshot, StatusReporter};

/// Fully wired assistant: one pool shared by failover and status reporting.
#[derive(Clone)]
pub struct Pharmabot {
    pool: Arc<CredentialPool>,
    client: FailoverClient,
    responder: ResponseGenerator,
    reporter: StatusReporter,
}

impl Pharmabot {
    /// Wire the Gemini backend over `http_client`.
    pub fn from_config(
        config: &AppConfig,
        source: Arc<dyn MedicineSource>,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, ConfigError> {
        let generator = GeminiGenerator::new(http_client)
            .with_base_url(config.api_base_url.as_str())
            .with_timeout_ms(config.request_timeout_ms);
        Self::with_generator(config, source, Arc::new(generator))
    }

    /// Wire an arbitrary generation backend.
    pub fn with_generator(
        config: &AppConfig,
        source: Arc<dyn MedicineSource>,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, ConfigError> {
        let pool = Arc::new(CredentialPool::new(config.credentials(), config.pool_config())?);
        Ok(Self::from_parts(
            pool,
            source,
            generator,
            config.max_results,
            config.temperature,
            config.max_output_tokens,
        ))
    }

    pub fn from_parts(
        pool: Arc<CredentialPool>,
        source: Arc<dyn MedicineSource>,
        generator: Arc<dyn TextGenerator>,
        max_results: usize,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Self {
        let client = FailoverClient::new(Arc::clone(&pool), generator);
        let retriever = MedicineRetriever::new(source).with_max_results(max_results);
        let responder = ResponseGenerator::new(retriever, client.clone())
            .with_sampling(temperature, max_output_tokens);
        let reporter = StatusReporter::new(Arc::clone(&pool));

        Self {
            pool,
            client,
            responder,
            reporter,
        }
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, AnswerError> {
        self.responder.answer(question).await
    }

    pub fn pool_status(&self) -> PoolSnapshot {
        self.reporter.snapshot()
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn client(&self) -> &FailoverClient {
        &self.client
    }

    pub fn responder(&self) -> &ResponseGenerator {
        &self.responder
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }
}
