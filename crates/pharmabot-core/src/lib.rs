//! # Pharmabot Core
//!
//! Catalog-grounded pharmacy answers over a rotating pool of generation
//! credentials.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pool`] | Credential health, cooldown and selection |
//! | [`failover`] | Rotation across credentials for one request |
//! | [`generation`] | Text generation contract and Gemini backend |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`retrieval`] | Keyword extraction and catalog lookup |
//! | [`answer`] | Prompt assembly and answering |
//! | [`status`] | Read-only pool snapshots |
//! | [`config`] | TOML and environment configuration |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pharmabot_catalog::Catalog;
//! use pharmabot_core::{AppConfig, Pharmabot, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(None)?;
//!     let catalog = Catalog::open(config.catalog_config())?;
//!     let bot = Pharmabot::from_config(&config, Arc::new(catalog), Arc::new(ReqwestHttpClient::new()))?;
//!
//!     let answer = bot.answer("What is paracetamol used for?").await?;
//!     println!("{}", answer.text);
//!     Ok(())
//! }
//! ```

pub mod answer;
pub mod assistant;
pub mod clock;
pub mod config;
pub mod credential;
pub mod failover;
pub mod generation;
pub mod http_client;
pub mod pool;
pub mod retrieval;
pub mod status;

pub use answer::{build_prompt, format_context, Answer, AnswerError, ResponseGenerator};
pub use assistant::Pharmabot;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, CredentialConfig, DEFAULT_MODELS};
pub use credential::{ApiKey, CallAttempt, CallOutcome, Credential};
pub use failover::{FailoverClient, FailoverError, GenerationOutcome};
pub use generation::{
    classify_http_failure, parse_generate_response, GeminiGenerator, GenerationError,
    GenerationErrorKind, GenerationRequest, TextGenerator, DEFAULT_GEMINI_BASE_URL,
};
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use pool::{CredentialPool, PoolConfig, MAX_COOLDOWN};
pub use retrieval::{
    extract_keyword, open_catalog_source, MedicineRetriever, MedicineSource, RetrievalError,
};
pub use status::{CredentialStatus, CredentialView, PoolSnapshot, RequestCounters, StatusReporter};

pub use pharmabot_catalog::{Catalog, CatalogConfig, CatalogError, MedicineRecord};
