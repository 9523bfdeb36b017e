//! Catalog lookup for a user question.

use std::sync::Arc;

use pharmabot_catalog::{Catalog, CatalogConfig, CatalogError, MedicineRecord};
use thiserror::Error;
use tracing::{debug, warn};

/// Medicine names and categories recognised directly in a question.
const KNOWN_KEYWORDS: &[&str] = &[
    "paracetamol",
    "ibuprofen",
    "amoxicillin",
    "cetirizine",
    "omeprazole",
    "antibiotic",
    "antipyretic",
    "nsaid",
    "antihistamine",
    "antacid",
    "tablet",
    "capsule",
    "pain",
    "fever",
    "allergy",
    "infection",
    "acid",
];

const STOP_WORDS: &[&str] = &[
    "what", "is", "the", "are", "can", "you", "tell", "me", "about", "do", "have", "any", "for",
    "used", "category", "name",
];

pub const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The catalog could not be reached or queried.
    #[error("medicine catalog unavailable: {0}")]
    DataSourceUnavailable(String),
}

impl From<CatalogError> for RetrievalError {
    fn from(error: CatalogError) -> Self {
        Self::DataSourceUnavailable(error.to_string())
    }
}

/// Read-only medicine lookup.
pub trait MedicineSource: Send + Sync {
    fn search(&self, keyword: &str, limit: usize) -> Result<Vec<MedicineRecord>, RetrievalError>;
}

impl MedicineSource for Catalog {
    fn search(&self, keyword: &str, limit: usize) -> Result<Vec<MedicineRecord>, RetrievalError> {
        Ok(self.search_medicines(keyword, limit)?)
    }
}

/// Open an existing catalog as the read-only source for answering.
///
/// A missing file or one without the medicine schema is reported as
/// [`RetrievalError::DataSourceUnavailable`]; nothing is created on disk.
pub fn open_catalog_source(config: CatalogConfig) -> Result<Catalog, RetrievalError> {
    Catalog::open_read_only(config).map_err(|error| {
        warn!(%error, "medicine catalog could not be opened");
        RetrievalError::from(error)
    })
}

/// Turns a question into a keyword and fetches matching medicines.
#[derive(Clone)]
pub struct MedicineRetriever {
    source: Arc<dyn MedicineSource>,
    max_results: usize,
}

impl MedicineRetriever {
    pub fn new(source: Arc<dyn MedicineSource>) -> Self {
        Self {
            source,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Medicines relevant to `question`. No match is an empty list.
    pub fn fetch_relevant(&self, question: &str) -> Result<Vec<MedicineRecord>, RetrievalError> {
        let keyword = extract_keyword(question);
        if keyword.is_empty() {
            debug!("blank question, catalog not searched");
            return Ok(Vec::new());
        }
        match self.source.search(&keyword, self.max_results) {
            Ok(records) => {
                debug!(keyword = %keyword, matches = records.len(), "retrieved medicines");
                Ok(records)
            }
            Err(error) => {
                warn!(keyword = %keyword, %error, "medicine retrieval failed");
                Err(error)
            }
        }
    }
}

/// Pick the search keyword for a question.
///
/// A known medicine or category contained in the question wins. Otherwise the
/// first word longer than two characters that is not a stop word is used, and
/// failing that the whole lowercased question.
pub fn extract_keyword(question: &str) -> String {
    let lowered = question.trim().to_lowercase();

    if let Some(keyword) = KNOWN_KEYWORDS.iter().find(|keyword| lowered.contains(*keyword)) {
        return (*keyword).to_string();
    }

    lowered
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .unwrap_or(lowered)
}
