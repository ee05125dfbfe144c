//! Session - Everything one user interaction needs, passed explicitly
//!
//! A session owns its dataset, its in-memory table and the translator. There
//! is no process-wide table: two sessions never see each other's data.

use crate::config::AppConfig;
use crate::error::{Nl2SqlError, Result};
use crate::generator::{self, OrderRecord};
use crate::llm::LlmClient;
use crate::schema::SchemaDescriptor;
use crate::store::{DatasetSummary, QueryResult, TabularStore};
use crate::translator::{Translation, TranslationMode, Translator};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Questions offered to new users
pub const SAMPLE_QUESTIONS: &[&str] = &[
    "Show total sales by region",
    "Top 5 products by quantity sold",
    "Monthly sales trend in 2023",
    "Profit by product category",
    "Average discount by customer type",
    "Sales comparison by payment method",
    "Customers with most orders",
    "What is the average unit price by region?",
    "Show me sales by month and region",
    "Which product has the highest profit margin?",
];

/// Outcome of one question. A SQL failure stays here with the offending SQL
/// instead of propagating.
#[derive(Debug, Serialize)]
pub struct Answer {
    pub question: String,
    pub translation: Translation,
    #[serde(serialize_with = "serialize_outcome")]
    pub outcome: Result<QueryResult>,
}

impl Answer {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn rows(&self) -> Option<&QueryResult> {
        self.outcome.as_ref().ok()
    }

    /// Message to show when execution failed
    pub fn error_message(&self) -> Option<String> {
        self.outcome.as_ref().err().map(|e| match e {
            Nl2SqlError::SqlExecution { message, .. } => format!("Error executing SQL: {}", message),
            other => other.to_string(),
        })
    }
}

fn serialize_outcome<S>(outcome: &Result<QueryResult>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    #[derive(Serialize)]
    #[serde(rename_all = "snake_case")]
    enum Outcome<'a> {
        Rows(&'a QueryResult),
        Error(String),
    }

    match outcome {
        Ok(result) => Outcome::Rows(result).serialize(serializer),
        Err(e) => Outcome::Error(e.to_string()).serialize(serializer),
    }
}

pub struct Session {
    id: Uuid,
    store: TabularStore,
    schema: SchemaDescriptor,
    translator: Translator,
    row_count: usize,
    seed: Option<u64>,
}

impl Session {
    /// Generate the configured dataset, load it, and wire the delegate if an
    /// API key is configured.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let translator = match LlmClient::from_config(config) {
            Some(client) => {
                info!(model = client.model(), "LLM delegate configured");
                Translator::with_delegate(Arc::new(client))
            }
            None => {
                warn!("OPENAI_API_KEY not set, delegated translation will fall back to rules");
                Translator::rule_based()
            }
        };
        Self::with_translator(translator, config.row_count, config.seed)
    }

    pub fn with_translator(translator: Translator, row_count: usize, seed: Option<u64>) -> Result<Self> {
        let id = Uuid::new_v4();
        let _span = info_span!("session", %id).entered();

        let records = generator::generate(row_count, seed)?;
        let (store, schema) = TabularStore::with_records(&records)?;
        info!(rows = records.len(), "session ready");

        Ok(Self {
            id,
            store,
            schema,
            translator,
            row_count,
            seed,
        })
    }

    /// Replace the dataset wholesale. On error the previous dataset is kept.
    pub fn regenerate(&mut self, row_count: usize, seed: Option<u64>) -> Result<()> {
        let _span = info_span!("session", id = %self.id).entered();
        let records: Vec<OrderRecord> = generator::generate(row_count, seed)?;
        self.schema = self.store.load(&records)?;
        self.row_count = row_count;
        self.seed = seed;
        info!(rows = row_count, ?seed, "regenerated dataset");
        Ok(())
    }

    /// Translate and run one question.
    pub async fn ask(&self, question: &str, mode: TranslationMode) -> Answer {
        let translation = self.translator.translate(question, &self.schema, mode).await;
        let outcome = self.store.query(&translation.sql);
        if let Err(e) = &outcome {
            warn!(session = %self.id, error = %e, "generated SQL failed");
        }

        Answer {
            question: question.to_string(),
            translation,
            outcome,
        }
    }

    /// Run SQL typed by the user directly.
    pub fn run_sql(&self, sql: &str) -> Result<QueryResult> {
        self.store.query(sql)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn store(&self) -> &TabularStore {
        &self.store
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn summary(&self) -> Result<DatasetSummary> {
        self.store.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::TranslationMethod;

    fn session(rows: usize) -> Session {
        Session::with_translator(Translator::rule_based(), rows, Some(42)).unwrap()
    }

    #[test]
    fn test_new_without_key_is_rule_based() {
        let config = AppConfig {
            row_count: 120,
            seed: Some(1),
            ..AppConfig::default()
        };
        let session = Session::new(&config).unwrap();
        assert!(!session.translator().has_delegate());
        assert_eq!(session.store().row_count().unwrap(), 120);
    }

    #[test]
    fn test_zero_rows_rejected() {
        assert!(matches!(
            Session::with_translator(Translator::rule_based(), 0, None),
            Err(Nl2SqlError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_ask_region_totals() {
        let session = session(300);
        let answer = session.ask("Show total sales by region", TranslationMode::RuleBased).await;
        assert_eq!(answer.translation.method, TranslationMethod::RuleBased);
        let rows = answer.rows().unwrap();
        assert_eq!(rows.columns, vec!["region", "total_sales"]);
        assert!(rows.len() <= 5);
    }

    #[test]
    fn test_regenerate_replaces_rows_and_keeps_old_on_error() {
        let mut session = session(200);
        session.regenerate(150, Some(7)).unwrap();
        assert_eq!(session.store().row_count().unwrap(), 150);
        assert_eq!(session.row_count(), 150);

        assert!(session.regenerate(0, None).is_err());
        assert_eq!(session.store().row_count().unwrap(), 150);
    }

    #[test]
    fn test_bad_sql_is_kept_in_answer() {
        let session = session(100);
        let answer = Answer {
            question: "raw".to_string(),
            translation: Translation {
                sql: "SELECT nope FROM sales".to_string(),
                method: TranslationMethod::RuleBased,
            },
            outcome: session.run_sql("SELECT nope FROM sales"),
        };
        assert!(!answer.is_success());
        assert!(answer.error_message().unwrap().starts_with("Error executing SQL"));
        let json = serde_json::to_value(&answer).unwrap();
        assert!(json["outcome"]["error"].is_string());
    }

    #[test]
    fn test_sample_questions_translate() {
        for question in SAMPLE_QUESTIONS {
            let sql = crate::translator::rule_based_sql(question);
            assert!(session(100).run_sql(&sql).is_ok(), "{question}: {sql}");
        }
    }
}
