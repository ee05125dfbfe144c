pub mod config;
pub mod error;
pub mod generator;
pub mod llm;
pub mod prompts;
pub mod render;
pub mod schema;
pub mod session;
pub mod sql_guard;
pub mod store;
pub mod translator;

pub use error::{Nl2SqlError, Result};
pub use generator::{generate, OrderRecord};
pub use schema::SchemaDescriptor;
pub use session::{Answer, Session};
pub use store::{QueryResult, TabularStore};
pub use translator::{Translation, TranslationMethod, TranslationMode, Translator};
