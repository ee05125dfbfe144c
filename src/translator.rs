//! Question → SQL translation
//!
//! Two paths:
//! - Rule-based: an ordered list of keyword rules, first match wins.
//! - Delegated: a schema-grounded prompt sent to an external model.
//!
//! The delegated path never fails outward. Any problem (no delegate, call
//! failure, unusable reply) falls back to the rule-based SQL for the same
//! question and is reported as `DelegatedFallback`.

use crate::error::{Nl2SqlError, Result};
use crate::llm::SqlDelegate;
use crate::prompts::{build_sql_prompt, SQL_SYSTEM_PROMPT};
use crate::schema::SchemaDescriptor;
use crate::sql_guard::{strip_code_fences, validate_query};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Default LIMIT for "top N products" when no number is given
pub const DEFAULT_TOP_PRODUCTS: u32 = 5;
/// Default LIMIT for "customers with most orders"
pub const DEFAULT_TOP_CUSTOMERS: u32 = 10;

/// Query used when no rule matches
pub const PREVIEW_SQL: &str = "SELECT * FROM sales LIMIT 10";

/// Which path the caller asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationMode {
    RuleBased,
    Delegated,
}

impl FromStr for TranslationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rule" | "rules" | "rule-based" | "rule_based" => Ok(TranslationMode::RuleBased),
            "llm" | "ai" | "gpt" | "delegated" => Ok(TranslationMode::Delegated),
            other => Err(format!(
                "unknown translation mode '{}' (expected 'rule' or 'llm')",
                other
            )),
        }
    }
}

/// Which path actually produced the SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationMethod {
    RuleBased,
    Delegated,
    DelegatedFallback,
}

impl fmt::Display for TranslationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TranslationMethod::RuleBased => "Rule-Based",
            TranslationMethod::Delegated => "AI-Generated",
            TranslationMethod::DelegatedFallback => "Rule-Based (Fallback)",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub sql: String,
    pub method: TranslationMethod,
}

/// A keyword rule: predicate over the lower-cased question and the SQL it emits
pub struct Rule {
    pub name: &'static str,
    matches: fn(&str) -> bool,
    render: fn(&str) -> String,
}

impl Rule {
    pub fn matches(&self, question_lower: &str) -> bool {
        (self.matches)(question_lower)
    }

    pub fn render(&self, question_lower: &str) -> String {
        (self.render)(question_lower)
    }
}

/// Evaluated top to bottom. A question with both "total sales" and "region"
/// must hit `sales_by_region` before anything more generic.
pub static RULES: &[Rule] = &[
    Rule {
        name: "sales_by_region",
        matches: |q| q.contains("total sales") && q.contains("region"),
        render: |_| {
            "SELECT region, SUM(total_sales) as total_sales FROM sales GROUP BY region ORDER BY total_sales DESC"
                .to_string()
        },
    },
    Rule {
        name: "top_products",
        matches: |q| q.contains("top") && q.contains("product"),
        render: |q| {
            format!(
                "SELECT product, SUM(quantity) as total_quantity FROM sales GROUP BY product ORDER BY total_quantity DESC LIMIT {}",
                extract_top_n(q).unwrap_or(DEFAULT_TOP_PRODUCTS)
            )
        },
    },
    Rule {
        name: "monthly_trend",
        matches: |q| q.contains("monthly") || q.contains("trend"),
        render: |_| {
            "SELECT strftime('%Y-%m', order_date) as month, SUM(total_sales) as monthly_sales FROM sales GROUP BY month ORDER BY month"
                .to_string()
        },
    },
    Rule {
        name: "profit_by_category",
        matches: |q| q.contains("profit") && q.contains("category"),
        render: |_| {
            "SELECT category, SUM(profit) as total_profit FROM sales GROUP BY category ORDER BY total_profit DESC"
                .to_string()
        },
    },
    Rule {
        name: "discount_by_customer_type",
        matches: |q| q.contains("discount") && q.contains("customer type"),
        render: |_| {
            "SELECT customer_type, AVG(discount) as avg_discount FROM sales GROUP BY customer_type"
                .to_string()
        },
    },
    Rule {
        name: "payment_methods",
        matches: |q| q.contains("payment"),
        render: |_| {
            "SELECT payment_method, COUNT(*) as transaction_count, SUM(total_sales) as total_sales FROM sales GROUP BY payment_method"
                .to_string()
        },
    },
    Rule {
        name: "customers_by_orders",
        matches: |q| q.contains("customer") && q.contains("orders"),
        render: |q| {
            format!(
                "SELECT customer_id, COUNT(*) as order_count FROM sales GROUP BY customer_id ORDER BY order_count DESC LIMIT {}",
                extract_top_n(q).unwrap_or(DEFAULT_TOP_CUSTOMERS)
            )
        },
    },
    Rule {
        name: "avg_price_by_region",
        matches: |q| q.contains("average") && q.contains("price") && q.contains("region"),
        render: |_| {
            "SELECT region, AVG(unit_price) as avg_unit_price FROM sales GROUP BY region ORDER BY avg_unit_price DESC"
                .to_string()
        },
    },
];

fn top_n_regex() -> &'static Regex {
    static TOP_N: OnceLock<Regex> = OnceLock::new();
    TOP_N.get_or_init(|| Regex::new(r"\btop\s+(\d+)").expect("top-n pattern is valid"))
}

/// The integer right after "top" (`"top 3 products"` → 3).
pub fn extract_top_n(question_lower: &str) -> Option<u32> {
    top_n_regex()
        .captures(question_lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First rule matching the question, if any.
pub fn matching_rule(question: &str) -> Option<&'static Rule> {
    let question_lower = question.to_lowercase();
    RULES.iter().find(|rule| rule.matches(&question_lower))
}

/// Rule-based SQL for a question; the preview query when nothing matches.
pub fn rule_based_sql(question: &str) -> String {
    let question_lower = question.to_lowercase();
    match RULES.iter().find(|rule| rule.matches(&question_lower)) {
        Some(rule) => {
            debug!(rule = rule.name, "matched keyword rule");
            rule.render(&question_lower)
        }
        None => {
            debug!("no keyword rule matched, using preview query");
            PREVIEW_SQL.to_string()
        }
    }
}

/// Stateless translator; holds only the optional delegate.
#[derive(Clone, Default)]
pub struct Translator {
    delegate: Option<Arc<dyn SqlDelegate>>,
}

impl Translator {
    pub fn rule_based() -> Self {
        Self { delegate: None }
    }

    pub fn with_delegate(delegate: Arc<dyn SqlDelegate>) -> Self {
        Self {
            delegate: Some(delegate),
        }
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    pub async fn translate(
        &self,
        question: &str,
        schema: &SchemaDescriptor,
        mode: TranslationMode,
    ) -> Translation {
        let translation = match mode {
            TranslationMode::RuleBased => Translation {
                sql: rule_based_sql(question),
                method: TranslationMethod::RuleBased,
            },
            TranslationMode::Delegated => match self.translate_delegated(question, schema).await {
                Ok(sql) => Translation {
                    sql,
                    method: TranslationMethod::Delegated,
                },
                Err(e) => {
                    warn!(error = %e, "delegated translation failed, falling back to rules");
                    Translation {
                        sql: rule_based_sql(question),
                        method: TranslationMethod::DelegatedFallback,
                    }
                }
            },
        };

        info!(method = %translation.method, "translated question");
        debug!(sql = %translation.sql, "generated SQL");
        translation
    }

    async fn translate_delegated(&self, question: &str, schema: &SchemaDescriptor) -> Result<String> {
        let delegate = self.delegate.as_ref().ok_or_else(|| {
            Nl2SqlError::DelegateUnavailable("no API key configured".to_string())
        })?;

        let prompt = build_sql_prompt(schema, question)?;
        let raw = delegate.complete(SQL_SYSTEM_PROMPT, &prompt).await?;
        let sql = strip_code_fences(&raw);
        validate_query(&sql, &[schema.table.as_str()])?;

        debug!(delegate = delegate.name(), "delegate produced SQL");
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SALES_TABLE;
    use async_trait::async_trait;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::from_columns(
            SALES_TABLE,
            vec![("region", "TEXT"), ("total_sales", "REAL"), ("quantity", "INTEGER")],
        )
    }

    struct FixedReply(&'static str);

    #[async_trait]
    impl SqlDelegate for FixedReply {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl SqlDelegate for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Err(Nl2SqlError::Llm("connection refused".to_string()))
        }
    }

    #[test]
    fn test_region_rule_wins_over_later_rules() {
        let sql = rule_based_sql("Show total sales by region and monthly trend");
        assert!(sql.contains("GROUP BY region"));
        assert!(sql.ends_with("ORDER BY total_sales DESC"));
        assert_eq!(matching_rule("Total Sales per Region").unwrap().name, "sales_by_region");
    }

    #[test]
    fn test_top_n_extraction() {
        assert_eq!(extract_top_n("top 3 products by quantity"), Some(3));
        assert_eq!(extract_top_n("top   12 products"), Some(12));
        assert_eq!(extract_top_n("top products"), None);
        assert_eq!(extract_top_n("stop 4 products"), None);
    }

    #[test]
    fn test_top_products_limit() {
        assert!(rule_based_sql("Top 3 products by quantity").ends_with("LIMIT 3"));
        assert!(rule_based_sql("Show top products").ends_with("LIMIT 5"));
    }

    #[test]
    fn test_other_rules() {
        assert!(rule_based_sql("Monthly sales trend").contains("strftime('%Y-%m', order_date)"));
        assert!(rule_based_sql("Profit by category").contains("SUM(profit)"));
        assert!(rule_based_sql("Average discount by customer type").contains("AVG(discount)"));
        assert!(rule_based_sql("Payment methods summary").contains("GROUP BY payment_method"));
        assert!(rule_based_sql("Customers with most orders").ends_with("LIMIT 10"));
        assert!(rule_based_sql("What is the average unit price by region?").contains("AVG(unit_price)"));
    }

    #[test]
    fn test_unmatched_question_previews() {
        assert_eq!(rule_based_sql("hello there"), PREVIEW_SQL);
        assert_eq!(rule_based_sql(""), PREVIEW_SQL);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("rule".parse::<TranslationMode>().unwrap(), TranslationMode::RuleBased);
        assert_eq!("LLM".parse::<TranslationMode>().unwrap(), TranslationMode::Delegated);
        assert!("magic".parse::<TranslationMode>().is_err());
    }

    #[tokio::test]
    async fn test_delegated_success_strips_fences() {
        let translator = Translator::with_delegate(Arc::new(FixedReply(
            "```sql\nSELECT region, COUNT(*) FROM sales GROUP BY region\n```",
        )));
        let t = translator
            .translate("orders per region", &schema(), TranslationMode::Delegated)
            .await;
        assert_eq!(t.method, TranslationMethod::Delegated);
        assert_eq!(t.sql, "SELECT region, COUNT(*) FROM sales GROUP BY region");
    }

    #[tokio::test]
    async fn test_delegate_failure_falls_back() {
        let translator = Translator::with_delegate(Arc::new(Broken));
        let question = "Top 3 products by quantity";
        let t = translator
            .translate(question, &schema(), TranslationMode::Delegated)
            .await;
        assert_eq!(t.method, TranslationMethod::DelegatedFallback);
        assert_eq!(t.sql, rule_based_sql(question));
    }

    #[tokio::test]
    async fn test_missing_delegate_falls_back() {
        let t = Translator::rule_based()
            .translate("hello", &schema(), TranslationMode::Delegated)
            .await;
        assert_eq!(t.method, TranslationMethod::DelegatedFallback);
        assert_eq!(t.sql, PREVIEW_SQL);
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back() {
        let translator =
            Translator::with_delegate(Arc::new(FixedReply("Sorry, I can't help with that.")));
        let t = translator
            .translate("Profit by category", &schema(), TranslationMode::Delegated)
            .await;
        assert_eq!(t.method, TranslationMethod::DelegatedFallback);
        assert!(t.sql.contains("GROUP BY category"));
    }

    #[tokio::test]
    async fn test_sqlite_only_reply_stays_delegated() {
        let translator = Translator::with_delegate(Arc::new(FixedReply(
            "```sqlite\nSELECT product FROM sales WHERE product GLOB 'L*';\n```",
        )));
        let t = translator
            .translate("Products starting with L", &schema(), TranslationMode::Delegated)
            .await;
        assert_eq!(t.method, TranslationMethod::Delegated);
        assert_eq!(t.sql, "SELECT product FROM sales WHERE product GLOB 'L*'");
    }

    #[tokio::test]
    async fn test_subquery_over_unknown_table_falls_back() {
        let translator = Translator::with_delegate(Arc::new(FixedReply(
            "SELECT * FROM sales WHERE customer_id IN (SELECT customer_id FROM vip_list)",
        )));
        let t = translator
            .translate("Profit by category", &schema(), TranslationMode::Delegated)
            .await;
        assert_eq!(t.method, TranslationMethod::DelegatedFallback);
    }

    #[tokio::test]
    async fn test_rule_mode_ignores_delegate() {
        let translator = Translator::with_delegate(Arc::new(FixedReply("SELECT 1 FROM sales")));
        let t = translator
            .translate("Profit by category", &schema(), TranslationMode::RuleBased)
            .await;
        assert_eq!(t.method, TranslationMethod::RuleBased);
    }
}
