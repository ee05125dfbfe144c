//! Prompts for delegated SQL generation
//!
//! The user prompt embeds the table schema (types and descriptions as JSON),
//! a fixed set of worked examples and the rules the model must follow.

use crate::error::Result;
use crate::schema::SchemaDescriptor;

/// System instruction sent with every delegated request
pub const SQL_SYSTEM_PROMPT: &str =
    "You are a SQL expert that converts natural language to SQL queries.";

/// Worked question → SQL examples
pub const WORKED_EXAMPLES: &str = r#"Example questions and their SQL:

1. "Show total sales by region" →
   SELECT region, SUM(total_sales) as total_sales
   FROM sales
   GROUP BY region
   ORDER BY total_sales DESC

2. "Top 5 products by quantity sold" →
   SELECT product, SUM(quantity) as total_quantity
   FROM sales
   GROUP BY product
   ORDER BY total_quantity DESC
   LIMIT 5

3. "Monthly sales trend in 2023" →
   SELECT strftime('%Y-%m', order_date) as month,
          SUM(total_sales) as monthly_sales
   FROM sales
   WHERE order_date >= '2023-01-01'
   GROUP BY month
   ORDER BY month

4. "Profit by product category" →
   SELECT category, SUM(profit) as total_profit
   FROM sales
   GROUP BY category
   ORDER BY total_profit DESC

5. "Average discount by customer type" →
   SELECT customer_type, AVG(discount) as avg_discount
   FROM sales
   GROUP BY customer_type

6. "Sales comparison by payment method" →
   SELECT payment_method,
          COUNT(*) as transaction_count,
          SUM(total_sales) as total_sales
   FROM sales
   GROUP BY payment_method

7. "Customers with most orders" →
   SELECT customer_id, COUNT(*) as order_count
   FROM sales
   GROUP BY customer_id
   ORDER BY order_count DESC
   LIMIT 10"#;

const SQL_RULES: &str = r#"Important Rules:
1. Use only the columns from the schema above
2. Always use table name 'sales'
3. Return ONLY the SQL query, no explanations
4. Use proper aggregation when needed (SUM, COUNT, AVG)
5. Format dates using strftime() if needed
6. Include ORDER BY for ranking questions"#;

/// Build the user prompt for one question.
pub fn build_sql_prompt(schema: &SchemaDescriptor, question: &str) -> Result<String> {
    let column_types = serde_json::to_string_pretty(&schema.column_types_json())?;
    let descriptions = serde_json::to_string_pretty(&schema.descriptions_json())?;

    Ok(format!(
        r#"You are a SQL expert. Convert this natural language question to SQLite SQL.

Database Schema:
Table: {}
Columns and Types: {}

Column Descriptions:
{}

{}

{}

Question: {}

SQL Query:"#,
        schema.table, column_types, descriptions, WORKED_EXAMPLES, SQL_RULES, question
    ))
}
