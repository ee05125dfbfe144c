//! Tabular Store - In-memory SQLite holding the single `sales` table
//!
//! `load` replaces the whole table inside one transaction; `query` runs
//! read-only SQL and returns rows as ordered column/value pairs.

use crate::error::{Nl2SqlError, Result};
use crate::generator::OrderRecord;
use crate::schema::{SchemaDescriptor, SALES_TABLE};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const CREATE_SALES_TABLE: &str = r#"
CREATE TABLE sales (
    order_id TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    order_date TEXT NOT NULL,
    product TEXT NOT NULL,
    category TEXT NOT NULL,
    region TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    unit_price REAL NOT NULL,
    total_sales REAL NOT NULL,
    cost_price REAL NOT NULL,
    profit REAL NOT NULL,
    payment_method TEXT NOT NULL,
    customer_type TEXT NOT NULL,
    discount REAL NOT NULL
)
"#;

const INSERT_ORDER: &str = r#"
INSERT INTO sales (
    order_id, customer_id, order_date, product, category, region, quantity,
    unit_price, total_sales, cost_price, profit, payment_method, customer_type, discount
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
"#;

/// Scalar cell value returned by a query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Text(format!("<blob {} bytes>", bytes.len())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{:.2}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// One result row: values in column order, addressable by column name
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().filter_map(|r| r.values.get(idx)).collect())
    }
}

/// Headline numbers for the loaded dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub total_records: i64,
    pub total_sales: f64,
    pub total_profit: f64,
    pub unique_customers: i64,
}

/// In-memory store owning one SQLite connection
pub struct TabularStore {
    conn: Connection,
}

impl TabularStore {
    /// Open a fresh in-memory database with an empty `sales` table.
    pub fn open() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_SALES_TABLE)?;
        Ok(Self { conn })
    }

    /// Open a store and load `records` into it.
    pub fn with_records(records: &[OrderRecord]) -> Result<(Self, SchemaDescriptor)> {
        let mut store = Self::open()?;
        let schema = store.load(records)?;
        Ok((store, schema))
    }

    /// Replace the whole `sales` table with `records`.
    pub fn load(&mut self, records: &[OrderRecord]) -> Result<SchemaDescriptor> {
        let tx = self.conn.transaction()?;
        tx.execute_batch("DROP TABLE IF EXISTS sales;")?;
        tx.execute_batch(CREATE_SALES_TABLE)?;
        {
            let mut stmt = tx.prepare(INSERT_ORDER)?;
            for record in records {
                stmt.execute(params![
                    record.order_id,
                    record.customer_id,
                    record.order_date.format("%Y-%m-%d").to_string(),
                    record.product.as_str(),
                    record.category.as_str(),
                    record.region.as_str(),
                    record.quantity,
                    record.unit_price,
                    record.total_sales,
                    record.cost_price,
                    record.profit,
                    record.payment_method.as_str(),
                    record.customer_type.as_str(),
                    record.discount,
                ])?;
            }
        }
        tx.commit()?;

        info!(rows = records.len(), "loaded sales table");
        self.schema()
    }

    /// Describe the current `sales` table from `PRAGMA table_info`.
    pub fn schema(&self) -> Result<SchemaDescriptor> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(sales)")?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let sql_type: String = row.get(2)?;
                Ok((name, sql_type))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(SchemaDescriptor::from_columns(SALES_TABLE, columns))
    }

    /// Execute read-only SQL against the table.
    ///
    /// Any failure (syntax, unknown table/column, a statement that would write)
    /// comes back as `SqlExecution` with the SQLite diagnostic.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        let started = Instant::now();
        let sql_text = sql.trim();
        if sql_text.is_empty() {
            return Err(Nl2SqlError::sql_execution(sql, "empty SQL statement"));
        }

        debug!(sql = sql_text, "executing query");

        let mut stmt = self
            .conn
            .prepare(sql_text)
            .map_err(|e| self.execution_error(sql_text, e))?;

        if !stmt.readonly() {
            return Err(self.execution_error(sql_text, "only read-only statements are allowed"));
        }

        let columns: Arc<Vec<String>> = Arc::new(
            stmt.column_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        );
        let column_count = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt
            .query([])
            .map_err(|e| self.execution_error(sql_text, e))?;
        while let Some(row) = cursor.next().map_err(|e| self.execution_error(sql_text, e))? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| self.execution_error(sql_text, e))?;
                values.push(Value::from(value));
            }
            rows.push(Row {
                columns: Arc::clone(&columns),
                values,
            });
        }

        Ok(QueryResult {
            columns: columns.as_ref().clone(),
            rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    pub fn row_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sales", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// First `limit` rows in insertion order.
    pub fn preview(&self, limit: usize) -> Result<QueryResult> {
        self.query(&format!("SELECT * FROM sales LIMIT {}", limit))
    }

    pub fn summary(&self) -> Result<DatasetSummary> {
        let summary = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(total_sales), 0.0), COALESCE(SUM(profit), 0.0), \
             COUNT(DISTINCT customer_id) FROM sales",
            [],
            |row| {
                Ok(DatasetSummary {
                    total_records: row.get(0)?,
                    total_sales: row.get(1)?,
                    total_profit: row.get(2)?,
                    unique_customers: row.get(3)?,
                })
            },
        )?;
        Ok(summary)
    }

    fn execution_error(&self, sql: &str, err: impl fmt::Display) -> Nl2SqlError {
        warn!(sql, error = %err, "query failed");
        Nl2SqlError::sql_execution(sql, err)
    }
}
