//! Schema Descriptor - Column names, declared types and human descriptions
//! of the `sales` table, used to ground the delegated prompt.

use serde::{Deserialize, Serialize};

/// Name of the single table held by the store
pub const SALES_TABLE: &str = "sales";

/// `(column, description)` for every column the generator materializes
pub const COLUMN_DESCRIPTIONS: &[(&str, &str)] = &[
    ("order_id", "Unique order identifier"),
    ("customer_id", "Customer identifier"),
    ("order_date", "Date when order was placed"),
    ("product", "Product name"),
    ("category", "Product category"),
    ("region", "Sales region"),
    ("quantity", "Number of units sold"),
    ("unit_price", "Price per unit"),
    ("total_sales", "Total sales amount (quantity × unit_price)"),
    ("cost_price", "Cost per unit"),
    ("profit", "Profit per transaction (total_sales - cost_price × quantity)"),
    ("payment_method", "Payment method used"),
    ("customer_type", "Type of customer"),
    ("discount", "Discount applied (decimal)"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared SQL type as reported by the store
    pub sql_type: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl SchemaDescriptor {
    /// Build a descriptor from `(name, declared_type)` pairs in table order.
    /// Columns without a catalogued description get an empty one.
    pub fn from_columns<I, N, T>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(name, sql_type)| {
                let name = name.into();
                let description = describe(&name).unwrap_or_default().to_string();
                ColumnDescriptor {
                    name,
                    sql_type: sql_type.into(),
                    description,
                }
            })
            .collect();

        Self {
            table: table.to_string(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `{"column": "TYPE", ...}` in table order
    pub fn column_types_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), serde_json::Value::String(c.sql_type.clone())))
                .collect(),
        )
    }

    /// `{"column": "description", ...}` in table order
    pub fn descriptions_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), serde_json::Value::String(c.description.clone())))
                .collect(),
        )
    }
}

fn describe(column: &str) -> Option<&'static str> {
    COLUMN_DESCRIPTIONS
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, description)| *description)
}
