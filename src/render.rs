//! Plain text rendering of query results for the terminal.

use crate::schema::SchemaDescriptor;
use crate::store::{DatasetSummary, QueryResult, Value};
use itertools::Itertools;

fn cell(value: &Value) -> String {
    value.to_string()
}

/// Render rows as a fixed-width table. Numbers are right aligned.
pub fn render_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "(no columns)".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.values().iter().map(cell).collect())
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            cells
                .iter()
                .filter_map(|row| row.get(idx))
                .map(|c| c.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, width)| format!("{:<width$}", name, width = *width))
        .join(" | ");
    let separator = widths.iter().map(|w| "-".repeat(*w)).join("-+-");

    let mut lines = vec![header, separator];
    for (row, rendered) in result.rows.iter().zip(&cells) {
        let line = rendered
            .iter()
            .zip(row.values())
            .zip(&widths)
            .map(|((text, value), width)| {
                if value.is_numeric() {
                    format!("{:>width$}", text, width = *width)
                } else {
                    format!("{:<width$}", text, width = *width)
                }
            })
            .join(" | ");
        lines.push(line.trim_end().to_string());
    }

    let noun = if result.len() == 1 { "row" } else { "rows" };
    lines.push(format!("({} {})", result.len(), noun));
    lines.join("\n")
}

pub fn render_summary(summary: &DatasetSummary) -> String {
    format!(
        "Total records: {}\nTotal sales: ${:.2}\nTotal profit: ${:.2}\nUnique customers: {}",
        summary.total_records, summary.total_sales, summary.total_profit, summary.unique_customers
    )
}

pub fn render_schema(schema: &SchemaDescriptor) -> String {
    let name_width = schema.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
    let type_width = schema.columns.iter().map(|c| c.sql_type.len()).max().unwrap_or(0);

    std::iter::once(format!("Table: {}", schema.table))
        .chain(schema.columns.iter().map(|c| {
            format!(
                "  {:<nw$}  {:<tw$}  {}",
                c.name,
                c.sql_type,
                c.description,
                nw = name_width,
                tw = type_width
            )
            .trim_end()
            .to_string()
        }))
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate;
    use crate::store::TabularStore;

    #[test]
    fn test_render_table_aligns_columns() {
        let records = generate(30, Some(2)).unwrap();
        let (store, _) = TabularStore::with_records(&records).unwrap();
        let result = store
            .query("SELECT region, SUM(quantity) AS units FROM sales GROUP BY region ORDER BY region")
            .unwrap();

        let text = render_table(&result);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("region"));
        assert!(lines[0].contains("| units"));
        assert!(lines[1].contains("-+-"));
        assert_eq!(lines.last().unwrap(), &format!("({} rows)", result.len()));
    }

    #[test]
    fn test_render_summary() {
        let text = render_summary(&DatasetSummary {
            total_records: 3,
            total_sales: 1234.5,
            total_profit: 100.0,
            unique_customers: 2,
        });
        assert!(text.contains("Total sales: $1234.50"));
        assert!(text.contains("Unique customers: 2"));
    }

    #[test]
    fn test_render_schema_lists_columns() {
        let store = TabularStore::open().unwrap();
        let text = render_schema(&store.schema().unwrap());
        assert!(text.starts_with("Table: sales"));
        assert!(text.contains("discount"));
        assert!(text.contains("Discount applied (decimal)"));
    }
}
