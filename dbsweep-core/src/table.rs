//! String-typed, column-addressable query results.
//!
//! A [`ResultTable`] is built once from a [`TypedRows`] source. Every cell is
//! stored in its canonical string form (see [`crate::value::render`]), so
//! callers can address columns by name and filter rows by regular expression
//! without caring about the backend's native types.

use regex::Regex;
use std::fmt;

use crate::error::{ConfigError, ConversionError};
use crate::value::{render, ColumnKind, ColumnMeta, FieldValue};

/// A positional, typed result stream.
///
/// Column metadata is read once; cells are then fetched row by row.
pub trait TypedRows {
    fn columns(&self) -> Vec<ColumnMeta>;
    fn row_count(&self) -> usize;
    fn value(&self, row: usize, column: usize) -> Result<FieldValue, ConversionError>;
}

/// In-memory [`TypedRows`] used by mocks and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRows {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<FieldValue>>,
}

impl StaticRows {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Text-only rows under the given column names.
    pub fn text(header: &[&str], rows: &[&[&str]]) -> Self {
        let columns = header
            .iter()
            .map(|name| ColumnMeta::new(*name, ColumnKind::Text))
            .collect();
        let mut source = Self::new(columns);
        for row in rows {
            source.push(row.iter().map(|v| FieldValue::Text(v.to_string())).collect());
        }
        source
    }

    pub fn push(&mut self, row: Vec<FieldValue>) {
        self.rows.push(row);
    }

    pub fn with_row(mut self, row: Vec<FieldValue>) -> Self {
        self.push(row);
        self
    }
}

impl TypedRows for StaticRows {
    fn columns(&self) -> Vec<ColumnMeta> {
        self.columns.clone()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn value(&self, row: usize, column: usize) -> Result<FieldValue, ConversionError> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .cloned()
            .ok_or_else(|| ConversionError::Decode {
                column: self
                    .columns
                    .get(column)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| column.to_string()),
                reason: "value missing from row".to_string(),
            })
    }
}

/// Normalized query result: a header plus string rows of equal width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ResultTable {
    /// Convert a typed source into a table.
    ///
    /// Rows with any field that fails to convert are dropped.
    pub fn build<S: TypedRows + ?Sized>(source: &S) -> Self {
        let columns = source.columns();
        let header: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut rows = Vec::with_capacity(source.row_count());

        for row_index in 0..source.row_count() {
            match convert_row(source, &columns, row_index) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    tracing::debug!(row = row_index, error = %e, "Dropping unconvertible row");
                }
            }
        }

        Self { header, rows }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of retained rows.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve a column name, ignoring ASCII case.
    pub fn column_index(&self, name: &str) -> Result<usize, ConfigError> {
        self.header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownColumn {
                column: name.to_string(),
            })
    }

    /// All values of one column, in row order.
    pub fn get_column(&self, name: &str) -> Result<Vec<String>, ConfigError> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[index].clone()).collect())
    }

    /// Batched [`get_column`](Self::get_column), in request order.
    pub fn get_columns(&self, names: &[&str]) -> Result<Vec<(String, Vec<String>)>, ConfigError> {
        let indexes = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(names
            .iter()
            .zip(indexes)
            .map(|(name, index)| {
                let values = self.rows.iter().map(|row| row[index].clone()).collect();
                (name.to_string(), values)
            })
            .collect())
    }

    pub fn get_field(&self, column: &str, row: usize) -> Result<&str, ConfigError> {
        let index = self.column_index(column)?;
        let record = self.rows.get(row).ok_or(ConfigError::RowOutOfRange {
            index: row,
            count: self.rows.len(),
        })?;
        Ok(&record[index])
    }

    /// Retain only rows whose value at `column` fully matches `pattern`.
    pub fn keep(&mut self, pattern: &str, column: usize) -> Result<(), ConfigError> {
        self.retain_matching(pattern, column, true)
    }

    /// Discard rows whose value at `column` fully matches `pattern`.
    pub fn remove(&mut self, pattern: &str, column: usize) -> Result<(), ConfigError> {
        self.retain_matching(pattern, column, false)
    }

    fn retain_matching(&mut self, pattern: &str, column: usize, keep: bool) -> Result<(), ConfigError> {
        if column >= self.header.len() {
            return Err(ConfigError::UnknownColumn {
                column: format!("#{}", column),
            });
        }
        let re = full_match(pattern)?;
        self.rows.retain(|row| re.is_match(&row[column]) == keep);
        Ok(())
    }
}

fn convert_row<S: TypedRows + ?Sized>(
    source: &S,
    columns: &[ColumnMeta],
    row: usize,
) -> Result<Vec<String>, ConversionError> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = source.value(row, i)?;
            render(&column.name, column.kind, &value)
        })
        .collect()
}

/// Compile `pattern` so it must match an entire value, not a substring.
pub fn full_match(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HEADER")?;
        writeln!(f, "[{}]", self.header.join(", "))?;
        writeln!(f, "RECORDS")?;
        for row in &self.rows {
            writeln!(f, "[{}]", row.join(", "))?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn databases() -> ResultTable {
        ResultTable::build(&StaticRows::text(
            &["Name", "owner"],
            &[&["db1", "hive"], &["db2", "etl"], &["db3", "hive"], &["sys", "admin"]],
        ))
    }

    #[test]
    fn test_build_keeps_source_column_order() {
        let source = StaticRows::new(vec![
            ColumnMeta::new("id", ColumnKind::BigInt),
            ColumnMeta::new("name", ColumnKind::Text),
            ColumnMeta::new("size", ColumnKind::Double),
        ])
        .with_row(vec![
            FieldValue::BigInt(1),
            FieldValue::Text("db1".into()),
            FieldValue::Double(1.5),
        ]);

        let table = ResultTable::build(&source);
        assert_eq!(table.header(), &["id", "name", "size"]);
        assert_eq!(table.rows(), &[vec!["1".to_string(), "db1".into(), "1.5".into()]]);
    }

    #[test]
    fn test_build_drops_unconvertible_rows() {
        let source = StaticRows::new(vec![
            ColumnMeta::new("name", ColumnKind::Text),
            ColumnMeta::new("tables", ColumnKind::Integer),
        ])
        .with_row(vec![FieldValue::Text("db1".into()), FieldValue::Int(3)])
        .with_row(vec![FieldValue::Text("db2".into()), FieldValue::Text("many".into())])
        .with_row(vec![FieldValue::Text("db3".into())])
        .with_row(vec![FieldValue::Text("db4".into()), FieldValue::Null]);

        let table = ResultTable::build(&source);
        assert_eq!(table.count(), 2);
        assert_eq!(table.get_column("name").unwrap(), vec!["db1", "db4"]);
        assert_eq!(table.get_field("tables", 1).unwrap(), "");
    }

    #[test]
    fn test_get_column_is_case_insensitive() {
        let table = databases();
        let expected = vec!["db1", "db2", "db3", "sys"];
        assert_eq!(table.get_column("Name").unwrap(), expected);
        assert_eq!(table.get_column("name").unwrap(), expected);
        assert_eq!(table.get_column("NAME").unwrap(), expected);
    }

    #[test]
    fn test_unknown_column_is_typed_error() {
        let table = databases();
        assert_eq!(
            table.get_column("location"),
            Err(ConfigError::UnknownColumn {
                column: "location".to_string()
            })
        );
        assert!(table.get_columns(&["name", "location"]).is_err());
    }

    #[test]
    fn test_get_columns_in_request_order() {
        let table = databases();
        let columns = table.get_columns(&["OWNER", "name"]).unwrap();
        assert_eq!(columns[0].0, "OWNER");
        assert_eq!(columns[0].1, vec!["hive", "etl", "hive", "admin"]);
        assert_eq!(columns[1].1, vec!["db1", "db2", "db3", "sys"]);
    }

    #[test]
    fn test_get_field_bounds() {
        let table = databases();
        assert_eq!(table.get_field("owner", 1).unwrap(), "etl");
        assert_eq!(
            table.get_field("owner", 9),
            Err(ConfigError::RowOutOfRange { index: 9, count: 4 })
        );
    }

    #[test]
    fn test_keep_is_full_match() {
        let mut table = databases();
        table.keep("db", 0).unwrap();
        assert!(table.is_empty());

        let mut table = databases();
        table.keep("db[12]", 0).unwrap();
        assert_eq!(table.get_column("name").unwrap(), vec!["db1", "db2"]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut table = databases();
        table.remove("hive", 1).unwrap();
        assert_eq!(table.get_column("name").unwrap(), vec!["db2", "sys"]);
    }

    #[test]
    fn test_filter_rejects_bad_input() {
        let mut table = databases();
        assert!(matches!(table.keep("db(", 0), Err(ConfigError::InvalidPattern { .. })));
        assert!(matches!(table.remove("db", 5), Err(ConfigError::UnknownColumn { .. })));
        assert_eq!(table.count(), 4);
    }

    #[test]
    fn test_display_lists_header_and_records() {
        let table = ResultTable::build(&StaticRows::text(&["name"], &[&["db1"]]));
        assert_eq!(format!("{}", table), "HEADER\n[name]\nRECORDS\n[db1]\n");
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
