use crate::error::{OlapError, OlapResult};
use crate::value::Value;
use std::collections::HashMap;

/// A physical table of the star schema: fact, dimension or aggregate table.
#[derive(Clone, Debug)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<impl Into<String>>) -> Self {
        let name = name.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let column_index = columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.clone(), idx))
            .collect();

        Self {
            name,
            columns,
            column_index,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> OlapResult<()> {
        if row.len() != self.columns.len() {
            return Err(OlapError::SchemaMismatch {
                table: self.name.clone(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }

        self.rows.push(row);
        Ok(())
    }

    pub fn column_idx(&self, column: &str) -> Option<usize> {
        self.column_index.get(column).copied()
    }

    pub(crate) fn require_column(&self, column: &str) -> OlapResult<usize> {
        self.column_idx(column).ok_or_else(|| OlapError::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_idx(column)?;
        self.rows.get(row)?.get(idx)
    }

    pub(crate) fn value_by_idx(&self, row: usize, idx: usize) -> Option<&Value> {
        self.rows.get(row)?.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_row_rejects_wrong_width() {
        let mut table = Table::new("store", vec!["store_id", "store_country"]);
        table.push_row(vec![1.into(), "USA".into()]).unwrap();
        let err = table.push_row(vec![2.into()]).unwrap_err();
        assert!(matches!(
            err,
            OlapError::SchemaMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.value(0, "store_country"), Some(&Value::from("USA")));
    }
}
