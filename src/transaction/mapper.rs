//! Converts raw result rows into ordered column→value mappings.

use rusqlite::types::Value;

use crate::Error;

/// One result row keyed by column name, in the order the query selected the columns.
///
/// Values are kept exactly as the driver returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    fields: Vec<(String, Value)>,
}

impl MappedRow {
    /// The value of `column`, if the row has that column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// The column names in select order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// The number of columns in the row.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Zip each row with `columns`, preserving row order and column order.
///
/// # Errors
/// Returns [Error::Serialization] if a row has a different number of values
/// than there are columns, or if a value is a blob, which has no JSON form.
pub fn map_rows(columns: &[String], rows: Vec<Vec<Value>>) -> Result<Vec<MappedRow>, Error> {
    rows.into_iter()
        .enumerate()
        .map(|(index, values)| {
            if values.len() != columns.len() {
                return Err(Error::Serialization(format!(
                    "row {index} has {} values but there are {} columns",
                    values.len(),
                    columns.len()
                )));
            }

            let fields = columns
                .iter()
                .cloned()
                .zip(values)
                .map(|(name, value)| match value {
                    Value::Blob(_) => Err(Error::Serialization(format!(
                        "column \"{name}\" in row {index} holds a blob"
                    ))),
                    value => Ok((name, value)),
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(MappedRow { fields })
        })
        .collect()
}
