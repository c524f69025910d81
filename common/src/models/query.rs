//! Query result models.
//!
//! A [`ResultSet`] holds backend-native cells exactly as the store returned
//! them. [`ResultSet::into_json_rows`] is the only way out to the wire and it
//! never fails: cells JSON cannot carry are downgraded to text.

use serde_json::{Number, Value};

/// One column value as produced by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A JSON or JSONB column, already parsed.
    Json(Value),
    /// A value with no JSON mapping. `text` is the backend's textual
    /// rendering when one could be obtained.
    Unrepresentable {
        type_name: String,
        text: Option<String>,
    },
}

impl CellValue {
    /// Converts the cell into JSON, falling back to a string when needed.
    pub fn into_json(self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(b),
            CellValue::Int(i) => Value::Number(i.into()),
            // NaN and infinities have no JSON number form.
            CellValue::Float(f) => Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(non_finite_text(f).to_string())),
            CellValue::Text(s) => Value::String(s),
            CellValue::Json(v) => v,
            CellValue::Unrepresentable { text: Some(text), .. } => Value::String(text),
            CellValue::Unrepresentable { type_name, text: None } => {
                Value::String(format!("<unrepresentable {}>", type_name))
            }
        }
    }

    /// Whether serializing this cell needs the textual fallback.
    pub fn needs_fallback(&self) -> bool {
        match self {
            CellValue::Float(f) => !f.is_finite(),
            CellValue::Unrepresentable { .. } => true,
            _ => false,
        }
    }
}

/// PostgreSQL's spelling of a non-finite float.
fn non_finite_text(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

/// Rows returned by one execution of the authorized query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Rows in backend order, cells in column order.
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Serializes into the `/query` wire form: an array of row arrays.
    ///
    /// Returns the rows together with the number of cells that took the
    /// textual fallback, so callers can log degraded output.
    pub fn into_json_rows(self) -> (Vec<Vec<Value>>, usize) {
        let mut degraded = 0;
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| {
                        if cell.needs_fallback() {
                            degraded += 1;
                        }
                        cell.into_json()
                    })
                    .collect()
            })
            .collect();
        (rows, degraded)
    }
}
