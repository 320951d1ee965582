//! Benchmark rows and the set they accumulate in

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::algorithm::AlgorithmError;

/// A measured number, or the reason there is none
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Metric {
    /// Measured value
    Value(f64),
    /// No way to measure this on the current host
    Unsupported,
    /// The algorithm failed in this cell
    Error,
}

impl Metric {
    /// The value, if measured
    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => match f.precision() {
                Some(p) => write!(f, "{:.*}", p, v),
                None => write!(f, "{}", v),
            },
            Metric::Unsupported => f.write_str("unsupported"),
            Metric::Error => f.write_str("error"),
        }
    }
}

// On the wire a metric is either a number or one of the sentinel strings
impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Metric::Value(v) => serializer.serialize_f64(*v),
            Metric::Unsupported => serializer.serialize_str("unsupported"),
            Metric::Error => serializer.serialize_str("error"),
        }
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(Metric::Value(v)),
            Raw::Text(s) if s == "unsupported" => Ok(Metric::Unsupported),
            Raw::Text(s) if s == "error" => Ok(Metric::Error),
            Raw::Text(s) => Err(serde::de::Error::custom(format!("unknown metric: {}", s))),
        }
    }
}

/// One cell of the benchmark matrix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    /// Algorithm name
    pub algorithm: String,
    /// Tier (operations run back to back)
    pub iterations: u64,
    /// Mean wall-clock time per operation in milliseconds
    pub time_per_op_ms: Metric,
    /// Heap growth over the tier in KB, floored at zero
    #[serde(rename = "memoryDeltaKB")]
    pub memory_delta_kb: Metric,
    /// Failure message when the algorithm failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BenchmarkResult {
    /// A successfully measured cell
    pub fn measured(
        algorithm: impl Into<String>,
        iterations: u64,
        time_per_op_ms: f64,
        memory_delta_kb: Metric,
    ) -> Self {
        BenchmarkResult {
            algorithm: algorithm.into(),
            iterations,
            time_per_op_ms: Metric::Value(time_per_op_ms),
            memory_delta_kb,
            error: None,
        }
    }

    /// A cell whose algorithm failed
    pub fn failed(algorithm: impl Into<String>, iterations: u64, error: &AlgorithmError) -> Self {
        BenchmarkResult {
            algorithm: algorithm.into(),
            iterations,
            time_per_op_ms: Metric::Error,
            memory_delta_kb: Metric::Error,
            error: Some(error.to_string()),
        }
    }

    /// Whether the algorithm failed in this cell
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Rows keyed by (algorithm, iterations), kept in recording order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    rows: Vec<BenchmarkResult>,
    index: HashMap<(String, u64), usize>,
}

impl ResultSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row; a second row for the same cell is refused
    pub fn insert(&mut self, row: BenchmarkResult) -> Result<(), BenchmarkResult> {
        let key = (row.algorithm.clone(), row.iterations);
        if self.index.contains_key(&key) {
            return Err(row);
        }
        self.index.insert(key, self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    /// Row for one cell
    pub fn get(&self, algorithm: &str, iterations: u64) -> Option<&BenchmarkResult> {
        self.index
            .get(&(algorithm.to_string(), iterations))
            .map(|&i| &self.rows[i])
    }

    /// Rows of one tier, in algorithm order
    pub fn tier(&self, iterations: u64) -> Vec<&BenchmarkResult> {
        self.rows
            .iter()
            .filter(|r| r.iterations == iterations)
            .collect()
    }

    /// Time per op of one algorithm across `tiers`; failed or missing cells are gaps
    pub fn time_series(&self, algorithm: &str, tiers: &[u64]) -> Vec<Option<f64>> {
        tiers
            .iter()
            .map(|&t| self.get(algorithm, t).and_then(|r| r.time_per_op_ms.value()))
            .collect()
    }

    /// Memory delta of one algorithm across `tiers`; unmeasured cells are gaps
    pub fn memory_series(&self, algorithm: &str, tiers: &[u64]) -> Vec<Option<f64>> {
        tiers
            .iter()
            .map(|&t| self.get(algorithm, t).and_then(|r| r.memory_delta_kb.value()))
            .collect()
    }

    /// All rows in recording order
    pub fn rows(&self) -> &[BenchmarkResult] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row was recorded
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rows.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_wire_format() {
        let row = BenchmarkResult::measured("SHA-256", 100, 0.5, Metric::Unsupported);
        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["timePerOpMs"], 0.5);
        assert_eq!(json["memoryDeltaKB"], "unsupported");
        assert!(json.get("error").is_none());

        let back: BenchmarkResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_failed_row_uses_sentinels() {
        let err = AlgorithmError::new("AES-256-GCM", "bad key");
        let row = BenchmarkResult::failed("AES-256-GCM", 1000, &err);

        assert!(row.is_error());
        assert_eq!(row.time_per_op_ms, Metric::Error);
        assert_eq!(row.memory_delta_kb, Metric::Error);
        assert_eq!(serde_json::to_value(&row).unwrap()["timePerOpMs"], "error");
    }

    #[test]
    fn test_metric_display_precision() {
        assert_eq!(format!("{:.2}", Metric::Value(1.23456)), "1.23");
        assert_eq!(format!("{:.2}", Metric::Error), "error");
    }

    #[test]
    fn test_duplicate_cell_refused() {
        let mut set = ResultSet::new();
        set.insert(BenchmarkResult::measured("A", 100, 1.0, Metric::Unsupported))
            .unwrap();
        assert!(set
            .insert(BenchmarkResult::measured("A", 100, 2.0, Metric::Unsupported))
            .is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_series_have_gaps_for_errors() {
        let mut set = ResultSet::new();
        let err = AlgorithmError::new("A", "boom");
        set.insert(BenchmarkResult::measured("A", 100, 1.0, Metric::Value(0.0)))
            .unwrap();
        set.insert(BenchmarkResult::failed("A", 1000, &err)).unwrap();

        assert_eq!(
            set.time_series("A", &[100, 1000, 10000]),
            vec![Some(1.0), None, None]
        );
        assert_eq!(set.memory_series("A", &[100]), vec![Some(0.0)]);
    }
}
