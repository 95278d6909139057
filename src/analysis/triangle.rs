//! External IBNR loss-triangle lookup
//!
//! The triangle itself is computed elsewhere; this is the read-only mapping
//! from metric name to a series of incremental future-loss amounts, one per
//! aggregation bucket in table row order. Absent metrics mean zero loading.

use std::collections::HashMap;
use std::error::Error;
use std::io::Read;

use serde::{Deserialize, Serialize};

/// Opaque metric-to-incremental-IBNR lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LossTriangle {
    series: HashMap<String, Vec<f64>>,
}

impl LossTriangle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the incremental IBNR series for one metric
    pub fn insert_metric(&mut self, metric: impl Into<String>, incremental: Vec<f64>) {
        self.series.insert(metric.into(), incremental);
    }

    /// Incremental series for a metric, in bucket order
    pub fn ibnr_series(&self, metric: &str) -> Option<&[f64]> {
        self.series.get(metric).map(Vec::as_slice)
    }

    /// Sum of the incremental series for a metric, zero when absent
    pub fn total_ibnr(&self, metric: &str) -> f64 {
        self.ibnr_series(metric)
            .map(|s| s.iter().sum())
            .unwrap_or(0.0)
    }

    /// Load a triangle exported as JSON (`{"metric": [values...]}`)
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, Box<dyn Error>> {
        let series: HashMap<String, Vec<f64>> = serde_json::from_reader(reader)?;
        Ok(Self { series })
    }
}
