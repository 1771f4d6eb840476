//! Charting collaborator contract.
//!
//! Chart rendering is external: the pipeline only needs the mapping from
//! chart name to image reference, never pixel content.

use async_trait::async_trait;

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::kpi::KpiSet;

/// A named reference to a rendered chart image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRef {
    /// Stable chart name (e.g. "daily_performance").
    pub name: String,
    /// Location of the rendered image (path or URL).
    pub uri: String,
    /// Human-readable caption.
    pub caption: String,
}

/// Collaborator that renders charts for a computed KPI set.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChartProvider: Send + Sync {
    /// Render charts for the KPI set, returning name -> image references.
    async fn render(&self, kpis: &KpiSet) -> AppResult<Vec<ChartRef>>;
}

/// Provider used when no charting collaborator is wired in. Reports still
/// assemble; the charts section is simply empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullChartProvider;

#[async_trait]
impl ChartProvider for NullChartProvider {
    async fn render(&self, _kpis: &KpiSet) -> AppResult<Vec<ChartRef>> {
        Ok(Vec::new())
    }
}
