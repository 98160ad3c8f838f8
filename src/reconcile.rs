//! Historical/forecast cumulative trajectory and growth summary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::forecast::ForecastPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub count: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    Historical,
    Forecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub date: NaiveDate,
    pub cumulative: f64,
    pub source: PointSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn historical(&self) -> impl Iterator<Item = &TrajectoryPoint> {
        self.points
            .iter()
            .filter(|p| p.source == PointSource::Historical)
    }

    pub fn forecast(&self) -> impl Iterator<Item = &TrajectoryPoint> {
        self.points
            .iter()
            .filter(|p| p.source == PointSource::Forecast)
    }

    /// Last historical cumulative value; 0 with no history.
    pub fn historical_total(&self) -> f64 {
        self.historical().last().map(|p| p.cumulative).unwrap_or(0.0)
    }

    /// Last forecast cumulative value, or the historical total with no forecast.
    pub fn forecast_total(&self) -> f64 {
        self.forecast()
            .last()
            .map(|p| p.cumulative)
            .unwrap_or_else(|| self.historical_total())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increase,
    Decrease,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthSummary {
    pub historical_total: f64,
    pub forecast_total: f64,
    pub growth_pct: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GrowthOutcome {
    Computed(GrowthSummary),
    /// Historical total is zero, so growth has no defined percentage.
    Undefined { forecast_total: f64 },
}

impl GrowthOutcome {
    pub fn summary(&self) -> Option<&GrowthSummary> {
        match self {
            Self::Computed(summary) => Some(summary),
            Self::Undefined { .. } => None,
        }
    }

    pub fn narrative(&self, county: &str, horizon_months: usize) -> String {
        match self {
            Self::Computed(summary) => format!(
                "EV adoption in {county} is projected to {} by {:.2}% in the next {}.",
                summary.trend.as_str(),
                summary.growth_pct,
                horizon_phrase(horizon_months)
            ),
            Self::Undefined { .. } => {
                "Historical EV total is zero, cannot compute forecast.".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub trajectory: Trajectory,
    pub summary: GrowthOutcome,
}

pub fn reconcile(historical: &[Observation], forecast: &[ForecastPoint]) -> Reconciliation {
    let mut points = Vec::with_capacity(historical.len() + forecast.len());

    let mut running = 0.0;
    for obs in historical {
        running += obs.count;
        points.push(TrajectoryPoint {
            date: obs.date,
            cumulative: running,
            source: PointSource::Historical,
        });
    }
    let historical_total = running;

    for point in forecast {
        running += point.predicted as f64;
        points.push(TrajectoryPoint {
            date: point.date,
            cumulative: running,
            source: PointSource::Forecast,
        });
    }

    let trajectory = Trajectory { points };
    let summary = summarize_growth(historical_total, trajectory.forecast_total());

    Reconciliation {
        trajectory,
        summary,
    }
}

pub fn summarize_growth(historical_total: f64, forecast_total: f64) -> GrowthOutcome {
    if historical_total == 0.0 {
        warn!(
            component = "reconcile",
            event = "reconcile.summary.undefined",
            forecast_total = forecast_total
        );
        return GrowthOutcome::Undefined { forecast_total };
    }

    let growth_pct = (forecast_total - historical_total) / historical_total * 100.0;
    let trend = if growth_pct > 0.0 {
        Trend::Increase
    } else {
        Trend::Decrease
    };

    info!(
        component = "reconcile",
        event = "reconcile.summary.computed",
        historical_total = historical_total,
        forecast_total = forecast_total,
        growth_pct = growth_pct,
        trend = trend.as_str()
    );

    GrowthOutcome::Computed(GrowthSummary {
        historical_total,
        forecast_total,
        growth_pct,
        trend,
    })
}

fn horizon_phrase(months: usize) -> String {
    match months {
        1 => "month".to_string(),
        12 => "year".to_string(),
        m if m % 12 == 0 => format!("{} years", m / 12),
        m => format!("{m} months"),
    }
}
