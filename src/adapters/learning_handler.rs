//! Query surface of the learning pipeline

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::api_handler::{ok, ApiError, ApiResult, AppState};
use crate::domain::{Insight, InsightType, LearningStats, Pattern, PatternType, Priority};
use crate::learning::{AnalysisReport, LearningConfig};
use crate::persistence::{InsightFilter, PatternFilter};

#[derive(Debug, Default, Deserialize)]
pub struct InsightQuery {
    #[serde(rename = "type")]
    pub insight_type: Option<String>,
    pub priority: Option<String>,
    pub tool: Option<String>,
    pub limit: Option<usize>,
}

impl InsightQuery {
    fn into_filter(self) -> Result<InsightFilter, ApiError> {
        Ok(InsightFilter {
            insight_type: parse_opt::<InsightType>(self.insight_type.as_deref())?,
            priority: parse_opt::<Priority>(self.priority.as_deref())?,
            tool_name: self.tool,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PatternQuery {
    #[serde(rename = "type")]
    pub pattern_type: Option<String>,
    pub tool: Option<String>,
    pub limit: Option<usize>,
}

impl PatternQuery {
    fn into_filter(self) -> Result<PatternFilter, ApiError> {
        Ok(PatternFilter {
            pattern_type: parse_opt::<PatternType>(self.pattern_type.as_deref())?,
            tool_name: self.tool,
            limit: self.limit,
        })
    }
}

fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.filter(|value| !value.is_empty())
        .map(|value| value.parse::<T>().map_err(ApiError::bad_request))
        .transpose()
}

pub async fn get_stats(State(state): State<AppState>) -> ApiResult<LearningStats> {
    ok(state.learning.get_stats().await?)
}

pub async fn list_insights(
    State(state): State<AppState>,
    Query(query): Query<InsightQuery>,
) -> ApiResult<Vec<Insight>> {
    let filter = query.into_filter()?;
    ok(state.learning.list_insights(&filter).await?)
}

pub async fn list_patterns(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> ApiResult<Vec<Pattern>> {
    let filter = query.into_filter()?;
    ok(state.learning.list_patterns(&filter).await?)
}

pub async fn get_tool_insights(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<Insight>> {
    ok(state.learning.get_tool_insights(&name).await?)
}

pub async fn run_analysis(State(state): State<AppState>) -> ApiResult<AnalysisReport> {
    ok(state.learning.run_analysis().await?)
}

pub async fn get_config(State(state): State<AppState>) -> ApiResult<LearningConfig> {
    ok(state.learning.get_config().await)
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<LearningConfig>,
) -> ApiResult<LearningConfig> {
    ok(state.learning.update_config(config).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_insight_query_parses_enums() {
        let filter = InsightQuery {
            insight_type: Some("Reliability".into()),
            priority: Some("high".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.insight_type, Some(InsightType::Reliability));
        assert_eq!(filter.priority, Some(Priority::High));
    }

    #[test]
    fn test_unknown_enum_is_bad_request() {
        let err = PatternQuery {
            pattern_type: Some("weird".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
