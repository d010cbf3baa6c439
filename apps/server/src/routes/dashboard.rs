use actix_web::{HttpResponse, get, web};
use serde::Deserialize;
use vigil_service::dashboard::{
    DEFAULT_DEVICES_DOWN_LIMIT, DEFAULT_HISTORY_HOURS, DEFAULT_HISTORY_INTERVAL_MINUTES,
    Dashboard,
};

use crate::error::AppError;

/// Longest look-back accepted by the uptime graph, 30 days
const MAX_HISTORY_HOURS: i64 = 720;

macros_utils::routes! {
    route up_down_stats_route,
    route devices_down_route,
    route uptime_graph_route,
}

#[derive(Debug, Deserialize)]
pub struct DevicesDownQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UptimeGraphQuery {
    hours: Option<i64>,
    interval: Option<i64>,
}

impl UptimeGraphQuery {
    fn validated(&self) -> Result<(i64, i64), AppError> {
        let hours = self.hours.unwrap_or(DEFAULT_HISTORY_HOURS);
        let interval = self.interval.unwrap_or(DEFAULT_HISTORY_INTERVAL_MINUTES);

        if !(1..=MAX_HISTORY_HOURS).contains(&hours) {
            return Err(AppError::BadRequest(format!(
                "hours must be between 1 and {MAX_HISTORY_HOURS}"
            )));
        }
        let max_interval = hours * 60;
        if !(1..=max_interval).contains(&interval) {
            return Err(AppError::BadRequest(format!(
                "interval must be between 1 and {max_interval} minutes"
            )));
        }
        Ok((hours, interval))
    }
}

/// Current up/down/ssl tallies over active monitors
#[get("/up-down-stats")]
pub async fn up_down_stats_route(
    dashboard: web::Data<Dashboard>,
) -> Result<HttpResponse, AppError> {
    let stats = dashboard.up_down_stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[get("/devices-down")]
pub async fn devices_down_route(
    dashboard: web::Data<Dashboard>,
    query: web::Query<DevicesDownQuery>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_DEVICES_DOWN_LIMIT);
    let devices = dashboard.devices_down(limit).await?;
    Ok(HttpResponse::Ok().json(devices))
}

/// Bucketed status history, `?hours=24&interval=60` by default
#[get("/uptime-graph")]
pub async fn uptime_graph_route(
    dashboard: web::Data<Dashboard>,
    query: web::Query<UptimeGraphQuery>,
) -> Result<HttpResponse, AppError> {
    let (hours, interval) = query.validated()?;
    let history = dashboard.uptime_history(hours, interval).await?;
    Ok(HttpResponse::Ok().json(history))
}
