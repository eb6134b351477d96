//! Service monitoring endpoints: `/health` for liveness probes and
//! `/metrics` for per-endpoint request statistics.

use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn overall_error_rate(metrics: &AppMetrics) -> f64 {
    if metrics.request_count == 0 {
        return 0.0;
    }
    metrics.error_count as f64 / metrics.request_count as f64
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": "acoustics-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "bind": format!("{}:{}", config.server.host, config.server.port)
        },
        "sessions": {
            "active": metrics.active_sessions
        },
        "requests": {
            "total": metrics.request_count,
            "errors": metrics.error_count,
            "error_rate": overall_error_rate(&metrics)
        },
        "storage": {
            "recordings_dir": config.storage.recordings_dir,
            "recording_count": state.catalog.record_count()
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let endpoints: Vec<serde_json::Value> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms()
            })
        })
        .collect();

    let requests_per_second = if uptime_seconds > 0 {
        metrics.request_count as f64 / uptime_seconds as f64
    } else {
        0.0
    };

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": overall_error_rate(&metrics),
            "requests_per_second": requests_per_second,
            "active_sessions": metrics.active_sessions
        },
        "endpoints": endpoints,
        "recordings": {
            "total": state.catalog.record_count()
        }
    }))
}
