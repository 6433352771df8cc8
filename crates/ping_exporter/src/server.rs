//! HTTP exposition of the ping metrics.

use std::io::Error as IoError;

use actix_web::{App, HttpResponse, HttpServer, web};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{error, info};

use crate::config::Web;

/// Shared state behind the HTTP routes.
pub struct MetricsState {
    registry: Registry,
    telemetry_path: String,
}

impl MetricsState {
    pub fn new(registry: Registry, telemetry_path: impl Into<String>) -> web::Data<Self> {
        web::Data::new(Self { registry, telemetry_path: telemetry_path.into() })
    }
}

/// Landing page at `/` and the metrics route at `telemetry_path`.
pub fn routes(telemetry_path: String) -> impl Fn(&mut web::ServiceConfig) + Clone + Send + 'static {
    move |cfg: &mut web::ServiceConfig| {
        cfg.route("/", web::get().to(index_route))
            .route(&telemetry_path, web::get().to(metrics_route));
    }
}

/// Prometheus text exposition of everything in `registry`.
pub fn render(registry: &Registry) -> prometheus::Result<String> {
    TextEncoder::new().encode_to_string(&registry.gather())
}

async fn index_route(state: web::Data<MetricsState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(landing_page(&state.telemetry_path))
}

async fn metrics_route(state: web::Data<MetricsState>) -> HttpResponse {
    let encoder = TextEncoder::new();
    match render(&state.registry) {
        Ok(body) => HttpResponse::Ok().content_type(encoder.format_type()).body(body),
        Err(e) => {
            error!("failed to encode metrics: {e}");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        r#"<html>
<head><title>ping Exporter (Version {version})</title></head>
<body>
<h1>ping Exporter</h1>
<p><a href="{telemetry_path}">Metrics</a></p>
</body>
</html>"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}

/// Serve until the server is stopped (SIGINT/SIGTERM by default).
pub async fn serve(web_config: &Web, registry: Registry) -> Result<(), IoError> {
    let state = MetricsState::new(registry, web_config.telemetry_path.clone());
    let routes = routes(web_config.telemetry_path.clone());

    info!("Listening for {} on {}", web_config.telemetry_path, web_config.listen_address);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes.clone()))
        .bind(web_config.listen_address)?
        .run()
        .await
}
