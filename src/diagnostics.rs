//! Health checks for the datasource configuration page.

use std::convert::Infallible;

use grafana_plugin_sdk::backend;
use tracing::debug;

use crate::DatasourceSettings;
use crate::OpenObservePlugin;

/// Message shown in the UI when the configured endpoint answers.
const HEALTHY_MESSAGE: &str = "Data source is working";

#[tonic::async_trait]
impl backend::DiagnosticsService for OpenObservePlugin {
    type CheckHealthError = Infallible;

    /// Connects to the configured endpoint with the saved credentials. Any
    /// failure is reported as an unhealthy datasource, never as a plugin
    /// error.
    async fn check_health(
        &self,
        request: backend::CheckHealthRequest<Self>,
    ) -> Result<backend::CheckHealthResponse, Self::CheckHealthError> {
        let Some(instance_settings) = request.plugin_context.instance_settings.as_ref() else {
            return Ok(backend::CheckHealthResponse::error(
                "datasource instance settings are missing".to_string(),
            ));
        };
        let settings = match DatasourceSettings::from_instance(instance_settings) {
            Ok(settings) => settings,
            Err(error) => return Ok(backend::CheckHealthResponse::error(error.to_string())),
        };

        debug!(url = %settings.url, "checking datasource health");
        match self.client(&settings).health_check().await {
            Ok(()) => Ok(backend::CheckHealthResponse::ok(
                HEALTHY_MESSAGE.to_string(),
            )),
            Err(error) => Ok(backend::CheckHealthResponse::error(error.to_string())),
        }
    }

    type CollectMetricsError = Infallible;

    async fn collect_metrics(
        &self,
        _request: backend::CollectMetricsRequest<Self>,
    ) -> Result<backend::CollectMetricsResponse, Self::CollectMetricsError> {
        Ok(backend::CollectMetricsResponse::new(None))
    }
}
