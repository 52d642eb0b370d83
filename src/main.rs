use grafana_openobserve_datasource::OpenObservePlugin;

#[grafana_plugin_sdk::main(
    services(data, diagnostics, resource),
    init_subscriber = true,
    shutdown_handler = "0.0.0.0:10001"
)]
async fn plugin() -> OpenObservePlugin {
    OpenObservePlugin::new().expect("failed to build HTTP client")
}
