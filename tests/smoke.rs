use hire_gw::config::AppConfig;
use hire_gw::server::build_app;
use std::sync::Arc;

#[test]
fn dev_config_loads_with_all_services() {
    let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let path = manifest_dir.join("config").join("dev.yaml");
    let config = AppConfig::load_from_file(path).expect("dev config should load");

    assert_eq!(config.listen, "127.0.0.1:8080");
    assert_eq!(config.services.auth.base_url, "http://localhost:3001");
    assert_eq!(config.services.jobs.base_url, "http://localhost:3002");
    assert_eq!(
        config.services.applications.base_url,
        "http://localhost:3003"
    );
}

#[tokio::test]
async fn app_builds_from_dev_config() {
    let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let path = manifest_dir.join("config").join("dev.yaml");
    let config = AppConfig::load_from_file(path).expect("dev config should load");

    build_app(Arc::new(config)).expect("app should build");
}
