use super::ControllerConfig;

/// Apply `FLEETD_*` environment variable overrides, mirroring the teacher's
/// `KNHK_*` convention in `knhk-config::env::apply_env_overrides`.
pub fn apply_env_overrides(config: &mut ControllerConfig) {
    if let Ok(val) = std::env::var("FLEETD_CLUSTER_NAME") {
        config.cluster_name = val;
    }
    if let Ok(val) = std::env::var("NODENAME") {
        config.node_name = Some(val);
    }
    if let Ok(val) = std::env::var("FLEETD_LISTEN_ADDR") {
        config.listen_addr = val;
    }
    if let Ok(val) = std::env::var("FLEETD_STATE_SAVE_DIR") {
        config.state_save_dir = val.into();
    }
    if let Ok(val) = std::env::var("FLEETD_AGENT_TIMEOUT_SECS") {
        if let Ok(secs) = val.parse() {
            config.scheduler.agent_timeout_secs = secs;
        }
    }
    if let Ok(val) = std::env::var("FLEETD_DEFER") {
        config.scheduler.defer = val == "1" || val.eq_ignore_ascii_case("true");
    }
}
