use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,
    /// Device names to collect from; `"*"` collects from every
    /// discovered NVMe device.
    #[serde(default = "default_devices")]
    pub devices: Vec<String>,
    #[serde(default = "default_true")]
    pub collect_ebs: bool,
    #[serde(default = "default_true")]
    pub collect_instance_store: bool,
}

fn default_collection_interval() -> u64 {
    60
}

fn default_devices() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_applies_defaults() {
        let config: AgentConfig = toml::from_str(r#"agent_id = "host-1""#).unwrap();
        assert_eq!(config.agent_id, "host-1");
        assert_eq!(config.collection_interval_secs, 60);
        assert_eq!(config.devices, ["*"]);
        assert!(config.collect_ebs);
        assert!(config.collect_instance_store);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            agent_id = "host-2"
            collection_interval_secs = 15
            devices = ["nvme0n1", "nvme1n1"]
            collect_instance_store = false
            "#,
        )
        .unwrap();
        assert_eq!(config.collection_interval_secs, 15);
        assert_eq!(config.devices, ["nvme0n1", "nvme1n1"]);
        assert!(config.collect_ebs);
        assert!(!config.collect_instance_store);
    }

    #[test]
    fn load_reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "agent_id = \"host-3\"\n").unwrap();
        let config = AgentConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.agent_id, "host-3");
    }

    #[test]
    fn missing_agent_id_is_an_error() {
        assert!(toml::from_str::<AgentConfig>("collection_interval_secs = 5").is_err());
    }
}
