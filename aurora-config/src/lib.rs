use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub discovery_port: u16,
    pub mining_interval_secs: u64,
    pub role: RoleConfig,
    pub wallet_path: String,
    #[serde(default)]
    pub peer_seeds: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleConfig {
    Leader,
    User,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("AURORA").separator("__"));
        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn example() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 7000,
            discovery_port: 9000,
            mining_interval_secs: 10,
            role: RoleConfig::User,
            wallet_path: "my_wallet.txt".into(),
            peer_seeds: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_from_toml_file() {
        let file = fixture(
            r#"
            host = "0.0.0.0"
            port = 7000
            discovery_port = 9000
            mining_interval_secs = 10
            role = "leader"
            wallet_path = "wallet.txt"
            "#,
        );
        let cfg = NodeConfig::load(file.path()).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.role, RoleConfig::Leader);
    }

    #[test]
    fn environment_overlay_wins() {
        let file = fixture(
            r#"
            host = "0.0.0.0"
            port = 7000
            discovery_port = 9000
            mining_interval_secs = 10
            role = "user"
            wallet_path = "wallet.txt"
            "#,
        );
        std::env::set_var("AURORA__PORT", "7999");
        let cfg = NodeConfig::load(file.path()).unwrap();
        std::env::remove_var("AURORA__PORT");
        assert_eq!(cfg.port, 7999);
    }
}
