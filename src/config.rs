use clap::Parser;
use std::net::SocketAddr;

/// Cricket match winner prediction service
#[derive(Parser, Debug, Clone)]
#[command(name = "cricket-predictor", version, about)]
pub struct Config {
    /// Path to the trained pipeline artifact (JSON). `model_info.json` is
    /// read from the same directory.
    #[arg(long, env = "MODEL_PATH", default_value = "models/cricket_model.json")]
    pub model_path: String,

    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: String,

    /// Load the model at startup instead of on the first request
    #[arg(
        long,
        env = "EAGER_LOAD",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub eager_load: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model_path.trim().is_empty() {
            anyhow::bail!("model_path must not be empty");
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("listen_addr '{}' is not a valid socket address", self.listen_addr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::parse_from(["cricket-predictor"]);
        assert_eq!(config.model_path, "models/cricket_model.json");
        assert!(config.eager_load);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_listen_addr() {
        let config = Config::parse_from(["cricket-predictor", "--listen-addr", "nowhere"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_model_path() {
        let config = Config::parse_from(["cricket-predictor", "--model-path", " "]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn eager_load_can_be_disabled() {
        let config = Config::parse_from(["cricket-predictor", "--eager-load", "false"]);
        assert!(!config.eager_load);
    }
}
