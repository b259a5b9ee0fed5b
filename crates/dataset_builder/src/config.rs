use std::{env, path::PathBuf};
use tile_sampler::{Result, SamplerError};

const ENV_CATALOG_TOKEN: &str = "DATASET_CATALOG_TOKEN";
const ENV_CHECKPOINT_DIR: &str = "DATASET_CHECKPOINT_DIR";

/// Settings that only come from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub catalog_token: Option<String>,
    pub checkpoint_dir: Option<PathBuf>,
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            catalog_token: non_blank(ENV_CATALOG_TOKEN),
            checkpoint_dir: None,
        };

        if let Some(dir) = non_blank(ENV_CHECKPOINT_DIR) {
            let path = PathBuf::from(dir);

            // If the path already exists but is not a directory, reject early.
            if path.exists() && !path.is_dir() {
                return Err(SamplerError::Config(format!(
                    "Checkpoint path is not a directory: {}",
                    path.display()
                )));
            }
            config.checkpoint_dir = Some(path);
        }
        Ok(config)
    }
}
