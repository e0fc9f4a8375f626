use std::{
    env,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use dotenv::dotenv;
use regex::{Captures, Regex};
use tracing::error;

use crate::manifest::config::WriterConfig;

pub const YAML_CONFIG_NAME: &str = "writer.yaml";

#[derive(thiserror::Error, Debug)]
pub enum ReadConfigError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse config: {0}")]
    CouldNotParseConfig(#[from] serde_yaml::Error),

    #[error("Could not substitute env variables: {0}")]
    CouldNotSubstituteEnvVariables(#[from] regex::Error),

    #[error("Environment variable {0} not found")]
    EnvironmentVariableNotFound(String),
}

/// Replaces `${NAME}` with the value of the environment variable `NAME`.
fn substitute_env_variables(contents: &str) -> Result<String, ReadConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}")?;

    let mut missing = None;
    let result = re.replace_all(contents, |caps: &Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(val) => val,
            Err(_) => {
                error!("Environment variable {} not found", var_name);
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(ReadConfigError::EnvironmentVariableNotFound(var_name)),
        None => Ok(result.into_owned()),
    }
}

pub fn parse_config(contents: &str) -> Result<WriterConfig, ReadConfigError> {
    let contents = substitute_env_variables(contents)?;
    let config: WriterConfig = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Reads the writer config, loading a `.env` file first so its variables can be referenced.
pub fn read_config(file_path: &Path) -> Result<WriterConfig, ReadConfigError> {
    dotenv().ok();

    let mut file = File::open(file_path)?;
    let mut contents = String::new();

    file.read_to_string(&mut contents)?;

    parse_config(&contents)
}

pub fn config_path(project_path: &Path) -> PathBuf {
    project_path.join(YAML_CONFIG_NAME)
}
