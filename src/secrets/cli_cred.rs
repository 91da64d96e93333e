//! CLI credential-provider style gatherer: invokes a fixed CyberArk CLI
//! argument template and wraps stdout as `{password: <stdout>}`.

use std::process::Command;
use std::time::Duration;

use crate::duration::default_command_timeout;
use crate::error::{BindError, Result};
use crate::template::Value;

pub struct CliCredConfig {
    pub cli: String,
    pub app_id: String,
    pub safe: String,
    pub folder: String,
    pub object: String,
    pub timeout: Duration,
}

impl CliCredConfig {
    pub fn new(cli: String, app_id: String, safe: String, folder: String, object: String) -> CliCredConfig {
        CliCredConfig { cli, app_id, safe, folder, object, timeout: default_command_timeout() }
    }
}

pub fn fetch(config: &CliCredConfig) -> Result<Value> {
    let mut cmd = Command::new(&config.cli);
    cmd.arg("GetPassword")
        .arg("-p").arg(format!("AppDescs.AppID={}", config.app_id))
        .arg("-p").arg(format!("Query=Safe={};Folder={};Object={}", config.safe, config.folder, config.object))
        .arg("-o").arg("Password");

    let output = crate::procutil::run_with_timeout(cmd, config.timeout)
        .map_err(|e| BindError::provider("cyberark-cli", e))?;
    let output = match output {
        Some(o) => o,
        None => return Err(BindError::Timeout { provider: "cyberark-cli".to_string(), elapsed: config.timeout }),
    };

    if !output.success {
        return Err(BindError::provider("cyberark-cli", String::from_utf8_lossy(&output.stderr).into_owned()));
    }

    let password = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    if password.is_empty() {
        return Err(BindError::provider("cyberark-cli", "empty password returned by CLI"));
    }

    let mut map = std::collections::BTreeMap::new();
    map.insert("password".to_string(), Value::Scalar(password));
    Ok(Value::Map(map))
}
