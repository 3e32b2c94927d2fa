use tracing::debug;

use crate::config::{config_dir, ApiConfig};
use crate::error::{Result, RosterError};

/// Try to run a shell command and capture stdout as a token
fn try_cli_token(command: &str) -> Option<String> {
    let output = std::process::Command::new("sh")
        .args(["-c", command])
        .output()
        .ok()?;

    if output.status.success() {
        non_empty(&String::from_utf8_lossy(&output.stdout))
    } else {
        None
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let token = raw.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Token saved by hand at ~/.config/roster/token
fn load_stored_token() -> Option<String> {
    let path = config_dir()?.join("token");
    non_empty(&std::fs::read_to_string(path).ok()?)
}

/// Find an access token, trying in order:
/// 1. the environment variable named by `token_env`
/// 2. the stored token file
/// 3. `token_command`
pub fn load_token(api: &ApiConfig) -> Result<String> {
    if let Some(env_var) = &api.token_env {
        if let Some(token) = std::env::var(env_var).ok().as_deref().and_then(non_empty) {
            debug!(source = %env_var, "using token from environment");
            return Ok(token);
        }
    }

    if let Some(token) = load_stored_token() {
        debug!("using stored token");
        return Ok(token);
    }

    if let Some(cmd) = &api.token_command {
        if let Some(token) = try_cli_token(cmd) {
            debug!("using token from command");
            return Ok(token);
        }
    }

    let hint = match &api.token_env {
        Some(var) => format!("set {} or configure api.token_command", var),
        None => "configure api.token_env or api.token_command".to_string(),
    };
    Err(RosterError::Auth(format!("no access token found ({})", hint)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty("  abc\n"), Some("abc".to_string()));
        assert_eq!(non_empty(" \n"), None);
    }

    #[test]
    fn cli_token_from_echo() {
        assert_eq!(try_cli_token("echo secret"), Some("secret".to_string()));
    }

    #[test]
    fn cli_token_failing_command() {
        assert_eq!(try_cli_token("exit 1"), None);
    }

    #[test]
    fn env_var_wins() {
        let var = "ROSTER_TEST_TOKEN_ENV_WINS";
        std::env::set_var(var, "from-env");
        let api = ApiConfig {
            token_env: Some(var.to_string()),
            token_command: Some("echo from-command".to_string()),
            ..ApiConfig::default()
        };
        assert_eq!(load_token(&api).unwrap(), "from-env");
        std::env::remove_var(var);
    }
}
