use clap::Parser;

/// Command-line and environment configuration for the Hearth MCP server.
#[derive(Debug, Parser)]
#[command(
    name = "hearth-mcp",
    about = "Home Assistant configuration MCP server with a dry-run + confirm write path",
    version
)]
pub struct Cli {
    /// Base URL of the Home Assistant instance.
    #[arg(long, env = "HEARTH_URL", default_value = "http://homeassistant.local:8123")]
    pub url: String,

    /// Long-lived access token used by both the WebSocket and REST channels.
    #[arg(long, env = "HEARTH_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Approve mutations when the connected client cannot prompt a human.
    /// Deny is the default.
    #[arg(long, env = "HEARTH_APPROVE_UNSUPPORTED")]
    pub approve_unsupported: bool,

    /// Per-command response timeout on the WebSocket channel, in milliseconds.
    #[arg(long, env = "HEARTH_COMMAND_TIMEOUT_MS", default_value_t = 30_000)]
    pub command_timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn defaults_apply_when_only_token_is_given() {
        let cli = Cli::try_parse_from(["hearth-mcp", "--token", "abc"]).expect("parse");
        assert_eq!(cli.url, "http://homeassistant.local:8123");
        assert!(!cli.approve_unsupported);
        assert_eq!(cli.command_timeout_ms, 30_000);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "hearth-mcp",
            "--token",
            "abc",
            "--url",
            "https://ha.example.org",
            "--approve-unsupported",
            "--command-timeout-ms",
            "5000",
        ])
        .expect("parse");
        assert_eq!(cli.url, "https://ha.example.org");
        assert!(cli.approve_unsupported);
        assert_eq!(cli.command_timeout_ms, 5_000);
    }
}
