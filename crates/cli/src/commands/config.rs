//! Configuration commands

use std::io::Write;

use anyhow::Result;

use crate::config::Config;
use crate::output::OutputFormat;

/// Write the effective configuration with secrets redacted
pub fn view(config: &Config, format: OutputFormat, mut out: impl Write) -> Result<()> {
    let config = config.redacted();
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?,
        OutputFormat::Table | OutputFormat::Yaml => {
            out.write_all(serde_yaml::to_string(&config)?.as_bytes())?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_redacts_token() {
        let config = Config {
            api_url: Some("http://localhost/v1/".into()),
            token: Some("secret".into()),
            default_namespace: None,
        };

        let mut out = Vec::new();
        view(&config, OutputFormat::Yaml, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("api_url: http://localhost/v1/"));
        assert!(!text.contains("secret"));
        assert!(!text.contains("default_namespace"));
    }
}
