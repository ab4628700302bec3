//! `bilbot parse <file>`: replay a saved model answer offline.

use std::path::Path;

use anyhow::{Context, Result};

use bilbot_config::BilboConfig;
use bilbot_ingest::{derive, parse_text, DerivationPolicy, ParseFailure};

pub async fn run(config: &BilboConfig, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}", render(config, &text)?);
    Ok(())
}

fn render(config: &BilboConfig, text: &str) -> Result<String> {
    let intermediate = match parse_text(text) {
        Ok(record) => record,
        Err(ParseFailure::NoExtractableData) => anyhow::bail!("no items and no total found in the response"),
        Err(other) => return Err(other.into()),
    };
    let policy = DerivationPolicy::from_config(&config.extraction);
    let record = derive(intermediate, &policy)?;
    Ok(serde_json::to_string_pretty(&record)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_structured_answer() {
        let answer = r#"```json
{"store": "Corner Shop", "items": [{"description": "Bread", "price": "2.50"}], "total": "2.50", "currency": "EUR"}
```"#;
        let json = render(&BilboConfig::default(), answer).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["store"], "Corner Shop");
        assert_eq!(value["currency"], "EUR");
        assert_eq!(value["reconciliation_mismatch"], false);
    }

    #[test]
    fn empty_answer_is_an_error() {
        let err = render(&BilboConfig::default(), "I cannot read this image.").unwrap_err();
        assert!(err.to_string().contains("no items and no total"));
    }
}
