//! Check command implementation.

use crate::page::PageFile;
use livebind_core::{resolve_mode, Selector, TargetConfig};
use serde::Serialize;
use std::path::Path;

/// Outcome for one discovered element.
#[derive(Debug, Serialize)]
pub struct TargetReport {
    /// Element tag.
    pub tag: String,
    /// Resolved endpoint, if the configuration is valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Resolved mode, if the configuration is valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Configuration error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validates every target of a page without connecting.
pub fn check(page: &PageFile) -> Result<Vec<TargetReport>, Box<dyn std::error::Error>> {
    let config = page.engine_config()?;
    let selector = Selector::parse(&config.selector)?;
    let document = page.document();

    let reports = document
        .query_all(&selector)
        .iter()
        .map(|element| {
            match TargetConfig::from_element(
                element,
                config.base_url.as_ref(),
                config.default_interval,
            ) {
                Ok(target) => TargetReport {
                    tag: element.tag().to_owned(),
                    mode: Some(
                        resolve_mode(target.mode, &target.endpoint, config.mode_strategy)
                            .to_string(),
                    ),
                    endpoint: Some(target.endpoint),
                    error: None,
                },
                Err(err) => TargetReport {
                    tag: element.tag().to_owned(),
                    endpoint: None,
                    mode: None,
                    error: Some(err.to_string()),
                },
            }
        })
        .collect();
    Ok(reports)
}

/// Runs the check command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let page = PageFile::load(path)?;
    let reports = check(&page)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("Targets: {}", reports.len());
        for report in &reports {
            match (&report.endpoint, &report.mode, &report.error) {
                (Some(endpoint), Some(mode), _) => {
                    println!("  {:<8} {:<10} {}", report.tag, mode, endpoint)
                }
                (_, _, Some(error)) => println!("  {:<8} INVALID    {}", report.tag, error),
                _ => {}
            }
        }
    }

    let invalid = reports.iter().filter(|r| r.error.is_some()).count();
    if invalid > 0 {
        return Err(format!("{invalid} target(s) misconfigured").into());
    }
    Ok(())
}
