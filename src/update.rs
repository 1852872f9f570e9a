//! Update check against a published version manifest.

use std::cmp::Ordering;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::UpdateConfig;
use crate::error::{AssistantError, Result};

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct VersionManifest {
    #[serde(default = "default_manifest_version")]
    version: String,
}

fn default_manifest_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate { current: String },
    Available { current: String, latest: String },
    /// Newer, but the user chose to skip this version.
    Skipped { latest: String },
}

/// Dotted numeric comparison. Non-digits in a component are ignored, missing
/// components count as 0, and a component with no digits at all makes the
/// versions compare equal.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.trim().split('.').collect();
    let right: Vec<&str> = b.trim().split('.').collect();

    for i in 0..left.len().max(right.len()) {
        let (Some(x), Some(y)) = (component(left.get(i)), component(right.get(i))) else {
            return Ordering::Equal;
        };
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn component(part: Option<&&str>) -> Option<u64> {
    let Some(part) = part else {
        return Some(0);
    };
    let digits: String = part.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub struct UpdateChecker {
    manifest_url: String,
    current_version: String,
    client: Client,
}

impl UpdateChecker {
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            manifest_url: config.manifest_url.clone(),
            current_version: CURRENT_VERSION.to_string(),
            client,
        })
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.manifest_url.trim().is_empty()
    }

    /// Fetch the manifest and compare. `skipped` is the version the user asked not to hear about.
    pub async fn check(&self, skipped: Option<&str>) -> Result<UpdateStatus> {
        if !self.is_configured() {
            return Err(AssistantError::Config("no update manifest configured".into()));
        }

        let resp = self
            .client
            .get(&self.manifest_url)
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .inspect_err(|e| warn!("Update check failed: {e}"))?;

        if resp.status() != StatusCode::OK {
            let status = resp.status();
            warn!("Version manifest returned {status}");
            return Err(AssistantError::Remote {
                status: status.as_u16(),
                message: format!("version manifest unavailable ({status})"),
            });
        }

        let manifest: VersionManifest = resp.json().await?;
        let latest = manifest.version;
        debug!("Current: {} | Latest: {latest}", self.current_version);

        if compare_versions(&latest, &self.current_version) != Ordering::Greater {
            return Ok(UpdateStatus::UpToDate {
                current: self.current_version.clone(),
            });
        }
        if skipped == Some(latest.as_str()) {
            info!("Version {latest} was skipped");
            return Ok(UpdateStatus::Skipped { latest });
        }

        info!("New version available: {latest}");
        Ok(UpdateStatus::Available {
            current: self.current_version.clone(),
            latest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::serve;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn compares_dotted_versions() {
        assert_eq!(compare_versions("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("v1.3.1", "1.3.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.4-beta", "1.4"), Ordering::Equal);
    }

    #[test]
    fn unparsable_versions_compare_equal() {
        assert_eq!(compare_versions("1.x.0", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("", "0.1.0"), Ordering::Equal);
    }

    async fn checker(version: &'static str) -> UpdateChecker {
        let router = Router::new().route(
            "/version.json",
            get(move || async move { Json(json!({ "version": version })) }),
        );
        let base = serve(router).await;
        UpdateChecker::new(&UpdateConfig {
            enabled: true,
            manifest_url: format!("{base}/version.json"),
            timeout_secs: 5,
        })
        .unwrap()
        .with_current_version("1.2.0")
    }

    #[tokio::test]
    async fn reports_newer_version() {
        let status = checker("1.3.0").await.check(None).await.unwrap();
        assert_eq!(
            status,
            UpdateStatus::Available {
                current: "1.2.0".into(),
                latest: "1.3.0".into()
            }
        );
    }

    #[tokio::test]
    async fn same_version_is_up_to_date() {
        let status = checker("1.2.0").await.check(Some("1.2.0")).await.unwrap();
        assert_eq!(
            status,
            UpdateStatus::UpToDate {
                current: "1.2.0".into()
            }
        );
    }

    #[tokio::test]
    async fn skipped_version_is_reported_as_skipped() {
        let status = checker("1.3.0").await.check(Some("1.3.0")).await.unwrap();
        assert_eq!(
            status,
            UpdateStatus::Skipped {
                latest: "1.3.0".into()
            }
        );
    }

    #[tokio::test]
    async fn unconfigured_manifest_is_config_error() {
        let checker = UpdateChecker::new(&UpdateConfig::default()).unwrap();
        assert!(matches!(
            checker.check(None).await,
            Err(AssistantError::Config(_))
        ));
    }
}
