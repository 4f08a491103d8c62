use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::QuestionnairePackageClient;
use crate::error::{PlanApplyError, Result};
use crate::model::resource_type;

/// Calls `POST {base}/Questionnaire/${operation}` with a Parameters body.
#[derive(Debug, Clone)]
pub struct HttpPackageClient {
    client: reqwest::blocking::Client,
}

impl HttpPackageClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlanApplyError::http_error(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn operation_url(base_url: &str, operation: &str) -> Result<Url> {
        let url = format!(
            "{}/Questionnaire/${}",
            base_url.trim_end_matches('/'),
            operation.trim_start_matches('$')
        );
        Ok(Url::parse(&url)?)
    }
}

impl QuestionnairePackageClient for HttpPackageClient {
    fn fetch_package(&self, base_url: &str, operation: &str, parameters: &Value) -> Result<Value> {
        let url = Self::operation_url(base_url, operation)?;
        tracing::debug!("Calling {}", url);

        let response = self
            .client
            .post(url.clone())
            .header("Content-Type", "application/fhir+json")
            .header("Accept", "application/fhir+json")
            .json(parameters)
            .send()
            .map_err(|e| PlanApplyError::http_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlanApplyError::http_error(format!("{url} returned {status}")));
        }

        let bundle: Value = response
            .json()
            .map_err(|e| PlanApplyError::http_error(e.to_string()))?;
        match resource_type(&bundle) {
            Some("Bundle") => Ok(bundle),
            other => Err(PlanApplyError::package(format!(
                "{url} returned {} instead of a Bundle",
                other.unwrap_or("no resource")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_url() {
        let url = HttpPackageClient::operation_url("http://example.org/fhir/", "$questionnaire-package")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.org/fhir/Questionnaire/$questionnaire-package"
        );
        assert!(HttpPackageClient::operation_url("not a url", "op").is_err());
    }
}
