//! HTTP client for the municipal geodata download backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PreparationError, PreparationService, PreparedDownload};
use crate::catalog::Polygon;
use crate::config::PreparationConfig;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(Serialize)]
struct RegisterRequest<'a> {
    data: RegisterData<'a>,
}

#[derive(Serialize)]
struct RegisterData<'a> {
    coords: &'a Polygon,
    dataset: &'a str,
    option: u32,
}

#[derive(Deserialize)]
struct RegisterResponse {
    items: Option<RegisterItems>,
}

#[derive(Deserialize)]
struct RegisterItems {
    confirmation: Option<String>,
    /// Archive size in MiB.
    size: Option<f64>,
}

#[derive(Serialize)]
struct ConfirmRequest<'a> {
    mail: &'a str,
}

/// Geodata backend client.
pub struct GeodataPreparationClient {
    client: Client,
    config: PreparationConfig,
}

impl GeodataPreparationClient {
    /// Create a new client.
    pub fn new(config: PreparationConfig) -> Result<Self, PreparationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| PreparationError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn ensure_success(response: Response) -> Result<Response, PreparationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PreparationError::Http {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

/// Turn a register response into a prepared download.
fn parse_register_response(response: RegisterResponse) -> Result<PreparedDownload, PreparationError> {
    let items = response
        .items
        .ok_or_else(|| PreparationError::InvalidResponse("missing items".to_string()))?;
    let download_id = items
        .confirmation
        .filter(|c| !c.is_empty())
        .ok_or_else(|| PreparationError::InvalidResponse("missing confirmation id".to_string()))?;
    let size_mib = items
        .size
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| PreparationError::InvalidResponse("missing size".to_string()))?;

    Ok(PreparedDownload {
        download_id,
        size_bytes: (size_mib * BYTES_PER_MIB).round() as u64,
    })
}

#[async_trait]
impl PreparationService for GeodataPreparationClient {
    async fn prepare(&self, footprint: &Polygon) -> Result<PreparedDownload, PreparationError> {
        let url = format!("{}/geodownload-backend/app/register", self.base_url());
        let request = RegisterRequest {
            data: RegisterData {
                coords: footprint,
                dataset: &self.config.dataset,
                option: self.config.option,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let response = Self::ensure_success(response).await?;
        let body: RegisterResponse = response.json().await?;

        let prepared = parse_register_response(body)?;
        debug!(
            "Registered download {} ({} bytes)",
            prepared.download_id, prepared.size_bytes
        );
        Ok(prepared)
    }

    async fn request_confirmation(&self, download_id: &str) -> Result<(), PreparationError> {
        // The UI page sets the session cookies the backend expects
        let ui_url = format!("{}/geodownload-ui/confirm/{}", self.base_url(), download_id);
        self.client
            .get(&ui_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await?;

        let url = format!(
            "{}/geodownload-backend/app/confirm/{}",
            self.base_url(),
            download_id
        );
        let response = self
            .client
            .patch(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ORIGIN, self.base_url())
            .header(REFERER, format!("{}/", self.base_url()))
            .json(&ConfirmRequest {
                mail: &self.config.notification_email,
            })
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn confirm(&self, download_id: &str) -> Result<(), PreparationError> {
        let url = format!(
            "{}/geodownload-backend/app/mail/{}",
            self.base_url(),
            self.config.mail_confirmation_id
        );
        let response = self.client.patch(&url).send().await?;
        Self::ensure_success(response).await?;
        debug!("Confirmed notification address for download {}", download_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_shape() {
        let polygon = Polygon::new(vec![(1.0, 2.0), (3.0, 4.0), (1.0, 2.0)]);
        let request = RegisterRequest {
            data: RegisterData {
                coords: &polygon,
                dataset: "KAPPAZUNDER 2020",
                option: 2,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": {
                    "coords": [[1.0, 2.0], [3.0, 4.0], [1.0, 2.0]],
                    "dataset": "KAPPAZUNDER 2020",
                    "option": 2
                }
            })
        );
    }

    #[test]
    fn test_parse_register_response_converts_mib() {
        let body: RegisterResponse = serde_json::from_str(
            r#"{"items": {"confirmation": "5276d431-a054-4a84-a38c-6dfbccefdef0", "size": 1.5}}"#,
        )
        .unwrap();
        let prepared = parse_register_response(body).unwrap();
        assert_eq!(prepared.download_id, "5276d431-a054-4a84-a38c-6dfbccefdef0");
        assert_eq!(prepared.size_bytes, 1_572_864);
    }

    #[test]
    fn test_parse_register_response_missing_fields() {
        let body: RegisterResponse = serde_json::from_str(r#"{"items": {"size": 10}}"#).unwrap();
        assert!(matches!(
            parse_register_response(body),
            Err(PreparationError::InvalidResponse(_))
        ));

        let body: RegisterResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(parse_register_response(body).is_err());
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let client = GeodataPreparationClient::new(PreparationConfig {
            base_url: "https://mein.wien.gv.at/".to_string(),
            dataset: "KAPPAZUNDER 2020".to_string(),
            option: 2,
            notification_email: "me@example.com".to_string(),
            mail_confirmation_id: "token".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.base_url(), "https://mein.wien.gv.at");
    }

    mod http {
        use super::*;
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn client_for(server: &MockServer) -> GeodataPreparationClient {
            GeodataPreparationClient::new(PreparationConfig {
                base_url: server.uri(),
                dataset: "KAPPAZUNDER 2020".to_string(),
                option: 2,
                notification_email: "me@example.com".to_string(),
                mail_confirmation_id: "mail-token".to_string(),
                timeout_secs: 5,
            })
            .unwrap()
        }

        #[tokio::test]
        async fn test_prepare_posts_footprint() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/geodownload-backend/app/register"))
                .and(body_json(serde_json::json!({
                    "data": {"coords": [[0.0, 0.0], [1.0, 1.0]], "dataset": "KAPPAZUNDER 2020", "option": 2}
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "items": {"confirmation": "dl-1", "size": 2}
                })))
                .expect(1)
                .mount(&server)
                .await;

            let client = client_for(&server);
            let prepared = client
                .prepare(&Polygon::new(vec![(0.0, 0.0), (1.0, 1.0)]))
                .await
                .unwrap();
            assert_eq!(prepared.download_id, "dl-1");
            assert_eq!(prepared.size_bytes, 2 * 1024 * 1024);
        }

        #[tokio::test]
        async fn test_prepare_http_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/geodownload-backend/app/register"))
                .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
                .mount(&server)
                .await;

            let result = client_for(&server)
                .prepare(&Polygon::new(vec![(0.0, 0.0)]))
                .await;
            assert!(matches!(
                result,
                Err(PreparationError::Http { status: 503, .. })
            ));
        }

        #[tokio::test]
        async fn test_confirmation_handshake() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/geodownload-ui/confirm/dl-1"))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("PATCH"))
                .and(path("/geodownload-backend/app/confirm/dl-1"))
                .and(body_json(serde_json::json!({"mail": "me@example.com"})))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("PATCH"))
                .and(path("/geodownload-backend/app/mail/mail-token"))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            let client = client_for(&server);
            client.request_confirmation("dl-1").await.unwrap();
            client.confirm("dl-1").await.unwrap();
        }
    }
}
