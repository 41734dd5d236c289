//! OTP validation against the YubiCloud validation protocol.
//!
//! [`OtpValidator`] is the seam to the external validation service. The
//! bundled [`YubicoValidator`] is a thin `reqwest` client for the
//! `wsapi/2.0/verify` endpoint: it walks the configured hosts in order and
//! accepts an OTP only when a host answers `status=OK` and echoes back the same
//! `otp` and `nonce`. Request signing and response signature checks with the
//! API key are not performed here.

use super::token::Otp;
use crate::APP_USER_AGENT;
use async_trait::async_trait;
use rand::{Rng, distributions::Alphanumeric};
use reqwest::Client;
use secrecy::SecretString;
use std::{collections::HashMap, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

const VERIFY_PATH: &str = "/wsapi/2.0/verify";
const NONCE_LENGTH: usize = 32;
const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Statuses that say nothing about the OTP itself; the next host is tried.
const RETRYABLE_STATUSES: [&str; 2] = ["BACKEND_ERROR", "NOT_ENOUGH_ANSWERS"];

pub struct ValidationRequest<'a> {
    pub otp: &'a Otp,
    pub client_id: &'a str,
    pub api_key: &'a SecretString,
    pub hosts: &'a [String],
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("no validation hosts configured")]
    NoHosts,
    #[error("request to {host} failed: {source}")]
    Transport {
        host: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{host} answered HTTP {status}")]
    HttpStatus { host: String, status: u16 },
    #[error("malformed response from {host}: {reason}")]
    MalformedResponse { host: String, reason: String },
    #[error("{host} could not validate the OTP: {status}")]
    Unavailable { host: String, status: String },
}

#[async_trait]
pub trait OtpValidator: Send + Sync {
    /// Ask the validation service whether `request.otp` is genuine and fresh.
    ///
    /// `Ok(false)` is a definitive rejection; errors mean no host could give
    /// an answer.
    async fn check(&self, request: &ValidationRequest<'_>) -> Result<bool, ValidatorError>;
}

#[derive(Clone, Debug)]
pub struct YubicoValidator {
    client: Client,
    scheme: String,
}

impl YubicoValidator {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            client,
            scheme: "https".to_string(),
        })
    }

    /// Scheme used to reach the hosts, `https` unless overridden.
    #[must_use]
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    async fn query_host(
        &self,
        host: &str,
        request: &ValidationRequest<'_>,
        nonce: &str,
    ) -> Result<bool, ValidatorError> {
        let url = format!("{}://{}{}", self.scheme, host, VERIFY_PATH);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("id", request.client_id),
                ("otp", request.otp.as_str()),
                ("nonce", nonce),
            ])
            .send()
            .await
            .map_err(|source| ValidatorError::Transport {
                host: host.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(ValidatorError::HttpStatus {
                host: host.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| ValidatorError::Transport {
                host: host.to_string(),
                source,
            })?;

        let reply = parse_reply(&body);
        let status = reply
            .get("status")
            .ok_or_else(|| ValidatorError::MalformedResponse {
                host: host.to_string(),
                reason: "no status".to_string(),
            })?;

        if RETRYABLE_STATUSES.contains(&status.as_str()) {
            return Err(ValidatorError::Unavailable {
                host: host.to_string(),
                status: status.clone(),
            });
        }

        if status != "OK" {
            debug!("{host} rejected the OTP with status {status}");
            return Ok(false);
        }

        if reply.get("otp").map(String::as_str) != Some(request.otp.as_str()) {
            warn!("{host} answered for a different OTP");
            return Ok(false);
        }

        if reply.get("nonce").map(String::as_str) != Some(nonce) {
            warn!("{host} answered with a different nonce");
            return Ok(false);
        }

        Ok(true)
    }
}

#[async_trait]
impl OtpValidator for YubicoValidator {
    async fn check(&self, request: &ValidationRequest<'_>) -> Result<bool, ValidatorError> {
        let nonce = nonce();
        debug!(
            "Validating OTP of YubiKey \"{}\" against {} host(s)",
            request.otp.device_id(),
            request.hosts.len()
        );
        let mut last_error = ValidatorError::NoHosts;

        for host in request.hosts {
            match self.query_host(host, request, &nonce).await {
                Ok(valid) => return Ok(valid),
                Err(err) => {
                    warn!("YubiKey validation via {host} failed: {err}");
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }
}

fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// Parse the `key=value` lines of a verify response.
fn parse_reply(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const OTP: &str = "cccccbhuinjddihfvdvnkukldhgfbjjlvjkbibrdbfed";

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    /// Echoes the request's otp and nonce back with the given status.
    struct Echo(&'static str);

    impl Respond for Echo {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let params: HashMap<String, String> = request
                .url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let body = format!(
                "h=c2lnbmF0dXJl=\r\nt=2024-01-01T00:00:00Z0000\r\notp={}\r\nnonce={}\r\nstatus={}\r\n",
                params.get("otp").cloned().unwrap_or_default(),
                params.get("nonce").cloned().unwrap_or_default(),
                self.0,
            );
            ResponseTemplate::new(200).set_body_string(body)
        }
    }

    fn host(server: &MockServer) -> String {
        server.address().to_string()
    }

    async fn check(hosts: &[String]) -> Result<bool, ValidatorError> {
        let otp = Otp::parse(OTP).unwrap();
        let key = SecretString::from("c2VjcmV0".to_string());
        let validator = YubicoValidator::new().unwrap().with_scheme("http");
        validator
            .check(&ValidationRequest {
                otp: &otp,
                client_id: "4711",
                api_key: &key,
                hosts,
            })
            .await
    }

    #[test]
    fn parse_reply_keeps_padding() {
        let reply = parse_reply("h=abc==\r\nstatus=OK\r\n\r\n");
        assert_eq!(reply.get("h").map(String::as_str), Some("abc=="));
        assert_eq!(reply.get("status").map(String::as_str), Some("OK"));
    }

    #[test]
    fn nonce_is_alphanumeric() {
        let value = nonce();
        assert_eq!(value.len(), NONCE_LENGTH);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn accepts_ok_status() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERIFY_PATH))
            .and(query_param("id", "4711"))
            .and(query_param("otp", OTP))
            .respond_with(Echo("OK"))
            .expect(1)
            .mount(&server)
            .await;

        assert!(check(&[host(&server)]).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_replayed_otp_without_failover() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERIFY_PATH))
            .respond_with(Echo("REPLAYED_OTP"))
            .expect(1)
            .mount(&first)
            .await;
        Mock::given(method("GET"))
            .and(path(VERIFY_PATH))
            .respond_with(Echo("OK"))
            .expect(0)
            .mount(&second)
            .await;

        assert!(!check(&[host(&first), host(&second)]).await.unwrap());
    }

    #[tokio::test]
    async fn fails_over_on_backend_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERIFY_PATH))
            .respond_with(Echo("BACKEND_ERROR"))
            .expect(1)
            .mount(&first)
            .await;
        Mock::given(method("GET"))
            .and(path(VERIFY_PATH))
            .respond_with(Echo("OK"))
            .expect(1)
            .mount(&second)
            .await;

        assert!(check(&[host(&first), host(&second)]).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_mismatched_nonce() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERIFY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "otp={OTP}\r\nnonce=somebodyelsesnonce\r\nstatus=OK\r\n"
            )))
            .mount(&server)
            .await;

        assert!(!check(&[host(&server)]).await.unwrap());
    }

    #[tokio::test]
    async fn errors_when_every_host_fails() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERIFY_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = check(&[host(&server)]).await.unwrap_err();
        assert!(matches!(err, ValidatorError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn errors_without_hosts() {
        assert!(matches!(check(&[]).await, Err(ValidatorError::NoHosts)));
    }
}
