// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`RemoteFileSource`] over reqwest.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error};
use url::Url;

use courier_config::model::AttachmentConfig;
use courier_core::traits::{RemoteFile, RemoteFileSource};
use courier_core::CourierError;

use crate::ssrf::{SsrfBlocked, SsrfSafeResolver, check_url, parse_allowlist};

const MAX_REDIRECTS: usize = 5;

/// Downloads attachments over HTTP(S) with SSRF protection on every hop.
///
/// Timeouts and the byte ceiling are enforced by the pipeline, which owns
/// the stream.
pub struct HttpFileSource {
    client: reqwest::Client,
    allowed_private_ips: Vec<IpAddr>,
}

impl HttpFileSource {
    pub fn new(config: &AttachmentConfig) -> Result<Self, CourierError> {
        let allowed = parse_allowlist(&config.allowed_private_ips);
        let redirect_allowed = allowed.clone();
        let redirects = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
            }
            match check_url(attempt.url(), &redirect_allowed) {
                Ok(()) => attempt.follow(),
                Err(reason) => attempt.error(format!("redirect refused: {reason}")),
            }
        });

        let client = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .dns_resolver(Arc::new(SsrfSafeResolver::new(allowed.clone())))
            .redirect(redirects)
            .connect_timeout(config.download_timeout())
            .build()
            .map_err(|e| {
                error!("failed to build attachment HTTP client: {e}");
                CourierError::Config(format!("failed to build attachment HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            allowed_private_ips: allowed,
        })
    }
}

fn download_error(url: &str, message: impl Into<String>, retryable: bool) -> CourierError {
    CourierError::Download {
        url: url.to_string(),
        message: message.into(),
        retryable,
    }
}

fn is_ssrf_block(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.is::<SsrfBlocked>() {
            return true;
        }
        source = std::error::Error::source(cause);
    }
    false
}

/// Server-side trouble that may clear up on redelivery.
fn retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl RemoteFileSource for HttpFileSource {
    async fn fetch(&self, url: &str) -> Result<RemoteFile, CourierError> {
        let parsed =
            Url::parse(url).map_err(|e| download_error(url, format!("invalid URL: {e}"), false))?;
        check_url(&parsed, &self.allowed_private_ips)
            .map_err(|reason| download_error(url, format!("URL refused: {reason}"), false))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            // Refused redirects and SSRF-blocked hosts stay refused.
            .map_err(|e| {
                let retryable = e.is_timeout() || (e.is_connect() && !is_ssrf_block(&e));
                download_error(url, e.to_string(), retryable)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(
                url,
                format!("HTTP {status}"),
                retryable_status(status),
            ));
        }

        let content_length = response.content_length();
        debug!(url, ?content_length, "attachment download started");
        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| download_error(&owned_url, e.to_string(), true)));

        Ok(RemoteFile {
            content_length,
            body: Box::pin(body),
        })
    }
}
