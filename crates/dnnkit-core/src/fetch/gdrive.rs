//! Google Drive downloads with the large-file confirmation cookie.
//!
//! Files above the virus-scan size limit answer the first request with a
//! warning page and a `download_warning*` cookie; repeating the request with
//! `confirm=<cookie value>` on the same cookie session returns the file.

use super::http::{configure, stream_to_file};
use super::RemoteFetch;
use crate::config::FetchConfig;
use anyhow::{Context, Result};
use std::path::Path;
use url::Url;

pub const DRIVE_ENDPOINT: &str = "https://docs.google.com/uc";

const WARNING_COOKIE_PREFIX: &str = "download_warning";

#[derive(Debug, Clone)]
pub struct GoogleDrive {
    id: String,
    endpoint: String,
}

impl GoogleDrive {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_endpoint(id, DRIVE_ENDPOINT)
    }

    /// Same flow against another host (local test servers, mirrors).
    pub fn with_endpoint(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn request_url(&self, confirm: Option<&str>) -> Result<Url> {
        let mut params = vec![("export", "download"), ("id", self.id.as_str())];
        if let Some(token) = confirm {
            params.push(("confirm", token));
        }
        Url::parse_with_params(&self.endpoint, &params)
            .with_context(|| format!("invalid drive endpoint {}", self.endpoint))
    }
}

/// Extracts the confirmation token from curl's Netscape-format cookie list.
pub(crate) fn confirm_token<'a, I>(cookies: I) -> Option<String>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    cookies.into_iter().find_map(|line| {
        let line = std::str::from_utf8(line).ok()?;
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() < 7 {
            return None;
        }
        let (name, value) = (fields[5], fields[6]);
        name.starts_with(WARNING_COOKIE_PREFIX)
            .then(|| value.to_string())
    })
}

impl RemoteFetch for GoogleDrive {
    fn fetch_into(&self, dst: &Path, cfg: &FetchConfig) -> Result<u64> {
        let mut easy = curl::easy::Easy::new();
        configure(&mut easy, cfg)?;
        // Empty file name enables the in-memory cookie engine.
        easy.cookie_file("")?;

        let first = self.request_url(None)?;
        let mut size = stream_to_file(&mut easy, first.as_str(), dst, cfg)?;

        let cookies = easy.cookies().context("read drive cookies")?;
        if let Some(token) = confirm_token(cookies.iter()) {
            tracing::debug!(id = %self.id, "drive asked for download confirmation");
            let confirmed = self.request_url(Some(&token))?;
            size = stream_to_file(&mut easy, confirmed.as_str(), dst, cfg)?;
        }
        println!();
        Ok(size)
    }

    fn describe(&self) -> String {
        format!("gdrive:{}", self.id)
    }
}
