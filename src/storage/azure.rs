//! Blob container access over the Azure REST surface.
//!
//! Authentication is a caller-supplied SAS query string appended to every
//! request; this module never signs anything itself. Listing drives the flat
//! enumeration API (`?restype=container&comp=list`) through `NextMarker`
//! pagination.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;

use super::{write_atomic, BlobStore};
use crate::core::errors::ApiError;

pub struct AzureBlobStore {
    container_url: String,
    sas_token: String,
    client: Client,
    name_re: Regex,
    marker_re: Regex,
}

impl AzureBlobStore {
    /// `container_url` addresses the container itself, e.g.
    /// `https://acct.blob.core.windows.net/nycc-codes`. `sas_token` is the
    /// raw query string (with or without the leading `?`), possibly empty
    /// for a public container.
    pub fn new(container_url: &str, sas_token: &str) -> Self {
        Self {
            container_url: container_url.trim_end_matches('/').to_string(),
            sas_token: sas_token.trim_start_matches('?').to_string(),
            client: Client::new(),
            name_re: Regex::new(r"<Name>([^<]+)</Name>").expect("static regex"),
            marker_re: Regex::new(r"<NextMarker>([^<]+)</NextMarker>").expect("static regex"),
        }
    }

    fn blob_url(&self, key: &str) -> String {
        let encoded = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if self.sas_token.is_empty() {
            format!("{}/{}", self.container_url, encoded)
        } else {
            format!("{}/{}?{}", self.container_url, encoded, self.sas_token)
        }
    }

    fn list_url(&self, prefix: &str, marker: Option<&str>) -> String {
        let mut url = format!(
            "{}?restype=container&comp=list&prefix={}",
            self.container_url,
            urlencoding::encode(prefix)
        );
        if let Some(marker) = marker {
            url.push_str("&marker=");
            url.push_str(&urlencoding::encode(marker));
        }
        if !self.sas_token.is_empty() {
            url.push('&');
            url.push_str(&self.sas_token);
        }
        url
    }

    fn parse_listing(&self, body: &str) -> (Vec<String>, Option<String>) {
        let names = self
            .name_re
            .captures_iter(body)
            .map(|c| unescape_xml(&c[1]))
            .collect();
        let marker = self
            .marker_re
            .captures(body)
            .map(|c| unescape_xml(&c[1]))
            .filter(|m| !m.is_empty());
        (names, marker)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ApiError> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let url = self.list_url(prefix, marker.as_deref());
            let res = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(ApiError::internal)?;

            if !res.status().is_success() {
                return Err(ApiError::Internal(format!(
                    "blob listing for prefix '{}' failed: {}",
                    prefix,
                    res.status()
                )));
            }

            let body = res.text().await.map_err(ApiError::internal)?;
            let (mut names, next) = self.parse_listing(&body);
            keys.append(&mut names);

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        let res = self
            .client
            .head(self.blob_url(key))
            .send()
            .await
            .map_err(ApiError::internal)?;

        match res.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(ApiError::Internal(format!(
                "existence check for '{}' failed: {}",
                key, status
            ))),
        }
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<(), ApiError> {
        let res = self
            .client
            .get(self.blob_url(key))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if res.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(key.to_string()));
        }
        if !res.status().is_success() {
            return Err(ApiError::Internal(format!(
                "download of '{}' failed: {}",
                key,
                res.status()
            )));
        }

        let bytes = res.bytes().await.map_err(ApiError::internal)?;
        write_atomic(local_path, &bytes).await
    }

    async fn stream(&self, key: &str) -> Result<mpsc::Receiver<Result<Bytes, ApiError>>, ApiError> {
        let res = self
            .client
            .get(self.blob_url(key))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if res.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(key.to_string()));
        }
        if !res.status().is_success() {
            return Err(ApiError::Internal(format!(
                "streaming of '{}' failed: {}",
                key,
                res.status()
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        if tx.send(Ok(bytes)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// The listing body is XML; blob names with reserved characters arrive
/// entity-escaped.
fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_marker_from_listing() {
        let store = AzureBlobStore::new("https://acct.blob.core.windows.net/codes", "sig=abc");
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults>
  <Blobs>
    <Blob><Name>vectorstores/ACI/2019/aci_318/index.bin</Name></Blob>
    <Blob><Name>vectorstores/ACI/2019/aci_318/docstore.json</Name></Blob>
    <Blob><Name>vectorstores/AAMA/2020/2605-20 &amp; errata/index.bin</Name></Blob>
  </Blobs>
  <NextMarker>2!marker</NextMarker>
</EnumerationResults>"#;

        let (names, marker) = store.parse_listing(body);
        assert_eq!(names.len(), 3);
        assert_eq!(names[0], "vectorstores/ACI/2019/aci_318/index.bin");
        assert_eq!(names[2], "vectorstores/AAMA/2020/2605-20 & errata/index.bin");
        assert_eq!(marker.as_deref(), Some("2!marker"));
    }

    #[test]
    fn final_listing_page_has_no_marker() {
        let store = AzureBlobStore::new("https://acct.blob.core.windows.net/codes", "");
        let body = "<EnumerationResults><Blobs></Blobs><NextMarker /></EnumerationResults>";
        let (names, marker) = store.parse_listing(body);
        assert!(names.is_empty());
        assert!(marker.is_none());
    }

    #[test]
    fn blob_url_encodes_segments_and_appends_sas() {
        let store = AzureBlobStore::new("https://acct.blob.core.windows.net/codes/", "?sig=abc");
        let url = store.blob_url("pdfs/ACI Codes/2019/ACI 318-19.pdf");
        assert_eq!(
            url,
            "https://acct.blob.core.windows.net/codes/pdfs/ACI%20Codes/2019/ACI%20318-19.pdf?sig=abc"
        );
    }
}
