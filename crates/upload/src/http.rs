//! HTTP implementation of [`StorageApi`].
//!
//! Async client using `reqwest` with optional Bearer token authentication.

use bytes::Bytes;
use futures_util::StreamExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, HeaderValue,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use strato_protocol::constants::PROGRESS_SLICE_SIZE;
use strato_protocol::messages::{
    CreateFolderRequest, NewFileParams, NewFilesRequest, NewFilesResponse, StartUploadRequest,
    StartUploadResponse,
};
use strato_protocol::types::{ContentRange, FileInfo};
use strato_transfer::ProgressFn;

use crate::api::{ApiFuture, StorageApi};
use crate::config::UploadConfig;
use crate::error::UploadError;

/// Storage server client.
pub struct HttpStorageApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStorageApi {
    /// Creates a client for `base_url`, sending `auth_token` as a Bearer token.
    pub fn new(base_url: &str, auth_token: Option<&str>) -> Result<Self, UploadError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| UploadError::InvalidConfig("invalid auth token".into()))?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &UploadConfig) -> Result<Self, UploadError> {
        Self::new(&config.server_url, config.auth_token.as_deref())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        share_id: Option<&str>,
        accepted: &[StatusCode],
    ) -> Result<R, UploadError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self
            .http
            .post(self.url(path))
            .query(&share_query(share_id))
            .json(body)
            .send()
            .await?;
        let resp = expect_status(resp, accepted).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl StorageApi for HttpStorageApi {
    fn start_upload<'a>(
        &'a self,
        root_folder_id: &'a str,
        chunk_size: u64,
        share_id: Option<&'a str>,
    ) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let req = StartUploadRequest {
                root_folder_id: root_folder_id.to_string(),
                chunk_size,
            };
            let resp: StartUploadResponse = self
                .post_json(
                    "/upload",
                    &req,
                    share_id,
                    &[StatusCode::OK, StatusCode::CREATED],
                )
                .await?;
            if resp.upload_id.is_empty() {
                return Err(UploadError::Structural(
                    "server returned an empty upload id".into(),
                ));
            }
            Ok(resp.upload_id)
        })
    }

    fn add_files_to_upload<'a>(
        &'a self,
        upload_id: &'a str,
        files: Vec<NewFileParams>,
        share_id: Option<&'a str>,
    ) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            let req = NewFilesRequest { new_files: files };
            let resp: NewFilesResponse = self
                .post_json(
                    &format!("/upload/{}", encode(upload_id)),
                    &req,
                    share_id,
                    &[StatusCode::CREATED],
                )
                .await?;
            Ok(resp.file_ids)
        })
    }

    fn upload_file_chunk<'a>(
        &'a self,
        upload_id: &'a str,
        file_id: &'a str,
        data: Bytes,
        range: ContentRange,
        share_id: Option<&'a str>,
        on_progress: ProgressFn,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let url = self.url(&format!(
                "/upload/{}/file/{}",
                encode(upload_id),
                encode(file_id)
            ));
            trace!(%url, %range, "PUT chunk");
            let len = data.len();
            let resp = self
                .http
                .put(url)
                .query(&share_query(share_id))
                .header(CONTENT_RANGE, range.to_string())
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(CONTENT_LENGTH, len)
                .body(progress_body(data, on_progress))
                .send()
                .await?;
            expect_status(resp, &[StatusCode::OK]).await?;
            Ok(())
        })
    }

    fn create_folder<'a>(
        &'a self,
        parent_folder_id: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, FileInfo> {
        Box::pin(async move {
            let req = CreateFolderRequest {
                parent_folder_id: parent_folder_id.to_string(),
                new_folder_name: name.to_string(),
            };
            self.post_json(
                "/folder",
                &req,
                None,
                &[StatusCode::OK, StatusCode::CREATED],
            )
            .await
        })
    }
}

/// Unreserved characters stay as they are in path segments.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

fn share_query(share_id: Option<&str>) -> Vec<(&'static str, &str)> {
    share_id.map(|id| vec![("shareID", id)]).unwrap_or_default()
}

async fn expect_status(
    resp: reqwest::Response,
    accepted: &[StatusCode],
) -> Result<reqwest::Response, UploadError> {
    let status = resp.status();
    if accepted.contains(&status) {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(UploadError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Streams `data` in fixed slices, reporting the running total as each is taken.
fn progress_body(data: Bytes, on_progress: ProgressFn) -> reqwest::Body {
    let slices: Vec<Bytes> = (0..data.len())
        .step_by(PROGRESS_SLICE_SIZE)
        .map(|start| data.slice(start..(start + PROGRESS_SLICE_SIZE).min(data.len())))
        .collect();
    let mut sent = 0u64;
    let stream = futures_util::stream::iter(slices).map(move |slice| {
        sent += slice.len() as u64;
        on_progress(sent);
        Ok::<_, std::io::Error>(slice)
    });
    reqwest::Body::wrap_stream(stream)
}
