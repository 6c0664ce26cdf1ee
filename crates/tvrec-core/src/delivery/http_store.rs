//! Remote store over a small HTTP API, driven by libcurl.
//!
//! - `PUT  {base}/upload?chat=&name=&caption=&duration=[&reply_to=]` with the file as body
//! - `PUT  {base}/thumbnail?chat=&message=` with the JPEG cover of a stored video
//! - `POST {base}/forward`        `{"from_chat","message","to_chat","reply_to"}`
//! - `POST {base}/messages`       `{"chat","reply_to","text","buttons"}` -> `{"message"}`
//! - `POST {base}/messages/edit`  `{"chat","message","text","buttons"}` -> `{"modified"}`
//!
//! Stored items come back as `{"chat","message","location"}`. A 429 with
//! `Retry-After` becomes `StoreError::RateLimited`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::str;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::store::{ProgressFn, RemoteStore, StoredRef, UploadRequest};
use crate::job::{ChatId, MessageId};
use crate::retry::StoreError;
use crate::status::Button;

/// Delay assumed when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpStore {
    base: Url,
    token: Option<String>,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct ButtonBody<'a> {
    label: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct SendBody<'a> {
    chat: ChatId,
    reply_to: Option<MessageId>,
    text: &'a str,
    buttons: Vec<ButtonBody<'a>>,
}

#[derive(Serialize)]
struct EditBody<'a> {
    chat: ChatId,
    message: MessageId,
    text: &'a str,
    buttons: Vec<ButtonBody<'a>>,
}

#[derive(Serialize)]
struct ForwardBody {
    from_chat: ChatId,
    message: MessageId,
    to_chat: ChatId,
    reply_to: Option<MessageId>,
}

#[derive(Deserialize)]
struct SentMessage {
    message: MessageId,
}

#[derive(Deserialize)]
struct Edited {
    modified: bool,
}

struct Response {
    code: u32,
    body: Vec<u8>,
    retry_after: Option<Duration>,
}

fn buttons_body(buttons: &[Button]) -> Vec<ButtonBody<'_>> {
    buttons
        .iter()
        .map(|b| ButtonBody {
            label: &b.label,
            data: &b.data,
        })
        .collect()
}

/// `Retry-After` in delta-seconds form.
fn parse_retry_after(line: &str) -> Option<Duration> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("retry-after") {
        return None;
    }
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn check(resp: Response) -> Result<Vec<u8>, StoreError> {
    match resp.code {
        200..=299 => Ok(resp.body),
        429 => Err(StoreError::RateLimited(
            resp.retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
        )),
        code => Err(StoreError::Http(code)),
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(body).map_err(|e| StoreError::Other(format!("invalid store response: {}", e)))
}

impl HttpStore {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            token,
            request_timeout: Duration::from_secs(30),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|e| StoreError::Other(format!("bad endpoint {}: {}", path, e)))
    }

    fn headers(&self, content_type: &str) -> Result<curl::easy::List, StoreError> {
        let mut list = curl::easy::List::new();
        list.append(&format!("Content-Type: {}", content_type))?;
        // Disable 100-continue round trips.
        list.append("Expect:")?;
        if let Some(token) = &self.token {
            list.append(&format!("Authorization: Bearer {}", token))?;
        }
        Ok(list)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned + Send + 'static>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_vec(body).map_err(|e| StoreError::Other(e.to_string()))?;
        let headers = self.headers("application/json")?;
        let timeout = self.request_timeout;
        let resp = tokio::task::spawn_blocking(move || post_blocking(url.as_str(), headers, payload, timeout))
            .await
            .map_err(|e| StoreError::Other(format!("store task: {}", e)))??;
        decode(&check(resp)?)
    }

    /// Sets the cover image of a stored video.
    async fn attach_thumbnail(
        &self,
        item: &StoredRef,
        thumb: &std::path::Path,
        abort: &CancellationToken,
    ) -> Result<(), StoreError> {
        let mut url = self.endpoint("thumbnail")?;
        url.query_pairs_mut()
            .append_pair("chat", &item.chat.to_string())
            .append_pair("message", &item.message.to_string());
        let headers = self.headers("image/jpeg")?;
        let path = thumb.to_path_buf();
        let timeout = self.request_timeout;
        let abort = abort.clone();
        let resp = tokio::task::spawn_blocking(move || {
            put_file_blocking(&url, headers, &path, 64 * 1024, timeout, None, &abort)
        })
        .await
        .map_err(|e| StoreError::Other(format!("thumbnail task: {}", e)))??;
        check(resp).map(|_| ())
    }
}

/// Runs in the current thread; call from `spawn_blocking` if used from async code.
fn post_blocking(
    url: &str,
    headers: curl::easy::List,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<Response, StoreError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.post(true)?;
    easy.post_fields_copy(&payload)?;
    easy.http_headers(headers)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(timeout)?;
    perform(&mut easy, None, None)
}

/// File streamed as the request body.
struct UploadBody {
    file: File,
    total: u64,
    chunk: usize,
    progress: Option<ProgressFn>,
}

/// Performs the prepared transfer, collecting body and `Retry-After`.
/// With an `abort` token the transfer stops at the next callback once it is
/// cancelled; curl calls the progress callback about once a second even
/// while the socket is stalled.
fn perform(
    easy: &mut curl::easy::Easy,
    upload: Option<UploadBody>,
    abort: Option<&CancellationToken>,
) -> Result<Response, StoreError> {
    let mut body = Vec::new();
    let mut retry_after = None;
    let mut read_error: Option<std::io::Error> = None;
    if abort.is_some() {
        easy.progress(true)?;
    }
    let performed = {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.header_function(|line| {
            if let Ok(s) = str::from_utf8(line) {
                if let Some(d) = parse_retry_after(s) {
                    retry_after = Some(d);
                }
            }
            true
        })?;
        if let Some(abort) = abort {
            transfer.progress_function(move |_, _, _, _| !abort.is_cancelled())?;
        }
        if let Some(UploadBody {
            mut file,
            total,
            chunk,
            mut progress,
        }) = upload
        {
            let mut sent = 0u64;
            let read_error = &mut read_error;
            transfer.read_function(move |buf| {
                if abort.is_some_and(|a| a.is_cancelled()) {
                    return Err(curl::easy::ReadError::Abort);
                }
                let want = buf.len().min(chunk);
                match file.read(&mut buf[..want]) {
                    Ok(n) => {
                        sent += n as u64;
                        if n > 0 {
                            if let Some(progress) = progress.as_mut() {
                                progress(sent, total);
                            }
                        }
                        Ok(n)
                    }
                    Err(e) => {
                        *read_error = Some(e);
                        Err(curl::easy::ReadError::Abort)
                    }
                }
            })?;
        }
        transfer.perform()
    };
    if let Some(e) = read_error {
        return Err(StoreError::Io(e));
    }
    if let Err(e) = performed {
        if abort.is_some_and(|a| a.is_cancelled()) {
            return Err(StoreError::Aborted);
        }
        return Err(e.into());
    }
    let code = easy.response_code()?;
    Ok(Response {
        code,
        body,
        retry_after,
    })
}

/// PUTs the file at `path` to `url`. Runs in the current thread; call from
/// `spawn_blocking` if used from async code.
fn put_file_blocking(
    url: &Url,
    headers: curl::easy::List,
    path: &std::path::Path,
    chunk: usize,
    timeout: Duration,
    progress: Option<ProgressFn>,
    abort: &CancellationToken,
) -> Result<Response, StoreError> {
    let file = File::open(path)?;
    let total = file.metadata()?.len();
    let mut easy = curl::easy::Easy::new();
    easy.url(url.as_str())?;
    easy.upload(true)?;
    easy.in_filesize(total)?;
    easy.http_headers(headers)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    if !timeout.is_zero() {
        easy.timeout(timeout)?;
    }
    let body = UploadBody {
        file,
        total,
        chunk,
        progress,
    };
    perform(&mut easy, Some(body), Some(abort))
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn upload(&self, req: UploadRequest, progress: ProgressFn) -> Result<StoredRef, StoreError> {
        let mut url = self.endpoint("upload")?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("chat", &req.chat.to_string())
                .append_pair("name", &req.file_name)
                .append_pair("caption", &req.caption)
                .append_pair("duration", &format!("{:.0}", req.duration_secs.max(0.0)));
            if let Some(r) = req.reply_to {
                q.append_pair("reply_to", &r.to_string());
            }
        }
        let headers = self.headers("application/octet-stream")?;
        // A dropped upload future must still stop the blocking transfer.
        let _abort_on_drop = req.abort.clone().drop_guard();
        let abort = req.abort.clone();
        let path = req.path.clone();
        let chunk = req.chunk_bytes.max(1);
        let timeout = req.timeout;
        let resp = tokio::task::spawn_blocking(move || {
            put_file_blocking(&url, headers, &path, chunk, timeout, Some(progress), &abort)
        })
        .await
        .map_err(|e| StoreError::Other(format!("upload task: {}", e)))??;
        let stored: StoredRef = decode(&check(resp)?)?;

        if let Some(thumb) = req.thumbnail.as_deref() {
            if let Err(e) = self.attach_thumbnail(&stored, thumb, &req.abort).await {
                tracing::warn!(file = %req.file_name, "thumbnail upload failed: {}", e);
            }
        }
        Ok(stored)
    }

    async fn forward(
        &self,
        item: &StoredRef,
        to: ChatId,
        reply_to: Option<MessageId>,
    ) -> Result<StoredRef, StoreError> {
        self.post_json(
            "forward",
            &ForwardBody {
                from_chat: item.chat,
                message: item.message,
                to_chat: to,
                reply_to,
            },
        )
        .await
    }

    async fn send_text(
        &self,
        chat: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, StoreError> {
        let sent: SentMessage = self
            .post_json(
                "messages",
                &SendBody {
                    chat,
                    reply_to,
                    text,
                    buttons: buttons_body(buttons),
                },
            )
            .await?;
        Ok(sent.message)
    }

    async fn edit_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<bool, StoreError> {
        let edited: Edited = self
            .post_json(
                "messages/edit",
                &EditBody {
                    chat,
                    message,
                    text,
                    buttons: buttons_body(buttons),
                },
            )
            .await?;
        Ok(edited.modified)
    }
}
