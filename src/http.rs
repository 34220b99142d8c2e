pub use kikcore::net::{HttpClient, HttpRequest, HttpResponse};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Uploads content with `ureq`. The calls block, so each one runs on
/// tokio's blocking pool.
#[derive(Debug, Clone, Default)]
pub struct UreqHttpClient;

impl UreqHttpClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HttpClient for UreqHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        tokio::task::spawn_blocking(move || {
            let mut put = ureq::put(&request.url);
            for (key, value) in &request.headers {
                put = put.header(key, value);
            }
            match put.send(&request.body[..]) {
                Ok(response) => {
                    let status_code = response.status().as_u16();
                    let body = response.into_body().read_to_vec()?;
                    Ok(HttpResponse {
                        status_code,
                        body: Bytes::from(body),
                    })
                }
                // A rejected upload is reported by its status alone.
                Err(ureq::Error::StatusCode(code)) => Ok(HttpResponse::status_only(code)),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}
