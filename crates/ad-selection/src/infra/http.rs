use {
    crate::infra::config,
    thiserror::Error,
    url::Url,
};

const USER_AGENT: &str = concat!("ad-selection/", env!("CARGO_PKG_VERSION"));

/// Network access used to fetch ad tech logic and signals and to send
/// reporting notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// GETs `url` and returns the body.
    async fn fetch(&self, url: &Url) -> Result<String, Error>;

    /// Pings `url` once. Notifications with a body are POSTed, the others are
    /// plain GETs. The response body is ignored.
    async fn notify(&self, url: &Url, body: Option<String>) -> Result<(), Error>;
}

/// [`HttpClient`] backed by `reqwest` with a response size limit.
#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    response_size_limit: usize,
}

impl Client {
    pub fn new(config: &config::Http) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            response_size_limit: config.response_size_limit,
        })
    }
}

#[async_trait::async_trait]
impl HttpClient for Client {
    async fn fetch(&self, url: &Url) -> Result<String, Error> {
        send(self.response_size_limit, url, self.client.get(url.clone())).await
    }

    async fn notify(&self, url: &Url, body: Option<String>) -> Result<(), Error> {
        let request = match body {
            Some(body) => self
                .client
                .post(url.clone())
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(body),
            None => self.client.get(url.clone()),
        };
        request
            .send()
            .await
            .map_err(|err| unreachable(url, err))?
            .error_for_status()?;
        Ok(())
    }
}

async fn send(
    limit_bytes: usize,
    url: &Url,
    req: reqwest::RequestBuilder,
) -> Result<String, Error> {
    let mut res = req
        .send()
        .await
        .map_err(|err| unreachable(url, err))?
        .error_for_status()?;
    let mut data = Vec::new();
    while let Some(chunk) = res.chunk().await? {
        if data.len() + chunk.len() > limit_bytes {
            return Err(Error::ResponseTooLarge { limit_bytes });
        }
        data.extend_from_slice(&chunk);
    }
    String::from_utf8(data).map_err(Into::into)
}

/// Requests that never got a response are reported as unreachable.
fn unreachable(url: &Url, err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() {
        Error::Unreachable(url.clone())
    } else {
        err.into()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("response error: {0:?}")]
    Response(#[from] reqwest::Error),
    #[error("the response was too large, the limit was {limit_bytes} bytes")]
    ResponseTooLarge { limit_bytes: usize },
    #[error("the response could not be parsed as UTF-8: {0:?}")]
    NotUtf8(#[from] std::string::FromUtf8Error),
    #[error("no response from {0}")]
    Unreachable(Url),
}
