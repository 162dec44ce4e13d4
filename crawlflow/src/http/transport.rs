//! Transports perform the actual HTTP exchange for a request.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use tracing::{debug, trace};

use super::options::{self, ProxySetting, QuerySetting, RedirectPolicy, RequestOptions, TlsVerify};
use super::request::Request;
use super::response::RawResponse;
use crate::config::TransportConfig;
use crate::errors::TransportError;

const RECOGNISED_OPTIONS: [&str; 10] = [
    options::TIMEOUT,
    options::ALLOW_REDIRECTS,
    options::PROXY,
    options::HEADERS,
    options::QUERY,
    options::AUTH,
    options::VERIFY,
    options::BODY,
    options::JSON,
    options::FORM_PARAMS,
];

/// Performs one HTTP exchange.
///
/// Implementations return `Ok` whenever any HTTP reply was received,
/// whatever its status, and `Err` only when no reply was obtained.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the raw reply.
    async fn send(&self, request: &Request) -> Result<RawResponse, TransportError>;
}

/// Client settings that reqwest fixes per client rather than per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientProfile {
    redirects: RedirectPolicy,
    proxy: Option<ProxySetting>,
    verify: TlsVerify,
}

/// A [`Transport`] backed by `reqwest`.
///
/// One `reqwest::Client` is built per distinct combination of redirect
/// policy, proxy and TLS settings and shared by every exchange using it.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    config: TransportConfig,
    clients: DashMap<ClientProfile, reqwest::Client>,
}

impl ReqwestTransport {
    /// Creates a transport with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport with the given settings.
    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    /// The transport settings.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Number of distinct clients built so far.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn profile_for(&self, options: &RequestOptions) -> Result<ClientProfile, TransportError> {
        Ok(ClientProfile {
            redirects: options
                .allow_redirects()?
                .unwrap_or(RedirectPolicy::Limited(self.config.max_redirects)),
            proxy: options.proxy()?,
            verify: options.verify()?.unwrap_or(TlsVerify::Enabled(true)),
        })
    }

    async fn client_for(&self, profile: &ClientProfile) -> Result<reqwest::Client, TransportError> {
        let cached = self.clients.get(profile).map(|entry| entry.value().clone());
        if let Some(client) = cached {
            return Ok(client);
        }

        debug!(?profile, "Building HTTP client");
        let client = self.build_client(profile).await?;
        self.clients.insert(profile.clone(), client.clone());
        Ok(client)
    }

    async fn build_client(&self, profile: &ClientProfile) -> Result<reqwest::Client, TransportError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.config.default_headers {
            default_headers.insert(header_name(name)?, header_value(name, value)?);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(self.config.user_agent.clone())
            .default_headers(default_headers)
            .redirect(match profile.redirects {
                RedirectPolicy::Disabled => Policy::none(),
                RedirectPolicy::Limited(max) => Policy::limited(max),
            });

        if let Some(timeout) = self.config.connect_timeout()? {
            builder = builder.connect_timeout(timeout);
        }

        match &profile.proxy {
            None => {}
            Some(ProxySetting::All(url)) => builder = builder.proxy(reqwest::Proxy::all(url)?),
            Some(ProxySetting::PerScheme { http, https }) => {
                if let Some(url) = http {
                    builder = builder.proxy(reqwest::Proxy::http(url)?);
                }
                if let Some(url) = https {
                    builder = builder.proxy(reqwest::Proxy::https(url)?);
                }
            }
        }

        match &profile.verify {
            TlsVerify::Enabled(true) => {}
            TlsVerify::Enabled(false) => builder = builder.danger_accept_invalid_certs(true),
            TlsVerify::CaBundle(path) => {
                let pem = tokio::fs::read(path).await.map_err(|e| {
                    TransportError::invalid_options(format!("cannot read CA bundle {}", path.display()))
                        .with_source(e)
                })?;
                builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
            }
        }

        Ok(builder.build()?)
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        request: &Request,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let options = request.options();
        for key in options.iter().map(|(key, _)| key) {
            if !RECOGNISED_OPTIONS.contains(&key.as_str()) {
                trace!(option = %key, "Ignoring option unknown to the reqwest transport");
            }
        }

        let mut url = request.url().clone();
        match options.query()? {
            None => {}
            Some(QuerySetting::Raw(query)) if query.is_empty() => url.set_query(None),
            Some(QuerySetting::Raw(query)) => url.set_query(Some(&query)),
            Some(QuerySetting::Pairs(pairs)) => {
                url.set_query(None);
                if !pairs.is_empty() {
                    url.query_pairs_mut().extend_pairs(pairs);
                }
            }
        }

        let mut headers = HeaderMap::new();
        for (name, values) in request.headers().iter() {
            let name = header_name(name)?;
            for value in values {
                headers.append(name.clone(), header_value(name.as_str(), value)?);
            }
        }
        for (name, values) in options.headers()? {
            let name = header_name(&name)?;
            headers.remove(&name);
            for value in &values {
                headers.append(name.clone(), header_value(name.as_str(), value)?);
            }
        }

        let mut builder = client.request(request.method().clone(), url).headers(headers);

        let timeout = if options.contains(options::TIMEOUT) {
            options.timeout()?
        } else {
            self.config.default_timeout()?
        };
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(auth) = options.auth()? {
            builder = builder.basic_auth(auth.username, auth.password);
        }
        if let Some(json) = options.json() {
            builder = builder.json(json);
        } else if let Some(form) = options.form_params()? {
            builder = builder.form(&form);
        } else if let Some(body) = options.body()? {
            builder = builder.body(body);
        }

        Ok(builder)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<RawResponse, TransportError> {
        let profile = self.profile_for(request.options())?;
        let client = self.client_for(&profile).await?;
        let reply = self.build_request(&client, request)?.send().await?;

        let status = reply.status();
        let headers = reply.headers().clone();
        let url = reply.url().clone();
        let body = reply.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

fn header_name(name: &str) -> Result<HeaderName, TransportError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TransportError::invalid_options(format!("invalid header name '{name}'")).with_source(e))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::invalid_options(format!("invalid value for header '{name}'")).with_source(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spider::empty_stream;
    use serde_json::json;
    use std::time::Duration;

    fn request(url: &str) -> Request {
        Request::get(url, |_| empty_stream()).unwrap()
    }

    #[test]
    fn test_request_headers_and_option_headers_merge() {
        let transport = ReqwestTransport::new();
        let client = reqwest::Client::new();
        let req = request("https://example.com/")
            .with_header("Accept", "text/html")
            .unwrap()
            .with_header("X-Keep", "yes")
            .unwrap()
            .with_option(options::HEADERS, json!({"accept": "application/json"}));

        let built = transport.build_request(&client, &req).unwrap().build().unwrap();
        let accept: Vec<_> = built.headers().get_all("accept").iter().collect();
        assert_eq!(accept, vec!["application/json"]);
        assert_eq!(built.headers().get("x-keep").unwrap(), "yes");
    }

    #[test]
    fn test_query_option_replaces_uri_query() {
        let transport = ReqwestTransport::new();
        let client = reqwest::Client::new();
        let req = request("https://example.com/search?old=1")
            .with_option(options::QUERY, json!({"q": "rust", "page": 2}));

        let built = transport.build_request(&client, &req).unwrap().build().unwrap();
        assert_eq!(built.url().query(), Some("page=2&q=rust"));
    }

    #[test]
    fn test_timeout_and_auth_are_applied() {
        let transport = ReqwestTransport::new();
        let client = reqwest::Client::new();
        let req = request("https://example.com/")
            .with_option(options::TIMEOUT, 1.5)
            .with_option(options::AUTH, json!(["user", "pass"]));

        let built = transport.build_request(&client, &req).unwrap().build().unwrap();
        assert_eq!(built.timeout(), Some(&Duration::from_millis(1500)));
        assert!(built.headers().get("authorization").unwrap().to_str().unwrap().starts_with("Basic "));
    }

    #[test]
    fn test_unrepresentable_timeouts_fail_the_request() {
        let client = reqwest::Client::new();
        let huge_option = request("https://example.com/").with_option(options::TIMEOUT, 1e30);
        let err = ReqwestTransport::new().build_request(&client, &huge_option).unwrap_err();
        assert_eq!(err.kind(), crate::errors::TransportErrorKind::InvalidOptions);

        let huge_default = ReqwestTransport::with_config(TransportConfig::new().with_default_timeout(1e30));
        let err = huge_default
            .build_request(&client, &request("https://example.com/"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::TransportErrorKind::InvalidOptions);
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let transport = ReqwestTransport::new();
        let client = reqwest::Client::new();
        let req = request("https://example.com/")
            .with_method("POST")
            .unwrap()
            .with_option(options::JSON, json!({"k": "v"}));

        let built = transport.build_request(&client, &req).unwrap().build().unwrap();
        assert_eq!(built.headers().get("content-type").unwrap(), "application/json");
        assert_eq!(built.body().and_then(reqwest::Body::as_bytes), Some(&br#"{"k":"v"}"#[..]));
    }

    #[tokio::test]
    async fn test_clients_are_shared_per_profile() {
        let transport = ReqwestTransport::new();
        let plain = request("https://example.com/");
        let no_redirects = plain.with_option(options::ALLOW_REDIRECTS, false);

        let first = transport.profile_for(plain.options()).unwrap();
        let second = transport.profile_for(no_redirects.options()).unwrap();
        transport.client_for(&first).await.unwrap();
        transport.client_for(&first).await.unwrap();
        transport.client_for(&second).await.unwrap();

        assert_eq!(transport.client_count(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_ca_bundle_is_invalid_options() {
        let transport = ReqwestTransport::new();
        let req = request("https://example.com/").with_option(options::VERIFY, "/definitely/not/here.pem");
        let profile = transport.profile_for(req.options()).unwrap();

        let err = transport.client_for(&profile).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::TransportErrorKind::InvalidOptions);
    }
}
