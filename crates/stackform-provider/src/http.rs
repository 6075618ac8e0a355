use crate::{
    Cloud, Connection, Fault, ImageApi, ImageSummary, ProviderConfig, ProviderError,
    ResourceSummary, StackApi, StackStatus, StackSummary,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stackform_schema::RegionName;
use std::io::Read;

/// Provider adapter speaking the Stackform gateway protocol.
///
/// - `GET    /regions`                               list region names
/// - `GET    /regions/<r>/stacks[?name=<s>]`         list live stacks
/// - `GET    /regions/<r>/stacks/<s>`                describe a stack
/// - `POST   /regions/<r>/stacks/<s>`                create (body: template document)
/// - `PUT    /regions/<r>/stacks/<s>`                update (body: template document)
/// - `DELETE /regions/<r>/stacks/<s>`                delete
/// - `GET    /regions/<r>/stacks/<s>/status`         current status token
/// - `GET    /regions/<r>/stacks/<s>/resources/<l>`  physical id of a resource
/// - `GET    /regions/<r>/images?tag=<k>&value=<v>`  images by tag
///
/// Faults come back as `{"code", "message"}` JSON with a 4xx/5xx status and
/// are classified by `ProviderError::from_fault`.
pub struct HttpCloud {
    client: Client,
}

impl HttpCloud {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub fn health(&self) -> Result<(), ProviderError> {
        let url = format!("{}/health", self.client.endpoint);
        self.client.get_text(&url).map(|_| ())
    }
}

impl Cloud for HttpCloud {
    fn regions(&self) -> Result<Vec<RegionName>, ProviderError> {
        let url = format!("{}/regions", self.client.endpoint);
        tracing::debug!("GET {url}");
        let names: Vec<String> = self.client.get_json(&url)?;
        Ok(names.into_iter().map(RegionName::from).collect())
    }

    fn connect(&self, region: &RegionName) -> Result<Box<dyn Connection>, ProviderError> {
        Ok(Box::new(HttpConnection {
            client: self.client.clone(),
            region: region.clone(),
        }))
    }
}

#[derive(Clone)]
struct Client {
    endpoint: String,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct StackIdBody {
    pub stack_id: String,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct StatusBody {
    pub status: StackStatus,
}

impl Client {
    fn new(config: &ProviderConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            auth_token: config.auth_token.clone(),
            agent: ureq::Agent::new_with_config(agent_config),
        }
    }

    fn decorate<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let req = req.header("X-Stackform-Protocol", &crate::PROTOCOL_VERSION.to_string());
        match self.auth_token {
            Some(ref token) => req.header("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }

    fn get_text(&self, url: &str) -> Result<String, ProviderError> {
        let result = self.decorate(self.agent.get(url)).call();
        read_response(url, result)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let body = self.get_text(url)?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Serialization(e.to_string()))
    }

    fn get_json_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let mut req = self.decorate(self.agent.get(url));
        for (k, v) in query {
            req = req.query(*k, *v);
        }
        let body = read_response(url, req.call())?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Serialization(e.to_string()))
    }

    fn send_document(&self, put: bool, url: &str, document: &str) -> Result<String, ProviderError> {
        let req = if put {
            self.agent.put(url)
        } else {
            self.agent.post(url)
        };
        let result = self
            .decorate(req)
            .header("Content-Type", "application/json")
            .send(document);
        let body = read_response(url, result)?;
        let parsed: StackIdBody =
            serde_json::from_str(&body).map_err(|e| ProviderError::Serialization(e.to_string()))?;
        Ok(parsed.stack_id)
    }

    fn delete(&self, url: &str) -> Result<(), ProviderError> {
        let result = self.decorate(self.agent.delete(url)).call();
        read_response(url, result).map(|_| ())
    }
}

fn read_response(
    url: &str,
    result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<String, ProviderError> {
    let resp = result.map_err(|e| ProviderError::Http(e.to_string()))?;
    let code = resp.status().as_u16();

    let mut reader = resp.into_body().into_reader();
    let mut body = String::new();
    reader
        .read_to_string(&mut body)
        .map_err(|e| ProviderError::Http(e.to_string()))?;

    if code >= 400 {
        if let Ok(fault) = serde_json::from_str::<Fault>(&body) {
            tracing::debug!("fault from {url}: {} {}", fault.code, fault.message);
            return Err(ProviderError::from_fault(fault.code, fault.message));
        }
        if code == 404 {
            return Err(ProviderError::NotFound {
                message: url.to_owned(),
            });
        }
        return Err(ProviderError::Http(format!("HTTP {code} for {url}")));
    }
    Ok(body)
}

/// Percent-encode one URL path segment.
fn segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

struct HttpConnection {
    client: Client,
    region: RegionName,
}

impl HttpConnection {
    fn stacks_url(&self) -> String {
        format!(
            "{}/regions/{}/stacks",
            self.client.endpoint,
            segment(&self.region)
        )
    }

    fn stack_url(&self, name: &str) -> String {
        format!("{}/{}", self.stacks_url(), segment(name))
    }
}

impl StackApi for HttpConnection {
    fn region(&self) -> &RegionName {
        &self.region
    }

    fn list_stacks(&self, name: Option<&str>) -> Result<Vec<StackSummary>, ProviderError> {
        let url = self.stacks_url();
        tracing::debug!("GET {url} name={name:?}");
        match name {
            Some(n) => self.client.get_json_query(&url, &[("name", n)]),
            None => self.client.get_json(&url),
        }
    }

    fn describe_stack(&self, name: &str) -> Result<StackSummary, ProviderError> {
        let url = self.stack_url(name);
        tracing::debug!("GET {url}");
        self.client.get_json(&url)
    }

    fn describe_stack_resource(
        &self,
        stack: &str,
        resource: &str,
    ) -> Result<ResourceSummary, ProviderError> {
        let url = format!("{}/resources/{}", self.stack_url(stack), segment(resource));
        tracing::debug!("GET {url}");
        self.client.get_json(&url)
    }

    fn create_stack(&self, name: &str, document: &str) -> Result<String, ProviderError> {
        let url = self.stack_url(name);
        tracing::debug!("POST {url} ({} bytes)", document.len());
        self.client.send_document(false, &url, document)
    }

    fn update_stack(&self, name: &str, document: &str) -> Result<String, ProviderError> {
        let url = self.stack_url(name);
        tracing::debug!("PUT {url} ({} bytes)", document.len());
        self.client.send_document(true, &url, document)
    }

    fn delete_stack(&self, name: &str) -> Result<(), ProviderError> {
        let url = self.stack_url(name);
        tracing::debug!("DELETE {url}");
        self.client.delete(&url)
    }

    fn stack_status(&self, name: &str) -> Result<StackStatus, ProviderError> {
        let url = format!("{}/status", self.stack_url(name));
        tracing::debug!("GET {url}");
        let body: StatusBody = self.client.get_json(&url)?;
        Ok(body.status)
    }
}

impl ImageApi for HttpConnection {
    fn find_images_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ImageSummary>, ProviderError> {
        let url = format!(
            "{}/regions/{}/images",
            self.client.endpoint,
            segment(&self.region)
        );
        tracing::debug!("GET {url} tag={key} value={value}");
        self.client
            .get_json_query(&url, &[("tag", key), ("value", value)])
    }
}
