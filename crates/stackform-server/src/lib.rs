//! Provider gateway backed by [`MockCloud`].
//!
//! Serves the routes `HttpCloud` speaks, so the CLI and the convergence
//! driver can be exercised end to end without a real cloud. Faults are sent
//! as `{"code", "message"}` bodies; a missing stack answers 404.
//!
//! The [`TestServer`] helper starts a gateway on a random port for integration testing.

use stackform_provider::{Cloud, Connection, MockCloud, ProviderError, PROTOCOL_VERSION};
use stackform_schema::RegionName;
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

/// Gateway state: the simulated cloud plus an optional required bearer token.
#[derive(Clone, Default)]
pub struct Gateway {
    cloud: MockCloud,
    auth_token: Option<String>,
}

impl Gateway {
    pub fn new(cloud: MockCloud) -> Self {
        Self {
            cloud,
            auth_token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn cloud(&self) -> &MockCloud {
        &self.cloud
    }
}

/// A parsed request path.
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    Health,
    Regions,
    Stacks { region: String },
    Stack { region: String, stack: String },
    Status { region: String, stack: String },
    Resource { region: String, stack: String, resource: String },
    Images { region: String },
}

/// Split `url` into a route and its decoded query pairs.
pub fn parse_route(url: &str) -> Option<(Route, Vec<(String, String)>)> {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let query = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (decode(k), decode(v))
        })
        .collect();

    let segments: Vec<String> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode)
        .collect();
    let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

    let route = match parts.as_slice() {
        ["health"] => Route::Health,
        ["regions"] => Route::Regions,
        ["regions", r, "stacks"] => Route::Stacks {
            region: (*r).to_owned(),
        },
        ["regions", r, "stacks", s] => Route::Stack {
            region: (*r).to_owned(),
            stack: (*s).to_owned(),
        },
        ["regions", r, "stacks", s, "status"] => Route::Status {
            region: (*r).to_owned(),
            stack: (*s).to_owned(),
        },
        ["regions", r, "stacks", s, "resources", l] => Route::Resource {
            region: (*r).to_owned(),
            stack: (*s).to_owned(),
            resource: (*l).to_owned(),
        },
        ["regions", r, "images"] => Route::Images {
            region: (*r).to_owned(),
        },
        _ => return None,
    };
    Some((route, query))
}

/// Percent-decode a path segment or query component.
fn decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| bytes.get(i + 1..i + 3))
            .flatten()
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        match (escaped, bytes[i]) {
            (Some(b), _) => {
                out.push(b);
                i += 3;
            }
            (None, b'+') => {
                out.push(b' ');
                i += 1;
            }
            (None, b) => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn header_value<'a>(req: &'a tiny_http::Request, name: &'static str) -> Option<&'a str> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str())
}

fn respond_json(req: tiny_http::Request, code: u16, body: &serde_json::Value) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(
        Response::from_string(body.to_string())
            .with_header(header)
            .with_status_code(StatusCode(code)),
    );
}

fn respond_fault(req: tiny_http::Request, code: u16, fault_code: &str, message: &str) {
    respond_json(
        req,
        code,
        &serde_json::json!({ "code": fault_code, "message": message }),
    );
}

fn respond_err(req: tiny_http::Request, err: &ProviderError) {
    let status = match err {
        ProviderError::NotFound { .. } => 404,
        ProviderError::NoUpdates { .. } | ProviderError::Fault { .. } => 400,
        _ => 500,
    };
    let fault = err.to_fault();
    debug!("fault {status}: {} {}", fault.code, fault.message);
    respond_fault(req, status, &fault.code, &fault.message);
}

fn read_body(req: &mut tiny_http::Request) -> Option<String> {
    let mut body = String::new();
    if req.as_reader().read_to_string(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn authorized(gateway: &Gateway, req: &tiny_http::Request) -> bool {
    match gateway.auth_token {
        Some(ref token) => {
            header_value(req, "Authorization") == Some(format!("Bearer {token}").as_str())
        }
        None => true,
    }
}

fn connect(gateway: &Gateway, region: &str) -> Result<Box<dyn Connection>, ProviderError> {
    gateway.cloud.connect(&RegionName::from(region))
}

fn handle_stack(
    gateway: &Gateway,
    mut req: tiny_http::Request,
    method: &Method,
    region: &str,
    stack: &str,
) {
    let conn = match connect(gateway, region) {
        Ok(c) => c,
        Err(e) => return respond_err(req, &e),
    };
    let result = match *method {
        Method::Get => conn.describe_stack(stack).and_then(to_json),
        Method::Post | Method::Put => {
            let Some(body) = read_body(&mut req) else {
                return respond_fault(req, 400, "ValidationError", "unreadable template body");
            };
            let submitted = if *method == Method::Post {
                conn.create_stack(stack, &body)
            } else {
                conn.update_stack(stack, &body)
            };
            submitted.map(|id| {
                info!("{method} {region}/{stack}: {} bytes -> {id}", body.len());
                serde_json::json!({ "stack_id": id })
            })
        }
        Method::Delete => conn.delete_stack(stack).map(|()| {
            info!("DELETE {region}/{stack}");
            serde_json::json!({})
        }),
        _ => return respond_fault(req, 405, "MethodNotAllowed", "method not allowed"),
    };
    match result {
        Ok(body) => respond_json(req, 200, &body),
        Err(e) => respond_err(req, &e),
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<serde_json::Value, ProviderError> {
    serde_json::to_value(value).map_err(|e| ProviderError::Serialization(e.to_string()))
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(gateway: &Gateway, req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    if let Some(version) = header_value(&req, "X-Stackform-Protocol").map(str::to_owned) {
        if version != PROTOCOL_VERSION.to_string() {
            warn!("rejecting protocol version {version}");
            return respond_fault(
                req,
                400,
                "UnsupportedProtocol",
                &format!("protocol version {version} is not supported"),
            );
        }
    }

    let Some((route, query)) = parse_route(&url) else {
        return respond_fault(req, 404, "NotFound", &format!("no route for {url}"));
    };
    if route != Route::Health && !authorized(gateway, &req) {
        return respond_fault(req, 401, "AccessDenied", "missing or invalid bearer token");
    }

    let result = match (route, &method) {
        (Route::Health, Method::Get) => Ok(serde_json::json!({ "status": "ok" })),
        (Route::Regions, Method::Get) => gateway
            .cloud
            .regions()
            .map(|rs| rs.iter().map(ToString::to_string).collect::<Vec<_>>())
            .and_then(to_json),
        (Route::Stacks { region }, Method::Get) => connect(gateway, &region)
            .and_then(|c| c.list_stacks(query_value(&query, "name")))
            .and_then(to_json),
        (Route::Stack { region, stack }, _) => {
            return handle_stack(gateway, req, &method, &region, &stack);
        }
        (Route::Status { region, stack }, Method::Get) => connect(gateway, &region)
            .and_then(|c| c.stack_status(&stack))
            .map(|status| serde_json::json!({ "status": status.to_string() })),
        (
            Route::Resource {
                region,
                stack,
                resource,
            },
            Method::Get,
        ) => connect(gateway, &region)
            .and_then(|c| c.describe_stack_resource(&stack, &resource))
            .and_then(to_json),
        (Route::Images { region }, Method::Get) => {
            let tag = query_value(&query, "tag").unwrap_or_default();
            let value = query_value(&query, "value").unwrap_or_default();
            connect(gateway, &region)
                .and_then(|c| c.find_images_by_tag(tag, value))
                .and_then(to_json)
        }
        _ => return respond_fault(req, 405, "MethodNotAllowed", "method not allowed"),
    };
    match result {
        Ok(body) => respond_json(req, 200, &body),
        Err(e) => respond_err(req, &e),
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(
    gateway: &Gateway,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::http(addr)?;
    for request in server.incoming_requests() {
        handle_request(gateway, request);
    }
    Ok(())
}

/// A test helper that starts a gateway on a random port in a background thread.
///
/// The server listens on `127.0.0.1:{port}`. Dropping the `TestServer`
/// unblocks the accept loop.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub cloud: MockCloud,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    /// Start a gateway over `cloud` without authentication.
    pub fn start(cloud: MockCloud) -> Self {
        Self::start_gateway(Gateway::new(cloud))
    }

    pub fn start_gateway(gateway: Gateway) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let cloud = gateway.cloud.clone();
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&gateway, request);
            }
        });

        Self {
            url,
            port,
            cloud,
            server,
            _handle: handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
