use crate::multipart::{self, MultipartError};
use crate::{Pipeline, PipelineError, SchemaOrigin, Submission, report};
use cxlens_report::ReportArtifact;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Multipart field carrying the uploaded source file.
pub const FILE_FIELD: &str = "file";

const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind: SocketAddr,
    pub max_body_bytes: usize,
}

#[derive(Debug, Error)]
pub enum HttpServeError {
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HttpResponse {
    status: u16,
    content_type: &'static str,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl HttpResponse {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            headers: Vec::new(),
            body: serde_json::to_vec_pretty(&body).unwrap_or_default(),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            content_type: "text/plain",
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn artifact(artifact: ReportArtifact) -> Self {
        let headers = vec![
            (
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", artifact.filename()),
            ),
            ("X-Report-Digest", artifact.digest()),
        ];
        Self {
            status: 200,
            content_type: artifact.media_type(),
            headers,
            body: artifact.into_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Healthz,
    Index,
    Analyze,
    Report,
    Preflight,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
enum RouteError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("content-length required")]
    LengthRequired,
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Request {
    method: String,
    target: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Serve the analysis API until Ctrl-C.
pub async fn serve_analysis_api(
    config: HttpServerConfig,
    pipeline: Arc<Pipeline>,
) -> Result<(), HttpServeError> {
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(HttpServeError::Bind)?;
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler unavailable; serving until killed");
            std::future::pending::<()>().await;
        }
    };
    serve_listener(listener, config, pipeline, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// Every connection runs in its own task.
pub async fn serve_listener(
    listener: TcpListener,
    config: HttpServerConfig,
    pipeline: Arc<Pipeline>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), HttpServeError> {
    let config = Arc::new(config);
    tokio::pin!(shutdown);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "analysis API listening");
    }

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("shutdown requested; no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(HttpServeError::Accept)?;
                let pipeline = Arc::clone(&pipeline);
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, &pipeline, &config).await {
                        tracing::debug!(%peer, error = %err, "connection ended with io error");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    pipeline: &Pipeline,
    config: &HttpServerConfig,
) -> std::io::Result<()> {
    let started = Instant::now();
    let (mut reader, mut writer) = stream.split();

    let request = match read_request(&mut reader, config.max_body_bytes).await {
        Ok(request) => request,
        Err(err) => {
            tracing::info!(error = %err, "rejected request");
            return write_response(&mut writer, route_error_response(err)).await;
        }
    };

    let route = match parse_route(&request.method, &request.target) {
        Ok(route) => route,
        Err(err) => {
            return write_response(&mut writer, route_error_response(err)).await;
        }
    };

    let Some(response) = execute_route(route, &request, pipeline, client_gone(&mut reader)).await
    else {
        tracing::info!(path = %request.target, "client disconnected; analysis abandoned");
        return Ok(());
    };

    tracing::info!(
        method = %request.method,
        path = %request.target,
        status = response.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    write_response(&mut writer, response).await
}

/// Resolves once the peer stops sending: EOF or a read error.
///
/// A client that half-closes its write side after a complete request is
/// indistinguishable from one that went away, so it gets no response.
async fn client_gone<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_body_bytes: usize,
) -> Result<Request, RouteError> {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(idx) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break idx;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(RouteError::BadRequest("request head too large".to_string()));
        }
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| RouteError::BadRequest(format!("failed to read request: {e}")))?;
        if n == 0 {
            return Err(RouteError::BadRequest(if buf.is_empty() {
                "empty request".to_string()
            } else {
                "incomplete request head".to_string()
            }));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let line = lines
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing request line".to_string()))?;
    let (method, target) = parse_request_line(line)?;
    let headers = parse_headers(lines)?;

    let mut body = buf.split_off(head_end + 4);
    let length = match headers.get("content-length") {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| RouteError::BadRequest(format!("invalid content-length `{raw}`")))?,
        None if headers.contains_key("transfer-encoding") => return Err(RouteError::LengthRequired),
        None if method == "POST" => return Err(RouteError::LengthRequired),
        None => 0,
    };
    if length > max_body_bytes {
        return Err(RouteError::PayloadTooLarge(length));
    }

    if body.len() < length {
        let already = body.len();
        body.resize(length, 0);
        reader
            .read_exact(&mut body[already..])
            .await
            .map_err(|e| RouteError::BadRequest(format!("failed to read request body: {e}")))?;
    }
    body.truncate(length);

    Ok(Request {
        method,
        target,
        headers,
        body,
    })
}

fn parse_request_line(line: &str) -> Result<(String, String), RouteError> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing target".to_string()))?;
    Ok((method.to_string(), target.to_string()))
}

fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<BTreeMap<String, String>, RouteError> {
    let mut headers = BTreeMap::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RouteError::BadRequest(format!("malformed header line `{line}`")))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(headers)
}

fn parse_route(method: &str, target: &str) -> Result<Route, RouteError> {
    let (path, _query) = split_target(target);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    if method == "OPTIONS" {
        return Ok(Route::Preflight);
    }

    let (route, allowed) = match path {
        "/" => (Route::Index, "GET"),
        "/healthz" => (Route::Healthz, "GET"),
        "/api/analyze" => (Route::Analyze, "POST"),
        "/api/download-pdf" => (Route::Report, "POST"),
        _ => return Err(RouteError::NotFound(format!("unknown route: {path}"))),
    };
    if method != allowed {
        return Err(RouteError::MethodNotAllowed(format!(
            "{path} accepts {allowed}"
        )));
    }
    Ok(route)
}

fn split_target(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

fn extract_submission(request: &Request) -> Result<Option<Submission>, RouteError> {
    let content_type = request.header("content-type").unwrap_or_default();
    let boundary = multipart::boundary(content_type).map_err(multipart_error)?;
    let part =
        multipart::find_file(&request.body, &boundary, FILE_FIELD).map_err(multipart_error)?;
    Ok(part.map(|part| Submission::new(part.filename, part.bytes)))
}

fn multipart_error(err: MultipartError) -> RouteError {
    RouteError::BadRequest(err.to_string())
}

/// `None` when the client went away before the response was ready.
async fn execute_route(
    route: Route,
    request: &Request,
    pipeline: &Pipeline,
    disconnected: impl Future<Output = ()>,
) -> Option<HttpResponse> {
    let response = match route {
        Route::Healthz => HttpResponse::json(200, json!({ "ok": true })),
        Route::Index => HttpResponse::json(
            200,
            json!({
                "service": "cxlens.analysis.v1",
                "routes": [
                    "GET /healthz",
                    "POST /api/analyze/ (multipart field `file`)",
                    "POST /api/download-pdf/ (analysis result json)"
                ]
            }),
        ),
        Route::Preflight => HttpResponse::no_content(),
        Route::Report => {
            // Large reports take a while to lay out; keep them off the async workers.
            let body = request.body.clone();
            match tokio::task::spawn_blocking(move || report(&body)).await {
                Ok(Ok(artifact)) => HttpResponse::artifact(artifact),
                Ok(Err(err)) => pipeline_error_response(err),
                Err(err) => HttpResponse::json(
                    500,
                    json!({
                        "error": "report rendering failed",
                        "category": "render_failure",
                        "details": err.to_string(),
                    }),
                ),
            }
        }
        Route::Analyze => {
            let submission = match extract_submission(request) {
                Ok(submission) => submission,
                Err(err) => return Some(route_error_response(err)),
            };
            // Dropping the pipeline future kills the analyzer and removes
            // the stored source.
            tokio::select! {
                outcome = pipeline.analyze(submission) => analyze_response(outcome),
                () = disconnected => return None,
            }
        }
    };
    Some(response)
}

fn analyze_response(
    outcome: Result<cxlens_schema::AnalysisResult, PipelineError>,
) -> HttpResponse {
    match outcome {
        Ok(result) => match result.to_json_value() {
            Ok(value) => HttpResponse::json(200, value),
            Err(err) => HttpResponse::json(
                500,
                json!({
                    "error": "failed to encode analysis result",
                    "category": "encode_failure",
                    "details": err.to_string(),
                }),
            ),
        },
        Err(err) => pipeline_error_response(err),
    }
}

/// Schema failures split by origin: a bad report body is the caller's fault
/// (400), bad analyzer output is ours (500).
fn pipeline_error_response(err: PipelineError) -> HttpResponse {
    let category = err.category();
    match err {
        PipelineError::MissingInput => HttpResponse::json(
            400,
            json!({ "error": "no file provided", "category": category }),
        ),
        PipelineError::Schema { origin, error } => {
            let (status, message) = match origin {
                SchemaOrigin::EngineOutput => (500, "analyzer output is not valid analysis json"),
                SchemaOrigin::ReportBody => (400, "report body is not a valid analysis result"),
            };
            HttpResponse::json(
                status,
                json!({
                    "error": message,
                    "category": category,
                    "reason": error.to_string(),
                    "output": error.raw(),
                }),
            )
        }
        PipelineError::Execution(inner) => HttpResponse::json(
            500,
            json!({
                "error": "analyzer failed",
                "category": category,
                "details": inner.diagnostic(),
                "exitCode": inner.exit_code(),
            }),
        ),
        PipelineError::Storage(inner) => HttpResponse::json(
            500,
            json!({
                "error": "temporary storage failed",
                "category": category,
                "details": inner.to_string(),
            }),
        ),
        PipelineError::Render(inner) => HttpResponse::json(
            500,
            json!({
                "error": "report rendering failed",
                "category": category,
                "details": inner.to_string(),
            }),
        ),
    }
}

fn route_error_response(err: RouteError) -> HttpResponse {
    let (status, category) = match &err {
        RouteError::BadRequest(_) => (400, "bad_request"),
        RouteError::NotFound(_) => (404, "not_found"),
        RouteError::MethodNotAllowed(_) => (405, "method_not_allowed"),
        RouteError::LengthRequired => (411, "length_required"),
        RouteError::PayloadTooLarge(_) => (413, "payload_too_large"),
    };
    HttpResponse::json(
        status,
        json!({ "error": err.to_string(), "category": category }),
    )
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: HttpResponse,
) -> std::io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nAccess-Control-Expose-Headers: Content-Disposition, X-Report-Digest\r\n",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("Connection: close\r\n\r\n");

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
