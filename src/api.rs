use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use log::{debug, warn};
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::highlight::engine::{RowClassification, RowGroup};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardStatus {
    #[default]
    Starting,
    Running,
    Reloading,
    Error,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct GroupSnapshot {
    pub id: String,
    pub title: String,
    pub rows: usize,
    pub current: Vec<String>,
    pub next: Vec<String>,
}

impl GroupSnapshot {
    pub fn from_group(group: &RowGroup) -> Self {
        let labels = |classification| {
            group
                .rows_with(classification)
                .map(|row| row.label())
                .collect::<Vec<_>>()
        };
        Self {
            id: group.id.clone(),
            title: group.title.clone(),
            rows: group.rows.len(),
            current: labels(RowClassification::Current),
            next: labels(RowClassification::Next),
        }
    }
}

/// Last state published by the tick loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeSnapshot {
    pub clock_text: String,
    pub weekday: String,
    pub offset_ms: i64,
    pub synchronized: bool,
    pub source_label: String,
    pub status: BoardStatus,
    pub error: Option<String>,
    pub reload_count: u64,
    pub groups: Vec<GroupSnapshot>,
    pub updated_unix_ms: i64,
}

#[derive(Debug)]
pub struct ApiSharedState {
    pub runtime: RuntimeSnapshot,
    total_requests: u64,
    server_started_unix_ms: i64,
}

impl Default for ApiSharedState {
    fn default() -> Self {
        Self {
            runtime: RuntimeSnapshot::default(),
            total_requests: 0,
            server_started_unix_ms: Local::now().timestamp_millis(),
        }
    }
}

impl ApiSharedState {
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn server_started_unix_ms(&self) -> i64 {
        self.server_started_unix_ms
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    pub state: Arc<Mutex<ApiSharedState>>,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        let state = Arc::new(Mutex::new(ApiSharedState::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);
        let http_join =
            thread::spawn(move || run_server_loop(server, state_for_thread, stop_for_thread));

        Ok(Self {
            state,
            stop,
            http_join: Some(http_join),
        })
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(server: Server, state: Arc<Mutex<ApiSharedState>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &state),
            Ok(None) => continue,
            Err(err) => {
                debug!("api receive failed: {err}");
                continue;
            }
        }
    }
}

#[derive(Debug)]
enum Reply {
    Json(serde_json::Value),
    Text(StatusCode, &'static str),
}

fn handle_request(request: tiny_http::Request, state: &Arc<Mutex<ApiSharedState>>) {
    if request.method() != &Method::Get {
        let _ = send_text(request, StatusCode(405), "method not allowed");
        return;
    }

    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let url = request.url().to_string();
    let (path, _query) = split_path_query(&url);

    let reply = match state.lock() {
        Ok(mut guard) => route(path, &mut guard),
        Err(_) => Reply::Text(StatusCode(500), "internal state lock error"),
    };

    let sent = match reply {
        Reply::Json(payload) => send_json(request, StatusCode(200), &payload),
        Reply::Text(status, body) => send_text(request, status, body),
    };
    if let Err(err) = sent {
        warn!("failed to answer {path}: {err:#}");
    }
}

fn route(path: &str, state: &mut ApiSharedState) -> Reply {
    state.total_requests += 1;
    match path {
        "/" | "/v1/state" => {
            #[derive(Serialize)]
            struct StateResponse<'a> {
                runtime: &'a RuntimeSnapshot,
                total_requests: u64,
                server_started_unix_ms: i64,
                response_iso_local: String,
            }

            let payload = StateResponse {
                runtime: &state.runtime,
                total_requests: state.total_requests(),
                server_started_unix_ms: state.server_started_unix_ms(),
                response_iso_local: Local::now().to_rfc3339(),
            };
            to_reply(&payload)
        }
        "/v1/time" => {
            #[derive(Serialize)]
            struct TimeResponse<'a> {
                server_time: &'a str,
                weekday: &'a str,
                synchronized: bool,
            }

            to_reply(&TimeResponse {
                server_time: &state.runtime.clock_text,
                weekday: &state.runtime.weekday,
                synchronized: state.runtime.synchronized,
            })
        }
        "/healthz" => Reply::Text(StatusCode(200), "ok"),
        _ => Reply::Text(StatusCode(404), "not found"),
    }
}

fn to_reply<T: Serialize>(payload: &T) -> Reply {
    match serde_json::to_value(payload) {
        Ok(value) => Reply::Json(value),
        Err(_) => Reply::Text(StatusCode(500), "failed to encode response"),
    }
}

fn send_json<T: Serialize>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}
