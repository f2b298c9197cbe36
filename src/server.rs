//! HTTP readings server.
//!
//! Serves the latest decoded readings and the gateway counters as JSON.
//! Uses `tiny_http` on a background thread so it never touches the async
//! runtime.
//!
//! # Endpoints
//!
//! - `GET /readings` - every device's latest readings, keyed by device name
//! - `GET /stats` - gateway counters
//!
//! # Example Response
//!
//! ```json
//! {
//!   "soil": { "moisture": 41.5, "temperature": 18.2 },
//!   "meter": { "kwh": 1203 }
//! }
//! ```

use log::{error, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Response, Server};

use crate::readings::ReadingsStore;
use crate::stats::GatewayStats;

pub use crate::config::DEFAULT_READINGS_PORT;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// HTTP readings server.
///
/// Runs in a background thread. Drop it to stop the server.
pub struct ReadingsServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl ReadingsServer {
    /// Start the readings server.
    ///
    /// # Arguments
    ///
    /// * `bind_addr` - IP address to bind to (use `None` for 0.0.0.0)
    /// * `port` - Port to listen on, 0 for an ephemeral port
    /// * `readings` - Store to serve
    /// * `stats` - Counters to serve
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        readings: Arc<ReadingsStore>,
        stats: Arc<GatewayStats>,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let local_addr = server.server_addr().to_ip();

        match local_addr {
            Some(bound) => info!("Readings server listening on http://{}/readings", bound),
            None => info!("Readings server listening on http://{}/readings", addr),
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::spawn(move || {
            Self::run_server(server, readings, stats, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
            local_addr,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn run_server(
        server: Server,
        readings: Arc<ReadingsStore>,
        stats: Arc<GatewayStats>,
        shutdown: Arc<AtomicBool>,
    ) {
        let content_type = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
            .expect("static header");
        let location =
            Header::from_bytes(&b"Location"[..], &b"/readings"[..]).expect("static header");
        let allow_get = Header::from_bytes(&b"Allow"[..], &b"GET"[..]).expect("static header");

        loop {
            // Pairs with the Release store in stop()
            if shutdown.load(Ordering::Acquire) {
                info!("Readings server shutting down");
                break;
            }

            let request = match server.recv_timeout(RECV_TIMEOUT) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    error!("Server error: {}", e);
                    break;
                }
            };

            if request.method() != &Method::Get {
                let response = Response::from_string("Method Not Allowed")
                    .with_status_code(405)
                    .with_header(allow_get.clone());
                let _ = request.respond(response);
                continue;
            }

            let path = request.url();
            let body = match path {
                "/readings" | "/readings/" => serde_json::to_string(&readings.snapshot()),
                "/stats" | "/stats/" => serde_json::to_string(&stats.snapshot()),
                "/" => {
                    let response = Response::from_string("See /readings for device readings")
                        .with_status_code(302)
                        .with_header(location.clone());
                    if let Err(e) = request.respond(response) {
                        warn!("Failed to send redirect: {}", e);
                    }
                    continue;
                }
                _ => {
                    let response = Response::from_string("Not Found").with_status_code(404);
                    if let Err(e) = request.respond(response) {
                        warn!("Failed to send 404: {}", e);
                    }
                    continue;
                }
            };

            let response = match body {
                Ok(json) => Response::from_string(json)
                    .with_header(content_type.clone())
                    .with_status_code(200),
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                    Response::from_string("Internal Server Error").with_status_code(500)
                }
            };
            if let Err(e) = request.respond(response) {
                warn!("Failed to send response: {}", e);
            }
        }
    }

    /// Stop the server.
    ///
    /// May take up to 100ms due to the polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReadingsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream};

    fn start() -> (ReadingsServer, Arc<ReadingsStore>, Arc<GatewayStats>) {
        let readings = Arc::new(ReadingsStore::new());
        let stats = Arc::new(GatewayStats::new());
        let server = ReadingsServer::start(
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            0,
            readings.clone(),
            stats.clone(),
        )
        .unwrap();
        (server, readings, stats)
    }

    fn request(server: &ReadingsServer, method: &str, path: &str) -> (u16, String) {
        let addr = server.local_addr().unwrap();
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(
            stream,
            "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            method, path
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        let status = response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (status, body)
    }

    // ==================== Endpoint Tests ====================

    #[test]
    fn test_readings_endpoint() {
        let (server, readings, _) = start();
        let mut values = serde_json::Map::new();
        values.insert("moisture".into(), json!(41.5));
        readings.merge("soil", values);

        let (status, body) = request(&server, "GET", "/readings");
        assert_eq!(status, 200);
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, json!({ "soil": { "moisture": 41.5 } }));
    }

    #[test]
    fn test_empty_readings() {
        let (server, _, _) = start();
        let (status, body) = request(&server, "GET", "/readings");
        assert_eq!(status, 200);
        assert_eq!(body, "{}");
    }

    #[test]
    fn test_stats_endpoint() {
        let (server, _, stats) = start();
        GatewayStats::incr(&stats.joins_accepted);

        let (status, body) = request(&server, "GET", "/stats");
        assert_eq!(status, 200);
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["joins_accepted"], json!(1));
        assert!(parsed.get("uptime_secs").is_some());
    }

    #[test]
    fn test_root_redirects() {
        let (server, _, _) = start();
        let (status, _) = request(&server, "GET", "/");
        assert_eq!(status, 302);
    }

    #[test]
    fn test_unknown_path() {
        let (server, _, _) = start();
        let (status, _) = request(&server, "GET", "/nope");
        assert_eq!(status, 404);
    }

    #[test]
    fn test_post_rejected() {
        let (server, _, _) = start();
        let (status, _) = request(&server, "POST", "/readings");
        assert_eq!(status, 405);
    }
}
