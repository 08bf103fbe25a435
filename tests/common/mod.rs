//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ocr_gateway::config::GatewayConfig;
use ocr_gateway::engine::EngineRegistry;
use ocr_gateway::http::{GatewayComponents, HttpServer};
use ocr_gateway::pipeline::rasterize::decode_image;
use ocr_gateway::pipeline::{DefaultPreprocessor, PageImage, RasterError, RasterLimits, Rasterizer};
use ocr_gateway::Shutdown;

/// A chat-completions backend that answers each call via a closure.
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Start a programmable mock backend. `respond` gets the 1-based call number
/// and returns the status and body to send.
pub async fn start_mock_backend<F>(respond: F) -> MockBackend
where
    F: Fn(usize) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let respond = Arc::new(respond);

    let counter = calls.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let counter = counter.clone();
                    let respond = respond.clone();
                    tokio::spawn(async move {
                        if read_request(&mut socket).await.is_none() {
                            return;
                        }
                        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        let (status, body) = respond(call);
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, calls }
}

/// A backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Consume one HTTP request (headers plus `Content-Length` body).
async fn read_request(socket: &mut TcpStream) -> Option<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(())
}

/// A successful chat-completions body carrying `text`.
pub fn chat_reply(text: &str) -> String {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }]
    })
    .to_string()
}

/// Rasterizer that pretends every PDF has `pages` blank pages and decodes
/// images for real.
pub struct StubRasterizer {
    pub pages: usize,
}

impl Rasterizer for StubRasterizer {
    fn rasterize(&self, bytes: &[u8], ext: &str, limits: &RasterLimits) -> Result<Vec<PageImage>, RasterError> {
        match ext {
            "pdf" => {
                limits.check_page_count(self.pages)?;
                Ok((1..=self.pages)
                    .map(|n| PageImage::new(n, DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 255, 255])))))
                    .collect())
            }
            _ => Ok(vec![PageImage::new(1, decode_image(bytes, limits)?)]),
        }
    }
}

/// Minimal bytes that pass the PDF signature check.
pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";

/// A small solid-colour PNG.
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    PageImage::new(1, DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([240, 240, 240]))))
        .to_png()
        .unwrap()
}

/// Config with storage under `dir` and inference pointed at `base_url`.
pub fn test_config(dir: &TempDir, base_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.storage.raw_path = dir.path().join("raw").display().to_string();
    config.storage.preprocessed_path = dir.path().join("preprocessed").display().to_string();
    config.storage.output_path = dir.path().join("output").display().to_string();
    config.ocr.base_url = base_url.to_string();
    config.ocr.model_name = "test-model".into();
    config.ocr.request_timeout_secs = 5;
    config.ocr.connect_timeout_secs = 1;
    config.retention.hours = 0;
    config.preprocess.detect_orientation = false;
    config
}

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the full server with a stub rasterizer producing `pdf_pages` pages.
pub async fn start_gateway(config: GatewayConfig, pdf_pages: usize) -> TestGateway {
    let engines = EngineRegistry::from_config(&config.ocr).unwrap();
    start_gateway_with_engines(config, engines, pdf_pages).await
}

/// Same as [`start_gateway`] with a caller-supplied engine table.
pub async fn start_gateway_with_engines(
    config: GatewayConfig,
    engines: EngineRegistry,
    pdf_pages: usize,
) -> TestGateway {
    let components = GatewayComponents {
        engines: Arc::new(engines),
        rasterizer: Arc::new(StubRasterizer { pages: pdf_pages }),
        preprocessor: Arc::new(DefaultPreprocessor::from_config(&config.preprocess)),
    };
    let server = HttpServer::with_components(config, components);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let serve_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, serve_shutdown).await.unwrap();
    });

    TestGateway { addr, shutdown }
}

/// Build the multipart form for `/ocr`.
pub fn upload_form(filename: &str, content: Vec<u8>, engine: Option<&str>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(content).file_name(filename.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    match engine {
        Some(engine) => form.text("engine", engine.to_string()),
        None => form,
    }
}
