//! In-process worker daemon used by a foreground `up`
//!
//! Only the surface the lifecycle tooling relies on is served here:
//!
//! GET /status - liveness, body informational
//! GET /pid    - identity, body is the daemon's decimal PID
//!
//! While running, the daemon owns `<worker_dir>/worker.pid`.

use crate::config::WorkerConfig;
use crate::errors::{Result, WorkerError};
use crate::utils;
use actix_web::dev::{Server, ServerHandle};
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use log::{info, warn};
use nix::unistd::Pid;
use std::io;
use std::path::PathBuf;

/// Seconds in-flight requests get once a stop is requested
const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

struct WorkerState {
    pid: Pid,
}

async fn status() -> impl Responder {
    HttpResponse::Ok().body("ready")
}

async fn report_pid(state: web::Data<WorkerState>) -> impl Responder {
    HttpResponse::Ok().body(state.pid.as_raw().to_string())
}

/// A bound, not yet awaited, worker HTTP server
pub struct WorkerServer {
    server: Server,
    port: u16,
    pid_file: Option<PathBuf>,
}

impl WorkerServer {
    /// Bind `host:port` (port 0 picks a free port) reporting `pid` as identity.
    ///
    /// Must be called from within an actix system.
    pub fn bind(host: &str, port: u16, pid: Pid) -> Result<Self> {
        let state = web::Data::new(WorkerState { pid });

        let http = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .route("/status", web::get().to(status))
                .route("/pid", web::get().to(report_pid))
        })
        .workers(1)
        .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
        .bind((host, port))?;

        let port = http
            .addrs()
            .first()
            .map(|addr| addr.port())
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no bound address"))?;

        Ok(Self {
            server: http.run(),
            port,
            pid_file: None,
        })
    }

    /// Record the PID in `path` for the lifetime of the server
    pub fn with_pid_file(mut self, path: PathBuf, pid: Pid) -> Result<Self> {
        utils::write_pid_file(&path, pid)?;
        self.pid_file = Some(path);
        Ok(self)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn handle(&self) -> ServerHandle {
        self.server.handle()
    }

    /// Serve until stopped by a signal or a [`ServerHandle`]
    pub async fn run(self) -> Result<()> {
        let result = self.server.await;

        if let Some(path) = &self.pid_file {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove PID file {}: {}", path.display(), e);
            }
        }

        result.map_err(WorkerError::Io)
    }
}

/// Run the worker in the current process until it is told to stop
pub fn run_foreground(config: &WorkerConfig) -> Result<()> {
    let pid = Pid::from_raw(std::process::id() as i32);
    let system = actix_web::rt::System::new();

    system.block_on(async {
        let server = WorkerServer::bind("127.0.0.1", config.worker_port, pid)?
            .with_pid_file(config.pid_file(), pid)?;
        info!("Worker {} listening on port {}", pid, server.port());
        server.run().await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[actix_web::test]
    async fn test_routes() {
        let app = actix_web::test::init_service(
            App::new()
                .app_data(web::Data::new(WorkerState {
                    pid: Pid::from_raw(31337),
                }))
                .route("/status", web::get().to(status))
                .route("/pid", web::get().to(report_pid)),
        )
        .await;

        let req = actix_web::test::TestRequest::get().uri("/pid").to_request();
        let body = actix_web::test::call_and_read_body(&app, req).await;
        assert_eq!(body, "31337");

        let req = actix_web::test::TestRequest::get()
            .uri("/status")
            .to_request();
        let resp = actix_web::test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_pid_file_lifetime() {
        let tmp = tempdir().unwrap();
        let pid_file = tmp.path().join("worker.pid");
        let pid = Pid::from_raw(4321);

        let server = WorkerServer::bind("127.0.0.1", 0, pid)
            .unwrap()
            .with_pid_file(pid_file.clone(), pid)
            .unwrap();
        assert_ne!(server.port(), 0);
        assert_eq!(fs::read_to_string(&pid_file).unwrap(), "4321");

        let handle = server.handle();
        let running = actix_web::rt::spawn(server.run());
        actix_web::rt::time::sleep(Duration::from_millis(50)).await;
        handle.stop(true).await;

        running.await.unwrap().unwrap();
        assert!(!pid_file.exists());
    }
}
