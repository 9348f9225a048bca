use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use super::http::{read_request, write_json_response};
use super::router::GatewayRouter;

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct GatewayServer {
    addr: String,
    router: Arc<GatewayRouter>,
}

#[derive(Debug)]
pub struct GatewayHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl GatewayHandle {
    /// Stop accepting connections and wait for the listener thread.
    ///
    /// Requests already being served finish on their own threads.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("gateway listener thread panicked"))?;
        }
        Ok(())
    }

    /// Block until the listener exits or `shutdown` is raised.
    pub fn wait(self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::SeqCst) {
            if self.join.as_ref().map_or(true, |join| join.is_finished()) {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        self.stop()
    }
}

impl GatewayServer {
    pub fn new(addr: impl Into<String>, router: GatewayRouter) -> Self {
        Self {
            addr: addr.into(),
            router: Arc::new(router),
        }
    }

    pub fn spawn(self) -> Result<GatewayHandle> {
        let configured_addr: SocketAddr = self
            .addr
            .parse()
            .with_context(|| format!("invalid gateway address '{}'", self.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind gateway on {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let router = self.router;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_gateway(listener, router, shutdown_thread) {
                log::error!("gateway stopped: {}", err);
            }
        });
        log::info!("gateway listening on {}", addr);

        Ok(GatewayHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_gateway(
    listener: TcpListener,
    router: Arc<GatewayRouter>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let router = router.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &router) {
                        log::warn!("gateway connection from {} failed: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_BACKOFF);
            }
            Err(err) => return Err(err.into()),
        }
    }
    log::info!("gateway listener stopped");
    Ok(())
}

fn handle_connection(mut stream: TcpStream, router: &GatewayRouter) -> Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            log::debug!("rejecting unreadable request: {}", err);
            write_json_response(&mut stream, err.status(), &err.to_json())?;
            return Ok(());
        }
    };

    let image = request.image_payload();
    match router.route(&request.method, &request.path, image.as_deref()) {
        Ok(reply) => {
            let body = reply.to_json()?;
            write_json_response(&mut stream, 200, &body)?;
            log::info!("{} {} -> 200", request.method, request.path);
        }
        Err(err) => {
            write_json_response(&mut stream, err.status(), &err.to_json())?;
            log::info!(
                "{} {} -> {} ({})",
                request.method,
                request.path,
                err.status(),
                err
            );
        }
    }
    Ok(())
}
