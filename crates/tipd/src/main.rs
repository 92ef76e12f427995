mod host;

use anyhow::{Context, Result};
use host::{ClientId, Host};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tipd_core::config::{self, Config};
use tipd_core::ipc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(1);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tipd=info".parse()?),
        )
        .init();

    info!("tipd starting");

    let config = Config::load().context("loading config")?;
    info!(
        rest_ms = config.timing.rest_ms,
        leave_ms = config.timing.leave_ms,
        offset = config.placement.offset,
        "config loaded"
    );

    let host = Arc::new(Mutex::new(Host::new(config)));
    // Poked whenever a client message may have armed an earlier deadline.
    let rearm = Arc::new(Notify::new());

    // Start IPC listener
    let socket_path = config::socket_path();
    // Remove stale socket
    let _ = std::fs::remove_file(&socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding socket {}", socket_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o666)).ok();
    }
    info!(path = %socket_path.display(), "IPC socket listening");

    let host_ipc = Arc::clone(&host);
    let rearm_ipc = Arc::clone(&rearm);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let host = Arc::clone(&host_ipc);
                    let rearm = Arc::clone(&rearm_ipc);
                    tokio::spawn(handle_ipc_client(stream, host, rearm));
                }
                Err(e) => {
                    warn!(error = %e, "IPC accept error");
                }
            }
        }
    });

    // Main loop: sleep until the earliest timer deadline, no idle wakeups.
    loop {
        let deadline = host.lock().await.next_deadline();
        let sleep_fut = match deadline {
            Some(dl) => tokio::time::sleep_until(tokio::time::Instant::from_std(dl)),
            None => tokio::time::sleep(Duration::from_secs(86400)),
        };
        let has_deadline = deadline.is_some();

        tokio::select! {
            _ = sleep_fut, if has_deadline => {
                let mut host = host.lock().await;
                if host.check_timers(Instant::now()) {
                    debug!(mode = ?host.store().mode(), "timer transition");
                }
            }
            _ = rearm.notified() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("tipd shutting down");
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

async fn handle_ipc_client(stream: UnixStream, host: Arc<Mutex<Host>>, rearm: Arc<Notify>) {
    let client = ClientId(NEXT_CLIENT.fetch_add(1, Ordering::Relaxed));
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Channel for sending messages back to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Writer task
    let write_handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    debug!(client = client.0, "client connected");

    while let Ok(Some(line)) = lines.next_line().await {
        let Some(msg) = ipc::decode_client(&line) else {
            debug!(client = client.0, "skipping undecodable line");
            continue;
        };

        let reply = host.lock().await.handle(client, &tx, msg, Instant::now());
        if let Some(reply) = reply {
            let _ = tx.send(ipc::encode(&reply));
        }
        rearm.notify_one();
    }

    write_handle.abort();

    // Client disconnected: unmount everything it owned
    host.lock().await.disconnect(client);
    rearm.notify_one();
    debug!(client = client.0, "client disconnected");
}
