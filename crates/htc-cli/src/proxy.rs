//! Lifecycle of a proxy launched by the runner (`--proxy-cmd`)

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use tokio::process::{Child, Command};

pub const ORIGIN_PORT_VAR: &str = "HTC_ORIGIN_PORT";
pub const PROXY_PORT_VAR: &str = "HTC_PROXY_PORT";
pub const RUN_DIR_VAR: &str = "HTC_RUN_DIR";

/// A proxy process started through `sh -c`
pub struct Proxy {
    port: u16,
    run_dir: PathBuf,
    child: Child,
}

impl Proxy {
    /// Spawn `command` with the origin port, a free proxy port and a fresh
    /// run directory in its environment.
    pub fn spawn(command: &str, origin_port: u16) -> std::io::Result<Proxy> {
        let port = free_port()?;
        let run_dir = tempfile::Builder::new()
            .prefix("runroot")
            .tempdir()?
            .into_path();

        debug!(
            "proxy: sh -c {:?} ({}={}, {}={}, {}={})",
            command,
            ORIGIN_PORT_VAR,
            origin_port,
            PROXY_PORT_VAR,
            port,
            RUN_DIR_VAR,
            run_dir.display()
        );
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env(ORIGIN_PORT_VAR, origin_port.to_string())
            .env(PROXY_PORT_VAR, port.to_string())
            .env(RUN_DIR_VAR, &run_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        Ok(Proxy {
            port,
            run_dir,
            child,
        })
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Kill the proxy and wait for it to exit
    pub async fn stop(&mut self) {
        match self.child.kill().await {
            Ok(()) => debug!("proxy: stopped"),
            Err(e) => warn!("proxy: could not stop process: {}", e),
        }
    }

    /// Remove the run directory after a passing run, keep it otherwise
    pub fn finish(self, passed: bool) {
        if !passed {
            info!("keeping proxy run directory {}", self.run_dir.display());
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.run_dir) {
            warn!("cannot remove {}: {}", self.run_dir.display(), e);
        }
    }
}

fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_nonzero() {
        assert_ne!(free_port().unwrap(), 0);
    }

    #[actix_web::test]
    async fn test_spawn_exports_environment() {
        let mut proxy = Proxy::spawn(
            "printf '%s %s' \"$HTC_ORIGIN_PORT\" \"$HTC_PROXY_PORT\" > \"$HTC_RUN_DIR/env\"",
            4242,
        )
        .unwrap();
        proxy.child.wait().await.unwrap();

        let written = std::fs::read_to_string(proxy.run_dir().join("env")).unwrap();
        assert_eq!(written, format!("4242 {}", proxy.port));

        let run_dir = proxy.run_dir().to_path_buf();
        proxy.finish(true);
        assert!(!run_dir.exists());
    }

    #[actix_web::test]
    async fn test_failed_run_keeps_run_dir() {
        let mut proxy = Proxy::spawn("exec sleep 30", 1).unwrap();
        proxy.stop().await;

        let run_dir = proxy.run_dir().to_path_buf();
        proxy.finish(false);
        assert!(run_dir.is_dir());
        std::fs::remove_dir_all(run_dir).unwrap();
    }
}
