use anyhow::{Result, bail};
use std::{
    env,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    sync::OnceLock,
    thread,
    time::Duration,
};

const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ensure a container runtime socket is available for testcontainers.
///
/// testcontainers talks to the Docker API; Podman works too, so when its
/// socket is the only one around we point `DOCKER_HOST` at it.
///
/// # Errors
/// Returns an error if no Docker/Podman socket can be found or configured.
pub fn ensure_container_runtime() -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match INIT.get_or_init(init_container_runtime) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

fn init_container_runtime() -> Result<(), String> {
    if let Ok(docker_host) = env::var("DOCKER_HOST") {
        return validate_docker_host(&docker_host);
    }

    if wait_for_socket(Path::new("/var/run/docker.sock"), SOCKET_WAIT_TIMEOUT) {
        return Ok(());
    }

    if let Some(path) = find_podman_socket() {
        if wait_for_socket(&path, SOCKET_WAIT_TIMEOUT) {
            set_docker_host(&path);
            return Ok(());
        }
        return Err(format!(
            "Podman socket found at `{}`, but it is not accepting connections. Start `podman.socket` or run `podman system service`.",
            path.display()
        ));
    }

    Err(
        "No container runtime socket found or reachable. Start the Docker daemon, start `podman.socket`, or set `DOCKER_HOST`."
            .to_string(),
    )
}

fn find_podman_socket() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime_dir).join("podman/podman.sock"));
    }
    if let Some(uid) = read_uid() {
        candidates.push(PathBuf::from(format!("/run/user/{uid}/podman/podman.sock")));
    }
    candidates.push(PathBuf::from("/var/run/podman/podman.sock"));
    candidates.push(PathBuf::from("/run/podman/podman.sock"));

    candidates.into_iter().find(|path| path.exists())
}

fn validate_docker_host(docker_host: &str) -> Result<(), String> {
    let path = docker_host
        .strip_prefix("unix://")
        .or_else(|| docker_host.starts_with('/').then_some(docker_host));

    // Non-socket hosts (tcp://...) are taken at face value.
    let Some(path) = path else {
        return Ok(());
    };

    if wait_for_socket(Path::new(path), SOCKET_WAIT_TIMEOUT) {
        return Ok(());
    }
    Err(format!(
        "`DOCKER_HOST` points to `{docker_host}`, but the socket is not accepting connections. Start `podman.socket` or the Docker daemon."
    ))
}

fn socket_connectable(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    UnixStream::connect(path).is_ok()
}

fn wait_for_socket(path: &Path, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if socket_connectable(path) {
            return true;
        }
        thread::sleep(Duration::from_millis(200));
    }
    false
}

fn set_docker_host(path: &Path) {
    let docker_host = format!("unix://{}", path.display());
    // SAFETY: We set this once during test setup before starting containers.
    unsafe {
        env::set_var("DOCKER_HOST", docker_host);
    }
}

fn read_uid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            let uid = rest.split_whitespace().next()?;
            return uid.parse::<u32>().ok();
        }
    }
    None
}
