//! Connection-hijack upgrade into Docker's raw-stream protocol (spec §4.3)
//!
//! Recognizes `Connection: Upgrade` + `Upgrade: tcp` on `/exec/.../start` and
//! `.../attach`, replies 101, then hands the now-raw connection's stdin to a
//! caller-supplied workload and frames its stdout/stderr back (unless the
//! workload is a TTY, in which case bytes pass through unframed).

use std::future::Future;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::logstore::{encode_frame, StreamType};
use crate::runtime::Io;

pub fn is_hijack_request(path: &str, headers: &HeaderMap) -> bool {
    let path_matches = path.contains("/exec/") || path.ends_with("/attach");
    let connection_upgrade = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("upgrade"))
        .unwrap_or(false);
    let upgrade_tcp = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("tcp"))
        .unwrap_or(false);
    path_matches && connection_upgrade && upgrade_tcp
}

/// Upgrades `req`, wires a caller-supplied async workload to the raw
/// stream, and returns the 101 response immediately. The workload runs
/// after the kernel/hyper completes the upgrade handshake, in a spawned
/// task, so callers never block the handler on it.
pub fn hijack<Run, Fut>(mut req: Request<Body>, tty: bool, run: Run) -> Response<Body>
where
    Run: FnOnce(Io) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let on_upgrade = hyper::upgrade::on(&mut req);

    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(error = %e, "raw-stream upgrade failed");
                return;
            }
        };

        let io = TokioIo::new(upgraded);
        let (mut read_half, mut write_half) = tokio::io::split(io);

        let (stdin_server, mut stdin_client) = tokio::io::duplex(8192);
        let (mut stdout_client, stdout_server) = tokio::io::duplex(8192);
        let (mut stderr_client, stderr_server) = tokio::io::duplex(8192);

        let stdin_task = tokio::spawn(async move {
            let _ = tokio::io::copy(&mut read_half, &mut stdin_client).await;
        });

        let output_task = tokio::spawn(async move {
            forward_output(tty, &mut stdout_client, &mut stderr_client, &mut write_half).await;
        });

        run(Io {
            stdin: Box::new(stdin_server),
            stdout: Box::new(stdout_server),
            stderr: Box::new(stderr_server),
        })
        .await;

        stdin_task.abort();
        let _ = output_task.await;
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONTENT_TYPE, "application/vnd.docker.raw-stream")
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "tcp")
        .body(Body::empty())
        .expect("static response is well-formed")
}

/// Drains both output sources until each hits EOF, framing chunks unless
/// `tty` is set. The two sources are polled concurrently so neither one
/// starves the other.
async fn forward_output(
    tty: bool,
    stdout: &mut (impl AsyncRead + Unpin),
    stderr: &mut (impl AsyncRead + Unpin),
    writer: &mut (impl AsyncWrite + Unpin),
) {
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            n = stdout.read(&mut out_buf), if out_open => {
                match n {
                    Ok(0) | Err(_) => out_open = false,
                    Ok(n) => {
                        let chunk = if tty {
                            out_buf[..n].to_vec()
                        } else {
                            encode_frame(StreamType::Stdout, &out_buf[..n])
                        };
                        if writer.write_all(&chunk).await.is_err() {
                            return;
                        }
                    }
                }
            }
            n = stderr.read(&mut err_buf), if err_open => {
                match n {
                    Ok(0) | Err(_) => err_open = false,
                    Ok(n) => {
                        let chunk = if tty {
                            err_buf[..n].to_vec()
                        } else {
                            encode_frame(StreamType::Stderr, &err_buf[..n])
                        };
                        if writer.write_all(&chunk).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
