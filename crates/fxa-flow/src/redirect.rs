//! Redirect ingestion: parsing completion URLs and a loopback callback server.

use crate::error::{FlowError, FlowResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use url::Url;

/// Default loopback callback port.
pub const DEFAULT_CALLBACK_PORT: u16 = 9876;

/// Default callback timeout in seconds.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;

/// Default callback path.
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

/// The `(code, state)` pair a redirect delivers.
#[derive(Clone, PartialEq, Eq)]
pub struct RedirectParams {
    pub code: String,
    pub state: String,
}

impl std::fmt::Debug for RedirectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectParams").finish_non_exhaustive()
    }
}

impl RedirectParams {
    /// Parse a full redirect URL such as `fxaclient://android.redirect?code=..&state=..`.
    pub fn from_url(redirect_url: &str) -> FlowResult<Self> {
        let url = Url::parse(redirect_url.trim())?;
        Self::from_query(&url.query_pairs().into_owned().collect())
    }

    fn from_query(params: &HashMap<String, String>) -> FlowResult<Self> {
        if let Some(error) = params.get("error") {
            let reason = match params.get("error_description") {
                Some(description) => format!("{}: {}", error, description),
                None => error.clone(),
            };
            return Err(FlowError::InvalidRedirect(reason));
        }

        match (params.get("code"), params.get("state")) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => Ok(Self {
                code: code.clone(),
                state: state.clone(),
            }),
            _ => Err(FlowError::InvalidRedirect(
                "missing code or state parameter".to_string(),
            )),
        }
    }
}

/// Loopback HTTP server that receives one authorization redirect.
pub struct RedirectCallbackServer {
    port: u16,
    path: String,
    timeout: Duration,
}

impl RedirectCallbackServer {
    pub fn new(port: u16, path: &str, timeout: Duration) -> Self {
        Self {
            port,
            path: path.to_string(),
            timeout,
        }
    }

    /// Create with default settings.
    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_CALLBACK_PORT,
            DEFAULT_CALLBACK_PATH,
            Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
        )
    }

    /// Server matching a loopback `http://localhost:<port>/<path>` redirect
    /// URI. Returns `None` for any other kind of redirect URI.
    pub fn for_redirect_uri(redirect_uri: &str, timeout: Duration) -> Option<Self> {
        let url = Url::parse(redirect_uri).ok()?;
        if url.scheme() != "http" {
            return None;
        }
        if !matches!(url.host_str(), Some("localhost") | Some("127.0.0.1")) {
            return None;
        }
        Some(Self::new(url.port()?, url.path(), timeout))
    }

    /// Get the callback URL for this server.
    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}{}", self.port, self.path)
    }

    /// Bind the listening socket.
    pub async fn bind(&self) -> FlowResult<TcpListener> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, path = %self.path, "Redirect callback server listening");
        Ok(listener)
    }

    /// Bind, then wait for the redirect.
    pub async fn wait_for_redirect(&self) -> FlowResult<RedirectParams> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until a request to the callback path
    /// arrives or the timeout elapses.
    pub async fn serve(&self, listener: TcpListener) -> FlowResult<RedirectParams> {
        let (tx, rx) = oneshot::channel::<FlowResult<RedirectParams>>();
        let tx = Arc::new(tokio::sync::Mutex::new(Some(tx)));
        let path = Arc::new(self.path.clone());

        let server_handle = tokio::spawn({
            let tx = tx.clone();
            async move {
                loop {
                    match listener.accept().await {
                        Ok((mut socket, _)) => {
                            let tx = tx.clone();
                            let path = path.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(&mut socket, &path, tx).await {
                                    error!("Error handling connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                            break;
                        }
                    }
                }
            }
        });

        let result = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FlowError::InvalidRedirect(
                "callback channel closed".to_string(),
            )),
            Err(_) => Err(FlowError::Timeout),
        };

        server_handle.abort();
        result
    }
}

type ResultSender = Arc<tokio::sync::Mutex<Option<oneshot::Sender<FlowResult<RedirectParams>>>>>;

async fn handle_connection(
    socket: &mut tokio::net::TcpStream,
    callback_path: &str,
    tx: ResultSender,
) -> FlowResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain headers so closing the socket does not reset the response
    let mut header = String::new();
    while reader.read_line(&mut header).await? > 0 && !header.trim_end().is_empty() {
        header.clear();
    }

    // GET /callback?code=..&state=.. HTTP/1.1
    let Some(target) = request_line
        .strip_prefix("GET ")
        .and_then(|rest| rest.split_whitespace().next())
    else {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(());
    };

    let url = Url::parse(&format!("http://localhost{}", target))?;
    debug!(path = %url.path(), "Received request");
    if url.path() != callback_path {
        send_response(&mut writer, 404, "Not Found", "Not Found").await?;
        return Ok(());
    }

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let result = RedirectParams::from_query(&params);
    match &result {
        Ok(_) => send_response(&mut writer, 200, "OK", &success_page()).await?,
        Err(e) => send_response(&mut writer, 200, "OK", &error_page(&e.to_string())).await?,
    }

    if let Some(tx) = tx.lock().await.take() {
        let _ = tx.send(result);
    }

    Ok(())
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> FlowResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>Firefox Accounts - Signed In</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Signed in</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Firefox Accounts - Sign-in Failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Sign-in failed</h1>
<p>{}</p>
<p>You can close this window and try again.</p>
</body>
</html>"#,
        escape_html(error)
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
