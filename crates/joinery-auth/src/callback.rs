//! Local listener for the identity provider redirect.
//!
//! Command-line logins point `redirect_uri` at the local machine. The
//! provider then redirects the browser to `http://localhost:<port>/...` with
//! `?code=&state=` (or `?error=`). [`CallbackServer`] accepts that single
//! request, answers with a small page, and hands the parameters back.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use crate::error::{AuthError, Result};

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Signed in to Joinery</title>
    <style>
        body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; text-align: center; padding-top: 20vh; color: #333; }
        h1 { color: #22c55e; }
    </style>
</head>
<body>
    <h1>Signed in</h1>
    <p>You can close this tab and return to Joinery.</p>
</body>
</html>"#;

const FAILURE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Joinery sign-in failed</title>
</head>
<body>
    <h1>Sign-in failed</h1>
    <p>Return to Joinery for details.</p>
</body>
</html>"#;

/// Parameters of a successful provider redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    /// Empty when the provider sent none; the state check then fails.
    pub state: String,
}

impl CallbackParams {
    /// Extract the parameters from a raw query string.
    ///
    /// # Errors
    ///
    /// - [`AuthError::ProviderDenied`] when the provider sent `error`.
    /// - [`AuthError::MissingCode`] when there is no `code`.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut code = None;
        let mut state = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "error" => {
                    return Err(AuthError::ProviderDenied {
                        error: value.into_owned(),
                    });
                }
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }

        let code = code.filter(|c| !c.is_empty()).ok_or(AuthError::MissingCode)?;
        Ok(Self {
            code,
            state: state.unwrap_or_default(),
        })
    }

    /// Extract the parameters from the first line of an HTTP request.
    fn from_request(request: &str) -> Result<Self> {
        let target = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .ok_or_else(|| AuthError::InvalidConfig {
                reason: "malformed callback request".to_string(),
            })?;
        let query = target.split_once('?').map(|(_, q)| q).unwrap_or_default();
        Self::from_query(query)
    }
}

/// Single-shot HTTP listener for the OAuth redirect.
pub struct CallbackServer {
    listener: TcpListener,
    timeout_secs: u64,
}

impl CallbackServer {
    /// Bind `127.0.0.1:<port>`, with the port taken from `redirect_uri`.
    pub async fn bind(redirect_uri: &str, timeout_secs: u64) -> Result<Self> {
        let port = port_from_redirect(redirect_uri)?;
        Self::bind_port(port, timeout_secs).await
    }

    pub async fn bind_port(port: u16, timeout_secs: u64) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        tracing::info!(port, "callback server listening for OAuth redirect");
        Ok(Self {
            listener,
            timeout_secs,
        })
    }

    pub fn port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Wait for the redirect.
    ///
    /// # Errors
    ///
    /// [`AuthError::CallbackTimeout`] if nothing arrives in time, plus the
    /// errors of [`CallbackParams::from_query`].
    pub async fn wait(self) -> Result<CallbackParams> {
        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        match tokio::time::timeout(timeout, accept_one(&self.listener)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::CallbackTimeout {
                timeout_secs: self.timeout_secs,
            }),
        }
    }
}

/// The port in `redirect_uri`, or the scheme default.
pub fn port_from_redirect(redirect_uri: &str) -> Result<u16> {
    let url = Url::parse(redirect_uri)?;
    url.port_or_known_default()
        .ok_or_else(|| AuthError::InvalidConfig {
            reason: format!("redirect_uri has no port: {redirect_uri}"),
        })
}

async fn accept_one(listener: &TcpListener) -> Result<CallbackParams> {
    let (mut stream, peer) = listener.accept().await?;
    tracing::debug!(peer = %peer, "accepted callback connection");

    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let params = CallbackParams::from_request(&request);

    let (status, body) = match params {
        Ok(_) => ("200 OK", SUCCESS_HTML),
        Err(_) => ("400 Bad Request", FAILURE_HTML),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    params
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
