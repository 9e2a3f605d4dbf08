//! Line-based login exchange.
//!
//! The client sees `login: ` and `password: ` prompts; each answer is one
//! line terminated by `\n` (a trailing `\r` is stripped).

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::auth::Credentials;
use crate::error::GateError;

pub const LOGIN_PROMPT: &[u8] = b"login: ";
pub const PASSWORD_PROMPT: &[u8] = b"password: ";
pub const LOGIN_INCORRECT: &[u8] = b"Login incorrect\r\n";
pub const BLOCKED_NOTICE: &[u8] = b"Too many failed login attempts\r\n";

/// Longest accepted answer line, terminator excluded.
pub const MAX_LINE_LEN: usize = 1024;

/// Prompt for and read one username/password pair.
pub async fn read_credentials<S>(stream: &mut S, buf: &mut BytesMut) -> Result<Credentials, GateError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(LOGIN_PROMPT).await?;
    let username = read_line(stream, buf).await?;
    stream.write_all(PASSWORD_PROMPT).await?;
    let password = read_line(stream, buf).await?;
    Ok(Credentials::new(username.trim(), password))
}

/// Read one line from `buf`, refilling it from `stream` as needed.
pub async fn read_line<S>(stream: &mut S, buf: &mut BytesMut) -> Result<String, GateError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line = buf.split_to(pos + 1);
            let mut text = &line[..pos];
            if let Some(stripped) = text.strip_suffix(b"\r") {
                text = stripped;
            }
            if text.len() > MAX_LINE_LEN {
                return Err(GateError::LineTooLong { limit: MAX_LINE_LEN });
            }
            return Ok(String::from_utf8_lossy(text).into_owned());
        }
        if buf.len() > MAX_LINE_LEN + 1 {
            return Err(GateError::LineTooLong { limit: MAX_LINE_LEN });
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(GateError::Disconnected);
        }
    }
}
