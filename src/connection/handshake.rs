//! The RFB 3.8 handshake state machine.
//!
//! ProtoVersion, Security, AuthExchange, SecurityResult, ClientInit and
//! ServerInit run in order over the still-unsplit stream. Every read and
//! write is cancellation-sensitive and honours the configured read and
//! write deadlines. A failure in any state aborts the handshake; the
//! caller closes the stream.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::negotiate_from_config;
use crate::config::ClientConfig;
use crate::error::{Result, RfbError};
use crate::pixel::{PixelFormat, PIXEL_FORMAT_WIRE_LEN};
use crate::session::Session;
use crate::validation::{
    parse_protocol_version, sanitize_text, validate_framebuffer_dimensions,
    validate_message_length, validate_security_types, MAX_DESKTOP_NAME_LEN, MAX_REASON_LEN,
};

use super::RfbStream;

/// The version banner this client answers with.
const CLIENT_PROTOCOL_VERSION: &[u8; 12] = b"RFB 003.008\n";

/// SecurityResult value reporting success.
const SECURITY_RESULT_OK: u32 = 0;
/// SecurityResult value reporting failure, followed by a reason string.
const SECURITY_RESULT_FAILED: u32 = 1;

/// Runs the full handshake and installs ServerInit into the session.
pub(crate) async fn perform<S: RfbStream>(
    stream: &mut S,
    config: &ClientConfig,
    session: &Session,
    cancel: &CancellationToken,
) -> Result<()> {
    const OP: &str = "handshake";

    info!("starting rfb handshake");
    let read_deadline = config.read_timeout;
    let write_deadline = config.write_timeout;

    // 7.1.1 ProtocolVersion.
    let mut banner = [0u8; 12];
    read_exact_timed(OP, stream, &mut banner, cancel, read_deadline).await?;
    let (major, minor) = parse_protocol_version(&banner)?;
    info!(major, minor, "received protocol version");

    if major < 3 {
        return Err(RfbError::unsupported(
            OP,
            format!("unsupported major version, less than 3: {major}"),
        ));
    }
    if minor < 8 {
        return Err(RfbError::unsupported(
            OP,
            format!("unsupported minor version, less than 8: {minor}"),
        ));
    }
    write_all_timed(OP, stream, CLIENT_PROTOCOL_VERSION, cancel, write_deadline).await?;

    // 7.1.2 Security.
    let num_types = read_u8_timed(OP, stream, cancel, read_deadline).await?;
    if num_types == 0 {
        let reason = read_failure_reason(stream, cancel, read_deadline).await;
        return Err(RfbError::authentication(
            OP,
            format!("no security types available: {reason}"),
        ));
    }

    let mut security_types = vec![0u8; usize::from(num_types)];
    read_exact_timed(OP, stream, &mut security_types, cancel, read_deadline).await?;
    validate_security_types(&security_types)
        .map_err(|e| RfbError::protocol(OP, "server sent invalid security types").caused_by(e))?;
    debug!(types = ?security_types, "received security types");

    let (auth, selected_type) =
        negotiate_from_config(&config.auth, config.auth_registry.as_ref(), &security_types)?;
    info!(
        security_type = selected_type,
        method = auth.name(),
        "selected authentication method"
    );
    write_all_timed(OP, stream, &[selected_type], cancel, write_deadline).await?;

    // AuthExchange, delegated to the negotiated method.
    let dyn_stream: &mut (dyn RfbStream + '_) = &mut *stream;
    auth.handshake(dyn_stream, cancel).await?;

    // 7.1.3 SecurityResult.
    match read_u32_timed(OP, stream, cancel, read_deadline).await? {
        SECURITY_RESULT_OK => info!("authentication successful"),
        SECURITY_RESULT_FAILED => {
            let reason = read_failure_reason(stream, cancel, read_deadline).await;
            return Err(RfbError::authentication(
                OP,
                format!("security handshake failed: {reason}"),
            ));
        }
        other => {
            return Err(RfbError::protocol(
                OP,
                format!("unexpected security result: {other}"),
            ));
        }
    }

    // 7.3.1 ClientInit.
    let shared_flag = u8::from(!config.exclusive);
    debug!(shared = shared_flag == 1, "sending client init");
    write_all_timed(OP, stream, &[shared_flag], cancel, write_deadline).await?;

    // 7.3.2 ServerInit.
    let width = read_u16_timed(OP, stream, cancel, read_deadline).await?;
    let height = read_u16_timed(OP, stream, cancel, read_deadline).await?;
    validate_framebuffer_dimensions(width, height).map_err(|e| {
        RfbError::protocol(OP, "server sent invalid framebuffer dimensions").caused_by(e)
    })?;

    let mut format_wire = [0u8; PIXEL_FORMAT_WIRE_LEN];
    read_exact_timed(OP, stream, &mut format_wire, cancel, read_deadline).await?;
    let pixel_format = PixelFormat::from_wire(&format_wire)?;
    pixel_format
        .validate()
        .map_err(|e| RfbError::protocol(OP, "server sent invalid pixel format").caused_by(e))?;

    let name_len = read_u32_timed(OP, stream, cancel, read_deadline).await?;
    validate_message_length(name_len, MAX_DESKTOP_NAME_LEN)
        .map_err(|e| RfbError::protocol(OP, "server sent invalid desktop name length").caused_by(e))?;
    let mut name_bytes = vec![0u8; name_len as usize];
    read_exact_timed(OP, stream, &mut name_bytes, cancel, read_deadline).await?;
    let desktop_name = sanitize_text(&String::from_utf8_lossy(&name_bytes));

    session
        .install_server_init(width, height, pixel_format, desktop_name.clone())
        .await;
    config.metrics.incr_counter("rfb.handshakes_completed", 1);
    info!(
        desktop_name = %desktop_name,
        fb_width = width,
        fb_height = height,
        bpp = pixel_format.bits_per_pixel,
        "rfb handshake completed"
    );

    Ok(())
}

/// Reads the length-prefixed failure reason servers send with refusals.
///
/// Never fails: parse problems degrade to placeholder text since the
/// handshake is already on its error path.
async fn read_failure_reason<S: RfbStream>(
    stream: &mut S,
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> String {
    const OP: &str = "read_failure_reason";

    let length = match read_u32_timed(OP, stream, cancel, deadline).await {
        Ok(length) => length,
        Err(_) => return "<failed to read reason length>".to_string(),
    };
    if validate_message_length(length, MAX_REASON_LEN).is_err() {
        return "<invalid reason length>".to_string();
    }
    let mut reason = vec![0u8; length as usize];
    if read_exact_timed(OP, stream, &mut reason, cancel, deadline)
        .await
        .is_err()
    {
        return "<failed to read reason>".to_string();
    }
    sanitize_text(&String::from_utf8_lossy(&reason))
}

async fn read_exact_timed<S: RfbStream>(
    op: &'static str,
    stream: &mut S,
    buf: &mut [u8],
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Result<()> {
    let read = async {
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, stream.read_exact(buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read deadline elapsed"))?,
            None => stream.read_exact(buf).await,
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(RfbError::timeout(op, "operation cancelled")),
        result = read => match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                Err(RfbError::timeout(op, "read deadline elapsed"))
            }
            Err(e) => Err(RfbError::io(op, e)),
        },
    }
}

async fn write_all_timed<S: RfbStream>(
    op: &'static str,
    stream: &mut S,
    data: &[u8],
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Result<()> {
    let write = async {
        match deadline {
            Some(deadline) => {
                tokio::time::timeout(deadline, async {
                    stream.write_all(data).await?;
                    stream.flush().await
                })
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write deadline elapsed"))?
            }
            None => {
                stream.write_all(data).await?;
                stream.flush().await
            }
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(RfbError::timeout(op, "operation cancelled")),
        result = write => match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                Err(RfbError::timeout(op, "write deadline elapsed"))
            }
            Err(e) => Err(RfbError::io(op, e)),
        },
    }
}

async fn read_u8_timed<S: RfbStream>(
    op: &'static str,
    stream: &mut S,
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact_timed(op, stream, &mut buf, cancel, deadline).await?;
    Ok(buf[0])
}

async fn read_u16_timed<S: RfbStream>(
    op: &'static str,
    stream: &mut S,
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact_timed(op, stream, &mut buf, cancel, deadline).await?;
    Ok(u16::from_be_bytes(buf))
}

async fn read_u32_timed<S: RfbStream>(
    op: &'static str,
    stream: &mut S,
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact_timed(op, stream, &mut buf, cancel, deadline).await?;
    Ok(u32::from_be_bytes(buf))
}
