//! Socket-level exchanges: one query out, one reply back.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::trace;

use crate::error::LookupError;
use crate::nameserver::EDNS_UDP_PAYLOAD_SIZE;

pub(crate) async fn exchange_udp(
    addr: SocketAddr,
    payload: &[u8],
    limit: Duration,
) -> Result<Vec<u8>, LookupError> {
    timeout(limit, async {
        let bind_addr: SocketAddr = if addr.is_ipv6() {
            "[::]:0".parse().expect("wildcard v6 bind address")
        } else {
            "0.0.0.0:0".parse().expect("wildcard v4 bind address")
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(addr).await?;
        socket.send(payload).await?;

        let mut buf = vec![0u8; EDNS_UDP_PAYLOAD_SIZE as usize];
        let len = socket.recv(&mut buf).await?;
        buf.truncate(len);
        trace!(%addr, bytes = len, "udp reply received");
        Ok(buf)
    })
    .await
    .map_err(|_| timed_out(addr, limit))?
}

pub(crate) async fn exchange_tcp(
    addr: SocketAddr,
    payload: &[u8],
    limit: Duration,
) -> Result<Vec<u8>, LookupError> {
    timeout(limit, async {
        let mut stream = TcpStream::connect(addr).await?;
        write_framed(&mut stream, payload).await?;
        let reply = read_framed(&mut stream).await?;
        trace!(%addr, bytes = reply.len(), "tcp reply received");
        Ok(reply)
    })
    .await
    .map_err(|_| timed_out(addr, limit))?
}

pub(crate) async fn exchange_tls(
    addr: SocketAddr,
    sni_domain: &str,
    payload: &[u8],
    limit: Duration,
) -> Result<Vec<u8>, LookupError> {
    let server_name = ServerName::try_from(sni_domain.to_string())
        .map_err(|err| LookupError::Io(format!("invalid tls server name {sni_domain:?}: {err}")))?;

    timeout(limit, async {
        let tcp = TcpStream::connect(addr).await?;
        let connector = TlsConnector::from(tls_client_config());
        let mut stream = connector.connect(server_name, tcp).await?;
        write_framed(&mut stream, payload).await?;
        let reply = read_framed(&mut stream).await?;
        trace!(%addr, sni = sni_domain, bytes = reply.len(), "tls reply received");
        Ok(reply)
    })
    .await
    .map_err(|_| timed_out(addr, limit))?
}

/// RFC 1035 4.2.2: stream transports prefix each message with a two-byte
/// big-endian length.
async fn write_framed<S>(stream: &mut S, payload: &[u8]) -> Result<(), LookupError>
where
    S: AsyncWrite + Unpin,
{
    let len = u16::try_from(payload.len())
        .map_err(|_| LookupError::Proto("query exceeds the 64KiB stream message limit".into()))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_framed<S>(stream: &mut S) -> Result<Vec<u8>, LookupError>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

fn timed_out(addr: SocketAddr, limit: Duration) -> LookupError {
    LookupError::Io(format!("query to {addr} timed out after {limit:?}"))
}

fn tls_client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        })
        .clone()
}
