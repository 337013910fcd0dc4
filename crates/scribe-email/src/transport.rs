//! IMAP transport (spec §4.7): TLS connection, IDLE preferred with a
//! 25-minute re-arm timer, UID-based polling as fallback.

use std::sync::Arc;
use std::time::Duration;

use async_imap::types::Fetch;
use scribe_core::config::ImapAccountConfig;
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::error::{EmailError, Result};

pub type ImapSession = async_imap::Session<TlsStream<TcpStream>>;

fn tls_connector() -> TlsConnector {
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = tokio_rustls::rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Connect, negotiate TLS, and log in. One connection per configured
/// account (spec §4.7 "Multi-account: parallel connections").
pub async fn connect(account: &ImapAccountConfig) -> Result<ImapSession> {
    let tcp = TcpStream::connect((account.host.as_str(), account.port)).await.map_err(|e| EmailError::Tls {
        account: account.label.clone(),
        message: e.to_string(),
    })?;
    let domain = tokio_rustls::rustls::pki_types::ServerName::try_from(account.host.clone()).map_err(|e| EmailError::Tls {
        account: account.label.clone(),
        message: e.to_string(),
    })?;
    let tls_stream = tls_connector().connect(domain, tcp).await.map_err(|e| EmailError::Tls {
        account: account.label.clone(),
        message: e.to_string(),
    })?;

    let client = async_imap::Client::new(tls_stream);
    let session = client
        .login(&account.user, &account.password)
        .await
        .map_err(|(e, _client)| EmailError::Imap { account: account.label.clone(), source: e })?;
    Ok(session)
}

/// Select the monitored folder and return `uidNext - 1` as the initial
/// high-water-mark so only new arrivals are ingested (spec §4.7).
pub async fn initial_high_water_mark(session: &mut ImapSession, folder: &str) -> Result<u32> {
    let mailbox = session
        .select(folder)
        .await
        .map_err(|e| EmailError::Imap { account: "session".to_string(), source: e })?;
    Ok(mailbox.uid_next.unwrap_or(1).saturating_sub(1))
}

/// Fetch every message with UID greater than `last_uid`, returning
/// `(uid, raw_rfc822_bytes)` pairs in ascending UID order.
pub async fn fetch_new_since(session: &mut ImapSession, last_uid: u32) -> Result<Vec<(u32, Vec<u8>)>> {
    use futures_util::TryStreamExt;

    let sequence = format!("{}:*", last_uid + 1);
    let stream = session
        .uid_fetch(&sequence, "RFC822")
        .await
        .map_err(|e| EmailError::Imap { account: "session".to_string(), source: e })?;
    let fetches: Vec<Fetch> = stream.try_collect().await.map_err(|e| EmailError::Imap { account: "session".to_string(), source: e })?;

    let mut out: Vec<(u32, Vec<u8>)> = fetches
        .into_iter()
        .filter_map(|f| {
            let uid = f.uid?;
            let body = f.body()?.to_vec();
            (uid > last_uid).then_some((uid, body))
        })
        .collect();
    out.sort_by_key(|(uid, _)| *uid);
    Ok(out)
}

/// Block in IDLE until either a new-mail notification arrives or
/// `timeout` elapses (the 25-minute re-arm safety margin). Returns
/// `true` if IDLE reported activity.
pub async fn idle_once(session: &mut ImapSession, timeout: Duration) -> Result<bool> {
    let mut idle = session.idle();
    idle.init().await.map_err(|e| EmailError::Imap { account: "session".to_string(), source: e })?;
    let (idle_wait, _interrupt) = idle.wait_with_timeout(timeout);
    match idle_wait.await {
        Ok(async_imap::extensions::idle::IdleResponse::NewData(_)) => Ok(true),
        Ok(_) => Ok(false),
        Err(e) => Err(EmailError::Imap { account: "session".to_string(), source: e }),
    }
}
