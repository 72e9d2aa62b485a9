//! IMAP-backed readiness oracle.

use std::collections::HashSet;

use async_trait::async_trait;
use mailparse::ParsedMail;
use regex_lite::Regex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{download_link_pattern, extract_download_ids, ReadinessError, ReadinessOracle};
use crate::config::MailboxConfig;

/// Readiness oracle reading download-link mails from an IMAP mailbox.
///
/// Construction scans every matching mail in the mailbox; `refresh` only looks
/// at unseen ones. Each poll uses a fresh session so a dropped connection never
/// outlives one cycle.
pub struct ImapReadinessOracle {
    config: MailboxConfig,
    pattern: Regex,
    ready: RwLock<HashSet<String>>,
}

impl ImapReadinessOracle {
    /// Connect and perform the full historical scan.
    pub async fn connect(
        config: MailboxConfig,
        download_base_url: &str,
    ) -> Result<Self, ReadinessError> {
        let pattern = download_link_pattern(download_base_url)?;
        let criteria = format!("SUBJECT \"{}\"", config.subject);
        let bodies = Self::fetch_bodies(config.clone(), criteria).await?;

        let mut ready = HashSet::new();
        for body in &bodies {
            ready.extend(extract_download_ids(&pattern, body));
        }
        info!(
            "Scanned {} notification mails, {} download ids ready",
            bodies.len(),
            ready.len()
        );

        Ok(Self {
            config,
            pattern,
            ready: RwLock::new(ready),
        })
    }

    async fn fetch_bodies(
        config: MailboxConfig,
        criteria: String,
    ) -> Result<Vec<String>, ReadinessError> {
        tokio::task::spawn_blocking(move || fetch_bodies_blocking(&config, &criteria))
            .await
            .map_err(|e| ReadinessError::Internal(e.to_string()))?
    }
}

fn fetch_bodies_blocking(
    config: &MailboxConfig,
    criteria: &str,
) -> Result<Vec<String>, ReadinessError> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .map_err(|e| ReadinessError::ConnectionFailed(e.to_string()))?;
    let client = imap::connect(
        (config.host.as_str(), config.port),
        config.host.as_str(),
        &tls,
    )
    .map_err(|e| ReadinessError::ConnectionFailed(e.to_string()))?;

    let mut session = client
        .login(&config.username, &config.password)
        .map_err(|(e, _)| ReadinessError::AuthenticationFailed(e.to_string()))?;

    session
        .select(&config.mailbox)
        .map_err(|e| ReadinessError::Protocol(e.to_string()))?;

    let found = session
        .search(criteria)
        .map_err(|e| ReadinessError::Protocol(e.to_string()))?;
    debug!("IMAP search {:?} matched {} messages", criteria, found.len());

    let mut bodies = Vec::new();
    if !found.is_empty() {
        let mut seqs: Vec<u32> = found.into_iter().collect();
        seqs.sort_unstable();
        let sequence_set = seqs
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let messages = session
            .fetch(sequence_set, "RFC822")
            .map_err(|e| ReadinessError::Protocol(e.to_string()))?;
        for message in messages.iter() {
            let Some(raw) = message.body() else {
                continue;
            };
            match mailparse::parse_mail(raw) {
                Ok(parsed) => bodies.push(plain_text(&parsed)),
                Err(e) => warn!("Skipping unparseable notification mail: {}", e),
            }
        }
    }

    if let Err(e) = session.logout() {
        debug!("IMAP logout failed: {}", e);
    }
    Ok(bodies)
}

/// Concatenated `text/plain` parts; single-part mails are taken as-is.
fn plain_text(mail: &ParsedMail) -> String {
    if mail.subparts.is_empty() {
        return mail.get_body().unwrap_or_default();
    }
    let mut text = String::new();
    collect_plain_parts(mail, &mut text);
    text
}

fn collect_plain_parts(mail: &ParsedMail, out: &mut String) {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
            if let Ok(body) = mail.get_body() {
                out.push_str(&body);
            }
        }
        return;
    }
    for part in &mail.subparts {
        collect_plain_parts(part, out);
    }
}

#[async_trait]
impl ReadinessOracle for ImapReadinessOracle {
    async fn refresh(&self) {
        let criteria = format!("UNSEEN SUBJECT \"{}\"", self.config.subject);
        match Self::fetch_bodies(self.config.clone(), criteria).await {
            Ok(bodies) => {
                let mut ready = self.ready.write().await;
                let before = ready.len();
                for body in &bodies {
                    ready.extend(extract_download_ids(&self.pattern, body));
                }
                if ready.len() > before {
                    info!("{} new download ids ready", ready.len() - before);
                }
            }
            Err(e) => warn!("Error refreshing mail: {}", e),
        }
    }

    async fn ready_ids(&self) -> HashSet<String> {
        self.ready.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_from_multipart_mail() {
        let raw = b"Subject: Download-Link zu Ihren Geodaten\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Link: https://www.wien.gv.at/ogdgeodata/download/5276d431-a054-4a84-a38c-=\r\n\
6dfbccefdef0.tar\r\n\
--b1\r\n\
Content-Type: text/html\r\n\
\r\n\
<a href=\"https://www.wien.gv.at/ogdgeodata/download/e4a3d58b-2c58-4991-8e98-ae7b635d25cf.tar\">x</a>\r\n\
--b1--\r\n";

        let parsed = mailparse::parse_mail(raw).unwrap();
        let text = plain_text(&parsed);

        let pattern = download_link_pattern("https://www.wien.gv.at/ogdgeodata/download").unwrap();
        let ids = extract_download_ids(&pattern, &text);
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("5276d431-a054-4a84-a38c-6dfbccefdef0"));
    }

    #[test]
    fn test_plain_text_single_part() {
        let raw = b"Subject: x\r\nContent-Type: text/plain\r\n\r\nhello\r\n";
        let parsed = mailparse::parse_mail(raw).unwrap();
        assert_eq!(plain_text(&parsed).trim(), "hello");
    }
}
