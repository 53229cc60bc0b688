//! SendGridMailer against a local stand-in for the mail API.

use chrono::Utc;
use judging_core::{EmailTemplates, Notifier, NotifyError};
use judging_mailer::{SendGridConfig, SendGridMailer};
use judging_state::{Award, Entry, EntryDetail, Judge, Organisation};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Accept one request, answer with `status_line`, and return the raw request.
async fn one_shot_server(status_line: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        let response = format!(
            "{status_line}\r\ncontent-length: 7\r\nconnection: close\r\n\r\nmessage"
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).into_owned()
    });

    (base, handle)
}

fn request_complete(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..header_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    buf.len() >= header_end + 4 + length
}

fn detail() -> EntryDetail {
    EntryDetail {
        entry: Entry::submitted("entry-1", "org-1", "award-1", Utc::now()),
        organisation: Organisation::new("org-1", "Acme Ltd").with_contact("Ada", "ada@acme.com"),
        award: Award::new("award-1", "Retailer of the Year", "Retail"),
        scores: vec![],
    }
}

fn mailer(base: &str) -> SendGridMailer {
    let config = SendGridConfig::new("test-key", "awards@example.org").with_api_base(base);
    SendGridMailer::new(config, EmailTemplates::default()).unwrap()
}

#[tokio::test]
async fn judge_notification_posts_authorised_json() {
    let (base, server) = one_shot_server("HTTP/1.1 202 Accepted").await;

    mailer(&base)
        .notify_judge_assigned(&Judge::new("j1@example.org", "Jo"), &detail())
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v3/mail/send"));
    assert!(request.to_lowercase().contains("authorization: bearer test-key"));
    assert!(request.contains("\"j1@example.org\""));
    assert!(request.contains("New entry to judge: Retailer of the Year"));
}

#[tokio::test]
async fn shortlist_notification_goes_to_contact() {
    let (base, server) = one_shot_server("HTTP/1.1 202 Accepted").await;

    mailer(&base).notify_entry_shortlisted(&detail()).await.unwrap();

    let request = server.await.unwrap();
    assert!(request.contains("\"ada@acme.com\""));
    assert!(request.contains("Shortlisted: Retailer of the Year"));
}

#[tokio::test]
async fn rejected_message_surfaces_status() {
    let (base, server) = one_shot_server("HTTP/1.1 401 Unauthorized").await;

    let err = mailer(&base)
        .notify_judge_assigned(&Judge::new("j1@example.org", "Jo"), &detail())
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, NotifyError::Rejected { status: 401, ref body } if body == "message"));
}

#[tokio::test]
async fn missing_contact_sends_nothing() {
    let mut entry = detail();
    entry.organisation.contact_email = None;

    // Nothing listens here; a send attempt would fail with a transport error
    let err = mailer("http://127.0.0.1:9")
        .notify_entry_shortlisted(&entry)
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::NoRecipient { .. }));
}
