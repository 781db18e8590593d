use base64::{Engine, engine::general_purpose::STANDARD};

use super::{
    error::MailError,
    relay::{Dialer, Encryption, build_message},
    schemas::*,
};
use crate::apex::config::SmtpConfig;

/// One personalization resolved against the request-level defaults.
#[derive(Debug, Clone, Copy)]
pub struct Draft<'a> {
    pub from: &'a EmailAddress,
    pub to: &'a [EmailAddress],
    pub cc: &'a [EmailAddress],
    pub bcc: &'a [EmailAddress],
    pub subject: &'a str,
    pub reply_to: Option<&'a EmailAddress>,
    pub headers: &'a Headers,
    pub content: &'a [ContentItem],
    pub attachments: &'a [Attachment],
}

pub fn assemble<'a>(request: &'a MailSendRequest, personalization: &'a Personalization) -> Draft<'a> {
    Draft {
        from: &request.from,
        to: &personalization.to,
        cc: &personalization.cc,
        bcc: &personalization.bcc,
        subject: &personalization.subject,
        reply_to: personalization
            .reply_to
            .as_ref()
            .or(request.reply_to.as_ref()),
        headers: &personalization.headers,
        content: &request.content,
        attachments: &request.attachments,
    }
}

pub fn decode_attachment(attachment: &Attachment) -> Result<Vec<u8>, MailError> {
    Ok(STANDARD.decode(attachment.content.trim())?)
}

pub fn format_address(address: &EmailAddress) -> String {
    if address.name.is_empty() {
        format!("<{}>", address.email)
    } else {
        format!("{} <{}>", address.name, address.email)
    }
}

fn format_address_list(addresses: &[EmailAddress]) -> String {
    addresses
        .iter()
        .map(format_address)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_message(draft: &Draft) -> String {
    let mut rendered = String::new();

    rendered.push_str(&format!("From: {}\n", format_address(draft.from)));
    rendered.push_str(&format!("To: {}\n", format_address_list(draft.to)));
    if !draft.cc.is_empty() {
        rendered.push_str(&format!("CC: {}\n", format_address_list(draft.cc)));
    }
    if !draft.bcc.is_empty() {
        rendered.push_str(&format!("BCC: {}\n", format_address_list(draft.bcc)));
    }
    rendered.push_str(&format!("Subject: {}\n", draft.subject));

    if let Some(reply_to) = draft.reply_to {
        rendered.push_str(&format!("Reply-To: {}\n", format_address(reply_to)));
    }

    for (key, value) in draft.headers.iter() {
        rendered.push_str(&format!("{}: {}\n", key, value));
    }

    rendered.push('\n');

    for item in draft.content {
        rendered.push_str(&format!("Content-Type: {}\n\n", item.content_type));
        rendered.push_str(&item.value);
        rendered.push_str("\n\n");
    }

    for attachment in draft.attachments {
        rendered.push_str(&format!(
            "Attachment: {} (Type: {})\n",
            attachment.filename, attachment.content_type
        ));
    }

    rendered
}

pub fn render_messages(request: &MailSendRequest) -> Vec<String> {
    request
        .personalizations
        .iter()
        .map(|personalization| render_message(&assemble(request, personalization)))
        .collect()
}

/// Checks every address in the request. Only used when `VALIDATE_ADDRESSES` is on.
pub fn validate_addresses(request: &MailSendRequest) -> Result<(), MailError> {
    let personal = request.personalizations.iter().flat_map(|personalization| {
        personalization
            .to
            .iter()
            .chain(&personalization.cc)
            .chain(&personalization.bcc)
            .chain(&personalization.reply_to)
    });

    let invalid = std::iter::once(&request.from)
        .chain(&request.reply_to)
        .chain(personal)
        .find(|address| !email_address::EmailAddress::is_valid(&address.email));

    match invalid {
        Some(address) => Err(MailError::InvalidAddress(address.email.clone())),
        None => Ok(()),
    }
}

/// Sends every personalization in order over a single relay connection.
///
/// Stops at the first failure; personalizations already handed to the relay
/// stay sent.
pub async fn send_emails(
    dialer: &dyn Dialer,
    smtp: &SmtpConfig,
    request: &MailSendRequest,
) -> Result<usize, MailError> {
    let encryption = smtp.encrypt.parse::<Encryption>()?;
    let relay = dialer.dial(smtp, encryption)?;

    for (index, personalization) in request.personalizations.iter().enumerate() {
        let message = build_message(&assemble(request, personalization))?;

        if let Err(error) = relay.send(message).await {
            tracing::error!(personalization = index, "{}", error);
            return Err(error);
        }

        tracing::debug!(personalization = index, "delivered to relay");
    }

    Ok(request.personalizations.len())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mail::relay::Relay;
    use async_trait::async_trait;
    use lettre::Message;
    use std::sync::{Arc, Mutex};

    /// Records formatted messages; fails the send at `fail_at` (0-based) when set.
    #[derive(Default, Clone)]
    pub(crate) struct RecordingDialer {
        pub sent: Arc<Mutex<Vec<String>>>,
        pub dials: Arc<Mutex<Vec<Encryption>>>,
        pub fail_at: Option<usize>,
    }

    struct RecordingRelay {
        sent: Arc<Mutex<Vec<String>>>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl Relay for RecordingRelay {
        async fn send(&self, message: Message) -> Result<(), MailError> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_at == Some(sent.len()) {
                return Err(MailError::Send("connection refused".to_string()));
            }
            sent.push(String::from_utf8_lossy(&message.formatted()).into_owned());
            Ok(())
        }
    }

    impl Dialer for RecordingDialer {
        fn dial(
            &self,
            _smtp: &SmtpConfig,
            encryption: Encryption,
        ) -> Result<Box<dyn Relay>, MailError> {
            self.dials.lock().unwrap().push(encryption);
            Ok(Box::new(RecordingRelay {
                sent: self.sent.clone(),
                fail_at: self.fail_at,
            }))
        }
    }

    pub(crate) fn smtp_config(encrypt: &str) -> SmtpConfig {
        SmtpConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: "relay".to_string(),
            password: "secret".to_string(),
            encrypt: encrypt.to_string(),
        }
    }

    fn recipient(n: usize) -> Personalization {
        Personalization {
            to: vec![EmailAddress::new(format!("R{n}"), format!("r{n}@example.com"))],
            subject: format!("Subject {n}"),
            ..Default::default()
        }
    }

    fn request() -> MailSendRequest {
        MailSendRequest {
            from: EmailAddress::new("A", "a@x.com"),
            content: vec![ContentItem {
                content_type: "text/plain".to_string(),
                value: "hi".to_string(),
            }],
            personalizations: vec![Personalization {
                to: vec![EmailAddress::new("B", "b@y.com")],
                subject: "Hello".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn renders_minimal_message() {
        let request = request();

        assert_eq!(
            render_messages(&request),
            vec!["From: A <a@x.com>\nTo: B <b@y.com>\nSubject: Hello\n\nContent-Type: text/plain\n\nhi\n\n"]
        );
    }

    #[test]
    fn renders_every_section_in_order() {
        let mut request = request();
        request.content.push(ContentItem {
            content_type: "text/html".to_string(),
            value: "<b>hi</b>".to_string(),
        });
        request.attachments.push(Attachment {
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            content: "not decoded here".to_string(),
        });
        let personalization = &mut request.personalizations[0];
        personalization.to.push(EmailAddress::new("", "c@y.com"));
        personalization.cc.push(EmailAddress::new("D", "d@y.com"));
        personalization.bcc.push(EmailAddress::new("E", "e@y.com"));
        personalization.headers = [("X-Tag", "one"), ("X-Other", "two")].into_iter().collect();

        let rendered = render_message(&assemble(&request, &request.personalizations[0]));

        assert_eq!(
            rendered,
            "From: A <a@x.com>\n\
             To: B <b@y.com>, <c@y.com>\n\
             CC: D <d@y.com>\n\
             BCC: E <e@y.com>\n\
             Subject: Hello\n\
             X-Tag: one\n\
             X-Other: two\n\
             \n\
             Content-Type: text/plain\n\nhi\n\n\
             Content-Type: text/html\n\n<b>hi</b>\n\n\
             Attachment: report.pdf (Type: application/pdf)\n"
        );
    }

    #[test]
    fn empty_names_render_bare_angle_addresses() {
        let mut request = request();
        request.from = EmailAddress::new("", "a@x.com");
        request.content.clear();
        request.personalizations[0].to = vec![EmailAddress::new("", "b@y.com")];
        request.personalizations[0].subject = "S".to_string();

        assert_eq!(
            render_messages(&request),
            vec!["From: <a@x.com>\nTo: <b@y.com>\nSubject: S\n\n"]
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut request = request();
        request.personalizations[0].headers =
            [("X-1", "a"), ("X-2", "b"), ("X-3", "c")].into_iter().collect();

        assert_eq!(render_messages(&request), render_messages(&request));
    }

    #[test]
    fn personalization_reply_to_wins() {
        let mut request = request();
        request.reply_to = Some(EmailAddress::new("Default", "default@x.com"));
        request.personalizations[0].reply_to = Some(EmailAddress::new("Own", "own@x.com"));

        let draft = assemble(&request, &request.personalizations[0]);

        assert_eq!(draft.reply_to, Some(&EmailAddress::new("Own", "own@x.com")));
        assert!(render_message(&draft).contains("Reply-To: Own <own@x.com>\n"));
    }

    #[test]
    fn request_reply_to_is_the_fallback() {
        let mut request = request();
        request.reply_to = Some(EmailAddress::new("Default", "default@x.com"));

        let rendered = render_messages(&request).remove(0);

        assert!(rendered.contains("Reply-To: Default <default@x.com>\n"));
    }

    #[test]
    fn reply_to_is_omitted_without_any_source() {
        let rendered = render_messages(&request()).remove(0);

        assert!(!rendered.contains("Reply-To"));
    }

    #[test]
    fn personalization_from_is_ignored() {
        let mut request = request();
        request.personalizations[0].from = Some(EmailAddress::new("Z", "z@x.com"));

        let rendered = render_messages(&request).remove(0);

        assert!(rendered.starts_with("From: A <a@x.com>\n"));
    }

    #[test]
    fn validation_reports_first_bad_address() {
        let mut request = request();
        assert!(validate_addresses(&request).is_ok());

        request.personalizations[0].cc.push(EmailAddress::new("", "not-an-address"));

        assert!(matches!(
            validate_addresses(&request),
            Err(MailError::InvalidAddress(address)) if address == "not-an-address"
        ));
    }

    #[tokio::test]
    async fn sends_once_per_personalization() {
        let mut request = request();
        request.personalizations = (1..=3).map(recipient).collect();
        let dialer = RecordingDialer::default();

        let sent = send_emails(&dialer, &smtp_config("PLAIN"), &request)
            .await
            .unwrap();

        assert_eq!(sent, 3);
        assert_eq!(dialer.dials.lock().unwrap().as_slice(), &[Encryption::Plain]);
        let messages = dialer.sent.lock().unwrap();
        assert_eq!(messages.len(), 3);
        for (index, message) in messages.iter().enumerate() {
            let n = index + 1;
            assert!(message.contains("From: A <a@x.com>"));
            assert!(message.contains(&format!("To: R{n} <r{n}@example.com>")));
            assert!(message.contains(&format!("Subject: Subject {n}")));
        }
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let mut request = request();
        request.personalizations = (1..=4).map(recipient).collect();
        let dialer = RecordingDialer {
            fail_at: Some(1),
            ..Default::default()
        };

        let error = send_emails(&dialer, &smtp_config("SSL"), &request)
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "failed to send email: connection refused");
        let messages = dialer.sent.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Subject: Subject 1"));
    }

    #[tokio::test]
    async fn unknown_encryption_never_dials() {
        let dialer = RecordingDialer::default();

        let error = send_emails(&dialer, &smtp_config("STARTTLS"), &request())
            .await
            .unwrap_err();

        assert!(matches!(error, MailError::InvalidEncryption(ref value) if value == "STARTTLS"));
        assert!(dialer.dials.lock().unwrap().is_empty());
        assert!(dialer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_attachment_aborts_before_sending() {
        let mut request = request();
        request.attachments.push(Attachment {
            filename: "a.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            content: "%%% not base64 %%%".to_string(),
        });
        let dialer = RecordingDialer::default();

        let error = send_emails(&dialer, &smtp_config("TLS"), &request)
            .await
            .unwrap_err();

        assert!(matches!(error, MailError::AttachmentDecode(_)));
        assert!(error.to_string().starts_with("failed to decode attachment content: "));
        assert!(dialer.sent.lock().unwrap().is_empty());
    }
}
