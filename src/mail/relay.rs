use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{
        Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart,
        header::{ContentType, HeaderName, HeaderValue},
    },
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use std::str::FromStr;

use super::{
    delegates::{Draft, decode_attachment},
    error::MailError,
    schemas::{ContentItem, EmailAddress},
};
use crate::apex::config::SmtpConfig;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    /// Implicit TLS from the first byte.
    Ssl,
    /// Mandatory STARTTLS.
    Tls,
    /// STARTTLS when the server offers it, cleartext otherwise.
    Plain,
}

impl FromStr for Encryption {
    type Err = MailError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SSL" => Ok(Self::Ssl),
            "TLS" => Ok(Self::Tls),
            "PLAIN" => Ok(Self::Plain),
            other => Err(MailError::InvalidEncryption(other.to_string())),
        }
    }
}

/// An open path to the SMTP relay.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), MailError>;
}

/// Produces a fresh [`Relay`] for each request.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, smtp: &SmtpConfig, encryption: Encryption) -> Result<Box<dyn Relay>, MailError>;
}

pub struct SmtpDialer;

impl Dialer for SmtpDialer {
    fn dial(&self, smtp: &SmtpConfig, encryption: Encryption) -> Result<Box<dyn Relay>, MailError> {
        let parameters = TlsParameters::new(smtp.host.clone())
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let tls = match encryption {
            Encryption::Ssl => Tls::Wrapper(parameters),
            Encryption::Tls => Tls::Required(parameters),
            Encryption::Plain => Tls::Opportunistic(parameters),
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
            .port(smtp.port)
            .tls(tls)
            .credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.clone(),
            ))
            .build();

        Ok(Box::new(SmtpRelay { transport }))
    }
}

struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl Relay for SmtpRelay {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;

        Ok(())
    }
}

enum Body {
    Single(SinglePart),
    Alternative(MultiPart),
}

fn mailbox(address: &EmailAddress) -> Result<Mailbox, MailError> {
    let email = address
        .email
        .parse()
        .map_err(|source| MailError::Address {
            address: address.email.clone(),
            source,
        })?;
    let name = (!address.name.is_empty()).then(|| address.name.clone());

    Ok(Mailbox::new(name, email))
}

fn text_part(item: &ContentItem) -> SinglePart {
    let content_type = ContentType::parse(&item.content_type).unwrap_or(ContentType::TEXT_PLAIN);
    SinglePart::builder()
        .header(content_type)
        .body(item.value.clone())
}

fn attachment_type(raw: &str) -> Result<ContentType, MailError> {
    ContentType::parse(raw)
        .or_else(|_| ContentType::parse(OCTET_STREAM))
        .map_err(|_| MailError::Header(format!("Content-Type: {}", raw)))
}

fn body(content: &[ContentItem]) -> Option<Body> {
    match content {
        [] => None,
        [single] => Some(Body::Single(text_part(single))),
        [first, rest @ ..] => {
            let alternative = MultiPart::alternative().singlepart(text_part(first));
            Some(Body::Alternative(rest.iter().map(text_part).fold(
                alternative,
                MultiPart::singlepart,
            )))
        }
    }
}

/// Turns a draft into a transmittable message. Attachments are decoded here,
/// so a bad one fails this personalization before anything is sent.
pub fn build_message(draft: &Draft) -> Result<Message, MailError> {
    let mut builder = Message::builder().from(mailbox(draft.from)?);

    for to in draft.to {
        builder = builder.to(mailbox(to)?);
    }
    for cc in draft.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    for bcc in draft.bcc {
        builder = builder.bcc(mailbox(bcc)?);
    }

    builder = builder.subject(draft.subject);

    if let Some(reply_to) = draft.reply_to {
        builder = builder.reply_to(mailbox(reply_to)?);
    }

    for (key, value) in draft.headers.iter() {
        let name = HeaderName::new_from_ascii(key.to_string())
            .map_err(|_| MailError::Header(key.to_string()))?;
        builder = builder.raw_header(HeaderValue::new(name, value.to_string()));
    }

    let mut attachments = Vec::with_capacity(draft.attachments.len());
    for attachment in draft.attachments {
        let bytes = decode_attachment(attachment)?;
        let content_type = attachment_type(&attachment.content_type)?;
        attachments.push(MimeAttachment::new(attachment.filename.clone()).body(bytes, content_type));
    }

    let mut attachments = attachments.into_iter();
    let message = match (body(draft.content), attachments.next()) {
        (None, None) => builder.body(String::new())?,
        (Some(Body::Single(part)), None) => builder.singlepart(part)?,
        (Some(Body::Alternative(part)), None) => builder.multipart(part)?,
        (body, Some(first)) => {
            let mixed = match body {
                None => MultiPart::mixed().singlepart(first),
                Some(Body::Single(part)) => MultiPart::mixed().singlepart(part).singlepart(first),
                Some(Body::Alternative(part)) => {
                    MultiPart::mixed().multipart(part).singlepart(first)
                }
            };
            builder.multipart(attachments.fold(mixed, MultiPart::singlepart))?
        }
    };

    Ok(message)
}
