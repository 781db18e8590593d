use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, MapAccess, Visitor},
};
use std::fmt;

pub const SEND_PATH: &str = "/tx/v1/send";

/// Reads an explicit JSON `null` as the type's zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct EmailAddress {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

#[cfg(test)]
impl EmailAddress {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Attachment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub content_type: String,
    /// Base64 encoded file bytes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContentItem {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub content_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
}

/// Header map that keeps the order keys arrived in.
///
/// A repeated key overwrites the earlier value without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::default();
        for (key, value) in iter {
            headers.insert(key, value);
        }
        headers
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of header names to string values")
            }

            fn visit_unit<E>(self) -> Result<Headers, E>
            where
                E: de::Error,
            {
                Ok(Headers::default())
            }

            fn visit_map<A>(self, mut access: A) -> Result<Headers, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut headers = Headers::default();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    headers.insert(key, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_any(HeadersVisitor)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Personalization {
    #[serde(default, deserialize_with = "null_as_default")]
    pub to: Vec<EmailAddress>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cc: Vec<EmailAddress>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bcc: Vec<EmailAddress>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default)]
    pub headers: Headers,
    /// DKIM settings are accepted but messages are not signed.
    #[allow(dead_code)]
    #[serde(default, deserialize_with = "null_as_default")]
    pub dkim_domain: String,
    #[allow(dead_code)]
    #[serde(default, deserialize_with = "null_as_default")]
    pub dkim_private_key: String,
    #[allow(dead_code)]
    #[serde(default, deserialize_with = "null_as_default")]
    pub dkim_selector: String,
    #[serde(default)]
    pub reply_to: Option<EmailAddress>,
    /// Accepted for compatibility; the request-level sender is always used.
    #[allow(dead_code)]
    #[serde(default)]
    pub from: Option<EmailAddress>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MailSendRequest {
    /// Request-level headers are accepted; only per-personalization ones are applied.
    #[allow(dead_code)]
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, deserialize_with = "null_as_default")]
    pub personalizations: Vec<Personalization>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reply_to: Option<EmailAddress>,
    /// Subjects come from each personalization.
    #[allow(dead_code)]
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: EmailAddress,
    /// The envelope sender is always the authenticated SMTP account.
    #[allow(dead_code)]
    #[serde(default)]
    pub mailfrom: Option<EmailAddress>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SendQuery {
    #[serde(rename = "dry-run")]
    pub dry_run: Option<String>,
}

impl SendQuery {
    #[inline]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run.as_deref() == Some("true")
    }
}

#[derive(Debug, Serialize)]
pub struct DryRunResponse {
    pub data: Vec<String>,
}
