use std::fmt;

use crate::{errors::Error, Result};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// The two disjoint collections an applicant record can live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordSet {
    Active,
    Archived,
}

impl RecordSet {
    pub fn label(self) -> &'static str {
        match self {
            RecordSet::Active => "active",
            RecordSet::Archived => "archived",
        }
    }

    pub fn other(self) -> RecordSet {
        match self {
            RecordSet::Active => RecordSet::Archived,
            RecordSet::Archived => RecordSet::Active,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Pending,
    Done,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "done" => Some(PaymentStatus::Done),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage buckets holding an applicant's files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
    Pictures,
    Cv,
    Letters,
}

impl Bucket {
    /// Record column holding the file URL for this bucket.
    pub fn url_column(self) -> &'static str {
        match self {
            Bucket::Pictures => "picture_url",
            Bucket::Cv => "cv_url",
            Bucket::Letters => "recommendation_url",
        }
    }

    pub fn caption(self) -> &'static str {
        match self {
            Bucket::Pictures => "📸 Profile Picture",
            Bucket::Cv => "📄 CV",
            Bucket::Letters => "📨 Recommendation Letters",
        }
    }
}

/// How staff identify an applicant: the alias-email key, or a WhatsApp number.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lookup {
    AliasEmail(String),
    WhatsApp(String),
}

impl Lookup {
    /// Input with an `@` is an alias-email (lowercased); anything else is
    /// reduced to its digits and treated as a phone number.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.contains('@') {
            return Ok(Lookup::AliasEmail(text.to_lowercase()));
        }
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "'{text}' is neither an alias email nor a phone number"
            )));
        }
        Ok(Lookup::WhatsApp(digits))
    }

    pub fn column(&self) -> &'static str {
        match self {
            Lookup::AliasEmail(_) => "alias_email",
            Lookup::WhatsApp(_) => "whatsapp",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Lookup::AliasEmail(v) | Lookup::WhatsApp(v) => v,
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
