use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::soap::wsse::{Error, Result};

/// Lifetime of every Timestamp this crate issues.
pub const TTL_SECONDS: i64 = 5 * 60;

// ISO-8601 in UTC with millisecond precision, e.g. 2024-05-01T10:15:30.123Z
const WIRE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename(serialize = "@u:Id", deserialize = "@Id"))]
    pub id: String,

    #[serde(rename(serialize = "u:Created", deserialize = "Created"))]
    pub created: String,

    #[serde(rename(serialize = "u:Expires", deserialize = "Expires"))]
    pub expires: String,
}

impl Timestamp {
    /// Create a timestamp starting now
    pub fn new(id: impl Into<String>) -> Result<Self> {
        Self::starting_at(id, OffsetDateTime::now_utc())
    }

    /// Create a timestamp created at `created` and expiring `TTL_SECONDS` later.
    /// Sub-millisecond precision is dropped so both instants render exactly.
    pub fn starting_at(id: impl Into<String>, created: OffsetDateTime) -> Result<Self> {
        let created = created
            .to_offset(time::UtcOffset::UTC)
            .replace_millisecond(created.millisecond())?;
        let expires = created + Duration::seconds(TTL_SECONDS);

        Ok(Self {
            id: id.into(),
            created: format_instant(created)?,
            expires: format_instant(expires)?,
        })
    }

    pub fn created_at(&self) -> Result<OffsetDateTime> {
        parse_instant(&self.created)
    }

    pub fn expires_at(&self) -> Result<OffsetDateTime> {
        parse_instant(&self.expires)
    }

    /// Validate that the timestamp is still valid
    pub fn validate(&self) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let created = self.created_at()?;
        let expires = self.expires_at()?;

        // 30s tolerance for clock skew
        let tolerance = Duration::seconds(30);
        if created > now + tolerance {
            return Err(Error::Invalid(
                "Timestamp created time is in the future".into(),
            ));
        }
        if now > expires {
            return Err(Error::Invalid("Timestamp has expired".into()));
        }
        if created >= expires {
            return Err(Error::Invalid(
                "Timestamp created time must be before expires time".into(),
            ));
        }
        Ok(())
    }
}

fn format_instant(instant: OffsetDateTime) -> Result<String> {
    Ok(instant.format(WIRE_FORMAT)?)
}

fn parse_instant(value: &str) -> Result<OffsetDateTime> {
    Ok(PrimitiveDateTime::parse(value, WIRE_FORMAT)?.assume_utc())
}
