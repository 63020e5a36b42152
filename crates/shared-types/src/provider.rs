//! Identity provider tag.
//!
//! Stored as upper-case TEXT (`LOCAL`, `GOOGLE`). With the `diesel` feature
//! enabled the enum maps straight onto a `TEXT` column.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "diesel",
    derive(diesel::expression::AsExpression, diesel::deserialize::FromSqlRow)
)]
#[cfg_attr(feature = "diesel", diesel(sql_type = diesel::sql_types::Text))]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthProvider {
    Local,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "LOCAL",
            AuthProvider::Google => "GOOGLE",
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored provider tag is not one we know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown auth provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for AuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCAL" => Ok(AuthProvider::Local),
            "GOOGLE" => Ok(AuthProvider::Google),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

// Diesel integration for AuthProvider

#[cfg(feature = "diesel")]
mod sql {
    use super::AuthProvider;
    use diesel::deserialize::FromSql;
    use diesel::pg::{Pg, PgValue};
    use diesel::serialize::{IsNull, Output, ToSql};
    use diesel::sql_types::Text;
    use std::io::Write;

    impl FromSql<Text, Pg> for AuthProvider {
        fn from_sql(bytes: PgValue<'_>) -> diesel::deserialize::Result<Self> {
            let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
            s.parse::<AuthProvider>()
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        }
    }

    impl ToSql<Text, Pg> for AuthProvider {
        fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> diesel::serialize::Result {
            out.write_all(self.as_str().as_bytes())?;
            Ok(IsNull::No)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_str() {
        for provider in [AuthProvider::Local, AuthProvider::Google] {
            assert_eq!(provider.as_str().parse::<AuthProvider>(), Ok(provider));
        }
    }

    #[test]
    fn test_rejects_lower_case_tag() {
        let err = "google".parse::<AuthProvider>().unwrap_err();
        assert_eq!(err, UnknownProvider("google".to_string()));
        assert_eq!(err.to_string(), "unknown auth provider: google");
    }

    #[test]
    fn test_serde_matches_column_format() {
        assert_eq!(
            serde_json::to_string(&AuthProvider::Local).unwrap(),
            r#""LOCAL""#
        );
    }
}
