//! Semantic host filters and their loosely-typed input form.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

/// Raw filter parameters, as they arrive from a query string or CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterParams {
    pub name: Option<String>,
    pub env: Option<String>,
    pub team: Option<String>,
    pub since: Option<String>,
    pub before: Option<String>,
}

/// Parsed filter. Every field is optional; unset fields do not narrow a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFilter {
    /// Case-sensitive name prefix.
    pub name: Option<String>,
    /// Case-insensitive match on `tags["env"]`.
    pub env: Option<String>,
    /// Case-insensitive match on `tags["team"]`.
    pub team: Option<String>,
    /// Inclusive lower bound on `modified`.
    pub since: Option<OffsetDateTime>,
    /// Exclusive upper bound on `modified`.
    pub before: Option<OffsetDateTime>,
}

impl HostFilter {
    /// Build a filter from raw parameters. Blank strings count as unset and a
    /// timestamp that is not RFC 3339 is logged and dropped. The name prefix
    /// is kept verbatim, surrounding whitespace included.
    pub fn from_params(params: &FilterParams) -> Self {
        HostFilter {
            name: params.name.clone().filter(|p| !p.trim().is_empty()),
            env: non_blank(&params.env),
            team: non_blank(&params.team),
            since: parse_bound("since", &params.since),
            before: parse_bound("before", &params.before),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.env.is_none() && self.team.is_none() && self.since.is_none() && self.before.is_none()
    }

    pub fn with_name(mut self, prefix: impl Into<String>) -> Self {
        self.name = Some(prefix.into());
        self
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn with_since(mut self, since: OffsetDateTime) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_before(mut self, before: OffsetDateTime) -> Self {
        self.before = Some(before);
        self
    }
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_bound(field: &str, raw: &Option<String>) -> Option<OffsetDateTime> {
    let raw = non_blank(raw)?;
    match OffsetDateTime::parse(&raw, &Rfc3339) {
        Ok(ts) => Some(ts),
        Err(err) => {
            warn!(field, value = %raw, error = %err, "ignoring unparseable filter timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn empty_params_give_empty_filter() {
        assert!(HostFilter::from_params(&FilterParams::default()).is_empty());
        let blanks = FilterParams { name: Some(" ".into()), env: Some(String::new()), ..Default::default() };
        assert!(HostFilter::from_params(&blanks).is_empty());
    }

    #[test]
    fn name_prefix_is_not_trimmed() {
        let p = FilterParams { name: Some("web ".into()), env: Some(" prod ".into()), ..Default::default() };
        let f = HostFilter::from_params(&p);
        assert_eq!(f.name.as_deref(), Some("web "));
        assert_eq!(f.env.as_deref(), Some("prod"));
    }

    #[test]
    fn parses_rfc3339_bounds() {
        let p = FilterParams {
            since: Some("2014-08-01T19:18:12Z".into()),
            before: Some("2014-08-02T00:00:00+02:00".into()),
            ..Default::default()
        };
        let f = HostFilter::from_params(&p);
        assert_eq!(f.since, Some(datetime!(2014-08-01 19:18:12 UTC)));
        assert_eq!(f.before, Some(datetime!(2014-08-02 00:00:00 +2)));
    }

    #[test]
    fn malformed_timestamp_is_dropped_not_fatal() {
        let p = FilterParams { team: Some("infra".into()), since: Some("yesterday".into()), ..Default::default() };
        let f = HostFilter::from_params(&p);
        assert_eq!(f.team.as_deref(), Some("infra"));
        assert_eq!(f.since, None);
    }
}
