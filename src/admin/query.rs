use std::collections::HashMap;

use time::{Date, Duration, Month, OffsetDateTime, Time, UtcOffset};

use crate::admin::{FilterKind, ModelAdmin};
use crate::errors::AccountsError;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Query-string keys with a fixed meaning; every other key is a list filter.
const PAGE_PARAM: &str = "page";
const LIMIT_PARAM: &str = "limit";
const SEARCH_PARAM: &str = "q";
const ORDERING_PARAM: &str = "ordering";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    Today,
    Past7Days,
    ThisMonth,
    ThisYear,
}

impl DateRange {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(DateRange::Today),
            "past_7_days" => Some(DateRange::Past7Days),
            "this_month" => Some(DateRange::ThisMonth),
            "this_year" => Some(DateRange::ThisYear),
            _ => None,
        }
    }

    /// Half-open `[from, until)` window in UTC.
    pub fn bounds(self, now: OffsetDateTime) -> Option<(OffsetDateTime, OffsetDateTime)> {
        let today = now.to_offset(UtcOffset::UTC).date();
        let (from, until) = match self {
            DateRange::Today => (today, today.next_day()?),
            DateRange::Past7Days => (today - Duration::days(7), today.next_day()?),
            DateRange::ThisMonth => {
                let first = today.replace_day(1).ok()?;
                let next = match today.month() {
                    Month::December => {
                        Date::from_calendar_date(today.year() + 1, Month::January, 1).ok()?
                    }
                    month => Date::from_calendar_date(today.year(), month.next(), 1).ok()?,
                };
                (first, next)
            }
            DateRange::ThisYear => (
                Date::from_calendar_date(today.year(), Month::January, 1).ok()?,
                Date::from_calendar_date(today.year() + 1, Month::January, 1).ok()?,
            ),
        };

        Some((
            from.with_time(Time::MIDNIGHT).assume_utc(),
            until.with_time(Time::MIDNIGHT).assume_utc(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppliedFilter {
    Equals {
        field: &'static str,
        value: bool,
    },
    Between {
        field: &'static str,
        from: OffsetDateTime,
        until: OffsetDateTime,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub descending: bool,
}

/// A list request checked against one [`ModelAdmin`]. Only declared fields
/// survive, so stores can trust every name in here.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminListQuery {
    pub page: i64,
    pub limit: i64,
    pub search_terms: Vec<String>,
    pub filters: Vec<AppliedFilter>,
    pub ordering: Vec<SortKey>,
}

impl AdminListQuery {
    pub fn for_admin(admin: &ModelAdmin) -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            search_terms: Vec::new(),
            filters: Vec::new(),
            ordering: admin
                .ordering
                .iter()
                .filter_map(|key| parse_sort_key(admin, key))
                .collect(),
        }
    }

    pub fn from_params(
        admin: &ModelAdmin,
        params: &HashMap<String, String>,
        now: OffsetDateTime,
    ) -> Result<Self, AccountsError> {
        let mut query = Self::for_admin(admin);

        if let Some(page) = params.get(PAGE_PARAM) {
            query.page = parse_number(PAGE_PARAM, page)?.max(1);
        }
        if let Some(limit) = params.get(LIMIT_PARAM) {
            query.limit = parse_number(LIMIT_PARAM, limit)?.clamp(1, MAX_PAGE_SIZE);
        }
        if query.checked_offset().is_none() {
            return Err(AccountsError::Validation(format!(
                "`{PAGE_PARAM}` is out of range"
            )));
        }

        if let Some(search) = params.get(SEARCH_PARAM) {
            query.search_terms = search.split_whitespace().map(str::to_string).collect();
        }

        if let Some(ordering) = params.get(ORDERING_PARAM) {
            let keys = ordering
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(|key| {
                    parse_sort_key(admin, key).ok_or_else(|| {
                        AccountsError::Validation(format!("cannot order by `{key}`"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if !keys.is_empty() {
                query.ordering = keys;
            }
        }

        let mut filter_keys: Vec<&String> = params
            .keys()
            .filter(|key| ![PAGE_PARAM, LIMIT_PARAM, SEARCH_PARAM, ORDERING_PARAM].contains(&key.as_str()))
            .collect();
        filter_keys.sort();

        for key in filter_keys {
            let filter = admin
                .filter(key)
                .ok_or_else(|| AccountsError::Validation(format!("cannot filter by `{key}`")))?;
            let raw = params[key].trim();

            let applied = match filter.kind {
                FilterKind::Boolean => AppliedFilter::Equals {
                    field: filter.field,
                    value: parse_bool(raw).ok_or_else(|| {
                        AccountsError::Validation(format!("`{key}` expects true or false"))
                    })?,
                },
                FilterKind::DateRange => {
                    let range = DateRange::parse(raw).ok_or_else(|| {
                        AccountsError::Validation(format!(
                            "`{key}` expects today, past_7_days, this_month or this_year"
                        ))
                    })?;
                    let (from, until) = range.bounds(now).ok_or_else(|| {
                        AccountsError::Validation(format!("`{key}` is out of range"))
                    })?;
                    AppliedFilter::Between {
                        field: filter.field,
                        from,
                        until,
                    }
                }
            };
            query.filters.push(applied);
        }

        Ok(query)
    }

    fn checked_offset(&self) -> Option<i64> {
        self.page.checked_sub(1)?.checked_mul(self.limit)
    }

    /// Rows skipped before this page. `from_params` rejects pages whose
    /// offset does not fit in an `i64`.
    pub fn offset(&self) -> i64 {
        self.checked_offset().unwrap_or(i64::MAX)
    }
}

fn parse_sort_key(admin: &ModelAdmin, key: &str) -> Option<SortKey> {
    let (name, descending) = match key.strip_prefix('-') {
        Some(name) => (name, true),
        None => (key, false),
    };
    admin.field(name).map(|field| SortKey {
        field: field.name,
        descending,
    })
}

fn parse_number(name: &str, raw: &str) -> Result<i64, AccountsError> {
    raw.trim()
        .parse()
        .map_err(|_| AccountsError::Validation(format!("`{name}` must be a whole number")))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{EMAIL_VERIFICATION_TOKEN_ADMIN, USER_ADMIN};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-05-14 15:30 UTC);

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_come_from_the_admin() {
        let query = AdminListQuery::from_params(&USER_ADMIN, &HashMap::new(), NOW).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.offset(), 0);
        assert!(query.search_terms.is_empty());
        assert!(query.filters.is_empty());
        assert_eq!(
            query.ordering,
            vec![SortKey {
                field: "date_joined",
                descending: true
            }]
        );
    }

    #[test]
    fn paging_is_clamped() {
        let query = AdminListQuery::from_params(
            &USER_ADMIN,
            &params(&[("page", "0"), ("limit", "1000")]),
            NOW,
        )
        .unwrap();
        assert_eq!((query.page, query.limit), (1, MAX_PAGE_SIZE));

        let query =
            AdminListQuery::from_params(&USER_ADMIN, &params(&[("page", "3"), ("limit", "10")]), NOW)
                .unwrap();
        assert_eq!(query.offset(), 20);

        let bad = AdminListQuery::from_params(&USER_ADMIN, &params(&[("page", "two")]), NOW);
        assert!(matches!(bad, Err(AccountsError::Validation(_))));
    }

    #[test]
    fn pages_past_the_addressable_range_are_rejected() {
        let huge = i64::MAX.to_string();
        let bad =
            AdminListQuery::from_params(&USER_ADMIN, &params(&[("page", huge.as_str())]), NOW);
        assert!(matches!(bad, Err(AccountsError::Validation(_))));

        let last = (i64::MAX / MAX_PAGE_SIZE + 1).to_string();
        let query = AdminListQuery::from_params(
            &USER_ADMIN,
            &params(&[("page", last.as_str()), ("limit", "100")]),
            NOW,
        )
        .unwrap();
        assert_eq!(query.offset(), (i64::MAX / MAX_PAGE_SIZE) * MAX_PAGE_SIZE);
    }

    #[test]
    fn search_splits_on_whitespace() {
        let query =
            AdminListQuery::from_params(&USER_ADMIN, &params(&[("q", "  ada   lovelace ")]), NOW)
                .unwrap();
        assert_eq!(query.search_terms, vec!["ada", "lovelace"]);
    }

    #[test]
    fn ordering_accepts_declared_fields_only() {
        let query = AdminListQuery::from_params(
            &USER_ADMIN,
            &params(&[("ordering", "username,-email")]),
            NOW,
        )
        .unwrap();
        assert_eq!(
            query.ordering,
            vec![
                SortKey {
                    field: "username",
                    descending: false
                },
                SortKey {
                    field: "email",
                    descending: true
                },
            ]
        );

        let bad = AdminListQuery::from_params(
            &USER_ADMIN,
            &params(&[("ordering", "password_hash")]),
            NOW,
        );
        assert!(matches!(bad, Err(AccountsError::Validation(_))));
    }

    #[test]
    fn boolean_filters() {
        let query = AdminListQuery::from_params(
            &USER_ADMIN,
            &params(&[("is_staff", "yes"), ("is_email_verified", "0")]),
            NOW,
        )
        .unwrap();
        assert_eq!(
            query.filters,
            vec![
                AppliedFilter::Equals {
                    field: "is_email_verified",
                    value: false
                },
                AppliedFilter::Equals {
                    field: "is_staff",
                    value: true
                },
            ]
        );

        let bad = AdminListQuery::from_params(&USER_ADMIN, &params(&[("is_staff", "maybe")]), NOW);
        assert!(matches!(bad, Err(AccountsError::Validation(_))));
    }

    #[test]
    fn undeclared_filters_are_rejected() {
        let bad = AdminListQuery::from_params(&USER_ADMIN, &params(&[("email", "x")]), NOW);
        assert!(matches!(bad, Err(AccountsError::Validation(_))));
    }

    #[test]
    fn created_at_date_range_filter() {
        let query = AdminListQuery::from_params(
            &EMAIL_VERIFICATION_TOKEN_ADMIN,
            &params(&[("created_at", "past_7_days")]),
            NOW,
        )
        .unwrap();
        assert_eq!(
            query.filters,
            vec![AppliedFilter::Between {
                field: "created_at",
                from: datetime!(2026-05-07 00:00 UTC),
                until: datetime!(2026-05-15 00:00 UTC),
            }]
        );

        let bad = AdminListQuery::from_params(
            &EMAIL_VERIFICATION_TOKEN_ADMIN,
            &params(&[("created_at", "last_century")]),
            NOW,
        );
        assert!(matches!(bad, Err(AccountsError::Validation(_))));
    }

    #[test]
    fn date_range_bounds() {
        assert_eq!(
            DateRange::Today.bounds(NOW),
            Some((datetime!(2026-05-14 00:00 UTC), datetime!(2026-05-15 00:00 UTC)))
        );
        assert_eq!(
            DateRange::ThisMonth.bounds(NOW),
            Some((datetime!(2026-05-01 00:00 UTC), datetime!(2026-06-01 00:00 UTC)))
        );
        assert_eq!(
            DateRange::ThisMonth.bounds(datetime!(2026-12-31 23:59 UTC)),
            Some((datetime!(2026-12-01 00:00 UTC), datetime!(2027-01-01 00:00 UTC)))
        );
        assert_eq!(
            DateRange::ThisYear.bounds(NOW),
            Some((datetime!(2026-01-01 00:00 UTC), datetime!(2027-01-01 00:00 UTC)))
        );
        // Local offsets are folded into UTC first.
        assert_eq!(
            DateRange::Today.bounds(datetime!(2026-05-15 01:00 +03:00)),
            Some((datetime!(2026-05-14 00:00 UTC), datetime!(2026-05-15 00:00 UTC)))
        );
    }
}
