use std::fmt;

use serde_json::Value;

use super::text;

/// How a field's value is typed in the output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Whole number (counts, ids, offsets).
    Count,
    /// Monetary or fractional number.
    Amount,
    /// Free text, or a scalar kept as-is (timestamps, tiers).
    Text,
    /// Boolean flag.
    Flag,
    /// List of plain strings.
    TextList,
    /// Nested mappings (questions, qualifications).
    Records,
}

impl FieldKind {
    /// Whether a value recovered from a payload may populate a field of this kind.
    pub fn admits(self, value: &Value) -> bool {
        match self {
            Self::Count | Self::Amount | Self::Text | Self::Flag => {
                !matches!(value, Value::Array(_) | Value::Object(_))
            }
            Self::TextList => matches!(value, Value::Array(_) | Value::Null),
            Self::Records => true,
        }
    }

    /// Coerce text scraped from markup into this kind's value shape.
    pub fn coerce_text(self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            Self::Count => text::parse_count(raw).map(Value::from),
            Self::Amount => text::parse_money(raw).map(Value::from),
            Self::Flag => text::parse_flag(raw).map(Value::Bool),
            Self::Text | Self::Records => Some(Value::String(raw.to_string())),
            Self::TextList => Some(Value::Array(vec![Value::String(raw.to_string())])),
        }
    }
}

macro_rules! job_fields {
    ($( $variant:ident => $name:literal : $kind:ident ),+ $(,)?) => {
        /// One column of a [`JobRecord`](super::JobRecord).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Field {
            $($variant),+
        }

        impl Field {
            /// Every field, in output order.
            pub const ALL: &'static [Field] = &[$(Field::$variant),+];
            pub const COUNT: usize = Self::ALL.len();

            pub const fn name(self) -> &'static str {
                match self {
                    $(Field::$variant => $name),+
                }
            }

            pub const fn kind(self) -> FieldKind {
                match self {
                    $(Field::$variant => FieldKind::$kind),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Field::$variant),)+
                    _ => None,
                }
            }
        }

        /// Output column names, in order.
        pub const ORDERED_FIELDS: &[&str] = &[$($name),+];
    };
}

job_fields! {
    Applicants => "applicants": Count,
    BuyerAvgHourlyRate => "buyer_avgHourlyJobsRate_amount": Amount,
    BuyerContractDate => "buyer_company_contractDate": Text,
    BuyerHireRatePct => "buyer_hire_rate_pct": Count,
    BuyerOpenJobs => "buyer_jobs_openCount": Count,
    BuyerPostedJobs => "buyer_jobs_postedCount": Count,
    BuyerCity => "buyer_location_city": Text,
    BuyerTimezone => "buyer_location_countryTimezone": Text,
    BuyerLocalTime => "buyer_location_localTime": Text,
    BuyerUtcOffset => "buyer_location_offsetFromUtcMillis": Count,
    BuyerActiveAssignments => "buyer_stats_activeAssignmentsCount": Count,
    BuyerHours => "buyer_stats_hoursCount": Count,
    BuyerJobsWithHires => "buyer_stats_totalJobsWithHires": Count,
    Category => "category": Text,
    CategoryGroupName => "categoryGroup_name": Text,
    CategoryGroupSlug => "categoryGroup_urlSlug": Text,
    CategoryName => "category_name": Text,
    CategorySlug => "category_urlSlug": Text,
    InvitationsSent => "clientActivity_invitationsSent": Count,
    TotalHired => "clientActivity_totalHired": Count,
    InvitedToInterview => "clientActivity_totalInvitedToInterview": Count,
    UnansweredInvites => "clientActivity_unansweredInvites": Count,
    ClientCompanySize => "client_company_size": Text,
    ClientCountry => "client_country": Text,
    ClientHires => "client_hires": Count,
    ClientIndustry => "client_industry": Text,
    ClientRating => "client_rating": Amount,
    ClientReviews => "client_reviews": Count,
    ClientTotalSpent => "client_total_spent": Amount,
    ConnectsRequired => "connects_required": Count,
    ContractorTier => "contractorTier": Text,
    Currency => "currency": Text,
    Description => "description": Text,
    Duration => "duration": Text,
    EnterpriseJob => "enterpriseJob": Flag,
    FixedBudget => "fixed_budget_amount": Amount,
    HourlyMax => "hourly_max": Amount,
    HourlyMin => "hourly_min": Amount,
    IsContractToHire => "isContractToHire": Flag,
    JobId => "job_id": Text,
    LastBuyerActivity => "lastBuyerActivity": Text,
    Level => "level": Text,
    PositionsToHire => "numberOfPositionsToHire": Count,
    PaymentVerified => "payment_verified": Flag,
    PhoneVerified => "phone_verified": Flag,
    Premium => "premium": Flag,
    Qualifications => "qualifications": Records,
    Questions => "questions": Records,
    Skills => "skills": TextList,
    Title => "title": Text,
    CreatedAt => "ts_create": Text,
    PublishedAt => "ts_publish": Text,
    Type => "type": Text,
    Url => "url": Text,
}

impl Field {
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
