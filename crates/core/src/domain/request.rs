use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::domain::site::SiteId;
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::lifecycle::TransitionPlan;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingRpm,
    PendingTop,
    ApprovedTop,
    Done,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingRpm => "pending_rpm",
            Self::PendingTop => "pending_top",
            Self::ApprovedTop => "approved_top",
            Self::Done => "done",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_rpm" => Some(Self::PendingRpm),
            "pending_top" => Some(Self::PendingTop),
            "approved_top" => Some(Self::ApprovedTop),
            "done" => Some(Self::Done),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Rejected)
    }
}

/// Expense category. The closed variants mirror the site-deployment
/// divisions; everything else (wifi, bbm, entertainment, token top-ups,
/// ...) is an operational subtype carried verbatim so that unknown
/// categories coming out of the store are quarantined, not dropped.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Division {
    Permit,
    Snd,
    CivilWork,
    ElJointer,
    Document,
    Rpm,
    Ops(String),
}

impl Division {
    pub fn storage_key(&self) -> String {
        match self {
            Self::Permit => "permit".to_string(),
            Self::Snd => "snd".to_string(),
            Self::CivilWork => "civil_work".to_string(),
            Self::ElJointer => "el_jointer".to_string(),
            Self::Document => "document".to_string(),
            Self::Rpm => "rpm".to_string(),
            Self::Ops(subtype) => subtype.clone(),
        }
    }

    /// Total parse: normalized match on the legacy spellings, with
    /// unrecognized values kept as an ops subtype.
    pub fn parse(value: &str) -> Self {
        let key = value.trim().to_ascii_lowercase().replace([' ', '/', '-'], "_");
        match key.as_str() {
            "permit" => Self::Permit,
            "snd" => Self::Snd,
            "cw" | "civil_work" => Self::CivilWork,
            "el" | "jointer" | "el_jointer" => Self::ElJointer,
            "dc" | "doc" | "document" => Self::Document,
            "rpm" => Self::Rpm,
            _ => Self::Ops(key),
        }
    }

    /// Display label used for report buckets and export rows.
    pub fn label(&self) -> String {
        match self {
            Self::Permit => "Permit".to_string(),
            Self::Snd => "SND".to_string(),
            Self::CivilWork => "Civil Work".to_string(),
            Self::ElJointer => "EL/Jointer".to_string(),
            Self::Document => "Document".to_string(),
            Self::Rpm => "RPM".to_string(),
            Self::Ops(subtype) => match subtype.as_str() {
                "wifi" => "Wifi".to_string(),
                "bbm" => "BBM".to_string(),
                "hb_token" => "HB Tokens".to_string(),
                "entertainment" => "Entertainment".to_string(),
                other => {
                    let mut chars = other.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                }
            },
        }
    }
}

impl Serialize for Division {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.storage_key())
    }
}

impl<'de> Deserialize<'de> for Division {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Division::parse(&raw))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NominalParseError {
    #[error("nominal value is empty")]
    Empty,
    #[error("nominal value `{0}` is not a currency amount")]
    Malformed(String),
}

/// Integer minor-unit rupiah. The source system stored free-form
/// currency strings; those are normalized exactly once at the ingest
/// boundary and never stored.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Money(pub i64);

impl Money {
    /// Parse a free-form nominal string ("150000", "Rp 1.500.000",
    /// "1,500,000"). Dots, commas, and spaces are treated as grouping
    /// separators.
    pub fn parse_nominal(raw: &str) -> Result<Self, NominalParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NominalParseError::Empty);
        }

        let without_prefix = trimmed
            .trim_start_matches("Rp")
            .trim_start_matches("rp")
            .trim_start_matches("RP")
            .trim_start_matches("IDR")
            .trim();
        let digits: String = without_prefix
            .chars()
            .filter(|ch| !matches!(ch, '.' | ',' | ' '))
            .collect();

        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(NominalParseError::Malformed(raw.to_string()));
        }

        digits
            .parse::<i64>()
            .map(Money)
            .map_err(|_| NominalParseError::Malformed(raw.to_string()))
    }

    /// Presentation-boundary formatting: "Rp 1.170.000".
    pub fn format_idr(&self) -> String {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
        for (index, ch) in digits.chars().enumerate() {
            if index > 0 && (digits.len() - index) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        if self.0 < 0 {
            format!("-Rp {grouped}")
        } else {
            format!("Rp {grouped}")
        }
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Transfer,
    Nota,
}

impl ReceiptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Nota => "nota",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "transfer" => Some(Self::Transfer),
            "nota" => Some(Self::Nota),
            _ => None,
        }
    }
}

/// One operational-expense request. Task-nested and standalone RPM
/// requests from the source system are unified here; the former carry a
/// `site_ref`, the latter do not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRequest {
    pub id: RequestId,
    pub activity_id: String,
    pub requested_by: UserId,
    pub requested_by_name: String,
    /// Legacy routing key: the supervising manager's display name.
    pub rpm: String,
    /// Durable routing reference; wins over `rpm` when present.
    pub rpm_id: Option<UserId>,
    pub division: Division,
    pub request_type: String,
    pub detail_plan: String,
    pub date: DateTime<Utc>,
    pub amount: Money,
    pub bank: String,
    pub bank_account_number: String,
    pub transfer_receipt_url: Option<String>,
    pub nota_receipt_url: Option<String>,
    pub status: RequestStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub site_ref: Option<SiteId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpenseRequest {
    /// Apply a planned transition. The plan's `from` state is the
    /// optimistic-concurrency precondition: a request whose status has
    /// moved since the plan was made is left untouched.
    pub fn apply_transition(
        &mut self,
        plan: &TransitionPlan,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != plan.from {
            return Err(DomainError::InvalidTransition { from: self.status, event: plan.event });
        }

        self.status = plan.to;
        if let Some(approver) = &plan.approved_by {
            self.approved_by = Some(approver.clone());
            self.approved_at = Some(now);
        }
        if let Some(rejector) = &plan.rejected_by {
            self.rejected_by = Some(rejector.clone());
            self.rejected_at = Some(now);
        }
        self.updated_at = now;

        Ok(())
    }

    /// Audit-field invariant: `approved_by` set iff the request reached
    /// executive approval, `rejected_by` set iff it was rejected.
    pub fn audit_fields_consistent(&self) -> bool {
        let approved_ok = match self.status {
            RequestStatus::ApprovedTop | RequestStatus::Done => self.approved_by.is_some(),
            _ => self.approved_by.is_none(),
        };
        let rejected_ok = match self.status {
            RequestStatus::Rejected => self.rejected_by.is_some(),
            _ => self.rejected_by.is_none(),
        };
        approved_ok && rejected_ok
    }
}

#[cfg(test)]
mod tests {
    use super::{Division, Money, NominalParseError, ReceiptKind, RequestStatus};

    #[test]
    fn status_round_trips_from_storage_encoding() {
        let cases = [
            RequestStatus::PendingRpm,
            RequestStatus::PendingTop,
            RequestStatus::ApprovedTop,
            RequestStatus::Done,
            RequestStatus::Rejected,
        ];

        for status in cases {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("pending"), None);
    }

    #[test]
    fn terminal_states_are_done_and_rejected() {
        assert!(RequestStatus::Done.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(!RequestStatus::PendingRpm.is_terminal());
        assert!(!RequestStatus::ApprovedTop.is_terminal());
    }

    #[test]
    fn division_parse_accepts_legacy_spellings() {
        assert_eq!(Division::parse("CW"), Division::CivilWork);
        assert_eq!(Division::parse("el/jointer"), Division::ElJointer);
        assert_eq!(Division::parse("dc"), Division::Document);
        assert_eq!(Division::parse(" Permit "), Division::Permit);
    }

    #[test]
    fn division_parse_quarantines_unknown_values_as_ops_subtype() {
        assert_eq!(Division::parse("Wifi"), Division::Ops("wifi".to_string()));
        assert_eq!(Division::parse("HB Token"), Division::Ops("hb_token".to_string()));
    }

    #[test]
    fn division_labels_match_report_buckets() {
        assert_eq!(Division::Snd.label(), "SND");
        assert_eq!(Division::CivilWork.label(), "Civil Work");
        assert_eq!(Division::ElJointer.label(), "EL/Jointer");
        assert_eq!(Division::Ops("wifi".to_string()).label(), "Wifi");
        assert_eq!(Division::Ops("hb_token".to_string()).label(), "HB Tokens");
        assert_eq!(Division::Ops("pulsa".to_string()).label(), "Pulsa");
    }

    #[test]
    fn division_storage_key_round_trips() {
        let cases = [
            Division::Permit,
            Division::Snd,
            Division::CivilWork,
            Division::ElJointer,
            Division::Document,
            Division::Rpm,
            Division::Ops("wifi".to_string()),
        ];

        for division in cases {
            assert_eq!(Division::parse(&division.storage_key()), division);
        }
    }

    #[test]
    fn nominal_parse_normalizes_free_form_currency_strings() {
        assert_eq!(Money::parse_nominal("150000"), Ok(Money(150_000)));
        assert_eq!(Money::parse_nominal("Rp 1.500.000"), Ok(Money(1_500_000)));
        assert_eq!(Money::parse_nominal("1,500,000"), Ok(Money(1_500_000)));
    }

    #[test]
    fn nominal_parse_rejects_empty_and_malformed_values() {
        assert_eq!(Money::parse_nominal("   "), Err(NominalParseError::Empty));
        assert_eq!(
            Money::parse_nominal("abc"),
            Err(NominalParseError::Malformed("abc".to_string()))
        );
        assert_eq!(
            Money::parse_nominal("-5000"),
            Err(NominalParseError::Malformed("-5000".to_string()))
        );
    }

    #[test]
    fn idr_formatting_groups_thousands() {
        assert_eq!(Money(1_170_000).format_idr(), "Rp 1.170.000");
        assert_eq!(Money(150_000).format_idr(), "Rp 150.000");
        assert_eq!(Money(999).format_idr(), "Rp 999");
        assert_eq!(Money(0).format_idr(), "Rp 0");
    }

    #[test]
    fn receipt_kind_round_trips_from_storage_encoding() {
        for kind in [ReceiptKind::Transfer, ReceiptKind::Nota] {
            assert_eq!(ReceiptKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ReceiptKind::parse("invoice"), None);
    }
}
