use std::collections::HashMap;

use thiserror::Error;

use crate::domain::request::ExpenseRequest;
use crate::domain::site::SiteAssignment;

/// Fixed export column contract; consumers key on this order.
pub const EXPORT_COLUMNS: [&str; 10] = [
    "date",
    "activity_id",
    "site",
    "requested_by",
    "division",
    "request_type",
    "bank",
    "bank_account_number",
    "nominal",
    "status",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv serialization failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Serialize the currently-filtered request set to a spreadsheet: one
/// row per request, columns per `EXPORT_COLUMNS`. Nominals are plain
/// integers so the spreadsheet can aggregate them.
pub fn export_csv(
    requests: &[&ExpenseRequest],
    sites: &HashMap<String, SiteAssignment>,
) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_COLUMNS)?;

    for request in requests {
        let site_name = request
            .site_ref
            .as_ref()
            .map(|site_ref| {
                sites
                    .get(&site_ref.0)
                    .map(|site| site.site_name.clone())
                    .unwrap_or_else(|| site_ref.0.clone())
            })
            .unwrap_or_default();

        writer.write_record([
            request.date.format("%Y-%m-%d").to_string(),
            request.activity_id.clone(),
            site_name,
            request.requested_by_name.clone(),
            request.division.label(),
            request.request_type.clone(),
            request.bank.clone(),
            request.bank_account_number.clone(),
            request.amount.0.to_string(),
            request.status.as_str().to_string(),
        ])?;
    }

    writer.into_inner().map_err(|error| ExportError::Csv(error.into_error().into()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};

    use crate::domain::request::{Division, ExpenseRequest, Money, RequestId, RequestStatus};
    use crate::domain::site::{SiteAssignment, SiteId};
    use crate::domain::user::UserId;
    use crate::export::{export_csv, EXPORT_COLUMNS};

    fn request(id: &str, site_ref: Option<&str>) -> ExpenseRequest {
        let date = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).single().expect("valid date");
        ExpenseRequest {
            id: RequestId(id.to_string()),
            activity_id: "ACT-1001".to_string(),
            requested_by: UserId("u-sari".to_string()),
            requested_by_name: "Sari".to_string(),
            rpm: "Indra".to_string(),
            rpm_id: None,
            division: Division::Permit,
            request_type: "Site permit fee".to_string(),
            detail_plan: "Village permit".to_string(),
            date,
            amount: Money(150_000),
            bank: "BCA".to_string(),
            bank_account_number: "8210045511".to_string(),
            transfer_receipt_url: None,
            nota_receipt_url: None,
            status: RequestStatus::PendingRpm,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            site_ref: site_ref.map(|value| SiteId(value.to_string())),
            created_at: date,
            updated_at: date,
        }
    }

    #[test]
    fn header_row_follows_the_column_contract() {
        let bytes = export_csv(&[], &HashMap::new()).expect("export empty set");
        let text = String::from_utf8(bytes).expect("utf8 csv");

        assert_eq!(text.trim_end(), EXPORT_COLUMNS.join(","));
    }

    #[test]
    fn rows_resolve_site_names_and_plain_integer_nominals() {
        let record = request("REQ-1", Some("JKT-001"));
        let mut sites = HashMap::new();
        sites.insert(
            "JKT-001".to_string(),
            SiteAssignment {
                site_id: SiteId("JKT-001".to_string()),
                site_name: "Tower Cilandak".to_string(),
                region: "Jabodetabek".to_string(),
                city: "Jakarta".to_string(),
                rpm: "Indra".to_string(),
                pic: "Sari".to_string(),
                division: Division::Permit,
            },
        );

        let bytes = export_csv(&[&record], &sites).expect("export");
        let text = String::from_utf8(bytes).expect("utf8 csv");
        let row = text.lines().nth(1).expect("one data row");

        assert_eq!(
            row,
            "2026-03-14,ACT-1001,Tower Cilandak,Sari,Permit,Site permit fee,BCA,8210045511,150000,pending_rpm"
        );
    }

    #[test]
    fn unresolved_site_refs_fall_back_to_the_raw_id() {
        let record = request("REQ-1", Some("SBY-404"));

        let bytes = export_csv(&[&record], &HashMap::new()).expect("export");
        let text = String::from_utf8(bytes).expect("utf8 csv");

        assert!(text.lines().nth(1).expect("data row").contains("SBY-404"));
    }

    #[test]
    fn standalone_requests_leave_the_site_column_empty() {
        let record = request("REQ-1", None);

        let bytes = export_csv(&[&record], &HashMap::new()).expect("export");
        let text = String::from_utf8(bytes).expect("utf8 csv");
        let row = text.lines().nth(1).expect("data row");

        assert!(row.starts_with("2026-03-14,ACT-1001,,Sari,"));
    }
}
