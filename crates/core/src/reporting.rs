use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{ExpenseRequest, Money};
use crate::domain::site::SiteAssignment;
use crate::domain::user::name_key;

pub const PAGE_SIZE: usize = 25;

/// User-supplied report filters, applied on top of role visibility.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub activity_id: Option<String>,
    pub site_id: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub pic: Option<String>,
    pub search: Option<String>,
}

impl ReportFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Region/city filters resolve through the site index since the
    /// request record only carries a site reference.
    pub fn matches(
        &self,
        request: &ExpenseRequest,
        site: Option<&SiteAssignment>,
    ) -> bool {
        if let Some(from) = self.date_from {
            if request.date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if request.date > to {
                return false;
            }
        }
        if let Some(activity_id) = &self.activity_id {
            if name_key(&request.activity_id) != name_key(activity_id) {
                return false;
            }
        }
        if let Some(site_id) = &self.site_id {
            let matches_site = request
                .site_ref
                .as_ref()
                .is_some_and(|site_ref| name_key(&site_ref.0) == name_key(site_id));
            if !matches_site {
                return false;
            }
        }
        if let Some(region) = &self.region {
            let matches_region =
                site.is_some_and(|site| name_key(&site.region) == name_key(region));
            if !matches_region {
                return false;
            }
        }
        if let Some(city) = &self.city {
            let matches_city = site.is_some_and(|site| name_key(&site.city) == name_key(city));
            if !matches_city {
                return false;
            }
        }
        if let Some(pic) = &self.pic {
            if name_key(&request.requested_by_name) != name_key(pic) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = name_key(search);
            if !needle.is_empty() && !search_haystack(request, site).contains(&needle) {
                return false;
            }
        }

        true
    }
}

fn search_haystack(request: &ExpenseRequest, site: Option<&SiteAssignment>) -> String {
    let mut haystack = name_key(&format!(
        "{} {} {} {} {}",
        request.activity_id,
        request.requested_by_name,
        request.request_type,
        request.detail_plan,
        request.bank,
    ));
    if let Some(site) = site {
        haystack.push(' ');
        haystack.push_str(&name_key(&site.site_name));
    }
    haystack
}

pub fn apply_filter<'a>(
    requests: &[&'a ExpenseRequest],
    filter: &ReportFilter,
    sites: &HashMap<String, SiteAssignment>,
) -> Vec<&'a ExpenseRequest> {
    requests
        .iter()
        .filter(|request| {
            let site = request.site_ref.as_ref().and_then(|site_ref| sites.get(&site_ref.0));
            filter.matches(request, site)
        })
        .copied()
        .collect()
}

/// Named category bucket: requests grouped by division label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionBucket {
    pub label: String,
    pub count: usize,
    pub total: Money,
}

pub fn division_buckets(requests: &[&ExpenseRequest]) -> Vec<DivisionBucket> {
    let mut grouped: BTreeMap<String, (usize, i64)> = BTreeMap::new();
    for request in requests {
        let entry = grouped.entry(request.division.label()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(request.amount.0);
    }

    grouped
        .into_iter()
        .map(|(label, (count, total))| DivisionBucket { label, count, total: Money(total) })
        .collect()
}

/// Running total over the filtered, visible set.
pub fn total_amount(requests: &[&ExpenseRequest]) -> Money {
    Money(requests.iter().fold(0i64, |sum, request| sum.saturating_add(request.amount.0)))
}

/// "Showing X-Y of N" pagination over a stable, creation-ordered set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub number: usize,
    pub total_pages: usize,
    pub total_records: usize,
    /// 1-based inclusive bounds of the visible window; both zero for an
    /// empty set.
    pub start: usize,
    pub end: usize,
}

impl PageInfo {
    pub fn label(&self) -> String {
        format!("showing {}-{} of {}", self.start, self.end, self.total_records)
    }
}

/// Resolve a requested page number against the record count, clamping
/// into `[1, total_pages]`.
pub fn page_info(total_records: usize, requested: usize) -> PageInfo {
    let total_pages = total_records.div_ceil(PAGE_SIZE);
    let number = requested.clamp(1, total_pages.max(1));

    let (start, end) = if total_records == 0 {
        (0, 0)
    } else {
        let start = (number - 1) * PAGE_SIZE + 1;
        let end = (start + PAGE_SIZE - 1).min(total_records);
        (start, end)
    };

    PageInfo { number, total_pages, total_records, start, end }
}

pub fn page_slice<'a, T>(items: &'a [T], info: &PageInfo) -> &'a [T] {
    if info.start == 0 {
        return &[];
    }
    &items[info.start - 1..info.end]
}

/// Previous/next/page-number navigation: a target outside
/// `[1, total_pages]` is a no-op.
pub fn navigate(current: usize, target: usize, total_pages: usize) -> usize {
    if target >= 1 && target <= total_pages {
        target
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, Utc};

    use crate::domain::request::{Division, ExpenseRequest, Money, RequestId, RequestStatus};
    use crate::domain::site::{SiteAssignment, SiteId};
    use crate::reporting::{
        apply_filter, division_buckets, navigate, page_info, page_slice, total_amount, PageInfo,
        ReportFilter, PAGE_SIZE,
    };

    fn request(id: usize, division: Division, amount: i64) -> ExpenseRequest {
        let now = Utc::now();
        ExpenseRequest {
            id: RequestId(format!("REQ-{id:04}")),
            activity_id: format!("ACT-{id:04}"),
            requested_by: crate::domain::user::UserId("u-sari".to_string()),
            requested_by_name: "Sari".to_string(),
            rpm: "Indra".to_string(),
            rpm_id: None,
            division,
            request_type: "Site permit fee".to_string(),
            detail_plan: "Village permit".to_string(),
            date: now,
            amount: Money(amount),
            bank: "BCA".to_string(),
            bank_account_number: "8210045511".to_string(),
            transfer_receipt_url: None,
            nota_receipt_url: None,
            status: RequestStatus::PendingRpm,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            site_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn site(id: &str, region: &str, city: &str) -> SiteAssignment {
        SiteAssignment {
            site_id: SiteId(id.to_string()),
            site_name: format!("Tower {id}"),
            region: region.to_string(),
            city: city.to_string(),
            rpm: "Indra".to_string(),
            pic: "Sari".to_string(),
            division: Division::Permit,
        }
    }

    #[test]
    fn total_sums_only_the_included_requests() {
        let included = [
            request(1, Division::Permit, 150_000),
            request(2, Division::Permit, 20_000),
            request(3, Division::Permit, 1_000_000),
        ];
        let excluded = request(4, Division::Snd, 999_999);

        let all: Vec<&ExpenseRequest> = included.iter().collect();
        assert_eq!(total_amount(&all), Money(1_170_000));

        let mut with_other: Vec<&ExpenseRequest> = included.iter().collect();
        with_other.push(&excluded);
        let permit_only: Vec<&ExpenseRequest> = with_other
            .into_iter()
            .filter(|request| request.division == Division::Permit)
            .collect();
        assert_eq!(total_amount(&permit_only), Money(1_170_000));
    }

    #[test]
    fn buckets_group_by_division_label() {
        let requests = [
            request(1, Division::Permit, 100),
            request(2, Division::Snd, 200),
            request(3, Division::Permit, 300),
            request(4, Division::Ops("wifi".to_string()), 50),
        ];
        let refs: Vec<&ExpenseRequest> = requests.iter().collect();

        let buckets = division_buckets(&refs);
        let labels: Vec<&str> = buckets.iter().map(|bucket| bucket.label.as_str()).collect();
        assert_eq!(labels, vec!["Permit", "SND", "Wifi"]);

        let permit = &buckets[0];
        assert_eq!(permit.count, 2);
        assert_eq!(permit.total, Money(400));
    }

    #[test]
    fn pagination_produces_ceil_of_record_count_over_page_size() {
        assert_eq!(page_info(0, 1).total_pages, 0);
        assert_eq!(page_info(1, 1).total_pages, 1);
        assert_eq!(page_info(25, 1).total_pages, 1);
        assert_eq!(page_info(26, 1).total_pages, 2);
        assert_eq!(page_info(103, 1).total_pages, 5);
    }

    #[test]
    fn concatenating_all_pages_reproduces_the_set() {
        let requests: Vec<ExpenseRequest> =
            (0..103).map(|i| request(i, Division::Permit, 1_000)).collect();
        let refs: Vec<&ExpenseRequest> = requests.iter().collect();

        let total_pages = page_info(refs.len(), 1).total_pages;
        let mut seen = Vec::new();
        for number in 1..=total_pages {
            let info = page_info(refs.len(), number);
            let slice = page_slice(&refs, &info);
            assert!(slice.len() <= PAGE_SIZE);
            seen.extend(slice.iter().map(|request| request.id.0.clone()));
        }

        let expected: Vec<String> = refs.iter().map(|request| request.id.0.clone()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn out_of_range_page_requests_clamp_to_the_boundaries() {
        let info = page_info(103, 99);
        assert_eq!(info.number, 5);
        assert_eq!(info.start, 101);
        assert_eq!(info.end, 103);

        let info = page_info(103, 0);
        assert_eq!(info.number, 1);
    }

    #[test]
    fn navigation_outside_the_range_is_a_no_op() {
        assert_eq!(navigate(3, 4, 5), 4);
        assert_eq!(navigate(3, 0, 5), 3);
        assert_eq!(navigate(3, 6, 5), 3);
        assert_eq!(navigate(1, 1, 0), 1);
    }

    #[test]
    fn showing_label_matches_the_window() {
        let info = page_info(103, 2);
        assert_eq!(info.label(), "showing 26-50 of 103");

        let empty = page_info(0, 1);
        assert_eq!(empty.label(), "showing 0-0 of 0");
        assert_eq!(page_slice::<PageInfo>(&[], &empty), &[] as &[PageInfo]);
    }

    #[test]
    fn date_range_filter_is_inclusive() {
        let mut early = request(1, Division::Permit, 100);
        early.date = Utc::now() - Duration::days(10);
        let recent = request(2, Division::Permit, 100);

        let refs = vec![&early, &recent];
        let filter = ReportFilter {
            date_from: Some(Utc::now() - Duration::days(1)),
            ..ReportFilter::default()
        };

        let filtered = apply_filter(&refs, &filter, &HashMap::new());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id.0, "REQ-0002");
    }

    #[test]
    fn region_filter_resolves_through_the_site_index() {
        let mut on_site = request(1, Division::Permit, 100);
        on_site.site_ref = Some(SiteId("JKT-001".to_string()));
        let off_site = request(2, Division::Permit, 100);

        let mut sites = HashMap::new();
        sites.insert("JKT-001".to_string(), site("JKT-001", "Jabodetabek", "Jakarta"));

        let refs = vec![&on_site, &off_site];
        let filter =
            ReportFilter { region: Some("jabodetabek".to_string()), ..ReportFilter::default() };

        let filtered = apply_filter(&refs, &filter, &sites);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id.0, "REQ-0001");
    }

    #[test]
    fn free_text_search_spans_requester_and_activity() {
        let first = request(1, Division::Permit, 100);
        let mut second = request(2, Division::Permit, 100);
        second.requested_by_name = "Budi".to_string();

        let refs = vec![&first, &second];
        let filter = ReportFilter { search: Some("budi".to_string()), ..ReportFilter::default() };

        let filtered = apply_filter(&refs, &filter, &HashMap::new());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id.0, "REQ-0002");

        let filter =
            ReportFilter { search: Some("ACT-0001".to_string()), ..ReportFilter::default() };
        let filtered = apply_filter(&refs, &filter, &HashMap::new());
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn pic_filter_matches_the_requester_name() {
        let first = request(1, Division::Permit, 100);
        let mut second = request(2, Division::Permit, 100);
        second.requested_by_name = "Budi".to_string();

        let refs = vec![&first, &second];
        let filter = ReportFilter { pic: Some(" SARI ".to_string()), ..ReportFilter::default() };

        let filtered = apply_filter(&refs, &filter, &HashMap::new());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].requested_by_name, "Sari");
    }
}
