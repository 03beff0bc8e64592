//! In-memory filtering, sorting, pagination and fuzzy matching for CRM records.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Case, CrmEntity, Lead, Vendor};

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Upper bound on the number of items per page.
pub const MAX_PAGE_SIZE: usize = 100;
/// Edit distance accepted by fuzzy matching.
pub const DEFAULT_MAX_DISTANCE: usize = 2;

/// A comparable field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Compared case-insensitively.
    Text(String),
    /// Compared numerically.
    Number(f64),
}

impl FieldValue {
    fn matches(&self, expected: &str) -> bool {
        match self {
            Self::Text(value) => value.eq_ignore_ascii_case(expected.trim()),
            Self::Number(value) => expected
                .trim()
                .parse::<f64>()
                .map(|parsed| parsed == *value)
                .unwrap_or(false),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Text(a), Self::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

/// Records that can be searched.
pub trait Searchable {
    /// Free text matched against the query.
    fn search_text(&self) -> String;
    /// Named field used for filters and sorting.
    fn field(&self, name: &str) -> Option<FieldValue>;
}

/// Sort direction.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Search parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Text to match, if any.
    pub text: Option<String>,
    /// Whether to accept near matches.
    #[serde(default)]
    pub fuzzy: bool,
    /// Exact (case-insensitive) field filters.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    /// Field to sort by.
    pub sort_by: Option<String>,
    /// Sort direction.
    #[serde(default)]
    pub order: SortOrder,
    /// 1-based page number.
    pub page: Option<usize>,
    /// Items per page.
    pub page_size: Option<usize>,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Matching items across all pages.
    pub total: usize,
    /// 1-based page number.
    pub page: usize,
    /// Items per page.
    pub page_size: usize,
    /// Number of pages.
    pub total_pages: usize,
}

/// Filter, match, sort and paginate `items`.
pub fn search<T: Searchable + Clone>(items: &[T], query: &SearchQuery) -> Page<T> {
    let needle = query
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty());

    let mut matched: Vec<&T> = items
        .iter()
        .filter(|item| passes_filters(*item, &query.filters))
        .filter(|item| match needle {
            Some(needle) => text_matches(&item.search_text(), needle, query.fuzzy),
            None => true,
        })
        .collect();

    if let Some(field) = query.sort_by.as_deref() {
        matched.sort_by(|a, b| compare_by_field(*a, *b, field, query.order));
    }

    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);
    let total = matched.len();
    let total_pages = total.div_ceil(page_size);
    let items = matched
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();

    Page {
        items,
        total,
        page,
        page_size,
        total_pages,
    }
}

fn passes_filters<T: Searchable>(item: &T, filters: &BTreeMap<String, String>) -> bool {
    filters.iter().all(|(name, expected)| {
        item.field(name)
            .map(|value| value.matches(expected))
            .unwrap_or(false)
    })
}

fn text_matches(haystack: &str, needle: &str, fuzzy: bool) -> bool {
    if fuzzy {
        return fuzzy_match(needle, haystack, DEFAULT_MAX_DISTANCE);
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn compare_by_field<T: Searchable>(a: &T, b: &T, field: &str, order: SortOrder) -> Ordering {
    // Missing values sort last in either direction.
    match (a.field(field), b.field(field)) {
        (Some(left), Some(right)) => {
            let ordering = left.compare(&right);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Levenshtein edit distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Case-insensitive near match of `query` within `candidate`.
///
/// Substring hits always match; otherwise the whole candidate or any one of
/// its whitespace-separated words must be within `max_distance` edits.
pub fn fuzzy_match(query: &str, candidate: &str, max_distance: usize) -> bool {
    let query = query.trim().to_lowercase();
    let candidate = candidate.to_lowercase();
    if query.is_empty() {
        return true;
    }
    if candidate.contains(&query) {
        return true;
    }
    if levenshtein(&query, &candidate) <= max_distance {
        return true;
    }
    candidate
        .split_whitespace()
        .any(|word| levenshtein(&query, word) <= max_distance)
}

impl Searchable for Case {
    fn search_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.tracking_number,
            self.carrier.as_str(),
            self.claim_type.as_str(),
            self.description
        )
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(FieldValue::Number(self.id as f64)),
            "carrier" => Some(FieldValue::Text(self.carrier.as_str().to_string())),
            "status" => Some(FieldValue::Text(self.status.as_str().to_string())),
            "priority" => Some(FieldValue::Text(self.priority.as_str().to_string())),
            "claimType" | "claim_type" => {
                Some(FieldValue::Text(self.claim_type.as_str().to_string()))
            }
            "trackingNumber" | "tracking_number" => {
                Some(FieldValue::Text(self.tracking_number.clone()))
            }
            "amountClaimed" | "amount_claimed" => Some(FieldValue::Number(self.amount_claimed)),
            "createdAt" | "created_at" => Some(FieldValue::Text(
                self.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            )),
            _ => None,
        }
    }
}

impl Searchable for Vendor {
    fn search_text(&self) -> String {
        [
            Some(self.name.as_str()),
            self.account_number.as_deref(),
            self.email.as_deref(),
            self.phone.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<&str>>()
        .join(" ")
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(FieldValue::Number(self.id as f64)),
            "name" => Some(FieldValue::Text(self.name.clone())),
            "carrier" => self
                .carrier
                .map(|carrier| FieldValue::Text(carrier.as_str().to_string())),
            "email" => self.email.clone().map(FieldValue::Text),
            _ => None,
        }
    }
}

impl Searchable for Lead {
    fn search_text(&self) -> String {
        [
            Some(self.name.as_str()),
            self.company.as_deref(),
            self.email.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<&str>>()
        .join(" ")
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(FieldValue::Number(self.id as f64)),
            "name" => Some(FieldValue::Text(self.name.clone())),
            "company" => self.company.clone().map(FieldValue::Text),
            "status" => Some(FieldValue::Text(self.status.as_str().to_string())),
            "estimatedValue" | "estimated_value" => {
                Some(FieldValue::Number(self.estimated_value))
            }
            _ => None,
        }
    }
}

impl Searchable for CrmEntity {
    fn search_text(&self) -> String {
        match self {
            Self::Case(case) => case.search_text(),
            Self::Vendor(vendor) => vendor.search_text(),
            Self::Lead(lead) => lead.search_text(),
        }
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if name == "kind" {
            return Some(FieldValue::Text(self.kind().to_string()));
        }
        match self {
            Self::Case(case) => case.field(name),
            Self::Vendor(vendor) => vendor.field(name),
            Self::Lead(lead) => lead.field(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Carrier, CaseStatus, ClaimType, LeadStatus, Priority};
    use chrono::NaiveDate;

    fn case(id: i64, carrier: Carrier, status: CaseStatus, amount: f64, description: &str) -> Case {
        Case {
            id,
            carrier,
            tracking_number: format!("TRK{id:04}"),
            claim_type: ClaimType::Overcharge,
            status,
            priority: Priority::Normal,
            amount_claimed: amount,
            description: description.to_string(),
            ship_date: None,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .expect("date")
                .and_hms_opt(0, 0, id as u32)
                .expect("time"),
        }
    }

    fn sample_cases() -> Vec<Case> {
        vec![
            case(1, Carrier::Ups, CaseStatus::Open, 40.0, "Residential surcharge"),
            case(2, Carrier::Fedex, CaseStatus::Filed, 125.5, "Crushed pallet"),
            case(3, Carrier::Ups, CaseStatus::Open, 12.0, "Address correction fee"),
            case(4, Carrier::Dhl, CaseStatus::Closed, 300.0, "Late delivery refund"),
        ]
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "ab"), 2);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("fedex", "fedex"), 0);
        assert_eq!(levenshtein("über", "uber"), 1);
    }

    #[test]
    fn fuzzy_match_accepts_typos() {
        assert!(fuzzy_match("pallet", "Crushed pallet", 2));
        assert!(fuzzy_match("palet", "Crushed pallet", 2));
        assert!(fuzzy_match("CRUSHD", "Crushed pallet", 1));
        assert!(!fuzzy_match("invoice", "Crushed pallet", 2));
        assert!(fuzzy_match("   ", "anything", 0));
    }

    #[test]
    fn search_without_query_returns_everything() {
        let page = search(&sample_cases(), &SearchQuery::default());

        assert_eq!(page.total, 4);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.items[0].id, 1);
    }

    #[test]
    fn search_applies_filters_case_insensitively() {
        let mut query = SearchQuery::default();
        query.filters.insert("carrier".to_string(), "ups".to_string());
        query.filters.insert("status".to_string(), "open".to_string());

        let page = search(&sample_cases(), &query);

        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|item| item.carrier == Carrier::Ups));
    }

    #[test]
    fn unknown_filter_field_excludes_everything() {
        let mut query = SearchQuery::default();
        query.filters.insert("color".to_string(), "red".to_string());

        assert_eq!(search(&sample_cases(), &query).total, 0);
    }

    #[test]
    fn search_matches_text_exactly_or_fuzzily() {
        let exact = SearchQuery {
            text: Some("surcharge".to_string()),
            ..SearchQuery::default()
        };
        assert_eq!(search(&sample_cases(), &exact).total, 1);

        let typo = SearchQuery {
            text: Some("surchage".to_string()),
            ..SearchQuery::default()
        };
        assert_eq!(search(&sample_cases(), &typo).total, 0);

        let fuzzy = SearchQuery {
            text: Some("surchage".to_string()),
            fuzzy: true,
            ..SearchQuery::default()
        };
        let page = search(&sample_cases(), &fuzzy);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, 1);
    }

    #[test]
    fn search_sorts_numbers_in_both_directions() {
        let asc = SearchQuery {
            sort_by: Some("amountClaimed".to_string()),
            ..SearchQuery::default()
        };
        let ids: Vec<i64> = search(&sample_cases(), &asc)
            .items
            .iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);

        let desc = SearchQuery {
            sort_by: Some("amountClaimed".to_string()),
            order: SortOrder::Desc,
            ..SearchQuery::default()
        };
        let ids: Vec<i64> = search(&sample_cases(), &desc)
            .items
            .iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let query = SearchQuery {
            sort_by: Some("carrier".to_string()),
            ..SearchQuery::default()
        };
        let ids: Vec<i64> = search(&sample_cases(), &query)
            .items
            .iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
    }

    #[test]
    fn missing_sort_values_go_last() {
        let vendors = vec![
            Vendor {
                id: 1,
                name: "No Mail".to_string(),
                carrier: None,
                account_number: None,
                email: None,
                phone: None,
            },
            Vendor {
                id: 2,
                name: "Has Mail".to_string(),
                carrier: Some(Carrier::Usps),
                account_number: Some("A-1".to_string()),
                email: Some("ops@example.com".to_string()),
                phone: None,
            },
        ];
        let query = SearchQuery {
            sort_by: Some("email".to_string()),
            order: SortOrder::Desc,
            ..SearchQuery::default()
        };

        let page = search(&vendors, &query);

        assert_eq!(page.items[0].id, 2);
        assert_eq!(page.items[1].id, 1);
    }

    #[test]
    fn pagination_clamps_and_counts_pages() {
        let query = SearchQuery {
            page: Some(2),
            page_size: Some(3),
            ..SearchQuery::default()
        };
        let page = search(&sample_cases(), &query);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, 4);

        let beyond = SearchQuery {
            page: Some(9),
            page_size: Some(0),
            ..SearchQuery::default()
        };
        let page = search(&sample_cases(), &beyond);
        assert_eq!(page.page_size, 1);
        assert!(page.items.is_empty());

        let huge = SearchQuery {
            page_size: Some(10_000),
            ..SearchQuery::default()
        };
        assert_eq!(search(&sample_cases(), &huge).page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn far_out_page_numbers_return_empty_pages() {
        let query = SearchQuery {
            page: Some(usize::MAX),
            page_size: Some(MAX_PAGE_SIZE),
            ..SearchQuery::default()
        };

        let page = search(&sample_cases(), &query);

        assert_eq!(page.page, usize::MAX);
        assert_eq!(page.total, 4);
        assert!(page.items.is_empty());
    }

    #[test]
    fn leads_are_searchable_by_company() {
        let leads = vec![Lead {
            id: 7,
            name: "Morgan".to_string(),
            company: Some("Northwind Traders".to_string()),
            email: None,
            status: LeadStatus::Contacted,
            estimated_value: 5000.0,
        }];
        let query = SearchQuery {
            text: Some("northwind".to_string()),
            ..SearchQuery::default()
        };

        assert_eq!(search(&leads, &query).total, 1);
    }

    #[test]
    fn mixed_entities_filter_by_kind() {
        let entities = vec![
            CrmEntity::Case(case(1, Carrier::Ups, CaseStatus::Open, 40.0, "Northwind pallet")),
            CrmEntity::Vendor(Vendor {
                id: 2,
                name: "Northwind Logistics".to_string(),
                carrier: Some(Carrier::Fedex),
                account_number: None,
                email: None,
                phone: None,
            }),
            CrmEntity::Lead(Lead {
                id: 3,
                name: "Avery".to_string(),
                company: Some("Northwind Traders".to_string()),
                email: None,
                status: LeadStatus::New,
                estimated_value: 900.0,
            }),
        ];
        let all = SearchQuery {
            text: Some("northwind".to_string()),
            ..SearchQuery::default()
        };
        assert_eq!(search(&entities, &all).total, 3);

        let mut vendors = all.clone();
        vendors.filters.insert("kind".to_string(), "vendor".to_string());
        let page = search(&entities, &vendors);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id(), 2);

        let by_id = SearchQuery {
            sort_by: Some("id".to_string()),
            order: SortOrder::Desc,
            ..SearchQuery::default()
        };
        let ids: Vec<i64> = search(&entities, &by_id)
            .items
            .iter()
            .map(CrmEntity::id)
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
