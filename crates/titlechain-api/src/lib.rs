use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use titlechain_core::{
    resolve_ownership, validate_request, InstrumentEvent, OwnershipRow, ReviewFlag, TractQuery,
};

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// One ownership-resolution request as received at the product boundary.
///
/// `as_of` is informational only: it is echoed into the result and folded
/// into the resolution id, but never parsed or enforced against event dates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolveRequest {
    pub events: Vec<InstrumentEvent>,
    pub tract_key: String,
    #[serde(default)]
    pub as_of: Option<String>,
    #[serde(default)]
    pub hbp: bool,
    #[serde(default)]
    pub total_acres: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolveResult {
    pub resolution_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub tract_key: String,
    pub as_of: Option<String>,
    pub events_count: usize,
    pub owners: Vec<OwnershipRow>,
    pub flags: Vec<ReviewFlag>,
}

/// Resolve current ownership for one tract from its normalized instrument
/// chain.
///
/// Preconditions (`events` non-empty, `tract_key` non-blank) are enforced
/// here rather than inside the engine, so callers receive a request error
/// instead of a degenerate report.
///
/// # Errors
/// Returns an error when the request violates the boundary preconditions or
/// when an event cannot be serialized while deriving the resolution id.
pub fn resolve(request: ResolveRequest) -> Result<ResolveResult> {
    validate_request(&request.events, &request.tract_key)?;

    let resolution_id = compute_resolution_id(&request)?;
    let query = TractQuery {
        tract_key: request.tract_key.clone(),
        total_acres: request.total_acres,
        hbp: request.hbp,
    };
    let report = resolve_ownership(&request.events, &query);

    Ok(ResolveResult {
        resolution_id,
        generated_at: OffsetDateTime::now_utc(),
        tract_key: request.tract_key,
        as_of: request.as_of,
        events_count: report.events_count,
        owners: report.owners,
        flags: report.flags,
    })
}

/// Content-derived run identifier: identical requests always map to the same
/// id, so downstream surfaces can correlate repeated resolutions.
fn compute_resolution_id(request: &ResolveRequest) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(request.tract_key.as_bytes());
    hasher.update(request.total_acres.to_bits().to_be_bytes());
    hasher.update([u8::from(request.hbp)]);
    hasher.update(request.as_of.as_deref().unwrap_or("").as_bytes());
    for event in &request.events {
        hasher.update(serde_json::to_vec(event)?);
    }

    let digest = hasher.finalize();
    let digest_hex = format!("{digest:x}");
    Ok(format!("run_{}", &digest_hex[..16]))
}

#[cfg(test)]
mod tests {
    use titlechain_core::{LeaseStatus, TractRef};

    use super::*;

    fn fixture_events() -> Vec<InstrumentEvent> {
        vec![InstrumentEvent {
            instrument_type: "mineral-deed".to_string(),
            recorded_date: Some("1998-03-02".to_string()),
            effective_date: None,
            grantors: Vec::new(),
            grantees: vec!["C".to_string()],
            conveys_all_interest: false,
            fraction_whole: Some("1/4".to_string()),
            mineral_reservation: None,
            life_estate: None,
            tracts: vec![TractRef { trs: "t1".to_string(), sec: "1".to_string() }],
            doc_id: Some("doc-1".to_string()),
        }]
    }

    fn fixture_request() -> ResolveRequest {
        ResolveRequest {
            events: fixture_events(),
            tract_key: "t1".to_string(),
            as_of: Some("2024-05-01".to_string()),
            hbp: false,
            total_acres: 160.0,
        }
    }

    // Test IDs: TAPI-001
    #[test]
    fn resolve_round_trip_reports_owner_and_echoes_request_scope() {
        let result = match resolve(fixture_request()) {
            Ok(result) => result,
            Err(err) => panic!("resolve should succeed: {err}"),
        };

        assert_eq!(result.events_count, 1);
        assert_eq!(result.tract_key, "t1");
        assert_eq!(result.as_of.as_deref(), Some("2024-05-01"));
        assert_eq!(result.owners.len(), 1);
        assert_eq!(result.owners[0].owner, "C");
        assert!((result.owners[0].percent - 25.0).abs() < 1e-9);
        assert!((result.owners[0].net_acres - 40.0).abs() < 1e-9);
        assert_eq!(result.owners[0].status, LeaseStatus::AppearsOpen);
        assert!(result.flags.is_empty());
    }

    // Test IDs: TAPI-002
    #[test]
    fn resolve_rejects_empty_events_and_blank_tract_key() {
        let mut no_events = fixture_request();
        no_events.events.clear();
        match resolve(no_events) {
            Ok(_) => panic!("empty events should be rejected"),
            Err(err) => assert!(err.to_string().contains("events")),
        }

        let mut blank_key = fixture_request();
        blank_key.tract_key = "   ".to_string();
        match resolve(blank_key) {
            Ok(_) => panic!("blank tract_key should be rejected"),
            Err(err) => assert!(err.to_string().contains("tract_key")),
        }
    }

    // Test IDs: TAPI-003
    #[test]
    fn resolution_id_is_deterministic_over_request_content() {
        let first = match resolve(fixture_request()) {
            Ok(result) => result,
            Err(err) => panic!("resolve should succeed: {err}"),
        };
        let second = match resolve(fixture_request()) {
            Ok(result) => result,
            Err(err) => panic!("resolve should succeed: {err}"),
        };
        assert_eq!(first.resolution_id, second.resolution_id);
        assert!(first.resolution_id.starts_with("run_"));

        let mut other_tract = fixture_request();
        other_tract.tract_key = "t2".to_string();
        other_tract.events[0].tracts[0].trs = "t2".to_string();
        let third = match resolve(other_tract) {
            Ok(result) => result,
            Err(err) => panic!("resolve should succeed: {err}"),
        };
        assert_ne!(first.resolution_id, third.resolution_id);
    }
}
