use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Ledger entries whose magnitude falls below this threshold are treated as
/// exactly zero and removed during finalization, absorbing floating-point
/// drift from repeated fractional arithmetic.
pub const BALANCE_EPSILON: f64 = 1e-9;

/// Fixed note attached to review flags raised for life-estate instruments.
pub const LIFE_ESTATE_NOTE: &str = "Life estate detected; confirm termination status";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentKind {
    WarrantyDeed,
    QuitclaimDeed,
    Deed,
    TrustDeed,
    PersonalRepresentativeDeed,
    MineralDeed,
    PartialReleaseMineralDeed,
    OilAndGasLease,
    LifeEstate,
    Easement,
    Mortgage,
    SurfaceOnly,
    Other,
}

impl InstrumentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WarrantyDeed => "warranty-deed",
            Self::QuitclaimDeed => "quitclaim-deed",
            Self::Deed => "deed",
            Self::TrustDeed => "trust-deed",
            Self::PersonalRepresentativeDeed => "personal-representative-deed",
            Self::MineralDeed => "mineral-deed",
            Self::PartialReleaseMineralDeed => "partial-release-mineral-deed",
            Self::OilAndGasLease => "oil-and-gas-lease",
            Self::LifeEstate => "life-estate",
            Self::Easement => "easement",
            Self::Mortgage => "mortgage",
            Self::SurfaceOnly => "surface-only",
            Self::Other => "other",
        }
    }

    /// Normalize a raw instrument-type code into the closed set. Matching is
    /// case-insensitive and ignores surrounding whitespace; codes outside the
    /// set map to `Other` rather than failing.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "warranty-deed" => Self::WarrantyDeed,
            "quitclaim-deed" => Self::QuitclaimDeed,
            "deed" => Self::Deed,
            "trust-deed" => Self::TrustDeed,
            "personal-representative-deed" => Self::PersonalRepresentativeDeed,
            "mineral-deed" => Self::MineralDeed,
            "partial-release-mineral-deed" => Self::PartialReleaseMineralDeed,
            "oil-and-gas-lease" => Self::OilAndGasLease,
            "life-estate" => Self::LifeEstate,
            "easement" => Self::Easement,
            "mortgage" => Self::Mortgage,
            "surface-only" => Self::SurfaceOnly,
            _ => Self::Other,
        }
    }

    /// Deed-family conveyance types subject to the surface-only reservation
    /// rule. Mineral deeds are deliberately outside the family: a mineral
    /// conveyance reserving minerals back is contradictory and falls through
    /// to the transfer step instead.
    #[must_use]
    pub fn is_deed_family(self) -> bool {
        matches!(
            self,
            Self::WarrantyDeed
                | Self::QuitclaimDeed
                | Self::Deed
                | Self::TrustDeed
                | Self::PersonalRepresentativeDeed
                | Self::PartialReleaseMineralDeed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MineralReservation {
    #[serde(default)]
    pub reserved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct LifeEstateClause {
    #[serde(default)]
    pub present: bool,
}

/// One tract descriptor attached to an instrument: a township-range-section
/// style key plus a section number, both kept exactly as extracted.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TractRef {
    pub trs: String,
    #[serde(default)]
    pub sec: String,
}

/// One normalized legal-instrument record affecting a tract.
///
/// Events are immutable once constructed; the resolver only ever mutates its
/// own ledger state. Date fields are kept as plain strings because the
/// chronological sort is a lexical comparison with an empty-string fallback,
/// not a true date sort.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct InstrumentEvent {
    pub instrument_type: String,
    #[serde(default)]
    pub recorded_date: Option<String>,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub grantors: Vec<String>,
    #[serde(default)]
    pub grantees: Vec<String>,
    #[serde(default)]
    pub conveys_all_interest: bool,
    #[serde(default)]
    pub fraction_whole: Option<String>,
    #[serde(default)]
    pub mineral_reservation: Option<MineralReservation>,
    #[serde(default)]
    pub life_estate: Option<LifeEstateClause>,
    #[serde(default)]
    pub tracts: Vec<TractRef>,
    #[serde(default)]
    pub doc_id: Option<String>,
}

impl InstrumentEvent {
    #[must_use]
    pub fn kind(&self) -> InstrumentKind {
        InstrumentKind::parse(&self.instrument_type)
    }

    fn reserves_minerals(&self) -> bool {
        self.mineral_reservation.as_ref().is_some_and(|clause| clause.reserved)
    }

    fn carries_life_estate(&self) -> bool {
        self.life_estate.as_ref().is_some_and(|clause| clause.present)
    }

    fn sort_key(&self) -> (&str, &str) {
        (
            self.recorded_date.as_deref().unwrap_or(""),
            self.effective_date.as_deref().unwrap_or(""),
        )
    }
}

/// Parse an ownership fraction of the exact shape `<integer>/<integer>`.
///
/// Surrounding whitespace is tolerated; decimals, mixed numbers, inner
/// whitespace, and zero denominators all yield `None` rather than an error,
/// so malformed source text degrades to "no fraction" downstream.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn parse_fraction(text: &str) -> Option<f64> {
    let (numerator, denominator) = text.trim().split_once('/')?;
    let numerator: u64 = numerator.parse().ok()?;
    let denominator: u64 = denominator.parse().ok()?;
    if denominator == 0 {
        return None;
    }
    Some(numerator as f64 / denominator as f64)
}

/// Decide whether an instrument event pertains to the tract under analysis.
///
/// A descriptor matches when its TRS key, lower-cased, is a non-empty
/// substring of the lower-cased tract key AND its section number, exactly as
/// supplied, appears verbatim in the tract key. One descriptor satisfying
/// both is sufficient; events with no descriptors never match.
///
/// This is a deliberately loose heuristic: tract identifiers in recorded
/// documents are inconsistently formatted, and callers needing precision are
/// expected to pre-filter before invoking the resolver.
#[must_use]
pub fn matches_tract(event: &InstrumentEvent, tract_key: &str) -> bool {
    let key_lower = tract_key.to_lowercase();
    event.tracts.iter().any(|tract| {
        let trs_lower = tract.trs.to_lowercase();
        !trs_lower.is_empty() && key_lower.contains(&trs_lower) && tract_key.contains(&tract.sec)
    })
}

/// Resolution behavior assigned to an event by the classifier table.
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(tag = "outcome", content = "note", rename_all = "snake_case")]
pub enum RuleOutcome {
    Ignore,
    Review(&'static str),
    Transfer,
}

/// One entry in the ordered classifier decision table.
pub struct ClassifierRule {
    pub name: &'static str,
    pub applies: fn(&InstrumentEvent) -> bool,
    pub outcome: RuleOutcome,
}

/// The fixed decision table, evaluated top to bottom with first match
/// winning. Events matching no rule proceed to the ledger transfer step.
pub const CLASSIFIER_RULES: &[ClassifierRule] = &[
    ClassifierRule {
        name: "non-ownership encumbrance",
        applies: |event| {
            matches!(
                event.kind(),
                InstrumentKind::Easement | InstrumentKind::Mortgage | InstrumentKind::SurfaceOnly
            )
        },
        outcome: RuleOutcome::Ignore,
    },
    ClassifierRule {
        name: "oil and gas lease",
        applies: |event| event.kind() == InstrumentKind::OilAndGasLease,
        outcome: RuleOutcome::Ignore,
    },
    ClassifierRule {
        name: "life estate",
        applies: |event| event.kind() == InstrumentKind::LifeEstate || event.carries_life_estate(),
        outcome: RuleOutcome::Review(LIFE_ESTATE_NOTE),
    },
    ClassifierRule {
        name: "surface-only reservation",
        applies: |event| event.reserves_minerals() && event.kind().is_deed_family(),
        outcome: RuleOutcome::Ignore,
    },
];

/// Classify one event against the decision table.
#[must_use]
pub fn classify(event: &InstrumentEvent) -> RuleOutcome {
    CLASSIFIER_RULES
        .iter()
        .find(|rule| (rule.applies)(event))
        .map_or(RuleOutcome::Transfer, |rule| rule.outcome)
}

/// Serializable view of the decision table for audit surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct RuleDescription {
    pub position: usize,
    pub name: &'static str,
    #[serde(flatten)]
    pub outcome: RuleOutcome,
}

#[must_use]
pub fn describe_rules() -> Vec<RuleDescription> {
    let mut rules: Vec<RuleDescription> = CLASSIFIER_RULES
        .iter()
        .enumerate()
        .map(|(index, rule)| RuleDescription {
            position: index + 1,
            name: rule.name,
            outcome: rule.outcome,
        })
        .collect();
    rules.push(RuleDescription {
        position: CLASSIFIER_RULES.len() + 1,
        name: "default transfer",
        outcome: RuleOutcome::Transfer,
    });
    rules
}

/// Insertion-ordered mapping from owner name to signed fractional interest.
///
/// Owner names are case-sensitive and never normalized. Entries keep the
/// order in which owners were first touched; report tie-breaking relies on
/// that order being stable across runs. Balances may go transiently negative
/// during replay and are only clamped when the report is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    entries: Vec<(String, f64)>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance for an owner; owners never touched read as zero.
    #[must_use]
    pub fn balance(&self, owner: &str) -> f64 {
        self.entries
            .iter()
            .find(|(name, _)| name == owner)
            .map_or(0.0, |(_, value)| *value)
    }

    fn slot(&mut self, owner: &str) -> &mut f64 {
        let index = match self.entries.iter().position(|(name, _)| name == owner) {
            Some(index) => index,
            None => {
                self.entries.push((owner.to_string(), 0.0));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    pub fn credit(&mut self, owner: &str, amount: f64) {
        *self.slot(owner) += amount;
    }

    pub fn debit(&mut self, owner: &str, amount: f64) {
        *self.slot(owner) -= amount;
    }

    pub fn set_zero(&mut self, owner: &str) {
        *self.slot(owner) = 0.0;
    }

    /// Drop entries with magnitude below [`BALANCE_EPSILON`]. Idempotent:
    /// running finalization twice yields the same entries as running it once.
    pub fn finalize(&mut self) {
        self.entries.retain(|(_, value)| value.abs() >= BALANCE_EPSILON);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Advisory record of a situation the replay could not resolve
/// deterministically. Flags never block resolution.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReviewFlag {
    #[serde(default)]
    pub doc_id: Option<String>,
    pub note: String,
}

/// Final ledger state and flags from one replay of a tract's chain.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub events_count: usize,
    pub ledger: Ledger,
    pub flags: Vec<ReviewFlag>,
}

/// Enforce the request-boundary preconditions.
///
/// The resolver itself never rejects input; callers apply these checks ahead
/// of it so violations surface as request errors rather than engine failures.
///
/// # Errors
/// Returns [`EngineError::Validation`] when `events` is empty or `tract_key`
/// is blank.
pub fn validate_request(events: &[InstrumentEvent], tract_key: &str) -> Result<(), EngineError> {
    if events.is_empty() {
        return Err(EngineError::Validation("events MUST be non-empty".to_string()));
    }
    if tract_key.trim().is_empty() {
        return Err(EngineError::Validation("tract_key MUST be non-empty".to_string()));
    }
    Ok(())
}

/// Replay a tract's instrument chain and compute the final ownership ledger.
///
/// Events are filtered to the tract, stable-sorted ascending by recorded then
/// effective date (plain string comparison; missing dates sort first via the
/// empty-string fallback, preserving input order on ties), and applied one at
/// a time under the classifier decision table. The ledger is finalized before
/// returning; input events are never mutated.
#[must_use]
pub fn resolve_chain(events: &[InstrumentEvent], tract_key: &str) -> Resolution {
    let mut relevant: Vec<&InstrumentEvent> =
        events.iter().filter(|event| matches_tract(event, tract_key)).collect();
    relevant.sort_by(|lhs, rhs| lhs.sort_key().cmp(&rhs.sort_key()));

    let mut ledger = Ledger::new();
    let mut flags: Vec<ReviewFlag> = Vec::new();

    for event in relevant {
        match classify(event) {
            RuleOutcome::Ignore => {}
            RuleOutcome::Review(note) => {
                flags.push(ReviewFlag { doc_id: event.doc_id.clone(), note: note.to_string() });
            }
            RuleOutcome::Transfer => apply_transfer(event, &mut ledger, &mut flags),
        }
    }

    ledger.finalize();
    Resolution { events_count: events.len(), ledger, flags }
}

#[allow(clippy::cast_precision_loss)]
fn apply_transfer(event: &InstrumentEvent, ledger: &mut Ledger, flags: &mut Vec<ReviewFlag>) {
    if event.conveys_all_interest {
        // Grantors are processed independently: a flagged grantor never
        // blocks the others in the same instrument.
        for grantor in &event.grantors {
            let balance = ledger.balance(grantor);
            if balance > 0.0 && !event.grantees.is_empty() {
                let share = balance / event.grantees.len() as f64;
                ledger.set_zero(grantor);
                for grantee in &event.grantees {
                    ledger.credit(grantee, share);
                }
            } else {
                flags.push(ReviewFlag {
                    doc_id: event.doc_id.clone(),
                    note: format!(
                        "Unknown grantor share for {grantor}; full-interest conveyance skipped"
                    ),
                });
            }
        }
        return;
    }

    let Some(fraction) = event.fraction_whole.as_deref().and_then(parse_fraction) else {
        // Neither a full-interest conveyance nor a parseable fraction: the
        // event is inert and raises no flag.
        return;
    };

    // The fraction is of the whole tract. Grantor debits and grantee credits
    // are two independent distribution steps, not one conserved transfer, and
    // grantor balances may go negative here.
    if !event.grantors.is_empty() {
        let share = fraction / event.grantors.len() as f64;
        for grantor in &event.grantors {
            ledger.debit(grantor, share);
        }
    }
    if !event.grantees.is_empty() {
        let share = fraction / event.grantees.len() as f64;
        for grantee in &event.grantees {
            ledger.credit(grantee, share);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LeaseStatus {
    #[serde(rename = "Appears Leased")]
    AppearsLeased,
    #[serde(rename = "Appears Open")]
    AppearsOpen,
}

impl LeaseStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppearsLeased => "Appears Leased",
            Self::AppearsOpen => "Appears Open",
        }
    }

    #[must_use]
    pub fn from_hbp(hbp: bool) -> Self {
        if hbp {
            Self::AppearsLeased
        } else {
            Self::AppearsOpen
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnershipRow {
    pub owner: String,
    pub percent: f64,
    pub net_acres: f64,
    pub status: LeaseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnershipReport {
    pub events_count: usize,
    pub owners: Vec<OwnershipRow>,
    pub flags: Vec<ReviewFlag>,
}

/// Caller-supplied parameters scoping one resolution run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TractQuery {
    pub tract_key: String,
    pub total_acres: f64,
    pub hbp: bool,
}

/// Convert a finalized resolution into the externally visible report.
///
/// Negative balances are clamped to zero here rather than at finalization,
/// so an owner explicitly touched by the chain can still surface as a row
/// with exactly zero net acres. The lease status is applied uniformly to
/// every row from the caller-supplied held-by-production flag.
#[must_use]
pub fn build_report(resolution: Resolution, total_acres: f64, hbp: bool) -> OwnershipReport {
    let status = LeaseStatus::from_hbp(hbp);
    let mut owners: Vec<OwnershipRow> = resolution
        .ledger
        .iter()
        .map(|(owner, fraction)| {
            let net_acres = fraction.max(0.0) * total_acres;
            #[allow(clippy::float_cmp)]
            let percent =
                if total_acres == 0.0 { 0.0 } else { (net_acres / total_acres) * 100.0 };
            OwnershipRow { owner: owner.to_string(), percent, net_acres, status }
        })
        .collect();
    owners.sort_by(|lhs, rhs| {
        rhs.net_acres.partial_cmp(&lhs.net_acres).unwrap_or(Ordering::Equal)
    });

    OwnershipReport {
        events_count: resolution.events_count,
        owners,
        flags: resolution.flags,
    }
}

/// Resolve a tract's chain and build the report in one call.
#[must_use]
pub fn resolve_ownership(events: &[InstrumentEvent], query: &TractQuery) -> OwnershipReport {
    let resolution = resolve_chain(events, &query.tract_key);
    build_report(resolution, query.total_acres, query.hbp)
}
