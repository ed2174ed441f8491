//! Result reconciliation.
//!
//! Turns a loosely-typed final payload from the compute service into
//! summary metrics and a list of placements, and resolves each placement
//! back to one of the line items stored when the calculation was
//! submitted. Resolution runs over an in-memory snapshot of candidate
//! items, so the whole cascade is a pure function of payload + snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Payload keys
// ---------------------------------------------------------------------------

/// Accepted keys for each field, in precedence order.
pub const FILL_RATE_KEYS: [&str; 2] = ["fill_rate", "fillRate"];
pub const TOTAL_WEIGHT_KEYS: [&str; 2] = ["total_weight", "totalWeight"];
pub const PLACED_ITEMS_KEYS: [&str; 2] = ["placed_items", "placedItems"];
pub const POSITION_X_KEYS: [&str; 2] = ["position_x", "x"];
pub const POSITION_Y_KEYS: [&str; 2] = ["position_y", "y"];
pub const POSITION_Z_KEYS: [&str; 2] = ["position_z", "z"];
pub const ROTATION_KEYS: [&str; 2] = ["rotation", "rotation_type"];

/// Separator between an item identifier and its instance suffix
/// (`BOX7_2` is the third unit of item `BOX7`).
pub const INSTANCE_SEPARATOR: char = '_';

// ---------------------------------------------------------------------------
// Numeric fallback policy
// ---------------------------------------------------------------------------

/// How to choose between alternative keys for a numeric field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericFallback {
    /// A value of exactly zero counts as missing, so a later key is
    /// consulted. Matches results already stored by earlier deployments,
    /// but misreads a legitimate zero.
    #[default]
    ZeroMeansAbsent,
    /// The first key that is present with a numeric value wins, even if
    /// that value is zero.
    Presence,
}

impl std::str::FromStr for NumericFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero_means_absent" | "zero" => Ok(Self::ZeroMeansAbsent),
            "presence" => Ok(Self::Presence),
            other => Err(format!("unknown numeric fallback policy '{other}'")),
        }
    }
}

/// Read the first acceptable number among `keys`, defaulting to `0.0`.
///
/// Non-numeric values count as absent under both policies.
pub fn pick_number(object: &Map<String, Value>, keys: &[&str], policy: NumericFallback) -> f64 {
    for key in keys {
        let Some(value) = object.get(*key).and_then(Value::as_f64) else {
            continue;
        };
        match policy {
            NumericFallback::Presence => return value,
            NumericFallback::ZeroMeansAbsent if value != 0.0 => return value,
            NumericFallback::ZeroMeansAbsent => {}
        }
    }
    0.0
}

pub(crate) fn pick_array<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array))
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Summary metrics of a finished calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResultSummary {
    pub fill_rate: f64,
    pub total_weight: f64,
}

/// One placement as reported by the compute service, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementEntry {
    /// Identifying token, e.g. `BOX7_2`. Empty when the entry carried none.
    pub token: String,
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub rotation: i32,
}

/// Extract summary metrics. A payload that is not an object yields zeros.
pub fn extract_summary(payload: &Value, policy: NumericFallback) -> ResultSummary {
    match payload.as_object() {
        Some(object) => ResultSummary {
            fill_rate: pick_number(object, &FILL_RATE_KEYS, policy),
            total_weight: pick_number(object, &TOTAL_WEIGHT_KEYS, policy),
        },
        None => ResultSummary {
            fill_rate: 0.0,
            total_weight: 0.0,
        },
    }
}

/// Extract the placement list. Entries that are not objects are skipped.
pub fn extract_placements(payload: &Value, policy: NumericFallback) -> Vec<PlacementEntry> {
    let Some(items) = payload
        .as_object()
        .and_then(|object| pick_array(object, &PLACED_ITEMS_KEYS))
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .map(|item| PlacementEntry {
            token: token_of(item),
            position_x: pick_number(item, &POSITION_X_KEYS, policy),
            position_y: pick_number(item, &POSITION_Y_KEYS, policy),
            position_z: pick_number(item, &POSITION_Z_KEYS, policy),
            rotation: pick_number(item, &ROTATION_KEYS, policy) as i32,
        })
        .collect()
}

pub(crate) fn token_of(item: &Map<String, Value>) -> String {
    match item.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// The part of `token` before its first instance separator, or the whole
/// token when it has none.
pub fn token_prefix(token: &str) -> &str {
    token
        .split_once(INSTANCE_SEPARATOR)
        .map_or(token, |(prefix, _)| prefix)
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// A stored line item that placements may resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCandidate {
    pub id: DbId,
    /// Identifier the client used for this line item.
    pub external_id: Option<String>,
    /// Display name.
    pub name: String,
}

/// Which rule resolved a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    ExternalIdExact,
    ExternalIdPrefix,
    NameExact,
    NamePrefix,
}

/// A matcher returns the first candidate it accepts for `token`.
pub type Matcher = fn(&str, &[ItemCandidate]) -> Option<DbId>;

fn external_id_exact(token: &str, candidates: &[ItemCandidate]) -> Option<DbId> {
    candidates
        .iter()
        .find(|c| c.external_id.as_deref() == Some(token))
        .map(|c| c.id)
}

fn external_id_prefix(token: &str, candidates: &[ItemCandidate]) -> Option<DbId> {
    let prefix = token_prefix(token);
    candidates
        .iter()
        .find(|c| {
            c.external_id
                .as_deref()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(prefix))
        })
        .map(|c| c.id)
}

fn name_exact(token: &str, candidates: &[ItemCandidate]) -> Option<DbId> {
    candidates.iter().find(|c| c.name == token).map(|c| c.id)
}

fn name_prefix(token: &str, candidates: &[ItemCandidate]) -> Option<DbId> {
    let prefix = token_prefix(token);
    candidates.iter().find(|c| c.name == prefix).map(|c| c.id)
}

/// The matching cascade, tried in order; the first hit wins.
pub const MATCHERS: [(MatchStrategy, Matcher); 4] = [
    (MatchStrategy::ExternalIdExact, external_id_exact),
    (MatchStrategy::ExternalIdPrefix, external_id_prefix),
    (MatchStrategy::NameExact, name_exact),
    (MatchStrategy::NamePrefix, name_prefix),
];

/// Resolve `token` against `candidates`.
///
/// Candidates are scanned in the order given, so callers should pass a
/// stable order (ascending id) to keep resolution deterministic.
pub fn resolve_item(token: &str, candidates: &[ItemCandidate]) -> Option<(DbId, MatchStrategy)> {
    if token.is_empty() {
        return None;
    }
    MATCHERS
        .iter()
        .find_map(|(strategy, matcher)| matcher(token, candidates).map(|id| (id, *strategy)))
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// A placement tied to a stored line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPlacement {
    pub item_id: DbId,
    pub strategy: MatchStrategy,
    pub entry: PlacementEntry,
}

/// Everything the persister needs from one payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub summary: ResultSummary,
    pub placements: Vec<ResolvedPlacement>,
    /// Tokens of placements that matched no stored item; these are dropped.
    pub unresolved: Vec<String>,
}

/// Stateless reconciler configured with a numeric fallback policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultReconciler {
    policy: NumericFallback,
}

impl ResultReconciler {
    pub fn new(policy: NumericFallback) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NumericFallback {
        self.policy
    }

    pub fn reconcile(&self, payload: &Value, candidates: &[ItemCandidate]) -> Reconciliation {
        let summary = extract_summary(payload, self.policy);
        let mut placements = Vec::new();
        let mut unresolved = Vec::new();

        for entry in extract_placements(payload, self.policy) {
            match resolve_item(&entry.token, candidates) {
                Some((item_id, strategy)) => placements.push(ResolvedPlacement {
                    item_id,
                    strategy,
                    entry,
                }),
                None => {
                    tracing::warn!(
                        token = %entry.token,
                        "No stored item matches placed item, dropping it",
                    );
                    unresolved.push(entry.token);
                }
            }
        }

        Reconciliation {
            summary,
            placements,
            unresolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn candidate(id: DbId, external_id: Option<&str>, name: &str) -> ItemCandidate {
        ItemCandidate {
            id,
            external_id: external_id.map(str::to_string),
            name: name.to_string(),
        }
    }

    fn stored_items() -> Vec<ItemCandidate> {
        vec![
            candidate(1, Some("BOX7"), "Box Kabel"),
            candidate(2, Some("crate"), "Box Pos"),
            candidate(3, None, "PALLET"),
            candidate(4, Some("BOX7_2"), "Box Rokok"),
        ]
    }

    // -- numeric fallback --

    #[test]
    fn zero_snake_case_falls_back_to_camel_case() {
        let payload = json!({"fill_rate": 0, "fillRate": 0.75});
        let summary = extract_summary(&payload, NumericFallback::ZeroMeansAbsent);
        assert_eq!(summary.fill_rate, 0.75);
    }

    #[test]
    fn nonzero_snake_case_takes_precedence() {
        let payload = json!({"fill_rate": 0.5, "fillRate": 0.9});
        let summary = extract_summary(&payload, NumericFallback::ZeroMeansAbsent);
        assert_eq!(summary.fill_rate, 0.5);
    }

    #[test]
    fn presence_policy_keeps_explicit_zero() {
        let payload = json!({"fill_rate": 0, "fillRate": 0.75});
        let summary = extract_summary(&payload, NumericFallback::Presence);
        assert_eq!(summary.fill_rate, 0.0);
    }

    #[test]
    fn presence_policy_falls_back_when_key_missing() {
        let payload = json!({"totalWeight": 120.5});
        let summary = extract_summary(&payload, NumericFallback::Presence);
        assert_eq!(summary.total_weight, 120.5);
        assert_eq!(summary.fill_rate, 0.0);
    }

    #[test]
    fn non_numeric_values_count_as_absent() {
        let payload = json!({"total_weight": "heavy", "totalWeight": 10});
        let summary = extract_summary(&payload, NumericFallback::Presence);
        assert_eq!(summary.total_weight, 10.0);
    }

    #[test]
    fn non_object_payload_yields_zero_summary() {
        let summary = extract_summary(&json!([1, 2, 3]), NumericFallback::default());
        assert_eq!(summary, ResultSummary { fill_rate: 0.0, total_weight: 0.0 });
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!("presence".parse::<NumericFallback>().unwrap(), NumericFallback::Presence);
        assert_eq!(
            "ZERO_MEANS_ABSENT".parse::<NumericFallback>().unwrap(),
            NumericFallback::ZeroMeansAbsent
        );
        assert!("sometimes".parse::<NumericFallback>().is_err());
    }

    // -- placements --

    #[test]
    fn placements_accept_either_list_key_and_position_names() {
        let payload = json!({
            "placedItems": [
                {"id": "A_1", "x": 1.0, "y": 2.0, "z": 3.0},
                {"id": "B", "position_x": 4.0, "position_y": 0, "y": 5.0, "position_z": 6.0, "rotation_type": 2},
                "not an object"
            ]
        });
        let entries = extract_placements(&payload, NumericFallback::ZeroMeansAbsent);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].token, "A_1");
        assert_eq!((entries[0].position_x, entries[0].position_y, entries[0].position_z), (1.0, 2.0, 3.0));
        assert_eq!((entries[1].position_x, entries[1].position_y, entries[1].position_z), (4.0, 5.0, 6.0));
        assert_eq!(entries[1].rotation, 2);
        assert_eq!(entries[0].rotation, 0);
    }

    #[test]
    fn snake_case_list_wins_when_both_present() {
        let payload = json!({
            "placed_items": [{"id": "snake"}],
            "placedItems": [{"id": "camel"}]
        });
        let entries = extract_placements(&payload, NumericFallback::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].token, "snake");
    }

    #[test]
    fn missing_list_yields_no_placements() {
        assert!(extract_placements(&json!({"fill_rate": 1}), NumericFallback::default()).is_empty());
    }

    #[test]
    fn token_prefix_cuts_at_first_separator() {
        assert_eq!(token_prefix("BOX7_2"), "BOX7");
        assert_eq!(token_prefix("a_b_c"), "a");
        assert_eq!(token_prefix("plain"), "plain");
    }

    // -- matching cascade --

    #[test]
    fn exact_external_id_wins_over_prefix() {
        let items = stored_items();
        assert_eq!(resolve_item("BOX7_2", &items), Some((4, MatchStrategy::ExternalIdExact)));
    }

    #[test]
    fn prefix_resolves_instance_suffix() {
        let items = vec![candidate(1, Some("BOX7"), "Box Kabel")];
        assert_eq!(resolve_item("BOX7_2", &items), Some((1, MatchStrategy::ExternalIdPrefix)));
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        let items = stored_items();
        assert_eq!(resolve_item("CRATE_5", &items), Some((2, MatchStrategy::ExternalIdPrefix)));
    }

    #[test]
    fn name_matches_follow_external_id_matches() {
        let items = stored_items();
        assert_eq!(resolve_item("Box Pos", &items), Some((2, MatchStrategy::NameExact)));
        assert_eq!(resolve_item("PALLET_3", &items), Some((3, MatchStrategy::NamePrefix)));
    }

    #[test]
    fn unmatched_and_empty_tokens_resolve_to_none() {
        let items = stored_items();
        assert_eq!(resolve_item("GHOST_1", &items), None);
        assert_eq!(resolve_item("", &items), None);
    }

    #[test]
    fn first_candidate_in_order_wins() {
        let items = vec![candidate(10, Some("dup"), "x"), candidate(11, Some("dup"), "y")];
        assert_eq!(resolve_item("dup", &items), Some((10, MatchStrategy::ExternalIdExact)));
    }

    // -- reconciler --

    #[test]
    fn reconcile_drops_unresolvable_items_and_keeps_the_rest() {
        let payload = json!({
            "fill_rate": 0.62,
            "totalWeight": 340.0,
            "placed_items": [
                {"id": "BOX7_1", "x": 0, "y": 0, "z": 0},
                {"id": "GHOST", "x": 1, "y": 1, "z": 1},
                {"id": "crate", "x": 2, "y": 0, "z": 0}
            ]
        });
        let result = ResultReconciler::default().reconcile(&payload, &stored_items());

        assert_eq!(result.summary, ResultSummary { fill_rate: 0.62, total_weight: 340.0 });
        let ids: Vec<DbId> = result.placements.iter().map(|p| p.item_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(result.unresolved, vec!["GHOST".to_string()]);
    }

    #[test]
    fn reconcile_is_deterministic() {
        let payload = json!({"placed_items": [{"id": "BOX7_9"}, {"id": "Box Rokok"}, {"id": "PALLET"}]});
        let reconciler = ResultReconciler::new(NumericFallback::Presence);
        let first = reconciler.reconcile(&payload, &stored_items());
        let second = reconciler.reconcile(&payload, &stored_items());
        assert_eq!(first, second);
    }
}
