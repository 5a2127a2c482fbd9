use super::{AnalysisContext, Rule, RuleResult};
use crate::config::EngineConfig;
use crate::domain::{Finding, RuleId, Transaction};
use crate::utils::geo::{country_centroid, normalize_country, GeoPoint};

/// Positions closer than this are treated as the same place.
const MIN_DISTANCE_KM: f64 = 1.0;

/// Where a transaction happened, and how precisely we know it.
enum Fix {
    Exact(GeoPoint),
    Country,
}

impl Fix {
    fn of(tx: &Transaction) -> Option<Fix> {
        if let Some(point) = tx.coordinates() {
            return Some(Fix::Exact(point));
        }
        tx.location_country
            .as_deref()
            .and_then(country_centroid)
            .map(|_| Fix::Country)
    }
}

/// Kilometres between two fixes. Exact distances need coordinates on both
/// sides; otherwise the comparison drops to country level and a shared
/// country counts as no movement.
fn separation_km(here: &Fix, there: &Fix, tx: &Transaction, previous: &Transaction) -> Option<f64> {
    if let (Fix::Exact(a), Fix::Exact(b)) = (here, there) {
        return Some(a.distance_km(b));
    }
    let a = normalize_country(tx.location_country.as_deref()?);
    let b = normalize_country(previous.location_country.as_deref()?);
    if a == b {
        return Some(0.0);
    }
    Some(country_centroid(&a)?.distance_km(&country_centroid(&b)?))
}

/// Two consecutive transactions too far apart for the time between them.
pub struct ImpossibleTravelRule;

impl Rule for ImpossibleTravelRule {
    fn id(&self) -> RuleId {
        RuleId::ImpossibleTravel
    }

    fn evaluate(&self, tx: &Transaction, ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult {
        let here = match Fix::of(tx) {
            Some(fix) => fix,
            None => return Ok(None),
        };
        let (previous, there) = match ctx.history.iter().find_map(|t| Fix::of(t).map(|f| (t, f))) {
            Some(found) => found,
            None => return Ok(None),
        };

        let distance = match separation_km(&here, &there, tx, previous) {
            Some(km) if km >= MIN_DISTANCE_KM => km,
            _ => return Ok(None),
        };

        let elapsed_secs = (tx.timestamp - previous.timestamp).num_seconds().max(1) as f64;
        let speed = distance / (elapsed_secs / 3600.0);
        if speed <= config.travel_speed_threshold_kmh {
            return Ok(None);
        }

        Ok(Some(Finding::new(
            self.id(),
            config.weight(self.id()),
            speed,
            format!(
                "{:.0} km from transaction {} in {} min implies {:.0} km/h",
                distance,
                previous.transaction_id,
                (elapsed_secs / 60.0).round(),
                speed
            ),
        )))
    }
}
