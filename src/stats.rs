//! Derived-metrics engine. Pure, total functions over entity snapshots:
//! every ratio defines its own zero-division fallback and percentages are
//! clamped defensively, so no input set can make these panic.

use crate::models::hse_audit::{AuditStatus, HseAudit};
use crate::models::machine::Machine;
use crate::models::operation::Operation;
use crate::models::progress::Progress;
use crate::models::safety_incident::{IncidentSeverity, IncidentStatus, SafetyIncident};
use mongodb::bson::DateTime;
use serde::Serialize;
use std::collections::BTreeMap;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Fallbacks used when a collection is empty. The HSE baseline and the
/// critical-incident window are site policy, not measurements, so they are
/// env-overridable rather than hardcoded at call sites.
#[derive(Clone, Copy, Debug)]
pub struct StatsConfig {
    pub hse_baseline_rate: u32,
    pub critical_window_days: i64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            hse_baseline_rate: 95,
            critical_window_days: 30,
        }
    }
}

impl StatsConfig {
    pub fn from_env() -> Self {
        let defaults = StatsConfig::default();
        StatsConfig {
            hse_baseline_rate: std::env::var("HSE_BASELINE_RATE")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.hse_baseline_rate),
            critical_window_days: std::env::var("CRITICAL_INCIDENT_WINDOW_DAYS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.critical_window_days),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub active_machines: usize,
    pub avg_yield: f64,
    pub volume: f64,
    pub availability: f64,
    pub incidents_count: usize,
    pub operations_count: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SafetyStats {
    pub safety_rate: u32,
    pub hse_compliance_rate: u32,
    pub days_since_last_critical: i64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PanneauProgress {
    pub panneau: String,
    pub avg_percentage: f64,
    pub zones: usize,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn clamp_percentage(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

pub fn dashboard_stats(
    machines: &[Machine],
    operations: &[Operation],
    incidents: &[SafetyIncident],
) -> DashboardStats {
    let active_machines = machines.iter().filter(|machine| machine.is_active).count();
    // Adversarial negatives are rejected at input validation; max(0) keeps the
    // ratios in range even for rows that predate that check.
    let total_volume: f64 = operations
        .iter()
        .map(|operation| operation.volume_blasted.max(0.0))
        .sum();
    let total_working_hours: f64 = operations
        .iter()
        .map(|operation| operation.working_hours.max(0.0))
        .sum();
    let total_downtime: f64 = operations
        .iter()
        .map(|operation| operation.downtime.max(0.0))
        .sum();

    let avg_yield = if total_working_hours > 0.0 {
        round1(total_volume / total_working_hours)
    } else {
        0.0
    };
    let total_time = total_working_hours + total_downtime;
    let availability = if total_time > 0.0 {
        round1(clamp_percentage(total_working_hours / total_time * 100.0))
    } else {
        0.0
    };

    DashboardStats {
        active_machines,
        avg_yield,
        volume: total_volume.round(),
        availability,
        incidents_count: incidents.len(),
        operations_count: operations.len(),
    }
}

/// Rendering rate of a single shift, m³ per working hour.
pub fn operation_yield(operation: &Operation) -> f64 {
    if operation.working_hours > 0.0 && operation.volume_blasted > 0.0 {
        round1(operation.volume_blasted / operation.working_hours)
    } else {
        0.0
    }
}

/// Resolved share of all incidents. An empty site reports 100 — the vacuous
/// "fully safe" baseline is a policy choice.
pub fn safety_rate(incidents: &[SafetyIncident]) -> u32 {
    if incidents.is_empty() {
        return 100;
    }
    let resolved = incidents
        .iter()
        .filter(|incident| {
            matches!(
                incident.status,
                IncidentStatus::Resolved | IncidentStatus::Closed
            )
        })
        .count();
    (resolved as f64 / incidents.len() as f64 * 100.0).round() as u32
}

pub fn hse_compliance_rate(audits: &[HseAudit], config: &StatsConfig) -> u32 {
    if audits.is_empty() {
        return config.hse_baseline_rate;
    }
    let compliant = audits
        .iter()
        .filter(|audit| audit.status == AuditStatus::Compliant)
        .count();
    (compliant as f64 / audits.len() as f64 * 100.0).round() as u32
}

/// Whole days elapsed since the most recent critical incident; the configured
/// window when no critical incident exists.
pub fn days_since_last_critical(
    incidents: &[SafetyIncident],
    now: DateTime,
    config: &StatsConfig,
) -> i64 {
    incidents
        .iter()
        .filter(|incident| incident.severity == IncidentSeverity::Critical)
        .map(|incident| incident.reported_at.timestamp_millis())
        .max()
        .map(|last| ((now.timestamp_millis() - last) / MILLIS_PER_DAY).max(0))
        .unwrap_or(config.critical_window_days)
}

pub fn safety_overview(
    incidents: &[SafetyIncident],
    audits: &[HseAudit],
    now: DateTime,
    config: &StatsConfig,
) -> SafetyStats {
    SafetyStats {
        safety_rate: safety_rate(incidents),
        hse_compliance_rate: hse_compliance_rate(audits, config),
        days_since_last_critical: days_since_last_critical(incidents, now, config),
    }
}

/// Mean completion per panneau over clamped percentages, stable order.
pub fn progress_by_panneau(rows: &[Progress]) -> Vec<PanneauProgress> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for row in rows {
        let entry = groups.entry(row.panneau.as_str()).or_insert((0.0, 0));
        entry.0 += clamp_percentage(row.progress_percentage);
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|(panneau, (sum, zones))| PanneauProgress {
            panneau: panneau.to_string(),
            avg_percentage: round1(sum / zones as f64),
            zones,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::machine::MachineKind;
    use crate::models::operation::MachineStatus;
    use mongodb::bson::oid::ObjectId;

    fn machine(is_active: bool) -> Machine {
        Machine {
            _id: Some(ObjectId::new()),
            name: "D11".to_string(),
            kind: MachineKind::Poussage,
            specifications: None,
            is_active,
            created_at: DateTime::from_millis(0),
        }
    }

    fn operation(working_hours: f64, downtime: f64, volume: f64) -> Operation {
        Operation {
            _id: Some(ObjectId::new()),
            fiche_id: "FD-2025-000001".to_string(),
            date: DateTime::from_millis(0),
            method: MachineKind::Poussage,
            machine_id: ObjectId::new(),
            operator_id: ObjectId::new(),
            poste: 1,
            panneau: "P-45".to_string(),
            tranche: "T-12".to_string(),
            niveau: "N-8".to_string(),
            machine_status: MachineStatus::Marche,
            working_hours,
            downtime,
            volume_blasted: volume,
            observations: None,
            created_at: DateTime::from_millis(0),
            updated_at: DateTime::from_millis(0),
        }
    }

    fn incident(severity: IncidentSeverity, status: IncidentStatus, reported_at: DateTime) -> SafetyIncident {
        SafetyIncident {
            _id: Some(ObjectId::new()),
            title: "Incident".to_string(),
            description: "Description".to_string(),
            severity,
            status,
            reported_by: ObjectId::new(),
            machine_id: None,
            location: None,
            reported_at,
            resolved_at: None,
        }
    }

    fn audit(status: AuditStatus) -> HseAudit {
        HseAudit {
            _id: Some(ObjectId::new()),
            title: "Audit".to_string(),
            audit_type: "safety".to_string(),
            score: Some(92.0),
            max_score: Some(100.0),
            audited_by: ObjectId::new(),
            location: None,
            findings: None,
            status,
            audit_date: DateTime::from_millis(0),
        }
    }

    fn progress(panneau: &str, percentage: f64) -> Progress {
        Progress {
            _id: Some(ObjectId::new()),
            panneau: panneau.to_string(),
            tranche: "T1".to_string(),
            niveau: "N1".to_string(),
            method: MachineKind::Casement,
            progress_percentage: percentage,
            target_depth: None,
            current_depth: None,
            updated_at: DateTime::from_millis(0),
        }
    }

    #[test]
    fn empty_collections_yield_all_zero_stats() {
        let stats = dashboard_stats(&[], &[], &[]);
        assert_eq!(
            stats,
            DashboardStats {
                active_machines: 0,
                avg_yield: 0.0,
                volume: 0.0,
                availability: 0.0,
                incidents_count: 0,
                operations_count: 0,
            }
        );
    }

    #[test]
    fn avg_yield_is_zero_whenever_working_hours_are_zero() {
        // Volume without hours must not divide by zero.
        let operations = vec![operation(0.0, 0.0, 5000.0), operation(0.0, 2.0, 300.0)];
        let stats = dashboard_stats(&[], &operations, &[]);
        assert_eq!(stats.avg_yield, 0.0);
    }

    #[test]
    fn dashboard_example_eight_hours_thousand_cubic_meters() {
        let machines = vec![machine(true), machine(true), machine(false)];
        let operations = vec![operation(8.0, 0.0, 1000.0)];
        let stats = dashboard_stats(&machines, &operations, &[]);

        assert_eq!(stats.active_machines, 2);
        assert_eq!(stats.avg_yield, 125.0);
        assert_eq!(stats.volume, 1000.0);
        assert_eq!(stats.availability, 100.0);
        assert_eq!(stats.operations_count, 1);
    }

    #[test]
    fn availability_stays_within_bounds_for_adversarial_inputs() {
        // Negative downtime straight from storage must not push availability past 100.
        let operations = vec![operation(8.0, -4.0, 0.0)];
        let stats = dashboard_stats(&[], &operations, &[]);
        assert!((0.0..=100.0).contains(&stats.availability));

        let operations = vec![operation(6.0, 2.0, 0.0)];
        let stats = dashboard_stats(&[], &operations, &[]);
        assert_eq!(stats.availability, 75.0);
    }

    #[test]
    fn operation_yield_rounds_to_one_decimal() {
        assert_eq!(operation_yield(&operation(3.0, 0.0, 1000.0)), 333.3);
        assert_eq!(operation_yield(&operation(0.0, 0.0, 1000.0)), 0.0);
    }

    #[test]
    fn safety_rate_defaults_to_100_without_incidents() {
        assert_eq!(safety_rate(&[]), 100);
    }

    #[test]
    fn safety_rate_is_half_for_one_resolved_of_two() {
        let incidents = vec![
            incident(
                IncidentSeverity::Minor,
                IncidentStatus::Resolved,
                DateTime::from_millis(0),
            ),
            incident(
                IncidentSeverity::Major,
                IncidentStatus::Open,
                DateTime::from_millis(0),
            ),
        ];
        assert_eq!(safety_rate(&incidents), 50);
    }

    #[test]
    fn closed_incidents_count_as_resolved() {
        let incidents = vec![incident(
            IncidentSeverity::Minor,
            IncidentStatus::Closed,
            DateTime::from_millis(0),
        )];
        assert_eq!(safety_rate(&incidents), 100);
    }

    #[test]
    fn hse_compliance_uses_baseline_when_no_audits() {
        let config = StatsConfig::default();
        assert_eq!(hse_compliance_rate(&[], &config), 95);

        let custom = StatsConfig {
            hse_baseline_rate: 80,
            ..config
        };
        assert_eq!(hse_compliance_rate(&[], &custom), 80);
    }

    #[test]
    fn hse_compliance_rounds_to_nearest_integer() {
        let audits = vec![
            audit(AuditStatus::Compliant),
            audit(AuditStatus::Compliant),
            audit(AuditStatus::NonCompliant),
        ];
        assert_eq!(hse_compliance_rate(&audits, &StatsConfig::default()), 67);
    }

    #[test]
    fn days_since_critical_uses_most_recent_incident() {
        let config = StatsConfig::default();
        let now = DateTime::from_millis(10 * MILLIS_PER_DAY);
        let incidents = vec![
            incident(
                IncidentSeverity::Critical,
                IncidentStatus::Resolved,
                DateTime::from_millis(2 * MILLIS_PER_DAY),
            ),
            incident(
                IncidentSeverity::Critical,
                IncidentStatus::Open,
                DateTime::from_millis(7 * MILLIS_PER_DAY),
            ),
            incident(
                IncidentSeverity::Minor,
                IncidentStatus::Open,
                DateTime::from_millis(9 * MILLIS_PER_DAY),
            ),
        ];
        assert_eq!(days_since_last_critical(&incidents, now, &config), 3);
    }

    #[test]
    fn days_since_critical_falls_back_to_configured_window() {
        let config = StatsConfig::default();
        let incidents = vec![incident(
            IncidentSeverity::Minor,
            IncidentStatus::Open,
            DateTime::from_millis(0),
        )];
        assert_eq!(
            days_since_last_critical(&incidents, DateTime::now(), &config),
            30
        );
        assert_eq!(days_since_last_critical(&[], DateTime::now(), &config), 30);
    }

    #[test]
    fn progress_percentages_are_clamped_before_averaging() {
        let rows = vec![
            progress("P1", 150.0),
            progress("P1", 50.0),
            progress("P2", -20.0),
        ];
        let summary = progress_by_panneau(&rows);
        assert_eq!(
            summary,
            vec![
                PanneauProgress {
                    panneau: "P1".to_string(),
                    avg_percentage: 75.0,
                    zones: 2,
                },
                PanneauProgress {
                    panneau: "P2".to_string(),
                    avg_percentage: 0.0,
                    zones: 1,
                },
            ]
        );
    }

    #[test]
    fn progress_summary_of_empty_input_is_empty() {
        assert!(progress_by_panneau(&[]).is_empty());
    }

    #[test]
    fn dashboard_stats_serialize_with_camel_case_keys() {
        let stats = dashboard_stats(&[machine(true)], &[operation(8.0, 0.0, 1000.0)], &[]);
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["activeMachines"], 1);
        assert_eq!(json["avgYield"], 125.0);
        assert_eq!(json["volume"], 1000.0);
        assert_eq!(json["availability"], 100.0);
        assert_eq!(json["incidentsCount"], 0);
        assert_eq!(json["operationsCount"], 1);
    }
}
