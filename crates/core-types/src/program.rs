use crate::enums::CapacityStatus;
use crate::error::CoreError;
use crate::validation::parse_iso_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIME: &str = "9:00 AM - 4:00 PM";
pub const DEFAULT_LOCATION: &str = "Sci-Bono Clubhouse";
pub const DEFAULT_AGE_RANGE: &str = "13-18 years";
pub const DEFAULT_MAX_PARTICIPANTS: i32 = 30;

/// Registration head counts for one program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationCounts {
    pub total: i64,
    pub confirmed: i64,
    pub pending: i64,
    pub mentors: i64,
    pub members: i64,
}

/// Fill level of a program, derived from its registrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityInfo {
    pub max_participants: i32,
    pub total_registrations: i64,
    pub confirmed_count: i64,
    pub pending_count: i64,
    pub mentor_count: i64,
    pub member_count: i64,
    pub capacity_percentage: f64,
    pub spots_remaining: i64,
    pub capacity_status: CapacityStatus,
    pub member_capacity: i64,
    pub mentor_capacity: i64,
    pub member_full: bool,
    pub mentor_full: bool,
}

impl CapacityInfo {
    pub fn new(
        max_participants: i32,
        counts: RegistrationCounts,
        member_capacity: i64,
        mentor_capacity: i64,
    ) -> Self {
        let max = i64::from(max_participants);
        let capacity_percentage = if max > 0 {
            round_to(counts.confirmed as f64 / max as f64 * 100.0, 1)
        } else {
            0.0
        };
        Self {
            max_participants,
            total_registrations: counts.total,
            confirmed_count: counts.confirmed,
            pending_count: counts.pending,
            mentor_count: counts.mentors,
            member_count: counts.members,
            capacity_percentage,
            spots_remaining: (max - counts.confirmed).max(0),
            capacity_status: capacity_status(counts.confirmed, max, capacity_percentage),
            member_capacity,
            mentor_capacity,
            member_full: counts.members >= member_capacity,
            mentor_full: counts.mentors >= mentor_capacity,
        }
    }
}

fn capacity_status(confirmed: i64, max: i64, percentage: f64) -> CapacityStatus {
    if confirmed >= max {
        CapacityStatus::Full
    } else if percentage >= 90.0 {
        CapacityStatus::NearlyFull
    } else if percentage >= 75.0 {
        CapacityStatus::FillingUp
    } else {
        CapacityStatus::Available
    }
}

/// Outcome of a successful capacity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityChange {
    pub max_participants: i32,
    pub current_registrations: i64,
    pub available_spots: i64,
    pub utilization_percentage: f64,
}

/// Checks a new participant limit against the registrations already held.
pub fn plan_capacity_change(
    max_participants: i32,
    current_registrations: i64,
) -> Result<CapacityChange, CoreError> {
    if max_participants < 1 {
        return Err(CoreError::Rule(
            "Maximum participants must be at least 1".to_string(),
        ));
    }
    let max = i64::from(max_participants);
    if max < current_registrations {
        return Err(CoreError::Rule(format!(
            "Cannot set capacity to {}. Current registrations: {}",
            max_participants, current_registrations
        )));
    }
    Ok(CapacityChange {
        max_participants,
        current_registrations,
        available_spots: max - current_registrations,
        utilization_percentage: round_to(current_registrations as f64 / max as f64 * 100.0, 2),
    })
}

/// Parses and orders a program's start and end dates.
pub fn parse_program_window(start: &str, end: &str) -> Result<(NaiveDate, NaiveDate), CoreError> {
    let start_date = parse_iso_date(start)
        .ok_or_else(|| CoreError::Rule("Invalid start date format. Use YYYY-MM-DD".to_string()))?;
    let end_date = parse_iso_date(end)
        .ok_or_else(|| CoreError::Rule("Invalid end date format. Use YYYY-MM-DD".to_string()))?;
    check_program_window(start_date, end_date)?;
    Ok((start_date, end_date))
}

pub fn check_program_window(start: NaiveDate, end: NaiveDate) -> Result<(), CoreError> {
    if end < start {
        return Err(CoreError::Rule("End date must be after start date".to_string()));
    }
    Ok(())
}

/// Display string for a program's run, e.g. `Jan 5 - Jan 16, 2026`.
pub fn program_dates_label(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} - {}", start.format("%b %-d"), end.format("%b %-d, %Y"))
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(confirmed: i64) -> RegistrationCounts {
        RegistrationCounts {
            total: confirmed,
            confirmed,
            ..Default::default()
        }
    }

    #[test]
    fn capacity_status_thresholds() {
        assert_eq!(
            CapacityInfo::new(20, counts(10), 30, 5).capacity_status,
            CapacityStatus::Available
        );
        assert_eq!(
            CapacityInfo::new(20, counts(15), 30, 5).capacity_status,
            CapacityStatus::FillingUp
        );
        assert_eq!(
            CapacityInfo::new(20, counts(18), 30, 5).capacity_status,
            CapacityStatus::NearlyFull
        );
        let full = CapacityInfo::new(20, counts(21), 30, 5);
        assert_eq!(full.capacity_status, CapacityStatus::Full);
        assert_eq!(full.spots_remaining, 0);
    }

    #[test]
    fn capacity_percentage_has_one_decimal() {
        let info = CapacityInfo::new(30, counts(7), 30, 5);
        assert_eq!(info.capacity_percentage, 23.3);
        assert_eq!(info.spots_remaining, 23);
    }

    #[test]
    fn member_and_mentor_limits() {
        let info = CapacityInfo::new(
            40,
            RegistrationCounts { total: 35, confirmed: 10, pending: 25, mentors: 5, members: 30 },
            30,
            5,
        );
        assert!(info.member_full);
        assert!(info.mentor_full);
        assert_eq!(info.pending_count, 25);
    }

    #[test]
    fn capacity_change_rules() {
        assert_eq!(
            plan_capacity_change(0, 0).unwrap_err().to_string(),
            "Maximum participants must be at least 1"
        );
        assert_eq!(
            plan_capacity_change(10, 12).unwrap_err().to_string(),
            "Cannot set capacity to 10. Current registrations: 12"
        );
        let change = plan_capacity_change(40, 12).unwrap();
        assert_eq!(change.available_spots, 28);
        assert_eq!(change.utilization_percentage, 30.0);
    }

    #[test]
    fn program_window_validation() {
        assert_eq!(
            parse_program_window("2026/01/05", "2026-01-16").unwrap_err().to_string(),
            "Invalid start date format. Use YYYY-MM-DD"
        );
        assert_eq!(
            parse_program_window("2026-01-16", "2026-01-05").unwrap_err().to_string(),
            "End date must be after start date"
        );
        let (start, end) = parse_program_window("2026-01-05", "2026-01-05").unwrap();
        assert_eq!(start, end);
    }

    #[test]
    fn dates_label() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        assert_eq!(program_dates_label(start, end), "Jan 5 - Jan 16, 2026");
    }
}
