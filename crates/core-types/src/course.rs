use crate::enums::CourseType;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Builds a course code such as `ROB-FC-0042` from the title's first three
/// letters, the course type segment and a random number.
pub fn generate_course_code(title: &str, course_type: CourseType) -> String {
    let suffix = rand::thread_rng().gen_range(1..=9999);
    course_code_with_suffix(title, course_type, suffix)
}

pub fn course_code_with_suffix(title: &str, course_type: CourseType, suffix: u16) -> String {
    let letters: String = title
        .chars()
        .filter(char::is_ascii_alphabetic)
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();
    let prefix = if letters.is_empty() { "CRS".to_string() } else { letters };
    format!("{}-{}-{:04}", prefix, course_type.code_segment(), suffix)
}

/// Percentage of a course's lessons a learner has completed, rounded to two
/// decimal places and clamped to `0..=100`.
pub fn progress_percent(completed_lessons: i64, total_lessons: i64) -> Decimal {
    if total_lessons <= 0 || completed_lessons <= 0 {
        return Decimal::ZERO;
    }
    let ratio = Decimal::from(completed_lessons) / Decimal::from(total_lessons) * dec!(100);
    ratio.round_dp(2).min(dec!(100))
}

pub fn is_complete(progress: Decimal) -> bool {
    progress >= dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_code_uses_letters_only() {
        assert_eq!(
            course_code_with_suffix("3D Printing Basics", CourseType::ShortCourse, 7),
            "DPR-SC-0007"
        );
        assert_eq!(
            course_code_with_suffix("robotics", CourseType::FullCourse, 1234),
            "ROB-FC-1234"
        );
        assert_eq!(course_code_with_suffix("101", CourseType::Lesson, 5), "CRS-LN-0005");
    }

    #[test]
    fn generated_code_has_expected_shape() {
        let code = generate_course_code("Coding Club", CourseType::SkillActivity);
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts[0], "COD");
        assert_eq!(parts[1], "SA");
        assert_eq!(parts[2].len(), 4);
        let n: u16 = parts[2].parse().unwrap();
        assert!((1..=9999).contains(&n));
    }

    #[test]
    fn progress_rounds_and_clamps() {
        assert_eq!(progress_percent(1, 3), dec!(33.33));
        assert_eq!(progress_percent(2, 3), dec!(66.67));
        assert_eq!(progress_percent(3, 3), dec!(100));
        assert_eq!(progress_percent(5, 3), dec!(100));
        assert_eq!(progress_percent(0, 0), Decimal::ZERO);
        assert!(is_complete(progress_percent(4, 4)));
        assert!(!is_complete(progress_percent(3, 4)));
    }
}
