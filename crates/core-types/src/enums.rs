use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::Postgres;
use std::fmt;
use std::str::FromStr;

/// Declares a closed set of values stored as `TEXT` in the database and as
/// lowercase strings on the wire.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Comma separated list of accepted values, used in error messages.
            pub fn allowed() -> String {
                Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(needle))
                    .ok_or_else(|| CoreError::UnknownVariant {
                        kind: $kind,
                        value: needle.to_string(),
                        allowed: Self::allowed(),
                    })
            }
        }

        impl sqlx::Type<Postgres> for $name {
            fn type_info() -> PgTypeInfo {
                <&str as sqlx::Type<Postgres>>::type_info()
            }

            fn compatible(ty: &PgTypeInfo) -> bool {
                <&str as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
                <&str as sqlx::Encode<'q, Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, Postgres> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let text = <&str as sqlx::Decode<'r, Postgres>>::decode(value)?;
                Ok(text.parse::<$name>()?)
            }
        }
    };
}

text_enum! {
    /// The role a user account plays in the clubhouse.
    pub enum UserType ("user type") {
        Admin => "admin",
        Mentor => "mentor",
        Member => "member",
        Student => "student",
        Parent => "parent",
        ProjectOfficer => "project_officer",
        Manager => "manager",
    }
}

impl UserType {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserType::Admin)
    }

    /// Staff may view attendance dashboards and sign other users in.
    pub fn is_staff(&self) -> bool {
        matches!(self, UserType::Admin | UserType::Mentor)
    }
}

text_enum! {
    /// Publication lifecycle of a course.
    pub enum CourseStatus ("course status") {
        Draft => "draft",
        Active => "active",
        Archived => "archived",
    }
}

impl Default for CourseStatus {
    fn default() -> Self {
        CourseStatus::Draft
    }
}

text_enum! {
    pub enum CourseType ("course type") {
        FullCourse => "full_course",
        ShortCourse => "short_course",
        Lesson => "lesson",
        SkillActivity => "skill_activity",
    }
}

impl CourseType {
    /// The two-letter segment used in generated course codes.
    pub fn code_segment(&self) -> &'static str {
        match self {
            CourseType::FullCourse => "FC",
            CourseType::ShortCourse => "SC",
            CourseType::Lesson => "LN",
            CourseType::SkillActivity => "SA",
        }
    }
}

impl Default for CourseType {
    fn default() -> Self {
        CourseType::FullCourse
    }
}

text_enum! {
    pub enum DifficultyLevel ("difficulty level") {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
    }
}

impl Default for DifficultyLevel {
    fn default() -> Self {
        DifficultyLevel::Beginner
    }
}

text_enum! {
    pub enum LessonType ("lesson type") {
        Text => "text",
        Video => "video",
        Interactive => "interactive",
        Quiz => "quiz",
        Assignment => "assignment",
        Live => "live",
    }
}

impl Default for LessonType {
    fn default() -> Self {
        LessonType::Text
    }
}

text_enum! {
    /// Lifecycle of a holiday program.
    pub enum ProgramStatus ("program status") {
        Draft => "draft",
        Published => "published",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl ProgramStatus {
    /// Whether the program is listed on the public programs endpoint.
    pub fn is_public(&self) -> bool {
        matches!(self, ProgramStatus::Published | ProgramStatus::Active)
    }
}

impl Default for ProgramStatus {
    fn default() -> Self {
        ProgramStatus::Draft
    }
}

text_enum! {
    pub enum RegistrationStatus ("registration status") {
        Pending => "pending",
        Confirmed => "confirmed",
        Canceled => "canceled",
        Waitlist => "waitlist",
    }
}

impl RegistrationStatus {
    /// Canceled registrations no longer hold a seat.
    pub fn holds_seat(&self) -> bool {
        !matches!(self, RegistrationStatus::Canceled)
    }
}

impl Default for RegistrationStatus {
    fn default() -> Self {
        RegistrationStatus::Pending
    }
}

text_enum! {
    pub enum MentorStatus ("mentor status") {
        Pending => "pending",
        Approved => "approved",
        Declined => "declined",
    }
}

text_enum! {
    pub enum AttendanceStatus ("attendance status") {
        SignedIn => "signed_in",
        SignedOut => "signed_out",
    }
}

text_enum! {
    pub enum SignInMethod ("sign-in method") {
        Manual => "manual",
        QrCode => "qr_code",
        Nfc => "nfc",
        Biometric => "biometric",
    }
}

impl Default for SignInMethod {
    fn default() -> Self {
        SignInMethod::Manual
    }
}

/// Derived fill level of a holiday program. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStatus {
    Available,
    FillingUp,
    NearlyFull,
    Full,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively_and_trims() {
        assert_eq!(" Active ".parse::<CourseStatus>().unwrap(), CourseStatus::Active);
        assert_eq!("PROJECT_OFFICER".parse::<UserType>().unwrap(), UserType::ProjectOfficer);
    }

    #[test]
    fn unknown_value_lists_allowed_values() {
        let err = "published".parse::<CourseStatus>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown course status 'published'. Must be one of: draft, active, archived"
        );
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&SignInMethod::QrCode).unwrap();
        assert_eq!(json, "\"qr_code\"");
        let back: CourseType = serde_json::from_str("\"skill_activity\"").unwrap();
        assert_eq!(back, CourseType::SkillActivity);
        let status = serde_json::to_string(&CapacityStatus::NearlyFull).unwrap();
        assert_eq!(status, "\"nearly_full\"");
    }

    #[test]
    fn role_helpers() {
        assert!(UserType::Admin.is_admin());
        assert!(UserType::Mentor.is_staff());
        assert!(!UserType::Member.is_staff());
        assert!(!RegistrationStatus::Canceled.holds_seat());
        assert!(RegistrationStatus::Waitlist.holds_seat());
        assert!(ProgramStatus::Published.is_public());
        assert!(!ProgramStatus::Draft.is_public());
    }

    #[test]
    fn course_code_segments() {
        let segments: Vec<_> = CourseType::ALL.iter().map(|t| t.code_segment()).collect();
        assert_eq!(segments, vec!["FC", "SC", "LN", "SA"]);
    }
}
