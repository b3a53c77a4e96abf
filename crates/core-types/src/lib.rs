pub mod attendance;
pub mod course;
pub mod enums;
pub mod error;
pub mod program;
pub mod report;
pub mod validation;

// Re-export the core types to provide a clean public API.
pub use enums::{
    AttendanceStatus, CapacityStatus, CourseStatus, CourseType, DifficultyLevel, LessonType,
    MentorStatus, ProgramStatus, RegistrationStatus, SignInMethod, UserType,
};
pub use error::CoreError;
pub use program::{CapacityChange, CapacityInfo, RegistrationCounts};
pub use validation::{ValidationErrors, Validator};
