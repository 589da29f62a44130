//! Push event names emitted by the notification server.
//!
//! Single source of truth for which events trigger a notification refresh.

// ---------------------------------------------------------------------------
// Generation jobs
// ---------------------------------------------------------------------------

pub const EXTRACT_ISSUE_SUCCESS: &str = "EXTRACT_ISSUE_SUCCESS";
pub const EXTRACT_ISSUE_FAILED: &str = "EXTRACT_ISSUE_FAILED";
pub const GENERATE_LESSON_SUCCESS: &str = "GENERATE_LESSON_SUCCESS";
pub const GENERATE_LESSON_FAILED: &str = "GENERATE_LESSON_FAILED";
pub const GENERATE_QUIZ_SUCCESS: &str = "GENERATE_QUIZ_SUCCESS";
pub const GENERATE_QUIZ_FAILED: &str = "GENERATE_QUIZ_FAILED";

// ---------------------------------------------------------------------------
// Account and game
// ---------------------------------------------------------------------------

pub const ACCOUNT_ACTIVATION_SUCCESS: &str = "ACCOUNT_ACTIVATION_SUCCESS";
pub const CREATE_GAME: &str = "CREATE_GAME";

/// Every event that means "a notification was written server-side".
pub const DEFAULT_RECONCILE_EVENTS: &[&str] = &[
    EXTRACT_ISSUE_SUCCESS,
    EXTRACT_ISSUE_FAILED,
    GENERATE_LESSON_SUCCESS,
    GENERATE_LESSON_FAILED,
    GENERATE_QUIZ_SUCCESS,
    GENERATE_QUIZ_FAILED,
    ACCOUNT_ACTIVATION_SUCCESS,
    CREATE_GAME,
];

/// Successful generation jobs that change class-assignment content.
pub const ASSIGNMENT_CONTENT_EVENTS: &[&str] = &[
    EXTRACT_ISSUE_SUCCESS,
    GENERATE_LESSON_SUCCESS,
    GENERATE_QUIZ_SUCCESS,
];

pub fn is_failure_event(event_type: &str) -> bool {
    event_type.ends_with("_FAILED")
}
