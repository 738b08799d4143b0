//! Status derivation from branch history.
//!
//! The user-facing message compares a finished build against the previous
//! finished build on the same branch; the color depends only on the build's
//! own result.

use crate::build::Build;

/// Derive the status label for a build given the most recent prior finished
/// build on the same repository and branch (`None` when there is none, or
/// when the build has no branch to compare on).
pub fn status_message(build: &Build, previous_on_branch: Option<&Build>) -> &'static str {
    if build.pending() {
        "Pending"
    } else if let Some(previous) = previous_on_branch {
        if build.passed() {
            if previous.passed() { "Passed" } else { "Fixed" }
        } else if previous.passed() {
            "Broken"
        } else {
            "Still Failing"
        }
    } else if build.passed() {
        "Passed"
    } else {
        "Failed"
    }
}

/// Display color for a build: yellow until finished, then green or red by
/// its own result alone.
pub fn color(build: &Build) -> &'static str {
    if build.pending() {
        "yellow"
    } else if build.passed() {
        "green"
    } else {
        "red"
    }
}

/// Expand a status label into a sentence. Unrecognized labels pass through
/// unchanged.
pub fn human_status_message(message: &str) -> String {
    match message {
        "Pending" => "The build is pending.",
        "Passed" => "The build passed.",
        "Failed" => "The build failed.",
        "Fixed" => "The build was fixed.",
        "Broken" => "The build was broken.",
        "Still Failing" => "The build is still failing.",
        other => other,
    }
    .to_string()
}
