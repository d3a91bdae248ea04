//! Status labels and cancellation eligibility.
//!
//! Both are pure functions of the progress code so the renderer and the
//! cancellation flow can never disagree.

use super::models::{PLACEHOLDER, Progress};

/// Human-readable label for a progress code. Absent progress renders as `-`.
pub fn status_label(progress: Option<Progress>) -> &'static str {
    match progress {
        None => PLACEHOLDER,
        Some(Progress::Created) => "Created",
        Some(Progress::Starting) => "Starting",
        Some(Progress::Running) => "In Progress",
        Some(Progress::Stopping) => "Stopping",
        Some(Progress::Stopped) => "Stopped",
        Some(Progress::Error) => "Error",
        Some(Progress::Done) => "Done",
    }
}

/// Whether the user may request cancellation for a job in this phase.
///
/// A job without a progress code yet is offered cancellation as well.
pub fn cancel_allowed(progress: Option<Progress>) -> bool {
    !matches!(
        progress,
        Some(Progress::Stopping | Progress::Stopped | Progress::Done)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_disallowed_for_exactly_three_codes() {
        let disallowed: Vec<Progress> = Progress::ALL
            .into_iter()
            .filter(|p| !cancel_allowed(Some(*p)))
            .collect();

        assert_eq!(
            disallowed,
            vec![Progress::Stopping, Progress::Stopped, Progress::Done]
        );
    }

    #[test]
    fn absent_progress_is_cancellable() {
        assert!(cancel_allowed(None));
    }

    #[test]
    fn every_code_has_a_label() {
        for p in Progress::ALL {
            assert_ne!(status_label(Some(p)), PLACEHOLDER);
        }
        assert_eq!(status_label(None), "-");
        assert_eq!(status_label(Some(Progress::Running)), "In Progress");
    }
}
