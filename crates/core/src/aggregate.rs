use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{CourseContent, EnrollmentProgress, LectureRef};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("course has no lectures")]
    EmptyCourse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAggregate {
    pub module_index: usize,
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

/// Completion percentages derived from lecture-level flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressAggregate {
    pub modules: Vec<ModuleAggregate>,
    pub completed: usize,
    pub total: usize,
    pub overall_percent: u8,
}

/// `completed / total` as a whole percentage, rounding half up.
fn rounded_percent(completed: usize, total: usize) -> u8 {
    debug_assert!(total > 0 && completed <= total);
    let percent = (completed * 200 + total) / (total * 2);
    u8::try_from(percent).unwrap_or(100)
}

/// Compute module and course completion percentages.
///
/// A module without lectures reports 100%.
///
/// # Errors
///
/// Returns `AggregateError::EmptyCourse` when the course has no lectures at all.
pub fn aggregate(
    content: &CourseContent,
    progress: &EnrollmentProgress,
) -> Result<ProgressAggregate, AggregateError> {
    let total = content.total_lectures();
    if total == 0 {
        return Err(AggregateError::EmptyCourse);
    }

    let modules: Vec<ModuleAggregate> = content
        .modules
        .iter()
        .enumerate()
        .map(|(module_index, module)| {
            let total = module.lectures.len();
            let completed = (0..total)
                .filter(|l| progress.is_lecture_completed(LectureRef::new(module_index, *l)))
                .count();
            let percent = if total == 0 {
                100
            } else {
                rounded_percent(completed, total)
            };
            ModuleAggregate {
                module_index,
                completed,
                total,
                percent,
            }
        })
        .collect();

    let completed = modules.iter().map(|m| m.completed).sum();
    Ok(ProgressAggregate {
        overall_percent: rounded_percent(completed, total),
        modules,
        completed,
        total,
    })
}
