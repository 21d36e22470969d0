use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::ProgressAggregate;
use crate::model::course::LectureRef;
use crate::model::ids::EnrollmentKey;

/// Submitted quiz answers: question index → chosen option index.
pub type Answers = BTreeMap<usize, usize>;

//
// ─── QUIZ RESULT ───────────────────────────────────────────────────────────────
//

/// Outcome of grading one quiz submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub score: u32,
    pub total_points: u32,
    pub percentage: f64,
    pub passed: bool,
    /// One entry per question, in question order.
    pub breakdown: Vec<bool>,
    pub submitted_answers: Answers,
    pub submitted_at: DateTime<Utc>,
}

impl QuizResult {
    /// Number of questions answered correctly.
    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.breakdown.iter().filter(|c| **c).count()
    }
}

//
// ─── LECTURE PROGRESS ──────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LectureProgress {
    lecture_index: usize,
    completed: bool,
    watched_percentage: u8,
    quiz_result: Option<QuizResult>,
    quiz_attempts: u32,
    completed_at: Option<DateTime<Utc>>,
}

impl LectureProgress {
    fn untouched(lecture_index: usize) -> Self {
        Self {
            lecture_index,
            completed: false,
            watched_percentage: 0,
            quiz_result: None,
            quiz_attempts: 0,
            completed_at: None,
        }
    }

    /// Rehydrate a lecture entry from persisted storage.
    #[must_use]
    pub fn from_persisted(
        lecture_index: usize,
        completed: bool,
        watched_percentage: u8,
        quiz_result: Option<QuizResult>,
        quiz_attempts: u32,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            lecture_index,
            completed,
            watched_percentage: watched_percentage.min(100),
            quiz_result,
            quiz_attempts,
            completed_at,
        }
    }

    #[must_use]
    pub fn lecture_index(&self) -> usize {
        self.lecture_index
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn watched_percentage(&self) -> u8 {
        self.watched_percentage
    }

    #[must_use]
    pub fn quiz_result(&self) -> Option<&QuizResult> {
        self.quiz_result.as_ref()
    }

    #[must_use]
    pub fn quiz_attempts(&self) -> u32 {
        self.quiz_attempts
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// True once a stored result clears the passing score.
    #[must_use]
    pub fn has_passed_quiz(&self) -> bool {
        self.quiz_result.as_ref().is_some_and(|r| r.passed)
    }

    pub(crate) fn raise_watched(&mut self, percentage: u8) {
        self.watched_percentage = self.watched_percentage.max(percentage.min(100));
    }

    pub(crate) fn mark_completed(&mut self, at: DateTime<Utc>) {
        if !self.completed {
            self.completed = true;
            self.completed_at = Some(at);
        }
    }

    pub(crate) fn record_quiz_result(&mut self, result: QuizResult) {
        self.quiz_attempts = self.quiz_attempts.saturating_add(1);
        self.quiz_result = Some(result);
    }
}

//
// ─── MODULE PROGRESS ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
    module_index: usize,
    /// Sparse, ordered by lecture index.
    lectures: Vec<LectureProgress>,
    progress_percent: u8,
}

impl ModuleProgress {
    fn empty(module_index: usize) -> Self {
        Self {
            module_index,
            lectures: Vec::new(),
            progress_percent: 0,
        }
    }

    #[must_use]
    pub fn module_index(&self) -> usize {
        self.module_index
    }

    #[must_use]
    pub fn lectures(&self) -> &[LectureProgress] {
        &self.lectures
    }

    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    #[must_use]
    pub fn lecture(&self, lecture_index: usize) -> Option<&LectureProgress> {
        self.lectures
            .binary_search_by_key(&lecture_index, LectureProgress::lecture_index)
            .ok()
            .map(|pos| &self.lectures[pos])
    }

    fn lecture_mut(&mut self, lecture_index: usize) -> &mut LectureProgress {
        let pos = match self
            .lectures
            .binary_search_by_key(&lecture_index, LectureProgress::lecture_index)
        {
            Ok(pos) => pos,
            Err(pos) => {
                self.lectures
                    .insert(pos, LectureProgress::untouched(lecture_index));
                pos
            }
        };
        &mut self.lectures[pos]
    }
}

//
// ─── ENROLLMENT PROGRESS ───────────────────────────────────────────────────────
//

/// One learner's progress through one course.
///
/// Completion flags live here; percentages are derived from them and are only
/// refreshed through the progression transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentProgress {
    key: EnrollmentKey,
    overall_progress_percent: u8,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    retired_at: Option<DateTime<Utc>>,
    modules: Vec<ModuleProgress>,
    /// Optimistic concurrency token; 0 means never persisted.
    version: u64,
}

impl EnrollmentProgress {
    /// Fresh, empty progress for a new enrollment.
    #[must_use]
    pub fn new(key: EnrollmentKey) -> Self {
        Self {
            key,
            overall_progress_percent: 0,
            is_completed: false,
            completed_at: None,
            retired_at: None,
            modules: Vec::new(),
            version: 0,
        }
    }

    /// Rehydrate progress from persisted storage.
    ///
    /// Aggregates start at zero; they are recomputed against course content
    /// before anything is handed to a caller.
    #[must_use]
    pub fn from_persisted(
        key: EnrollmentKey,
        version: u64,
        is_completed: bool,
        completed_at: Option<DateTime<Utc>>,
        retired_at: Option<DateTime<Utc>>,
        lectures: Vec<(usize, LectureProgress)>,
    ) -> Self {
        let mut progress = Self::new(key);
        progress.version = version;
        progress.is_completed = is_completed;
        progress.completed_at = completed_at;
        progress.retired_at = retired_at;
        for (module_index, entry) in lectures {
            let slot = progress
                .module_mut(module_index)
                .lecture_mut(entry.lecture_index);
            *slot = entry;
        }
        progress
    }

    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn key(&self) -> EnrollmentKey {
        self.key
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn overall_progress_percent(&self) -> u8 {
        self.overall_progress_percent
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn retired_at(&self) -> Option<DateTime<Utc>> {
        self.retired_at
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleProgress] {
        &self.modules
    }

    #[must_use]
    pub fn module(&self, module_index: usize) -> Option<&ModuleProgress> {
        self.modules
            .binary_search_by_key(&module_index, ModuleProgress::module_index)
            .ok()
            .map(|pos| &self.modules[pos])
    }

    #[must_use]
    pub fn lecture(&self, at: LectureRef) -> Option<&LectureProgress> {
        self.module(at.module).and_then(|m| m.lecture(at.lecture))
    }

    /// Missing entries count as not completed.
    #[must_use]
    pub fn is_lecture_completed(&self, at: LectureRef) -> bool {
        self.lecture(at).is_some_and(LectureProgress::completed)
    }

    /// Every stored lecture entry with its address, in course order.
    pub fn lecture_entries(&self) -> impl Iterator<Item = (LectureRef, &LectureProgress)> + '_ {
        self.modules.iter().flat_map(|m| {
            m.lectures
                .iter()
                .map(move |l| (LectureRef::new(m.module_index, l.lecture_index), l))
        })
    }

    fn module_mut(&mut self, module_index: usize) -> &mut ModuleProgress {
        let pos = match self
            .modules
            .binary_search_by_key(&module_index, ModuleProgress::module_index)
        {
            Ok(pos) => pos,
            Err(pos) => {
                self.modules.insert(pos, ModuleProgress::empty(module_index));
                pos
            }
        };
        &mut self.modules[pos]
    }

    pub(crate) fn lecture_mut(&mut self, at: LectureRef) -> &mut LectureProgress {
        self.module_mut(at.module).lecture_mut(at.lecture)
    }

    pub(crate) fn apply_aggregate(&mut self, aggregate: &ProgressAggregate) {
        for module in &aggregate.modules {
            self.module_mut(module.module_index).progress_percent = module.percent;
        }
        self.overall_progress_percent = aggregate.overall_percent;
    }

    pub(crate) fn finalize(&mut self, at: DateTime<Utc>) {
        self.is_completed = true;
        self.completed_at = Some(at);
    }

    pub(crate) fn retire(&mut self, at: DateTime<Utc>) {
        if self.retired_at.is_none() {
            self.retired_at = Some(at);
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CourseId, LearnerId};
    use crate::time::fixed_now;

    fn key() -> EnrollmentKey {
        EnrollmentKey::new(LearnerId::new(1), CourseId::new(7))
    }

    #[test]
    fn missing_entries_are_not_completed() {
        let progress = EnrollmentProgress::new(key());
        assert!(!progress.is_lecture_completed(LectureRef::FIRST));
        assert!(progress.lecture(LectureRef::new(3, 2)).is_none());
        assert_eq!(progress.version(), 0);
    }

    #[test]
    fn lecture_mut_keeps_entries_sorted_and_unique() {
        let mut progress = EnrollmentProgress::new(key());
        progress.lecture_mut(LectureRef::new(1, 2)).mark_completed(fixed_now());
        progress.lecture_mut(LectureRef::new(0, 1)).raise_watched(40);
        progress.lecture_mut(LectureRef::new(1, 0)).raise_watched(10);
        progress.lecture_mut(LectureRef::new(1, 2)).raise_watched(90);

        let refs: Vec<_> = progress.lecture_entries().map(|(at, _)| at).collect();
        assert_eq!(
            refs,
            vec![
                LectureRef::new(0, 1),
                LectureRef::new(1, 0),
                LectureRef::new(1, 2)
            ]
        );
        assert!(progress.is_lecture_completed(LectureRef::new(1, 2)));
        assert_eq!(
            progress.lecture(LectureRef::new(1, 2)).unwrap().watched_percentage(),
            90
        );
    }

    #[test]
    fn watched_percentage_never_decreases_and_caps_at_100() {
        let mut progress = EnrollmentProgress::new(key());
        let entry = progress.lecture_mut(LectureRef::FIRST);
        entry.raise_watched(80);
        entry.raise_watched(30);
        assert_eq!(entry.watched_percentage(), 80);
        entry.raise_watched(250);
        assert_eq!(entry.watched_percentage(), 100);
    }

    #[test]
    fn mark_completed_keeps_first_timestamp() {
        let mut progress = EnrollmentProgress::new(key());
        let first = fixed_now();
        let later = first + chrono::Duration::hours(1);
        let entry = progress.lecture_mut(LectureRef::FIRST);
        entry.mark_completed(first);
        entry.mark_completed(later);
        assert_eq!(entry.completed_at(), Some(first));
    }

    #[test]
    fn from_persisted_groups_entries_by_module() {
        let entries = vec![
            (
                1,
                LectureProgress::from_persisted(0, true, 100, None, 0, Some(fixed_now())),
            ),
            (0, LectureProgress::from_persisted(0, false, 55, None, 0, None)),
        ];
        let progress =
            EnrollmentProgress::from_persisted(key(), 4, false, None, None, entries);
        assert_eq!(progress.version(), 4);
        assert_eq!(progress.modules().len(), 2);
        assert_eq!(progress.modules()[0].module_index(), 0);
        assert!(progress.is_lecture_completed(LectureRef::new(1, 0)));
    }

    #[test]
    fn quiz_attempts_count_every_recorded_result() {
        let mut progress = EnrollmentProgress::new(key());
        let result = QuizResult {
            score: 0,
            total_points: 10,
            percentage: 0.0,
            passed: false,
            breakdown: vec![false],
            submitted_answers: Answers::from([(0, 1)]),
            submitted_at: fixed_now(),
        };
        let entry = progress.lecture_mut(LectureRef::FIRST);
        entry.record_quiz_result(result.clone());
        entry.record_quiz_result(QuizResult {
            passed: true,
            ..result
        });
        assert_eq!(entry.quiz_attempts(), 2);
        assert!(entry.has_passed_quiz());
    }
}
