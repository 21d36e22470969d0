use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors raised when a reference or definition does not fit the course tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
    #[error("module {module} does not exist")]
    UnknownModule { module: usize },

    #[error("lecture {at} does not exist")]
    UnknownLecture { at: LectureRef },

    #[error("lecture {at} has no quiz")]
    NoQuiz { at: LectureRef },

    #[error("question {question} of lecture {at} must be worth at least one point")]
    ZeroPoints { at: LectureRef, question: usize },

    #[error("question {question} of lecture {at} has no option {correct_option}")]
    CorrectOptionOutOfRange {
        at: LectureRef,
        question: usize,
        correct_option: usize,
    },

    #[error("passing score of lecture {at} must be within 0..=100, got {provided}")]
    PassingScoreOutOfRange { at: LectureRef, provided: u8 },
}

impl ContentError {
    /// True for errors caused by pointing at something the course does not have.
    #[must_use]
    pub fn is_invalid_reference(&self) -> bool {
        matches!(
            self,
            Self::UnknownModule { .. } | Self::UnknownLecture { .. } | Self::NoQuiz { .. }
        )
    }
}

//
// ─── LECTURE REF ───────────────────────────────────────────────────────────────
//

/// Positional address of a lecture: `(module index, lecture index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LectureRef {
    pub module: usize,
    pub lecture: usize,
}

impl LectureRef {
    /// The first lecture of the first module.
    pub const FIRST: Self = Self {
        module: 0,
        lecture: 0,
    };

    #[must_use]
    pub const fn new(module: usize, lecture: usize) -> Self {
        Self { module, lecture }
    }
}

impl fmt::Display for LectureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.module, self.lecture)
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    pub points: u32,
}

impl Question {
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
        points: u32,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            correct_option,
            points,
        }
    }
}

/// Quiz attached to a lecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub questions: Vec<Question>,
    pub passing_score_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
}

impl Quiz {
    #[must_use]
    pub fn new(questions: Vec<Question>, passing_score_percent: u8) -> Self {
        Self {
            questions,
            passing_score_percent,
            time_limit_minutes: None,
        }
    }

    #[must_use]
    pub fn with_time_limit(mut self, minutes: u32) -> Self {
        self.time_limit_minutes = Some(minutes);
        self
    }

    /// Sum of all question points.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.questions
            .iter()
            .fold(0_u32, |acc, q| acc.saturating_add(q.points))
    }

    fn validate(&self, at: LectureRef) -> Result<(), ContentError> {
        if self.passing_score_percent > 100 {
            return Err(ContentError::PassingScoreOutOfRange {
                at,
                provided: self.passing_score_percent,
            });
        }
        for (question, q) in self.questions.iter().enumerate() {
            if q.points == 0 {
                return Err(ContentError::ZeroPoints { at, question });
            }
            if q.correct_option >= q.options.len() {
                return Err(ContentError::CorrectOptionOutOfRange {
                    at,
                    question,
                    correct_option: q.correct_option,
                });
            }
        }
        Ok(())
    }
}

//
// ─── LECTURES & MODULES ────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LectureKind {
    Video,
    Text,
    Assignment,
    Quiz,
    Other,
}

impl LectureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LectureKind::Video => "video",
            LectureKind::Text => "text",
            LectureKind::Assignment => "assignment",
            LectureKind::Quiz => "quiz",
            LectureKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lecture {
    pub title: String,
    pub kind: LectureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Quiz>,
}

impl Lecture {
    #[must_use]
    pub fn new(title: impl Into<String>, kind: LectureKind) -> Self {
        Self {
            title: title.into(),
            kind,
            duration_minutes: None,
            quiz: None,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn with_quiz(mut self, quiz: Quiz) -> Self {
        self.quiz = Some(quiz);
        self
    }

    #[must_use]
    pub fn has_quiz(&self) -> bool {
        self.quiz.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub title: String,
    pub lectures: Vec<Lecture>,
}

impl Module {
    #[must_use]
    pub fn new(title: impl Into<String>, lectures: Vec<Lecture>) -> Self {
        Self {
            title: title.into(),
            lectures,
        }
    }
}

//
// ─── COURSE CONTENT ────────────────────────────────────────────────────────────
//

/// Read-only course tree as delivered by the content catalog.
///
/// Modules and lectures are identified by their position, so the engine never
/// reorders or edits this structure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CourseContent {
    pub modules: Vec<Module>,
}

impl CourseContent {
    #[must_use]
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Check quiz definitions (points, answer keys, passing scores).
    ///
    /// # Errors
    ///
    /// Returns the first `ContentError` found, in module/lecture order.
    pub fn validate(&self) -> Result<(), ContentError> {
        for at in self.lecture_refs() {
            if let Some(quiz) = &self.modules[at.module].lectures[at.lecture].quiz {
                quiz.validate(at)?;
            }
        }
        Ok(())
    }

    /// Fetch a module by index.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::UnknownModule` if the index is out of range.
    pub fn module(&self, module: usize) -> Result<&Module, ContentError> {
        self.modules
            .get(module)
            .ok_or(ContentError::UnknownModule { module })
    }

    /// Resolve a lecture reference. Every index coming from a caller passes
    /// through here.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::UnknownModule` / `UnknownLecture` for bad indices.
    pub fn lecture(&self, at: LectureRef) -> Result<&Lecture, ContentError> {
        self.module(at.module)?
            .lectures
            .get(at.lecture)
            .ok_or(ContentError::UnknownLecture { at })
    }

    /// Resolve the quiz owned by a lecture.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::NoQuiz` if the lecture exists but carries no quiz.
    pub fn quiz(&self, at: LectureRef) -> Result<&Quiz, ContentError> {
        self.lecture(at)?
            .quiz
            .as_ref()
            .ok_or(ContentError::NoQuiz { at })
    }

    /// Index of the last lecture in a module, `None` for an empty module.
    #[must_use]
    pub fn last_lecture_index(&self, module: usize) -> Option<usize> {
        self.modules
            .get(module)
            .and_then(|m| m.lectures.len().checked_sub(1))
    }

    #[must_use]
    pub fn total_lectures(&self) -> usize {
        self.modules.iter().map(|m| m.lectures.len()).sum()
    }

    /// All lecture references in course order.
    pub fn lecture_refs(&self) -> impl Iterator<Item = LectureRef> + '_ {
        self.modules.iter().enumerate().flat_map(|(module, m)| {
            (0..m.lectures.len()).map(move |lecture| LectureRef::new(module, lecture))
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: usize, points: u32) -> Question {
        Question::new("Q", vec!["a".into(), "b".into()], correct, points)
    }

    fn sample() -> CourseContent {
        CourseContent::new(vec![
            Module::new(
                "Basics",
                vec![
                    Lecture::new("Intro", LectureKind::Video).with_duration(12),
                    Lecture::new("Check", LectureKind::Quiz)
                        .with_quiz(Quiz::new(vec![question(0, 10), question(1, 10)], 70)),
                ],
            ),
            Module::new("Next", vec![Lecture::new("Reading", LectureKind::Text)]),
        ])
    }

    #[test]
    fn lecture_lookup_rejects_bad_indices() {
        let content = sample();
        assert!(content.lecture(LectureRef::new(1, 0)).is_ok());
        assert_eq!(
            content.lecture(LectureRef::new(2, 0)).unwrap_err(),
            ContentError::UnknownModule { module: 2 }
        );
        assert_eq!(
            content.lecture(LectureRef::new(1, 1)).unwrap_err(),
            ContentError::UnknownLecture {
                at: LectureRef::new(1, 1)
            }
        );
    }

    #[test]
    fn quiz_lookup_requires_quiz() {
        let content = sample();
        assert_eq!(content.quiz(LectureRef::new(0, 1)).unwrap().total_points(), 20);
        let err = content.quiz(LectureRef::new(0, 0)).unwrap_err();
        assert!(err.is_invalid_reference());
    }

    #[test]
    fn lecture_refs_walk_in_course_order() {
        let refs: Vec<_> = sample().lecture_refs().collect();
        assert_eq!(
            refs,
            vec![
                LectureRef::new(0, 0),
                LectureRef::new(0, 1),
                LectureRef::new(1, 0)
            ]
        );
        assert_eq!(sample().total_lectures(), 3);
        assert_eq!(sample().last_lecture_index(0), Some(1));
    }

    #[test]
    fn validate_rejects_zero_point_question() {
        let mut content = sample();
        content.modules[0].lectures[1].quiz = Some(Quiz::new(vec![question(0, 0)], 50));
        let err = content.validate().unwrap_err();
        assert_eq!(
            err,
            ContentError::ZeroPoints {
                at: LectureRef::new(0, 1),
                question: 0
            }
        );
        assert!(!err.is_invalid_reference());
    }

    #[test]
    fn validate_rejects_answer_key_outside_options() {
        let mut content = sample();
        content.modules[0].lectures[1].quiz = Some(Quiz::new(vec![question(5, 1)], 50));
        assert!(matches!(
            content.validate(),
            Err(ContentError::CorrectOptionOutOfRange { .. })
        ));
    }

    #[test]
    fn validate_rejects_passing_score_above_100() {
        let mut content = sample();
        content.modules[0].lectures[1].quiz = Some(Quiz::new(vec![question(0, 1)], 101));
        assert!(matches!(
            content.validate(),
            Err(ContentError::PassingScoreOutOfRange { provided: 101, .. })
        ));
    }

    #[test]
    fn content_deserializes_from_catalog_json() {
        let json = r#"{
            "modules": [{
                "title": "M",
                "lectures": [
                    {"title": "L", "kind": "video", "duration_minutes": 5},
                    {"title": "Q", "kind": "quiz", "quiz": {
                        "questions": [{"prompt": "?", "options": ["x", "y"], "correct_option": 1, "points": 2}],
                        "passing_score_percent": 50
                    }}
                ]
            }]
        }"#;
        let content: CourseContent = serde_json::from_str(json).unwrap();
        assert!(content.validate().is_ok());
        assert_eq!(content.modules[0].lectures[0].kind, LectureKind::Video);
        assert!(content.modules[0].lectures[1].has_quiz());
    }
}
