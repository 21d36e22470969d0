use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Answers, Quiz, QuizResult};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GradeError {
    #[error("submission is missing answers for questions {missing:?}")]
    IncompleteSubmission { missing: Vec<usize> },

    #[error("submission answers question {question}, which the quiz does not have")]
    UnexpectedAnswer { question: usize },

    #[error("quiz is worth zero points")]
    MalformedQuiz,
}

//
// ─── GRADER ────────────────────────────────────────────────────────────────────
//

/// Grade a submission against a quiz.
///
/// Each question is all-or-nothing. The pass decision is made on the exact
/// ratio (`100 * score >= passing * total`), so a score sitting exactly on the
/// passing percentage passes.
///
/// # Errors
///
/// Returns `GradeError::IncompleteSubmission` if any question is unanswered,
/// `GradeError::UnexpectedAnswer` for answers to questions that do not exist,
/// and `GradeError::MalformedQuiz` when the quiz has no points to award.
pub fn grade(
    quiz: &Quiz,
    answers: &Answers,
    submitted_at: DateTime<Utc>,
) -> Result<QuizResult, GradeError> {
    if let Some((&question, _)) = answers.range(quiz.questions.len()..).next() {
        return Err(GradeError::UnexpectedAnswer { question });
    }
    let missing: Vec<usize> = (0..quiz.questions.len())
        .filter(|i| !answers.contains_key(i))
        .collect();
    if !missing.is_empty() {
        return Err(GradeError::IncompleteSubmission { missing });
    }

    let total_points = quiz.total_points();
    if total_points == 0 {
        return Err(GradeError::MalformedQuiz);
    }

    let mut score = 0_u32;
    let mut breakdown = Vec::with_capacity(quiz.questions.len());
    for (i, question) in quiz.questions.iter().enumerate() {
        let correct = answers.get(&i) == Some(&question.correct_option);
        if correct {
            score = score.saturating_add(question.points);
        }
        breakdown.push(correct);
    }

    let percentage = 100.0 * f64::from(score) / f64::from(total_points);
    let passed =
        u64::from(score) * 100 >= u64::from(quiz.passing_score_percent) * u64::from(total_points);

    Ok(QuizResult {
        score,
        total_points,
        percentage,
        passed,
        breakdown,
        submitted_answers: answers.clone(),
        submitted_at,
    })
}
