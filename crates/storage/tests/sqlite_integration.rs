use chrono::Duration;
use course_core::model::{
    Answers, CourseContent, CourseId, EnrollmentKey, EnrollmentProgress, LearnerId, Lecture,
    LectureKind, LectureRef, Module, Question, Quiz,
};
use course_core::progression;
use course_core::time::fixed_now;
use storage::repository::{NewQuizAttempt, ProgressRepository, StorageError};
use storage::sqlite::SqliteRepository;

const QUIZ: LectureRef = LectureRef {
    module: 0,
    lecture: 1,
};

fn key() -> EnrollmentKey {
    EnrollmentKey::new(LearnerId::new(7), CourseId::new(3))
}

fn content() -> CourseContent {
    let quiz = Quiz::new(
        vec![
            Question::new("2 + 2?", vec!["3".into(), "4".into()], 1, 1),
            Question::new("Capital of France?", vec!["Paris".into(), "Rome".into()], 0, 1),
        ],
        50,
    );
    CourseContent::new(vec![
        Module::new(
            "Basics",
            vec![
                Lecture::new("Intro", LectureKind::Video).with_duration(5),
                Lecture::new("Check", LectureKind::Quiz).with_quiz(quiz),
            ],
        ),
        Module::new("Wrap-up", vec![Lecture::new("Outro", LectureKind::Text)]),
    ])
}

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrip_persists_lectures_and_quiz_result() {
    let repo = repo("memdb_roundtrip").await;
    let content = content();
    let now = fixed_now();

    let fresh = EnrollmentProgress::new(key());
    let step = progression::complete_lecture(&content, &fresh, LectureRef::FIRST, 100, now)
        .unwrap()
        .progress;
    let version = repo.commit_progress(&step, None).await.unwrap();
    assert_eq!(version, 1);

    let stored = repo.get_progress(key()).await.unwrap().unwrap();
    assert_eq!(stored.version(), 1);

    let answers = Answers::from([(0, 1), (1, 0)]);
    let (transition, result) = progression::submit_quiz(
        &content,
        &stored,
        QUIZ,
        &answers,
        now + Duration::minutes(3),
    )
    .unwrap();
    let attempt = NewQuizAttempt { at: QUIZ, result };
    let version = repo
        .commit_progress(&transition.progress, Some(&attempt))
        .await
        .unwrap();
    assert_eq!(version, 2);

    let stored = repo.get_progress(key()).await.unwrap().unwrap();
    assert_eq!(stored.version(), 2);
    assert!(stored.is_lecture_completed(LectureRef::FIRST));
    assert!(stored.is_lecture_completed(QUIZ));

    let lecture = stored.lecture(QUIZ).unwrap();
    assert_eq!(lecture.quiz_attempts(), 1);
    assert_eq!(lecture.watched_percentage(), 100);
    let quiz = lecture.quiz_result().unwrap();
    assert_eq!(quiz.score, 2);
    assert_eq!(quiz.breakdown, vec![true, true]);
    assert_eq!(quiz.submitted_answers, answers);
    assert_eq!(quiz.submitted_at, now + Duration::minutes(3));
    assert!(stored.lecture(LectureRef::FIRST).unwrap().quiz_result().is_none());
}

#[tokio::test]
async fn sqlite_rejects_stale_versions() {
    let repo = repo("memdb_conflict").await;
    let fresh = EnrollmentProgress::new(key());

    repo.commit_progress(&fresh, None).await.unwrap();
    let err = repo.commit_progress(&fresh, None).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let stored = repo.get_progress(key()).await.unwrap().unwrap();
    repo.commit_progress(&stored, None).await.unwrap();
    let err = repo.commit_progress(&stored, None).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
}

#[tokio::test]
async fn sqlite_conflict_leaves_no_attempt_behind() {
    let repo = repo("memdb_conflict_attempt").await;
    let content = content();
    let now = fixed_now();

    let fresh = EnrollmentProgress::new(key());
    let done = progression::complete_lecture(&content, &fresh, LectureRef::FIRST, 100, now)
        .unwrap()
        .progress;
    repo.commit_progress(&done, None).await.unwrap();

    let (transition, result) =
        progression::submit_quiz(&content, &done, QUIZ, &Answers::from([(0, 0), (1, 1)]), now)
            .unwrap();
    let attempt = NewQuizAttempt { at: QUIZ, result };
    let err = repo
        .commit_progress(&transition.progress, Some(&attempt))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    assert!(
        repo.list_quiz_attempts(key(), QUIZ, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sqlite_lists_attempts_newest_first() {
    let repo = repo("memdb_attempts").await;
    let content = content();
    let now = fixed_now();

    let fresh = EnrollmentProgress::new(key());
    let mut current = progression::complete_lecture(&content, &fresh, LectureRef::FIRST, 100, now)
        .unwrap()
        .progress;
    let version = repo.commit_progress(&current, None).await.unwrap();
    current = current.with_version(version);

    let submissions = [
        Answers::from([(0, 0), (1, 1)]),
        Answers::from([(0, 1), (1, 1)]),
        Answers::from([(0, 1), (1, 0)]),
    ];
    for (minutes, answers) in (1..).zip(submissions.iter()) {
        let (transition, result) = progression::submit_quiz(
            &content,
            &current,
            QUIZ,
            answers,
            now + Duration::minutes(minutes),
        )
        .unwrap();
        let attempt = NewQuizAttempt { at: QUIZ, result };
        let version = repo
            .commit_progress(&transition.progress, Some(&attempt))
            .await
            .unwrap();
        current = transition.progress.with_version(version);
    }

    let attempts = repo.list_quiz_attempts(key(), QUIZ, 10).await.unwrap();
    let scores: Vec<u32> = attempts.iter().map(|a| a.result.score).collect();
    assert_eq!(scores, vec![2, 1, 0]);

    let limited = repo.list_quiz_attempts(key(), QUIZ, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].result.score, 2);

    let stored = repo.get_progress(key()).await.unwrap().unwrap();
    assert_eq!(stored.lecture(QUIZ).unwrap().quiz_attempts(), 3);
}

#[tokio::test]
async fn sqlite_persists_completion_and_retirement() {
    let repo = repo("memdb_completion").await;
    let content = content();
    let now = fixed_now();

    let mut current = EnrollmentProgress::new(key());
    current = progression::complete_lecture(&content, &current, LectureRef::FIRST, 100, now)
        .unwrap()
        .progress;
    let answers = Answers::from([(0, 1), (1, 0)]);
    current = progression::submit_quiz(&content, &current, QUIZ, &answers, now)
        .unwrap()
        .0
        .progress;
    current = progression::complete_lecture(&content, &current, LectureRef::new(1, 0), 100, now)
        .unwrap()
        .progress;
    current = progression::complete_course(&content, &current, now)
        .unwrap()
        .progress;
    let version = repo.commit_progress(&current, None).await.unwrap();

    let (retired, changed) =
        progression::retire(&current.with_version(version), now + Duration::days(1));
    assert!(changed);
    repo.commit_progress(&retired, None).await.unwrap();

    let stored = repo.get_progress(key()).await.unwrap().unwrap();
    assert!(stored.is_completed());
    assert_eq!(stored.completed_at(), Some(now));
    assert_eq!(stored.retired_at(), Some(now + Duration::days(1)));
    assert_eq!(stored.version(), 2);
}
