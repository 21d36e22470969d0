use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use course_core::model::{Answers, CourseId, EnrollmentKey, LearnerId, LectureRef};
use serde_json::Value;
use services::{
    Clock, EnrollmentRoster, LocalCertificateIssuer, ProgressChanged, ProgressSink,
    ProgressionConfig, ProgressionError, ProgressionService,
};
use storage::repository::Storage;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod db;

use catalog::JsonDirCatalog;

#[derive(Parser)]
#[command(name = "course-progress")]
#[command(author, version, about = "Track learner progress through courses", long_about = None)]
struct Cli {
    /// SQLite database URL or file path
    #[arg(long, env = "PROGRESS_DB_URL", default_value = "sqlite://progress.sqlite3")]
    db: String,

    /// Directory holding `<course_id>.json` content files
    #[arg(long, env = "PROGRESS_CONTENT_DIR", default_value = "content")]
    content_dir: PathBuf,

    /// Learner acting on the course
    #[arg(long, env = "PROGRESS_LEARNER_ID")]
    learner: LearnerId,

    /// Courses the learner is enrolled in (defaults to every course with content)
    #[arg(long, value_delimiter = ',')]
    enrolled: Vec<CourseId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show progress, readiness and the next lecture
    Snapshot { course: CourseId },
    /// Show which lectures are unlocked
    Unlocks { course: CourseId },
    /// Mark a lecture as completed
    CompleteLecture {
        course: CourseId,
        module: usize,
        lecture: usize,
        /// Watched percentage to record alongside the completion
        #[arg(long, default_value_t = 100)]
        watched: u8,
    },
    /// Record how much of a lecture has been watched
    Watch {
        course: CourseId,
        module: usize,
        lecture: usize,
        percentage: u8,
    },
    /// Submit quiz answers as `question=option` pairs, e.g. `0=1,1=3`
    SubmitQuiz {
        course: CourseId,
        module: usize,
        lecture: usize,
        #[arg(value_delimiter = ',', value_parser = parse_answer, required = true)]
        answers: Vec<(usize, usize)>,
    },
    /// Finalize a course and issue a certificate
    CompleteCourse { course: CourseId },
    /// List graded quiz attempts, newest first
    Attempts {
        course: CourseId,
        module: usize,
        lecture: usize,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Mark stored progress as retired after unenrolling
    Retire { course: CourseId },
}

fn parse_answer(raw: &str) -> Result<(usize, usize), String> {
    let (question, option) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected question=option, got `{raw}`"))?;
    let question = question
        .trim()
        .parse()
        .map_err(|_| format!("invalid question index `{question}`"))?;
    let option = option
        .trim()
        .parse()
        .map_err(|_| format!("invalid option index `{option}`"))?;
    Ok((question, option))
}

/// Prints every event as one JSON line on stdout.
struct JsonLineSink;

impl ProgressSink for JsonLineSink {
    fn publish(&self, event: ProgressChanged) {
        match serde_json::to_string(&serde_json::json!({ "event": event })) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(error = %err, "could not encode progress event"),
        }
    }
}

fn classified(err: ProgressionError) -> anyhow::Error {
    let kind = err.kind();
    anyhow::Error::new(err).context(kind.to_string())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let db_url = db::normalize_sqlite_url(&cli.db);
    // Open + migrate SQLite in the binary glue so core/services stay pure.
    db::prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url)
        .await
        .with_context(|| format!("opening {db_url}"))?;

    let catalog = JsonDirCatalog::new(&cli.content_dir);
    let enrolled = if cli.enrolled.is_empty() {
        catalog
            .course_ids()
            .await
            .with_context(|| format!("listing {}", cli.content_dir.display()))?
    } else {
        cli.enrolled.clone()
    };
    let roster = EnrollmentRoster::with_enrollments(
        enrolled
            .into_iter()
            .map(|course| EnrollmentKey::new(cli.learner, course)),
    );

    let service = ProgressionService::new(
        Clock::default_clock(),
        Arc::clone(&storage.progress),
        Arc::new(catalog),
        Arc::new(roster),
        Arc::new(LocalCertificateIssuer),
        Arc::new(JsonLineSink),
    )
    .with_config(ProgressionConfig::from_env());

    let learner = cli.learner;
    match cli.command {
        Command::Snapshot { course } => {
            let snapshot = service
                .progress_snapshot(learner, course)
                .await
                .map_err(classified)?;
            print_json(&snapshot)
        }
        Command::Unlocks { course } => {
            let map = service
                .unlock_map(learner, course)
                .await
                .map_err(classified)?;
            let rows: Vec<Value> = map
                .into_iter()
                .map(|(at, unlocked)| {
                    serde_json::json!({
                        "module": at.module,
                        "lecture": at.lecture,
                        "unlocked": unlocked,
                    })
                })
                .collect();
            print_json(&rows)
        }
        Command::CompleteLecture {
            course,
            module,
            lecture,
            watched,
        } => {
            let snapshot = service
                .complete_lecture(learner, course, LectureRef::new(module, lecture), watched)
                .await
                .map_err(classified)?;
            print_json(&snapshot)
        }
        Command::Watch {
            course,
            module,
            lecture,
            percentage,
        } => {
            let snapshot = service
                .record_watch_progress(learner, course, LectureRef::new(module, lecture), percentage)
                .await
                .map_err(classified)?;
            print_json(&snapshot)
        }
        Command::SubmitQuiz {
            course,
            module,
            lecture,
            answers,
        } => {
            let answers: Answers = answers.into_iter().collect();
            let submission = service
                .submit_quiz(learner, course, LectureRef::new(module, lecture), &answers)
                .await
                .map_err(classified)?;
            print_json(&submission)
        }
        Command::CompleteCourse { course } => {
            let completion = service
                .complete_course(learner, course)
                .await
                .map_err(classified)?;
            if let Some(certificate) = completion.certificate_id {
                info!(%certificate, "certificate issued");
            }
            print_json(&completion)
        }
        Command::Attempts {
            course,
            module,
            lecture,
            limit,
        } => {
            let attempts = service
                .quiz_attempts(learner, course, LectureRef::new(module, lecture), limit)
                .await
                .map_err(classified)?;
            print_json(&attempts)
        }
        Command::Retire { course } => {
            let snapshot = service
                .retire_enrollment(learner, course)
                .await
                .map_err(classified)?;
            print_json(&snapshot)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "services=info,app=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    run(Cli::parse()).await
}
