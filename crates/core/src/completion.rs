use crate::model::{CourseContent, EnrollmentProgress};

/// True when every lecture of every module has a completed entry.
///
/// Watched percentages are not consulted; only the completion flag counts.
/// This only detects that all work is done. Finalizing the course is a
/// separate, explicit transition.
#[must_use]
pub fn is_course_complete(content: &CourseContent, progress: &EnrollmentProgress) -> bool {
    content
        .lecture_refs()
        .all(|at| progress.is_lecture_completed(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CourseId, EnrollmentKey, LearnerId, Lecture, LectureKind, LectureRef, Module,
    };
    use crate::time::fixed_now;
    use proptest::prelude::*;

    fn course(shape: &[usize]) -> CourseContent {
        CourseContent::new(
            shape
                .iter()
                .map(|n| {
                    Module::new(
                        "M",
                        (0..*n)
                            .map(|_| Lecture::new("L", LectureKind::Assignment))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    fn progress() -> EnrollmentProgress {
        EnrollmentProgress::new(EnrollmentKey::new(LearnerId::new(3), CourseId::new(3)))
    }

    #[test]
    fn watched_percentage_alone_does_not_complete() {
        let content = course(&[1]);
        let mut p = progress();
        p.lecture_mut(LectureRef::FIRST).raise_watched(100);
        assert!(!is_course_complete(&content, &p));
        p.lecture_mut(LectureRef::FIRST).mark_completed(fixed_now());
        assert!(is_course_complete(&content, &p));
    }

    proptest! {
        #[test]
        fn complete_iff_every_lecture_completed(
            (shape, flags) in prop::collection::vec(1_usize..4, 1..4).prop_flat_map(|shape| {
                let total: usize = shape.iter().sum();
                (Just(shape), prop::collection::vec(any::<bool>(), total))
            })
        ) {
            let content = course(&shape);
            let mut p = progress();
            for (at, done) in content.lecture_refs().zip(&flags) {
                if *done {
                    p.lecture_mut(at).mark_completed(fixed_now());
                }
            }
            prop_assert_eq!(is_course_complete(&content, &p), flags.iter().all(|d| *d));
        }
    }
}
