use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

/// One learner's attempt at one quiz.
///
/// `id` is local to the backend that produced the value; across backends a
/// submission is identified by `(quiz_id, user_id)` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: i64,
    pub final_grade: Option<f64>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

/// A learner's response to one question of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: i64,
    pub submission_id: i64,
    pub question_id: i64,
    pub value: String,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

/// Points and feedback awarded for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Grade {
    pub id: i64,
    pub answer_id: i64,
    pub question_id: i64,
    pub points: i32,
    pub feedback: Option<String>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

impl Submission {
    pub fn with_final_grade(self, final_grade: Option<f64>) -> Self {
        Self { final_grade, ..self }
    }
}

impl Grade {
    pub fn with_points(self, points: i32) -> Self {
        Self { points, ..self }
    }

    pub fn with_feedback(self, feedback: Option<String>) -> Self {
        Self { feedback, ..self }
    }
}
