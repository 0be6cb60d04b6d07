use crate::models::{grade_join_key, GradeRecord};
use std::collections::HashMap;

/// Letter grades that carry grade points on the 4.0 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradeLetter {
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    F,
}

impl GradeLetter {
    pub const ALL: [GradeLetter; 11] = [
        GradeLetter::A,
        GradeLetter::AMinus,
        GradeLetter::BPlus,
        GradeLetter::B,
        GradeLetter::BMinus,
        GradeLetter::CPlus,
        GradeLetter::C,
        GradeLetter::CMinus,
        GradeLetter::DPlus,
        GradeLetter::D,
        GradeLetter::F,
    ];

    /// Parse a raw grade cell. Surrounding whitespace is ignored; anything
    /// outside the scale (W, I, P, blanks, lower-case letters) is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let letter = match raw.trim() {
            "A" => GradeLetter::A,
            "A-" => GradeLetter::AMinus,
            "B+" => GradeLetter::BPlus,
            "B" => GradeLetter::B,
            "B-" => GradeLetter::BMinus,
            "C+" => GradeLetter::CPlus,
            "C" => GradeLetter::C,
            "C-" => GradeLetter::CMinus,
            "D+" => GradeLetter::DPlus,
            "D" => GradeLetter::D,
            "F" => GradeLetter::F,
            _ => return None,
        };
        Some(letter)
    }

    pub fn points(self) -> f64 {
        match self {
            GradeLetter::A => 4.0,
            GradeLetter::AMinus => 3.7,
            GradeLetter::BPlus => 3.3,
            GradeLetter::B => 3.0,
            GradeLetter::BMinus => 2.7,
            GradeLetter::CPlus => 2.3,
            GradeLetter::C => 2.0,
            GradeLetter::CMinus => 1.7,
            GradeLetter::DPlus => 1.3,
            GradeLetter::D => 1.0,
            GradeLetter::F => 0.0,
        }
    }
}

/// Grade points for a raw cell, `None` when the grade is excluded.
pub fn grade_points(raw: Option<&str>) -> Option<f64> {
    raw.and_then(GradeLetter::parse).map(GradeLetter::points)
}

/// Per-student grade statistics.
///
/// `avg`, `min` and `max` are `None` when none of the student's grades
/// mapped to points; `num_courses` still reports the mapped count (zero).
#[derive(Debug, Clone, PartialEq)]
pub struct GpaSummary {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub num_courses: usize,
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    count: usize,
}

impl Accumulator {
    fn push(&mut self, points: f64) {
        self.sum += points;
        self.count += 1;
        self.min = Some(self.min.map_or(points, |m| m.min(points)));
        self.max = Some(self.max.map_or(points, |m| m.max(points)));
    }

    fn finish(self) -> GpaSummary {
        let avg = if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        };
        GpaSummary {
            avg,
            min: self.min,
            max: self.max,
            num_courses: self.count,
        }
    }
}

/// Aggregate grade rows per student, keyed by [`grade_join_key`].
/// Students with grade rows but no mapped grade still get an entry.
pub fn summarize_grades(grades: &[GradeRecord]) -> HashMap<String, GpaSummary> {
    let mut accumulators: HashMap<String, Accumulator> = HashMap::new();

    for record in grades {
        let entry = accumulators.entry(grade_join_key(&record.id)).or_default();
        if let Some(points) = grade_points(record.final_course_grade.as_deref()) {
            entry.push(points);
        }
    }

    accumulators
        .into_iter()
        .map(|(id, acc)| (id, acc.finish()))
        .collect()
}

/// Round half away from zero to `digits` decimal places.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
