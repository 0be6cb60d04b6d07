use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

static ALL_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("static regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Source locations: a path relative to data_directory, an absolute path, or an http(s) URL
    pub data_directory: Option<String>,
    pub enrollment_file: String,
    pub grades_file: String,
    pub program_file: String,
    pub ratings_file: String,
    pub output_file: String,
    /// Cell values that load as absent. Matching is exact, so a
    /// whitespace-only cell is kept as text unless listed here.
    #[serde(default = "default_null_tokens")]
    pub null_tokens: Vec<String>,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

fn default_null_tokens() -> Vec<String> {
    ["", "NA", "N/A", "NULL", "NaN", "nan"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_preview_rows() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_directory: Some("data-source".to_string()),
            enrollment_file: "fall_enrollment.csv".to_string(),
            grades_file: "grades.csv".to_string(),
            program_file: "program_data.csv".to_string(),
            ratings_file: "admission_rating.csv".to_string(),
            output_file: "single_query_results.csv".to_string(),
            null_tokens: default_null_tokens(),
            preview_rows: default_preview_rows(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    /// Resolve a configured source location. URLs are returned untouched.
    pub fn resolve_location(&self, location: &str) -> String {
        if is_url(location) || Path::new(location).is_absolute() {
            return location.to_string();
        }
        match &self.data_directory {
            Some(dir) => PathBuf::from(dir).join(location).to_string_lossy().into_owned(),
            None => location.to_string(),
        }
    }

    pub fn is_null(&self, cell: &str) -> bool {
        self.null_tokens.iter().any(|token| token == cell)
    }
}

pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Census point at which an enrollment snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Census {
    Wk3,
    Eot,
    Other(String),
}

impl Census {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "WK3" => Census::Wk3,
            "EOT" => Census::Eot,
            other => Census::Other(other.to_string()),
        }
    }
}

/// Recency key for a term code.
///
/// All-digit codes compare by numeric value, so `"202410"` is newer than
/// `"99999"` regardless of padding. Any other code compares as text and
/// ranks after every numeric code. Absent or blank codes rank below
/// everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermKey {
    Missing,
    Numeric(String),
    Text(String),
}

impl TermKey {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => TermKey::Missing,
            Some(code) => {
                let code = code.trim();
                if code.is_empty() {
                    TermKey::Missing
                } else if let Some(digits) = canonical_digits(code) {
                    TermKey::Numeric(digits)
                } else {
                    TermKey::Text(code.to_string())
                }
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TermKey::Missing => 0,
            TermKey::Numeric(_) => 1,
            TermKey::Text(_) => 2,
        }
    }
}

impl Ord for TermKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // Leading zeros are stripped, so digit count orders magnitude
            (TermKey::Numeric(a), TermKey::Numeric(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (TermKey::Text(a), TermKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for TermKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One enrollment snapshot row. Descriptive fields are `None` when the
/// source cell was null.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRecord {
    pub id: String,
    pub term_code: Option<String>,
    pub census: Census,
    pub race_desc: Option<String>,
    pub legal_sex_desc: Option<String>,
    pub ethn_desc: Option<String>,
    pub visa_desc: Option<String>,
    pub college: Option<String>,
    pub degr: Option<String>,
    pub majr: Option<String>,
    pub birth_date: Option<String>,
}

impl EnrollmentRecord {
    pub fn term_key(&self) -> TermKey {
        TermKey::parse(self.term_code.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeRecord {
    pub id: String,
    pub term_code: Option<String>,
    pub final_course_grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramMapping {
    pub college: Option<String>,
    pub degree: Option<String>,
    pub major: Option<String>,
    pub program: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingRecord {
    pub id: String,
    pub admit_rating: Option<String>,
    pub sequence_no: Option<i64>,
}

/// The four source tables, fully loaded and read-only from here on.
#[derive(Debug, Clone, Default)]
pub struct StudentStore {
    pub enrollment: Vec<EnrollmentRecord>,
    pub grades: Vec<GradeRecord>,
    pub programs: Vec<ProgramMapping>,
    pub ratings: Vec<RatingRecord>,
}

/// Key used to join grade rows to students.
///
/// Grade ids were typed as integers upstream, so all-digit ids match on
/// numeric value: `"00042"` and `"42"` are the same student.
pub fn grade_join_key(id: &str) -> String {
    let trimmed = id.trim();
    canonical_digits(trimmed).unwrap_or_else(|| trimmed.to_string())
}

/// An all-digit value without leading zeros (`"000"` becomes `"0"`);
/// `None` for anything that is not purely ASCII digits.
fn canonical_digits(value: &str) -> Option<String> {
    if !ALL_DIGITS.is_match(value) {
        return None;
    }
    let digits = value.trim_start_matches('0');
    Some(if digits.is_empty() { "0" } else { digits }.to_string())
}
