use crate::error::LoadError;
use crate::models::{
    is_url, Census, Config, EnrollmentRecord, GradeRecord, ProgramMapping, RatingRecord, StudentStore, TermKey,
};
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const ENROLLMENT: &str = "enrollment";
const GRADES: &str = "grades";
const PROGRAMS: &str = "program";
const RATINGS: &str = "ratings";

/// Reads the four source tables into a [`StudentStore`].
pub struct SourceLoader {
    client: reqwest::Client,
    config: Config,
}

/// A parsed CSV source with its header positions.
struct Table<'c> {
    name: &'static str,
    config: &'c Config,
    headers: HashMap<String, usize>,
    records: Vec<StringRecord>,
}

impl<'c> Table<'c> {
    fn parse(name: &'static str, content: &str, config: &'c Config) -> Result<Self, LoadError> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|source| LoadError::Csv { table: name, source })?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_lowercase(), i))
            .collect();

        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| LoadError::Csv { table: name, source })?;

        Ok(Self {
            name,
            config,
            headers,
            records,
        })
    }

    /// Position of a required column; header names match case-insensitively.
    fn column(&self, column: &str) -> Result<usize, LoadError> {
        self.headers
            .get(&column.to_lowercase())
            .copied()
            .ok_or_else(|| LoadError::MissingColumn {
                table: self.name,
                column: column.to_string(),
            })
    }

    fn cell(&self, record: &StringRecord, index: usize) -> Option<String> {
        record
            .get(index)
            .filter(|value| !self.config.is_null(value))
            .map(|value| value.to_string())
    }

    fn required(&self, record: &StringRecord, index: usize, column: &str) -> Result<String, LoadError> {
        self.cell(record, index).ok_or_else(|| self.invalid(record, column, ""))
    }

    fn invalid(&self, record: &StringRecord, column: &str, value: &str) -> LoadError {
        LoadError::InvalidValue {
            table: self.name,
            line: record.position().map(|p| p.line()).unwrap_or(0),
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

impl SourceLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: config.clone(),
        }
    }

    /// Load all four sources. The sources are read concurrently; any failure
    /// aborts the whole load so no partial store is ever returned.
    pub async fn load_store(&self) -> Result<StudentStore, LoadError> {
        let config = &self.config;
        let (enrollment, grades, programs, ratings) = tokio::try_join!(
            self.read_source(&config.enrollment_file),
            self.read_source(&config.grades_file),
            self.read_source(&config.program_file),
            self.read_source(&config.ratings_file),
        )?;

        let store = StudentStore {
            enrollment: self.parse_enrollment(&enrollment)?,
            grades: self.parse_grades(&grades)?,
            programs: self.parse_programs(&programs)?,
            ratings: self.parse_ratings(&ratings)?,
        };

        info!(
            "Loaded {} enrollment rows, {} grade rows, {} program mappings, {} rating rows",
            store.enrollment.len(),
            store.grades.len(),
            store.programs.len(),
            store.ratings.len()
        );
        Ok(store)
    }

    async fn read_source(&self, location: &str) -> Result<String, LoadError> {
        let resolved = self.config.resolve_location(location);

        if is_url(&resolved) {
            debug!("Fetching {}", resolved);
            let http = |source| LoadError::Http {
                url: resolved.clone(),
                source,
            };
            let response = self
                .client
                .get(&resolved)
                .timeout(std::time::Duration::from_secs(30))
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(http)?;
            return response.text().await.map_err(http);
        }

        debug!("Reading {}", resolved);
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|source| LoadError::Io { path: resolved, source })
    }

    pub fn parse_enrollment(&self, content: &str) -> Result<Vec<EnrollmentRecord>, LoadError> {
        let table = Table::parse(ENROLLMENT, content, &self.config)?;
        let id = table.column("id")?;
        let term_code = table.column("term_code")?;
        let census = table.column("census")?;
        let race_desc = table.column("race_desc")?;
        let legal_sex_desc = table.column("legal_sex_desc")?;
        let ethn_desc = table.column("ethn_desc")?;
        let visa_desc = table.column("visa_desc")?;
        let college = table.column("college")?;
        let degr = table.column("degr")?;
        let majr = table.column("majr")?;
        let birth_date = table.column("birth_date")?;

        let mut warned_text_term = false;
        let mut rows = Vec::with_capacity(table.records.len());
        for record in &table.records {
            let row = EnrollmentRecord {
                id: table.required(record, id, "id")?,
                term_code: table.cell(record, term_code),
                census: Census::parse(&table.cell(record, census).unwrap_or_default()),
                race_desc: table.cell(record, race_desc),
                legal_sex_desc: table.cell(record, legal_sex_desc),
                ethn_desc: table.cell(record, ethn_desc),
                visa_desc: table.cell(record, visa_desc),
                college: table.cell(record, college),
                degr: table.cell(record, degr),
                majr: table.cell(record, majr),
                birth_date: table.cell(record, birth_date),
            };

            if !warned_text_term && matches!(row.term_key(), TermKey::Text(_)) {
                warn!(
                    "Non-numeric term code '{}' in {}; such codes order as text after all numeric codes",
                    row.term_code.as_deref().unwrap_or_default(),
                    ENROLLMENT
                );
                warned_text_term = true;
            }
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn parse_grades(&self, content: &str) -> Result<Vec<GradeRecord>, LoadError> {
        let table = Table::parse(GRADES, content, &self.config)?;
        let id = table.column("id")?;
        let term_code = table.column("term_code")?;
        let grade = table.column("final_course_grade")?;

        table
            .records
            .iter()
            .map(|record| -> Result<GradeRecord, LoadError> {
                Ok(GradeRecord {
                    id: table.required(record, id, "id")?,
                    term_code: table.cell(record, term_code),
                    final_course_grade: table.cell(record, grade),
                })
            })
            .collect()
    }

    pub fn parse_programs(&self, content: &str) -> Result<Vec<ProgramMapping>, LoadError> {
        let table = Table::parse(PROGRAMS, content, &self.config)?;
        let college = table.column("COLLEGE")?;
        let degree = table.column("DEGREE")?;
        let major = table.column("MAJOR")?;
        let program = table.column("PROGRAM")?;

        Ok(table
            .records
            .iter()
            .map(|record| ProgramMapping {
                college: table.cell(record, college),
                degree: table.cell(record, degree),
                major: table.cell(record, major),
                program: table.cell(record, program),
            })
            .collect())
    }

    pub fn parse_ratings(&self, content: &str) -> Result<Vec<RatingRecord>, LoadError> {
        let table = Table::parse(RATINGS, content, &self.config)?;
        let id = table.column("id")?;
        let admit_rating = table.column("admit_rating")?;
        let sequence_no = table.column("sequence_no")?;

        table
            .records
            .iter()
            .map(|record| -> Result<RatingRecord, LoadError> {
                let sequence = match table.cell(record, sequence_no) {
                    None => None,
                    Some(raw) => {
                        Some(parse_integer(&raw).ok_or_else(|| table.invalid(record, "sequence_no", &raw))?)
                    }
                };
                Ok(RatingRecord {
                    id: table.required(record, id, "id")?,
                    admit_rating: table.cell(record, admit_rating).map(|r| r.trim().to_string()),
                    sequence_no: sequence,
                })
            })
            .collect()
    }
}

/// Integer cell; integral floats such as `3.0` are accepted.
fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .map(|v| v as i64)
}
