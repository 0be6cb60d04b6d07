use crate::grades::{round_to, summarize_grades, GpaSummary};
use crate::models::{grade_join_key, Census, EnrollmentRecord, ProgramMapping, RatingRecord, StudentStore};
use crate::report::StudentReport;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

pub const INTERNATIONAL: &str = "International";
pub const HISPANIC_OR_LATINO: &str = "Hispanic or Latino";
pub const UNKNOWN_RACE: &str = "Unknown";
pub const UNKNOWN_RATING: &str = "unk";

/// Visa descriptions that denote domestic residency rather than a student visa.
const DOMESTIC_VISA_CODES: [&str; 3] = ["PR", "RF", "AS"];

/// The authoritative snapshot for one student at one census point, with its
/// resolved program attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<'a> {
    pub census: Census,
    pub record: &'a EnrollmentRecord,
    pub program: Option<String>,
}

/// (college, degree, major) -> program. Triples with a null component are
/// never indexed because they can never match.
#[derive(Debug, Default)]
pub struct ProgramIndex {
    programs: HashMap<(String, String, String), Option<String>>,
    pub duplicates: usize,
}

impl ProgramIndex {
    /// Build the index; when a triple repeats, the first mapping row wins.
    pub fn build(mappings: &[ProgramMapping]) -> Self {
        let mut index = ProgramIndex::default();
        for mapping in mappings {
            let (Some(college), Some(degree), Some(major)) = (&mapping.college, &mapping.degree, &mapping.major) else {
                continue;
            };
            let key = (college.clone(), degree.clone(), major.clone());
            if index.programs.contains_key(&key) {
                index.duplicates += 1;
                debug!("Duplicate program mapping for {}/{}/{} ignored", college, degree, major);
                continue;
            }
            index.programs.insert(key, mapping.program.clone());
        }
        index
    }

    pub fn lookup(&self, college: Option<&str>, degree: Option<&str>, major: Option<&str>) -> Option<String> {
        let key = (college?.to_string(), degree?.to_string(), major?.to_string());
        self.programs.get(&key).cloned().flatten()
    }
}

pub struct Reconciler<'a> {
    store: &'a StudentStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a StudentStore) -> Self {
        Self { store }
    }

    /// Produce one report row per distinct enrollment id, ordered by id.
    pub fn reconcile(&self) -> Vec<StudentReport> {
        // Step 1: Latest snapshot per student for each census point
        let wk3 = self.latest_snapshots(Census::Wk3);
        let eot = self.latest_snapshots(Census::Eot);
        info!("Deduplicated snapshots: {} WK3, {} EOT", wk3.len(), eot.len());

        // Step 2: Attach programs from the crosswalk
        let programs = ProgramIndex::build(&self.store.programs);
        if programs.duplicates > 0 {
            warn!(
                "Program crosswalk has {} duplicate (college, degree, major) rows; first occurrence kept",
                programs.duplicates
            );
        }
        let wk3 = Self::resolve_programs(wk3, &programs);
        let eot = Self::resolve_programs(eot, &programs);

        // Step 3: Grade point aggregates
        let gpa = summarize_grades(&self.store.grades);
        info!("Grade summaries computed for {} students", gpa.len());

        // Step 4: Most recent admission rating
        let ratings = self.latest_ratings();
        info!("Admission ratings selected for {} students", ratings.len());

        // Step 5: Merge over the full student universe
        let rows: Vec<StudentReport> = self
            .student_ids()
            .into_iter()
            .map(|id| {
                merge_student(
                    id,
                    wk3.get(id),
                    eot.get(id),
                    gpa.get(&grade_join_key(id)),
                    ratings.get(id).map(|r| r.as_deref()),
                )
            })
            .collect();

        info!("Reconciled {} students", rows.len());
        rows
    }

    /// Every distinct student id in the enrollment table, ascending.
    pub fn student_ids(&self) -> BTreeSet<&'a str> {
        self.store.enrollment.iter().map(|r| r.id.as_str()).collect()
    }

    /// Reduce the enrollment rows for one census point to the row with the
    /// greatest term code per student. On equal term codes the row that
    /// appears first in the source is kept.
    pub fn latest_snapshots(&self, census: Census) -> HashMap<&'a str, Snapshot<'a>> {
        let mut latest: HashMap<&'a str, Snapshot<'a>> = HashMap::new();

        for record in self.store.enrollment.iter().filter(|r| r.census == census) {
            let newer = latest
                .get(record.id.as_str())
                .map_or(true, |existing| record.term_key() > existing.record.term_key());
            if newer {
                latest.insert(
                    record.id.as_str(),
                    Snapshot {
                        census: census.clone(),
                        record,
                        program: None,
                    },
                );
            }
        }

        latest
    }

    /// Attach the crosswalk program to each snapshot; misses stay `None`.
    pub fn resolve_programs(
        snapshots: HashMap<&'a str, Snapshot<'a>>,
        programs: &ProgramIndex,
    ) -> HashMap<&'a str, Snapshot<'a>> {
        snapshots
            .into_iter()
            .map(|(id, mut snapshot)| {
                let record = snapshot.record;
                snapshot.program = programs.lookup(record.college.as_deref(), record.degr.as_deref(), record.majr.as_deref());
                (id, snapshot)
            })
            .collect()
    }

    /// Rating from each student's highest sequence number. Ties keep the row
    /// that appears first; a null sequence number ranks below any number.
    /// The inner `None` means the winning row carried no rating.
    pub fn latest_ratings(&self) -> HashMap<&'a str, Option<String>> {
        let mut latest: HashMap<&'a str, &'a RatingRecord> = HashMap::new();

        for record in &self.store.ratings {
            let newer = latest
                .get(record.id.as_str())
                .map_or(true, |existing| record.sequence_no > existing.sequence_no);
            if newer {
                latest.insert(record.id.as_str(), record);
            }
        }

        latest
            .into_iter()
            .map(|(id, record)| (id, record.admit_rating.clone()))
            .collect()
    }
}

/// EOT value when present, otherwise WK3.
fn prefer_eot<'s, F>(eot: Option<&Snapshot<'s>>, wk3: Option<&Snapshot<'s>>, field: F) -> Option<String>
where
    F: Fn(&EnrollmentRecord) -> &Option<String>,
{
    eot.and_then(|s| field(s.record).clone())
        .or_else(|| wk3.and_then(|s| field(s.record).clone()))
}

/// Race/ethnicity by precedence: international visa, then Hispanic
/// ethnicity, then reported race, then `Unknown`.
pub fn resolve_race_ethnicity(visa: Option<&str>, ethnicity: Option<&str>, race: Option<&str>) -> String {
    if let Some(visa) = visa {
        let code = visa.to_uppercase();
        let code = code.trim();
        if !code.is_empty() && !DOMESTIC_VISA_CODES.contains(&code) {
            return INTERNATIONAL.to_string();
        }
    }

    if let Some(ethnicity) = ethnicity {
        let lowered = ethnicity.to_lowercase();
        if lowered.contains("hispanic") && !lowered.starts_with("not hispanic") {
            return HISPANIC_OR_LATINO.to_string();
        }
    }

    race.unwrap_or(UNKNOWN_RACE).to_string()
}

/// Assemble one student's row from whichever overlays exist for them.
pub fn merge_student(
    id: &str,
    wk3: Option<&Snapshot<'_>>,
    eot: Option<&Snapshot<'_>>,
    gpa: Option<&GpaSummary>,
    rating: Option<Option<&str>>,
) -> StudentReport {
    let visa = prefer_eot(eot, wk3, |r| &r.visa_desc);
    let ethnicity = prefer_eot(eot, wk3, |r| &r.ethn_desc);
    let race = prefer_eot(eot, wk3, |r| &r.race_desc);

    let wk3_program = wk3.and_then(|s| s.program.clone());
    let eot_program = eot.and_then(|s| s.program.clone());

    StudentReport {
        id: id.to_string(),
        enrolled_wk3: wk3.is_some(),
        enrolled_eot: eot.is_some(),
        persisted_wk3_to_eot: wk3.is_some() && eot.is_some(),
        legal_sex_desc: prefer_eot(eot, wk3, |r| &r.legal_sex_desc),
        race_ethnicity: resolve_race_ethnicity(visa.as_deref(), ethnicity.as_deref(), race.as_deref()),
        birth_date: prefer_eot(eot, wk3, |r| &r.birth_date),
        wk3_college: wk3.and_then(|s| s.record.college.clone()),
        wk3_degree: wk3.and_then(|s| s.record.degr.clone()),
        wk3_major: wk3.and_then(|s| s.record.majr.clone()),
        program_final: eot_program.clone().or_else(|| wk3_program.clone()),
        wk3_program,
        eot_college: eot.and_then(|s| s.record.college.clone()),
        eot_degree: eot.and_then(|s| s.record.degr.clone()),
        eot_major: eot.and_then(|s| s.record.majr.clone()),
        eot_program,
        degree_final: prefer_eot(eot, wk3, |r| &r.degr),
        college_final: prefer_eot(eot, wk3, |r| &r.college),
        major_final: prefer_eot(eot, wk3, |r| &r.majr),
        avg_gpa: gpa.and_then(|g| g.avg).map(|avg| round_to(avg, 3)),
        min_gpa: gpa.and_then(|g| g.min),
        max_gpa: gpa.and_then(|g| g.max),
        num_courses: gpa.map(|g| g.num_courses),
        latest_admit_rating: rating.flatten().unwrap_or(UNKNOWN_RATING).to_string(),
    }
}
