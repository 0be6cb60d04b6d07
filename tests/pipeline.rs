use std::collections::HashSet;
use std::path::Path;

use student_recon::report::{write_report, COLUMNS};
use student_recon::{Config, Reconciler, SourceLoader, StudentReport};
use tempfile::TempDir;

const ENROLLMENT: &str = "\
id,term_code,census,race_desc,legal_sex_desc,ethn_desc,visa_desc,college,degr,majr,birth_date
1001,202310,WK3,White,Female,Not Hispanic or Latino,,AS,BS,BIOL,2004-03-01
1001,202410,WK3,White,Female,Not Hispanic or Latino,,AS,BS,CHEM,2004-03-01
1001,202410,EOT,White,,Not Hispanic or Latino,,AS,BS,CHEM,2004-03-02
1002,202410,WK3,Asian,Male,Hispanic,F-1,EN,BS,MECH,2003-11-20
1003,202410,EOT,,Female,Hispanic or Latino,PR,AS,BA,HIST,2005-01-15
1004,202410,WK3,,Male,,RF,BU,BBA,ACCT,
1005,202410,SUMMER,Black,Female,,,AS,BS,BIOL,2004-07-07
";

const GRADES: &str = "\
id,term_code,final_course_grade
1001,202410,A
1001,202410,W
1001,202410,B-
1002,202410,I
1004,202410, C+
1004,202410,F
9999,202410,A
";

const PROGRAMS: &str = "\
COLLEGE,DEGREE,MAJOR,PROGRAM
AS,BS,BIOL,Biology
AS,BS,CHEM,Chemistry
AS,BS,CHEM,Chemical Sciences
EN,BS,MECH,Mechanical Engineering
";

const RATINGS: &str = "\
id,admit_rating,sequence_no
1001,2,1
1001,4,3
1001,5,2
1003, 3 ,1
";

fn write_sources(dir: &Path) {
    std::fs::write(dir.join("fall_enrollment.csv"), ENROLLMENT).unwrap();
    std::fs::write(dir.join("grades.csv"), GRADES).unwrap();
    std::fs::write(dir.join("program_data.csv"), PROGRAMS).unwrap();
    std::fs::write(dir.join("admission_rating.csv"), RATINGS).unwrap();
}

fn config_for(dir: &TempDir) -> Config {
    Config {
        data_directory: Some(dir.path().to_string_lossy().into_owned()),
        output_file: dir.path().join("out/report.csv").to_string_lossy().into_owned(),
        ..Config::default()
    }
}

async fn run_pipeline(config: &Config) -> Vec<StudentReport> {
    let store = SourceLoader::new(config).load_store().await.unwrap();
    Reconciler::new(&store).reconcile()
}

fn row<'a>(rows: &'a [StudentReport], id: &str) -> &'a StudentReport {
    rows.iter().find(|r| r.id == id).unwrap_or_else(|| panic!("no row for {id}"))
}

#[tokio::test]
async fn every_enrolled_student_appears_exactly_once() {
    let dir = TempDir::new().unwrap();
    write_sources(dir.path());
    let rows = run_pipeline(&config_for(&dir)).await;

    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1001", "1002", "1003", "1004", "1005"]);
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
    // grades for an unknown student never add a row
    assert!(!ids.contains(&"9999"));
}

#[tokio::test]
async fn presence_flags_follow_snapshots() {
    let dir = TempDir::new().unwrap();
    write_sources(dir.path());
    let rows = run_pipeline(&config_for(&dir)).await;

    for r in &rows {
        assert_eq!(r.persisted_wk3_to_eot, r.enrolled_wk3 && r.enrolled_eot, "student {}", r.id);
    }
    assert!(row(&rows, "1001").persisted_wk3_to_eot);
    assert!(row(&rows, "1002").enrolled_wk3 && !row(&rows, "1002").enrolled_eot);
    assert!(!row(&rows, "1003").enrolled_wk3 && row(&rows, "1003").enrolled_eot);

    let summer = row(&rows, "1005");
    assert!(!summer.enrolled_wk3 && !summer.enrolled_eot);
    assert_eq!(summer.race_ethnicity, "Unknown");
    assert_eq!(summer.major_final, None);
}

#[tokio::test]
async fn latest_snapshot_and_eot_precedence() {
    let dir = TempDir::new().unwrap();
    write_sources(dir.path());
    let rows = run_pipeline(&config_for(&dir)).await;

    let r = row(&rows, "1001");
    assert_eq!(r.wk3_major.as_deref(), Some("CHEM"));
    assert_eq!(r.wk3_program.as_deref(), Some("Chemistry"));
    assert_eq!(r.eot_program.as_deref(), Some("Chemistry"));
    assert_eq!(r.program_final.as_deref(), Some("Chemistry"));
    assert_eq!(r.legal_sex_desc.as_deref(), Some("Female"));
    assert_eq!(r.birth_date.as_deref(), Some("2004-03-02"));
    assert_eq!(r.race_ethnicity, "White");

    let r = row(&rows, "1004");
    assert_eq!(r.wk3_program, None);
    assert_eq!(r.program_final, None);
    assert_eq!(r.college_final.as_deref(), Some("BU"));
    assert_eq!(r.birth_date, None);
}

#[tokio::test]
async fn race_ethnicity_precedence() {
    let dir = TempDir::new().unwrap();
    write_sources(dir.path());
    let rows = run_pipeline(&config_for(&dir)).await;

    assert_eq!(row(&rows, "1002").race_ethnicity, "International");
    assert_eq!(row(&rows, "1003").race_ethnicity, "Hispanic or Latino");
    assert_eq!(row(&rows, "1004").race_ethnicity, "Unknown");
}

#[tokio::test]
async fn gpa_excludes_unmapped_grades() {
    let dir = TempDir::new().unwrap();
    write_sources(dir.path());
    let rows = run_pipeline(&config_for(&dir)).await;

    let r = row(&rows, "1001");
    assert_eq!(r.num_courses, Some(2));
    assert_eq!(r.avg_gpa, Some(3.35));
    assert_eq!(r.min_gpa, Some(2.7));
    assert_eq!(r.max_gpa, Some(4.0));

    let r = row(&rows, "1002");
    assert_eq!(r.num_courses, Some(0));
    assert_eq!(r.avg_gpa, None);

    let r = row(&rows, "1004");
    assert_eq!(r.num_courses, Some(2));
    assert_eq!(r.avg_gpa, Some(1.15));

    assert_eq!(row(&rows, "1003").num_courses, None);
}

#[tokio::test]
async fn latest_rating_with_imputation() {
    let dir = TempDir::new().unwrap();
    write_sources(dir.path());
    let rows = run_pipeline(&config_for(&dir)).await;

    assert_eq!(row(&rows, "1001").latest_admit_rating, "4");
    assert_eq!(row(&rows, "1003").latest_admit_rating, "3");
    assert_eq!(row(&rows, "1002").latest_admit_rating, "unk");
}

#[tokio::test]
async fn report_is_byte_identical_across_runs() {
    let dir = TempDir::new().unwrap();
    write_sources(dir.path());
    let config = config_for(&dir);

    write_report(&run_pipeline(&config).await, &config.output_file).unwrap();
    let first = std::fs::read(&config.output_file).unwrap();
    write_report(&run_pipeline(&config).await, &config.output_file).unwrap();
    let second = std::fs::read(&config.output_file).unwrap();
    assert_eq!(first, second);

    let text = String::from_utf8(first).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(COLUMNS.join(",").as_str()));
    assert_eq!(
        lines.next(),
        Some("1001,1,1,1,Female,White,2004-03-02,AS,BS,CHEM,Chemistry,AS,BS,CHEM,Chemistry,Chemistry,BS,AS,CHEM,3.35,2.7,4.0,2,4")
    );
    assert_eq!(lines.count(), 4);
}

#[tokio::test]
async fn missing_source_aborts_the_load() {
    let dir = TempDir::new().unwrap();
    write_sources(dir.path());
    std::fs::remove_file(dir.path().join("grades.csv")).unwrap();

    let result = SourceLoader::new(&config_for(&dir)).load_store().await;
    assert!(matches!(result, Err(student_recon::LoadError::Io { .. })));
}
