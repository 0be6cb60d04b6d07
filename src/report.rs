use anyhow::{Context, Result};
use csv::Writer;
use std::io::Write;
use std::path::Path;

/// Output columns, in the order downstream consumers expect them.
pub const COLUMNS: [&str; 24] = [
    "id",
    "enrolled_wk3",
    "enrolled_eot",
    "persisted_wk3_to_eot",
    "legal_sex_desc",
    "race_ethnicity",
    "birth_date",
    "wk3_college",
    "wk3_degree",
    "wk3_major",
    "wk3_program",
    "eot_college",
    "eot_degree",
    "eot_major",
    "eot_program",
    "program_final",
    "degree_final",
    "college_final",
    "major_final",
    "avg_gpa",
    "min_gpa",
    "max_gpa",
    "num_courses",
    "latest_admit_rating",
];

/// One reconciled student.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentReport {
    pub id: String,
    pub enrolled_wk3: bool,
    pub enrolled_eot: bool,
    pub persisted_wk3_to_eot: bool,
    pub legal_sex_desc: Option<String>,
    pub race_ethnicity: String,
    pub birth_date: Option<String>,
    pub wk3_college: Option<String>,
    pub wk3_degree: Option<String>,
    pub wk3_major: Option<String>,
    pub wk3_program: Option<String>,
    pub eot_college: Option<String>,
    pub eot_degree: Option<String>,
    pub eot_major: Option<String>,
    pub eot_program: Option<String>,
    pub program_final: Option<String>,
    pub degree_final: Option<String>,
    pub college_final: Option<String>,
    pub major_final: Option<String>,
    pub avg_gpa: Option<f64>,
    pub min_gpa: Option<f64>,
    pub max_gpa: Option<f64>,
    pub num_courses: Option<usize>,
    pub latest_admit_rating: String,
}

impl StudentReport {
    /// Cells in [`COLUMNS`] order. Absent values render as empty cells.
    pub fn to_record(&self) -> Vec<String> {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let gpa = |value: Option<f64>| value.map(format_gpa).unwrap_or_default();

        vec![
            self.id.clone(),
            flag(self.enrolled_wk3),
            flag(self.enrolled_eot),
            flag(self.persisted_wk3_to_eot),
            text(&self.legal_sex_desc),
            self.race_ethnicity.clone(),
            text(&self.birth_date),
            text(&self.wk3_college),
            text(&self.wk3_degree),
            text(&self.wk3_major),
            text(&self.wk3_program),
            text(&self.eot_college),
            text(&self.eot_degree),
            text(&self.eot_major),
            text(&self.eot_program),
            text(&self.program_final),
            text(&self.degree_final),
            text(&self.college_final),
            text(&self.major_final),
            gpa(self.avg_gpa),
            gpa(self.min_gpa),
            gpa(self.max_gpa),
            self.num_courses.map(|n| n.to_string()).unwrap_or_default(),
            self.latest_admit_rating.clone(),
        ]
    }
}

fn flag(value: bool) -> String {
    let cell = if value { "1" } else { "0" };
    cell.to_string()
}

/// Shortest round-trip decimal, always with a fractional part: `4.0`, `3.35`.
pub fn format_gpa(value: f64) -> String {
    format!("{:?}", value)
}

/// Write the header and all rows as CSV to any sink.
pub fn write_csv<W: Write>(rows: &[StudentReport], sink: W) -> Result<()> {
    let mut writer = Writer::from_writer(sink);

    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.write_record(row.to_record())?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_report(rows: &[StudentReport], output_file: &str) -> Result<()> {
    let path = Path::new(output_file);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file: {}", output_file))?;
    write_csv(rows, file).with_context(|| format!("Failed to write report: {}", output_file))
}

/// Console preview: row/column counts followed by the first `limit` rows
/// as an aligned table.
pub fn render_preview(rows: &[StudentReport], limit: usize) -> String {
    let mut table: Vec<Vec<String>> = vec![COLUMNS.iter().map(|c| c.to_string()).collect()];
    table.extend(rows.iter().take(limit).map(|r| r.to_record()));

    let mut widths = vec![0usize; COLUMNS.len()];
    for line in &table {
        for (i, cell) in line.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut content = format!("Rows: {} Cols: {}\n", rows.len(), COLUMNS.len());
    for line in &table {
        let cells: Vec<String> = line
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:>width$}", cell, width = *width))
            .collect();
        content.push_str(&cells.join(" "));
        content.push('\n');
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StudentReport {
        StudentReport {
            id: "1001".to_string(),
            enrolled_wk3: true,
            enrolled_eot: false,
            persisted_wk3_to_eot: false,
            legal_sex_desc: Some("Female".to_string()),
            race_ethnicity: "International".to_string(),
            birth_date: None,
            wk3_college: Some("AS".to_string()),
            wk3_degree: Some("BS".to_string()),
            wk3_major: Some("BIOL".to_string()),
            wk3_program: Some("Biology, General".to_string()),
            eot_college: None,
            eot_degree: None,
            eot_major: None,
            eot_program: None,
            program_final: Some("Biology, General".to_string()),
            degree_final: Some("BS".to_string()),
            college_final: Some("AS".to_string()),
            major_final: Some("BIOL".to_string()),
            avg_gpa: Some(3.35),
            min_gpa: Some(2.7),
            max_gpa: Some(4.0),
            num_courses: Some(2),
            latest_admit_rating: "unk".to_string(),
        }
    }

    #[test]
    fn gpa_values_keep_a_fractional_digit() {
        assert_eq!(format_gpa(4.0), "4.0");
        assert_eq!(format_gpa(0.0), "0.0");
        assert_eq!(format_gpa(2.7), "2.7");
        assert_eq!(format_gpa(3.35), "3.35");
    }

    #[test]
    fn record_follows_column_order() {
        let record = sample().to_record();
        assert_eq!(record.len(), COLUMNS.len());
        assert_eq!(record[0], "1001");
        assert_eq!(&record[1..4], &["1", "0", "0"]);
        assert_eq!(record[6], "");
        assert_eq!(&record[19..], &["3.35", "2.7", "4.0", "2", "unk"]);
    }

    #[test]
    fn csv_output_quotes_embedded_delimiters() {
        let mut buffer = Vec::new();
        write_csv(&[sample()], &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(COLUMNS.join(",").as_str()));
        assert!(lines.next().unwrap().contains("\"Biology, General\""));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn preview_reports_dimensions_and_limits_rows() {
        let rows = vec![sample(), sample(), sample()];
        let preview = render_preview(&rows, 2);
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines[0], "Rows: 3 Cols: 24");
        assert_eq!(lines.len(), 1 + 1 + 2);
        assert!(lines[1].trim_start().starts_with("id"));
    }
}
