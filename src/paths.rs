use anyhow::Context;
use std::path::{Path, PathBuf};

pub const OUTPUT_EXTENSION: &str = "docx";

/// Month folder names as they appear in the bulletin archive, keyed by the
/// genitive month of the date label.
fn month_folder(month_genitive: &str) -> Option<&'static str> {
    let folder = match month_genitive {
        "січня" => "01-Січень",
        "лютого" => "02-Лютий",
        "березня" => "03-Березень",
        "квітня" => "04-Квітень",
        "травня" => "05-Травень",
        "червня" => "06-Червень",
        "липня" => "07-Липень",
        "серпня" => "08-Серпень",
        "вересня" => "09-Вересень",
        "жовтня" => "10-Жовтень",
        "листопада" => "11-Листопад",
        "грудня" => "12-Грудень",
        _ => return None,
    };
    Some(folder)
}

/// Derives the destination of a bulletin from its date label, e.g.
/// `{root}/2025-2026/09-Вересень/5 вересня.docx`. When the month cannot be
/// recognized the file lands directly in the academic-year folder.
pub fn output_path(root: &Path, academic_year: &str, date_text: &str) -> PathBuf {
    let year_dir = root.join(academic_year);
    let mut parts = date_text.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(day), Some(month_raw)) => {
            let month = month_raw.trim_end_matches(',');
            let file_name = format!("{} {}.{}", day, month, OUTPUT_EXTENSION);
            match month_folder(month) {
                Some(folder) => year_dir.join(folder).join(file_name),
                None => year_dir.join(file_name),
            }
        }
        _ => year_dir.join(format!("{}.{}", date_text.trim(), OUTPUT_EXTENSION)),
    }
}

/// Resolves the output path and creates the year/month directories. Existing
/// directories are fine; an existing file at the path is overwritten later
/// by the renderer without prompting.
pub fn resolve_output_path(
    root: &Path,
    academic_year: &str,
    date_text: &str,
) -> anyhow::Result<PathBuf> {
    let path = output_path(root, academic_year, date_text);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn september_bulletin_lands_in_month_folder() {
        let path = output_path(Path::new("/Zaminy"), "2025-2026", "5 вересня");
        assert_eq!(
            path,
            PathBuf::from("/Zaminy/2025-2026/09-Вересень/5 вересня.docx")
        );
    }

    #[test]
    fn weekday_suffix_and_comma_do_not_leak_into_the_name() {
        let path = output_path(Path::new("/Zaminy"), "2025-2026", "5 вересня, п'ятниця");
        assert_eq!(
            path,
            PathBuf::from("/Zaminy/2025-2026/09-Вересень/5 вересня.docx")
        );
    }

    #[test]
    fn unknown_month_falls_back_to_year_folder() {
        let path = output_path(Path::new("/Zaminy"), "2025-2026", "5 серпіня");
        assert_eq!(path, PathBuf::from("/Zaminy/2025-2026/5 серпіня.docx"));
    }

    #[test]
    fn single_token_label_names_the_file_directly() {
        let path = output_path(Path::new("/Zaminy"), "2025-2026", "сьогодні");
        assert_eq!(path, PathBuf::from("/Zaminy/2025-2026/сьогодні.docx"));
    }

    #[test]
    fn resolve_creates_intermediate_directories() {
        let root = std::env::temp_dir().join(format!(
            "zaminyd-paths-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let path = resolve_output_path(&root, "2025-2026", "5 вересня").expect("resolve");
        assert!(path.parent().expect("parent").is_dir());
        // Idempotent: resolving again succeeds with the directories present.
        let again = resolve_output_path(&root, "2025-2026", "5 вересня").expect("resolve again");
        assert_eq!(path, again);
    }
}
