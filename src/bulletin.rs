use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Logical table width of the bulletin grid: two 3-column halves.
pub const GRID_COLUMNS: usize = 6;

/// Column widths in twentieths of a point, matching the paper form
/// (1.5 cm / 1.0 cm / 6.5 cm per half).
pub const COLUMN_WIDTHS_DXA: [i64; 6] = [850, 567, 3685, 850, 567, 3685];

pub const BULLETIN_TITLE: &str = "Зміни до розкладу занять";
pub const APPROVAL_LINE: &str = "ЗАТВЕРДЖУЮ";

#[derive(Debug, Clone, Serialize)]
pub struct LayoutError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LayoutError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionEntry {
    pub group: String,
    pub lesson_spec: String,
    pub lesson_label: String,
    pub discipline: String,
    pub room: String,
}

#[derive(Debug, Clone)]
pub struct DepartmentInfo {
    pub id: i64,
    pub name: String,
    pub sort_order: i64,
    pub is_general: bool,
    pub has_groups: bool,
}

/// Read-only data snapshot taken at bulletin-open time. `degraded` is set
/// instead of silently substituting fallback data when the store is
/// unreachable; layout still runs against the empty snapshot.
#[derive(Debug, Clone, Default)]
pub struct DataSnapshot {
    pub departments: Vec<DepartmentInfo>,
    pub group_departments: HashMap<String, i64>,
    pub degraded: bool,
}

impl DataSnapshot {
    pub fn unavailable() -> Self {
        Self {
            departments: Vec::new(),
            group_departments: HashMap::new(),
            degraded: true,
        }
    }
}

/// One bulletin-composition session. Owned by the daemon state, mutated only
/// by IPC requests, discarded when a new session is opened.
#[derive(Debug, Clone)]
pub struct BulletinSession {
    pub date_text: String,
    pub weekday: String,
    pub week_type: String,
    pub duty_group: String,
    pub duty_teacher: String,
    pub dorm_teacher: String,
    pub academic_year: String,
    pub approver_title: Option<String>,
    pub approver_name: Option<String>,
    pub base_date: NaiveDate,
    pub edu_practice: String,
    pub practice_type: String,
    pub practice_info: String,
    pub entries: Vec<SubstitutionEntry>,
    pub snapshot: DataSnapshot,
}

impl BulletinSession {
    pub fn is_saturday(&self) -> bool {
        self.weekday.trim().to_lowercase() == "субота"
    }

    pub fn target_date(&self) -> Option<NaiveDate> {
        parse_date_text(&self.date_text, &self.academic_year)
    }

    /// The weekday whose timetable this Saturday follows, or None when the
    /// session's date is not a Saturday or cannot be parsed.
    pub fn saturday_schedule_day(&self) -> Option<ScheduleDay> {
        if !self.is_saturday() {
            return None;
        }
        let target = self.target_date()?;
        Some(schedule_day_for(target, self.base_date))
    }
}

// ---------------------------------------------------------------------------
// Lesson-slot parser

fn lesson_in_range(n: u32) -> bool {
    (1..=8).contains(&n)
}

fn parse_lesson_number(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn validate_lesson_list(values: &[u32], raw: &str) -> Result<String, LayoutError> {
    let out_of_range: Vec<u32> = values.iter().copied().filter(|v| !lesson_in_range(*v)).collect();
    if !out_of_range.is_empty() {
        return Err(LayoutError::with_details(
            "lesson_out_of_range",
            format!("lesson numbers must be between 1 and 8: {}", raw),
            serde_json::json!({ "values": out_of_range }),
        ));
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mut duplicates: Vec<u32> = Vec::new();
    for pair in sorted.windows(2) {
        if pair[0] == pair[1] && duplicates.last() != Some(&pair[0]) {
            duplicates.push(pair[0]);
        }
    }
    if !duplicates.is_empty() {
        return Err(LayoutError::with_details(
            "lesson_duplicate",
            format!("duplicate lesson numbers: {}", raw),
            serde_json::json!({ "duplicates": duplicates }),
        ));
    }

    let joined = sorted
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("Пари {}", joined))
}

/// Validates a raw lesson-slot spec and returns its canonical label.
///
/// Accepted forms, first match wins: a single number ("3"), a range ("2-4"),
/// a comma list ("1,3,5" with optional spaces) or a space list ("1 3 5").
pub fn parse_lesson_spec(raw: &str) -> Result<String, LayoutError> {
    let spec = raw.trim();
    if spec.is_empty() {
        return Err(LayoutError::new(
            "empty_lesson_spec",
            "lesson number must not be empty",
        ));
    }

    if let Some(n) = parse_lesson_number(spec) {
        if !lesson_in_range(n) {
            return Err(LayoutError::with_details(
                "lesson_out_of_range",
                format!("lesson number must be between 1 and 8, got {}", n),
                serde_json::json!({ "values": [n] }),
            ));
        }
        return Ok(format!("Пара {}", n));
    }

    if let Some((a, b)) = spec.split_once('-') {
        if let (Some(start), Some(end)) = (parse_lesson_number(a), parse_lesson_number(b)) {
            if !lesson_in_range(start) || !lesson_in_range(end) {
                return Err(LayoutError::with_details(
                    "lesson_out_of_range",
                    format!("range bounds must be between 1 and 8: {}", spec),
                    serde_json::json!({ "values": [start, end] }),
                ));
            }
            if start > end {
                return Err(LayoutError::with_details(
                    "lesson_range_inverted",
                    format!("range start {} is greater than its end {}", start, end),
                    serde_json::json!({ "start": start, "end": end }),
                ));
            }
            return Ok(format!("Пари {}-{}", start, end));
        }
    } else if spec.contains(',') {
        let tokens: Vec<&str> = spec.split(',').map(str::trim).collect();
        let values: Option<Vec<u32>> = tokens.iter().copied().map(parse_lesson_number).collect();
        if let Some(values) = values {
            if values.len() >= 2 {
                return validate_lesson_list(&values, spec);
            }
        }
    } else {
        let tokens: Vec<&str> = spec.split_whitespace().collect();
        if tokens.len() >= 2 {
            let values: Option<Vec<u32>> = tokens.iter().copied().map(parse_lesson_number).collect();
            if let Some(values) = values {
                return validate_lesson_list(&values, spec);
            }
        }
    }

    Err(LayoutError::with_details(
        "lesson_bad_format",
        format!(
            "unrecognized lesson format: '{}' (expected '1', '2-4', '1,3,5' or '1 3 5')",
            spec
        ),
        serde_json::json!({ "raw": spec }),
    ))
}

// ---------------------------------------------------------------------------
// Saturday rotation

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl ScheduleDay {
    const ALL: [ScheduleDay; 5] = [
        ScheduleDay::Monday,
        ScheduleDay::Tuesday,
        ScheduleDay::Wednesday,
        ScheduleDay::Thursday,
        ScheduleDay::Friday,
    ];

    pub fn name_uk(self) -> &'static str {
        match self {
            ScheduleDay::Monday => "понеділок",
            ScheduleDay::Tuesday => "вівторок",
            ScheduleDay::Wednesday => "середа",
            ScheduleDay::Thursday => "четвер",
            ScheduleDay::Friday => "п'ятниця",
        }
    }
}

/// Advances a date to the next Monday unless it already is one.
pub fn align_to_monday(date: NaiveDate) -> NaiveDate {
    let offset = (7 - date.weekday().num_days_from_monday()) % 7;
    date + Duration::days(i64::from(offset))
}

/// Maps a Saturday to the weekday whose timetable it follows. Each Saturday
/// stands in for a different weekday in successive weeks, cycling Mon..Fri
/// every five Saturdays, anchored on the (Monday-aligned) base date.
pub fn schedule_day_for(target: NaiveDate, base: NaiveDate) -> ScheduleDay {
    let base = align_to_monday(base);
    let days = (target - base).num_days();
    let weeks = days.div_euclid(7);
    let index = weeks.rem_euclid(5) as usize;
    ScheduleDay::ALL[index]
}

/// The first Monday on or after September 1 of the academic year containing
/// `target` (dates before September belong to the year that started the
/// previous September).
pub fn default_base_date(target: NaiveDate) -> NaiveDate {
    let year = if target.month() < 9 {
        target.year() - 1
    } else {
        target.year()
    };
    let september_first =
        NaiveDate::from_ymd_opt(year, 9, 1).expect("September 1 is a valid date");
    align_to_monday(september_first)
}

/// Parses user-entered base-date text ("dd.mm.yyyy"). Callers fall back to
/// the computed default on None; malformed input never raises.
pub fn parse_base_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%d.%m.%Y").ok()
}

pub fn month_from_genitive(name: &str) -> Option<u32> {
    let month = match name {
        "січня" => 1,
        "лютого" => 2,
        "березня" => 3,
        "квітня" => 4,
        "травня" => 5,
        "червня" => 6,
        "липня" => 7,
        "серпня" => 8,
        "вересня" => 9,
        "жовтня" => 10,
        "листопада" => 11,
        "грудня" => 12,
        _ => return None,
    };
    Some(month)
}

pub fn academic_year_start(label: &str) -> Option<i32> {
    label.get(0..4)?.parse().ok()
}

/// Parses a date label like "5 вересня, п'ятниця". The year comes from the
/// academic-year label: September-December belong to its first year,
/// January-August to its second.
pub fn parse_date_text(text: &str, academic_year: &str) -> Option<NaiveDate> {
    let mut parts = text.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month_name = parts.next()?.trim_end_matches(',');
    let month = month_from_genitive(month_name)?;
    let start = academic_year_start(academic_year)?;
    let year = if month >= 9 { start } else { start + 1 };
    NaiveDate::from_ymd_opt(year, month, day)
}

// ---------------------------------------------------------------------------
// Department grouping

/// One display row of a department bucket: the group label is carried only by
/// the first row of each group-run.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub group_label: String,
    pub lesson: String,
    pub detail: String,
}

/// Combines discipline and room for the detail cell.
pub fn detail_text(discipline: &str, room: &str) -> String {
    let discipline = discipline.trim();
    let room = room.trim();
    match (discipline.is_empty(), room.is_empty()) {
        (false, false) => format!("{}, ауд. {}", discipline, room),
        (false, true) => discipline.to_string(),
        (true, false) => format!("ауд. {}", room),
        (true, true) => String::new(),
    }
}

/// Buckets entries by owning department id. Entries whose group has no
/// department mapping are dropped, not reported.
pub fn group_by_department<'a>(
    entries: &'a [SubstitutionEntry],
    index: &HashMap<String, i64>,
) -> HashMap<i64, Vec<&'a SubstitutionEntry>> {
    let mut buckets: HashMap<i64, Vec<&'a SubstitutionEntry>> = HashMap::new();
    for entry in entries {
        if let Some(dept_id) = index.get(&entry.group) {
            buckets.entry(*dept_id).or_default().push(entry);
        }
    }
    buckets
}

fn runs_by_group<'a>(
    bucket: &[&'a SubstitutionEntry],
) -> BTreeMap<&'a str, Vec<&'a SubstitutionEntry>> {
    let mut runs: BTreeMap<&'a str, Vec<&'a SubstitutionEntry>> = BTreeMap::new();
    for &entry in bucket {
        runs.entry(entry.group.as_str()).or_default().push(entry);
    }
    runs
}

fn run_rows(name: &str, entries: &[&SubstitutionEntry]) -> Vec<DisplayRow> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| DisplayRow {
            group_label: if i == 0 { name.to_string() } else { String::new() },
            lesson: entry.lesson_spec.clone(),
            detail: detail_text(&entry.discipline, &entry.room),
        })
        .collect()
}

/// Flattens a department bucket into display rows: group-runs ascending by
/// group name, first row of each run labeled.
pub fn flatten_group_runs(bucket: &[&SubstitutionEntry]) -> Vec<DisplayRow> {
    let mut rows = Vec::with_capacity(bucket.len());
    for (name, entries) in runs_by_group(bucket) {
        rows.extend(run_rows(name, &entries));
    }
    rows
}

/// Deals group-runs alternately into left/right sub-columns (even index left)
/// to balance the two half-width sub-tables of the general-education section.
pub fn split_alternating(bucket: &[&SubstitutionEntry]) -> (Vec<DisplayRow>, Vec<DisplayRow>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (idx, (name, entries)) in runs_by_group(bucket).into_iter().enumerate() {
        let side = if idx % 2 == 0 { &mut left } else { &mut right };
        side.extend(run_rows(name, &entries));
    }
    (left, right)
}

// ---------------------------------------------------------------------------
// Grid plan

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Borders {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl Borders {
    pub const ALL: Borders = Borders {
        top: true,
        bottom: true,
        left: true,
        right: true,
    };

    fn sides(left: bool, right: bool) -> Borders {
        Borders {
            top: false,
            bottom: false,
            left,
            right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellAlign {
    Left,
    Center,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellPlan {
    pub span: usize,
    pub text: String,
    pub bold: bool,
    pub shaded: bool,
    pub align: CellAlign,
    pub borders: Borders,
}

impl CellPlan {
    fn data(text: impl Into<String>, borders: Borders) -> Self {
        Self {
            span: 1,
            text: text.into(),
            bold: false,
            shaded: false,
            align: CellAlign::Center,
            borders,
        }
    }

    fn data_left(text: impl Into<String>, borders: Borders) -> Self {
        Self {
            align: CellAlign::Left,
            ..Self::data(text, borders)
        }
    }

    fn header(span: usize, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
            bold: true,
            shaded: true,
            align: CellAlign::Center,
            borders: Borders::ALL,
        }
    }

    fn blank(span: usize) -> Self {
        Self {
            span,
            text: String::new(),
            bold: false,
            shaded: false,
            align: CellAlign::Center,
            borders: Borders::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowPlan {
    pub cells: Vec<CellPlan>,
}

impl RowPlan {
    pub fn total_span(&self) -> usize {
        self.cells.iter().map(|c| c.span).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPlan {
    pub column_widths_dxa: [i64; 6],
    pub rows: Vec<RowPlan>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadingPlan {
    pub approval_lines: Vec<String>,
    pub title: String,
    pub date_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletinPlan {
    pub heading: HeadingPlan,
    pub grid: GridPlan,
}

fn general_half(row: Option<&DisplayRow>) -> Vec<CellPlan> {
    match row {
        Some(r) => vec![
            CellPlan::data(r.group_label.clone(), Borders::sides(true, false)),
            CellPlan::data(r.lesson.clone(), Borders::default()),
            CellPlan::data_left(r.detail.clone(), Borders::sides(false, true)),
        ],
        None => vec![
            CellPlan::data("", Borders::sides(true, false)),
            CellPlan::data("", Borders::default()),
            CellPlan::data("", Borders::sides(false, true)),
        ],
    }
}

fn paired_half(row: Option<&DisplayRow>) -> Vec<CellPlan> {
    match row {
        Some(r) => vec![
            CellPlan::data(r.group_label.clone(), Borders::sides(true, true)),
            CellPlan::data(r.lesson.clone(), Borders::sides(false, true)),
            CellPlan::data_left(r.detail.clone(), Borders::sides(false, true)),
        ],
        None => vec![
            CellPlan::data("", Borders::sides(true, true)),
            CellPlan::data("", Borders::sides(false, true)),
            CellPlan::data("", Borders::sides(false, true)),
        ],
    }
}

/// The original form redraws the last data row of each department block with
/// a bottom rule and exterior-only verticals; last write wins.
fn close_block(rows: &mut [RowPlan]) {
    if let Some(last) = rows.last_mut() {
        for (col, cell) in last.cells.iter_mut().enumerate() {
            cell.borders = Borders {
                top: false,
                bottom: true,
                left: col == 0 || col == 3,
                right: col == 2 || col == 5,
            };
        }
    }
}

fn push_data_rows(rows: &mut Vec<RowPlan>, left: &[DisplayRow], right: &[DisplayRow], general: bool) {
    let count = left.len().max(right.len()).max(1);
    for i in 0..count {
        let mut cells = Vec::with_capacity(GRID_COLUMNS);
        if general {
            cells.extend(general_half(left.get(i)));
            cells.extend(general_half(right.get(i)));
        } else {
            cells.extend(paired_half(left.get(i)));
            cells.extend(paired_half(right.get(i)));
        }
        rows.push(RowPlan { cells });
    }
    close_block(rows);
}

fn heading_plan(session: &BulletinSession) -> HeadingPlan {
    let mut approval_lines = vec![APPROVAL_LINE.to_string()];
    if let Some(title) = session.approver_title.as_deref() {
        if !title.trim().is_empty() {
            approval_lines.push(title.trim().to_string());
        }
    }
    if let Some(name) = session.approver_name.as_deref() {
        if !name.trim().is_empty() {
            approval_lines.push(name.trim().to_string());
        }
    }

    let mut parts = session.date_text.split_whitespace();
    let short_date = match (parts.next(), parts.next()) {
        (Some(day), Some(month)) => format!("{} {}", day, month.trim_end_matches(',')),
        _ => session.date_text.trim().to_string(),
    };

    let week = session.week_type.to_lowercase();
    let date_lines = match session.saturday_schedule_day() {
        Some(day) => vec![
            format!("на {}, суботу, за {}", short_date, day.name_uk()),
            format!("заняття за {}", week),
        ],
        None => vec![
            format!("на {}, {}", short_date, session.weekday),
            format!("навчання за {}", week),
        ],
    };

    HeadingPlan {
        approval_lines,
        title: BULLETIN_TITLE.to_string(),
        date_lines,
    }
}

/// Builds the complete bulletin plan: the general-education section first,
/// remaining departments paired two per row-block in display order, fixed
/// practice rows and the three duty rows.
pub fn plan_bulletin(session: &BulletinSession) -> Result<BulletinPlan, LayoutError> {
    let snapshot = &session.snapshot;
    if snapshot.departments.is_empty() {
        return Err(LayoutError::new(
            "no_departments",
            "no departments in the current data snapshot",
        ));
    }

    let buckets = group_by_department(&session.entries, &snapshot.group_departments);

    let mut departments: Vec<&DepartmentInfo> = snapshot.departments.iter().collect();
    departments.sort_by_key(|d| (d.sort_order, d.id));
    let general = departments.iter().copied().find(|d| d.is_general);
    let others: Vec<&DepartmentInfo> = departments
        .iter()
        .copied()
        .filter(|d| general.map(|g| g.id) != Some(d.id))
        .collect();

    let empty_bucket: Vec<&SubstitutionEntry> = Vec::new();
    let mut rows: Vec<RowPlan> = Vec::new();

    if let Some(dept) = general {
        rows.push(RowPlan {
            cells: vec![CellPlan::header(GRID_COLUMNS, dept.name.clone())],
        });
        let bucket = buckets.get(&dept.id).unwrap_or(&empty_bucket);
        let (left, right) = split_alternating(bucket);
        push_data_rows(&mut rows, &left, &right, true);
    }

    for pair in others.chunks(2) {
        let mut header_cells = Vec::with_capacity(2);
        for slot in 0..2 {
            match pair.get(slot) {
                Some(dept) => header_cells.push(CellPlan::header(3, dept.name.clone())),
                None => header_cells.push(CellPlan::blank(3)),
            }
        }
        rows.push(RowPlan {
            cells: header_cells,
        });

        let halves: Vec<Vec<DisplayRow>> = (0..2)
            .map(|slot| match pair.get(slot) {
                Some(dept) => {
                    let bucket = buckets.get(&dept.id).unwrap_or(&empty_bucket);
                    flatten_group_runs(bucket)
                }
                None => Vec::new(),
            })
            .collect();
        push_data_rows(&mut rows, &halves[0], &halves[1], false);
    }

    // Practice details collected from the user are deliberately not wired
    // into these rows; the paper form ships placeholders.
    rows.push(RowPlan {
        cells: vec![
            CellPlan::header(3, "НАВЧАЛЬНА ПРАКТИКА"),
            CellPlan::header(3, "ВИРОБНИЧА ПРАКТИКА"),
        ],
    });
    rows.push(RowPlan {
        cells: vec![
            CellPlan {
                span: 3,
                ..CellPlan::data("--------", Borders::ALL)
            },
            CellPlan {
                span: 3,
                ..CellPlan::data("--------", Borders::ALL)
            },
        ],
    });

    for text in [
        format!("Чергова група: {}", session.duty_group),
        format!("Черговий викладач: {}", session.duty_teacher),
        format!("Черговий викладач у гуртожитках: {}", session.dorm_teacher),
    ] {
        rows.push(RowPlan {
            cells: vec![CellPlan {
                span: GRID_COLUMNS,
                ..CellPlan::data_left(text, Borders::ALL)
            }],
        });
    }

    Ok(BulletinPlan {
        heading: heading_plan(session),
        grid: GridPlan {
            column_widths_dxa: COLUMN_WIDTHS_DXA,
            rows,
        },
    })
}
