use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Type aliases for clarity
pub type CourseId = String;
pub type ProfessorId = String;
pub type SlotId = String;
pub type Day = String;

fn default_num_classes() -> u32 {
    1
}

fn default_available() -> bool {
    true
}

/// A course offering to be placed on the weekly timetable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Course {
    #[serde(rename = "course_id")]
    pub id: CourseId,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub is_core: bool,
    /// Required weekly meetings.
    #[serde(default = "default_num_classes")]
    pub num_classes: u32,
}

impl Course {
    /// "Name (ID)" for named courses, the bare id otherwise.
    pub fn label(&self) -> String {
        match self.course_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{} ({})", name, self.id),
            _ => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Professor {
    #[serde(rename = "professor_id")]
    pub id: ProfessorId,
    /// Qualification anchor used when a course has no explicit edges.
    #[serde(default)]
    pub department_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeSlot {
    #[serde(rename = "timeslot_id")]
    pub id: SlotId,
    #[serde(default)]
    pub name: Option<String>,
    pub day_of_week: Day,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub slot_family: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfessorAvailability {
    pub professor_id: ProfessorId,
    pub timeslot_id: SlotId,
    #[serde(default)]
    pub day_of_week: Option<Day>,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

/// Explicit permission for a professor to teach a course.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfessorCourse {
    pub professor_id: ProfessorId,
    pub course_id: CourseId,
}

/// The complete input for one scheduling request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingRequest {
    pub schedule_id: String,
    pub courses: Vec<Course>,
    pub professors: Vec<Professor>,
    pub time_slots: Vec<TimeSlot>,
    pub professor_availability: Vec<ProfessorAvailability>,
    #[serde(default)]
    pub professor_courses: Vec<ProfessorCourse>,
}

/// One placed weekly meeting of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledMeeting {
    pub scheduled_course_id: String,
    pub course_id: CourseId,
    pub class_instance: u32,
    pub num_classes: u32,
    pub professor_id: ProfessorId,
    pub timeslot_id: SlotId,
    pub day_of_week: Day,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    NoAvailableSlot,
    NoQualifiedProfessor,
    TimeSlotConflict,
    ProfessorDoubleBooked,
    ConsecutiveTeaching,
    ProfessorUnavailable,
    DayPatternViolation,
    SlotFamilyViolation,
    DurationMismatch,
    ExtractionInconsistency,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::NoAvailableSlot => "NO_AVAILABLE_SLOT",
            ConflictKind::NoQualifiedProfessor => "NO_QUALIFIED_PROFESSOR",
            ConflictKind::TimeSlotConflict => "TIME_SLOT_CONFLICT",
            ConflictKind::ProfessorDoubleBooked => "PROFESSOR_DOUBLE_BOOKED",
            ConflictKind::ConsecutiveTeaching => "CONSECUTIVE_TEACHING",
            ConflictKind::ProfessorUnavailable => "PROFESSOR_UNAVAILABLE",
            ConflictKind::DayPatternViolation => "DAY_PATTERN_VIOLATION",
            ConflictKind::SlotFamilyViolation => "SLOT_FAMILY_VIOLATION",
            ConflictKind::DurationMismatch => "DURATION_MISMATCH",
            ConflictKind::ExtractionInconsistency => "EXTRACTION_INCONSISTENCY",
        }
    }
}

/// Describes a problem found while decoding or re-checking a schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub conflict_id: String,
    pub conflict_type: ConflictKind,
    pub timeslot_id: Option<SlotId>,
    pub day_of_week: Option<Day>,
    pub course_ids: Vec<CourseId>,
    pub scheduled_course_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_professor_id: Option<ProfessorId>,
    pub description: String,
    pub is_resolved: bool,
}

impl Conflict {
    /// Creates an unresolved conflict; the id is assigned once the full list is known.
    pub fn new(kind: ConflictKind, description: impl Into<String>) -> Self {
        Self {
            conflict_id: String::new(),
            conflict_type: kind,
            timeslot_id: None,
            day_of_week: None,
            course_ids: Vec::new(),
            scheduled_course_ids: Vec::new(),
            suggested_professor_id: None,
            description: description.into(),
            is_resolved: false,
        }
    }

    pub fn at(mut self, slot: Option<&SlotId>, day: Option<&Day>) -> Self {
        self.timeslot_id = slot.cloned();
        self.day_of_week = day.cloned();
        self
    }

    pub fn with_courses<I, S>(mut self, courses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CourseId>,
    {
        for course in courses {
            let course = course.into();
            if !self.course_ids.contains(&course) {
                self.course_ids.push(course);
            }
        }
        self
    }

    pub fn with_meetings<'a, I>(mut self, meetings: I) -> Self
    where
        I: IntoIterator<Item = &'a ScheduledMeeting>,
    {
        for m in meetings {
            self.scheduled_course_ids.push(m.scheduled_course_id.clone());
            if !self.course_ids.contains(&m.course_id) {
                self.course_ids.push(m.course_id.clone());
            }
        }
        self
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.conflict_type.as_str(), self.description)
    }
}

/// Terminal status reported by the solving engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverStatus {
    Optimal,
    Feasible,
    Infeasible,
    ModelInvalid,
    Unknown,
}

impl SolverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverStatus::Optimal => "OPTIMAL",
            SolverStatus::Feasible => "FEASIBLE",
            SolverStatus::Infeasible => "INFEASIBLE",
            SolverStatus::ModelInvalid => "MODEL_INVALID",
            SolverStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_courses: usize,
    pub total_meetings_required: usize,
    pub meetings_scheduled: usize,
    pub scheduling_percentage: f64,
    pub core_meetings_required: usize,
    pub core_meetings_scheduled: usize,
    pub core_scheduling_percentage: f64,
    pub meetings_per_day: BTreeMap<Day, usize>,
    pub unresolved_conflicts: usize,
    pub variables: usize,
    pub constraints: usize,
    pub solver_status: String,
    pub solver_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    DurationGap,
    QualificationGap,
    AvailabilityGap,
    PatternGap,
    CapacityShortfall,
}

/// One likely root cause of an unsolved model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub issue_type: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<CourseId>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfeasibilityReport {
    pub solver_status: SolverStatus,
    pub issues: Vec<Issue>,
}

/// The final output of one scheduling request.
#[derive(Debug, Clone, Serialize)]
pub struct SolveResult {
    pub schedule_id: String,
    pub status: SolverStatus,
    pub scheduled_courses: Vec<ScheduledMeeting>,
    pub conflicts: Vec<Conflict>,
    pub statistics: Statistics,
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infeasibility: Option<InfeasibilityReport>,
}

/// Replaces the normal payload when a request cannot be processed at all.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub detail: String,
}
