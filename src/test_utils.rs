use crate::data::{Course, Professor, SchedulingRequest, TimeSlot};

pub fn course(id: &str, duration: u32, is_core: bool, num_classes: u32, dept: Option<&str>) -> Course {
    Course {
        id: id.into(),
        course_name: None,
        department_id: dept.map(Into::into),
        duration_minutes: duration,
        is_core,
        num_classes,
    }
}

pub fn professor(id: &str, dept: Option<&str>) -> Professor {
    Professor {
        id: id.into(),
        department_id: dept.map(Into::into),
    }
}

pub fn slot(id: &str, day: &str, start: &str, end: &str, duration: u32) -> TimeSlot {
    TimeSlot {
        id: id.into(),
        name: None,
        day_of_week: day.into(),
        start_time: start.into(),
        end_time: end.into(),
        duration_minutes: duration,
        slot_family: None,
    }
}

pub fn request(courses: Vec<Course>, professors: Vec<Professor>, time_slots: Vec<TimeSlot>) -> SchedulingRequest {
    SchedulingRequest {
        schedule_id: "SCH-TEST".into(),
        courses,
        professors,
        time_slots,
        professor_availability: Vec::new(),
        professor_courses: Vec::new(),
    }
}
