pub mod allocation;
pub mod domain;
pub mod grid;
pub mod ports;
pub mod rotation;

pub use allocation::{allocate_group, course_capacity, Allocation, CapacityReport};
pub use domain::{
    ApplicantType, AuthSession, Candidate, CandidateStatus, Course, Group, GroupAssignment,
    ProgrammeSubject, RotationSlot, Staff, StaffCredentials, StaffRole, StationAssignment,
    StationSession, SubjectType, WorkshopRotation,
};
pub use grid::{generate_station_grid, GridCell, StationGrid};
pub use ports::{CourseStore, EmailService, PortError, PortResult};
pub use rotation::{
    plan_rotation, GroupProgress, RotationConflict, RotationOutcome, RotationRequest,
};
