pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

// Re-export the REST handlers to make them easily accessible
// to the binary that will build the web server router.
pub use middleware::require_auth;
pub use rest::{
    activate_candidate_handler, apply_handler, course_capacity_handler,
    create_station_subject_handler, delete_subject_handler,
    generate_workshop_rotation_handler, list_programme_handler, station_grid_handler,
    update_candidate_status_handler,
};
