//! Integration tests for lmsync-moodle
//!
//! Uses wiremock to simulate the Moodle REST web service and verifies the
//! call policies of the MoodleClient, course and file resolution, and
//! authenticated downloads.

mod common;

mod test_call;
mod test_resolver;
