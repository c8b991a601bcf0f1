//! Version 1 API handlers.

mod sessions;

pub use sessions::{
    compact_session, create_session, delete_session, get_history, get_session, list_sessions,
    notify_session, process_message, submit_status, terminate_session,
};
