pub mod service;

pub use service::{
    cancel_shred, doctor, find_files, get_shred_session, poll_shred_events, start_shred,
    CancelShredResponse, ShredRequest, ShredSessionSnapshot, ShredSessionStatus,
};
