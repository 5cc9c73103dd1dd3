use std::env;

use serde::{Deserialize, Serialize};

use crate::content::ContentMatcher;
use crate::overwrite::CHUNK_SIZE;
use crate::owner::OwnerLookup;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorInfo {
    pub os: String,
    pub arch: String,
    pub current_dir: Option<String>,
    pub pdf_backend: Option<String>,
    pub ocr_backend: Option<String>,
    pub owner_lookup_supported: bool,
    pub chunk_size_bytes: u64,
    pub notes: Vec<String>,
}

pub fn collect_doctor_info() -> DoctorInfo {
    doctor_info_for(&ContentMatcher::from_system())
}

pub fn doctor_info_for(matcher: &ContentMatcher) -> DoctorInfo {
    let current_dir = env::current_dir()
        .ok()
        .map(|path| path.to_string_lossy().to_string());
    let capabilities = matcher.capabilities();
    let owner_lookup_supported = OwnerLookup::is_supported();

    let mut notes = vec![
        "Overwrite-based erasure is not reliable on SSDs or flash media (wear leveling, TRIM)."
            .to_string(),
        "Filesystem metadata, journal entries and free space are not erased.".to_string(),
        "Another process can still read a file until its first overwrite pass has been synced."
            .to_string(),
    ];
    if capabilities.pdf.is_none() {
        notes.push("pdftotext not found; PDF content filters never match.".to_string());
    }
    if capabilities.ocr.is_none() {
        notes.push("tesseract not found; image content filters never match.".to_string());
    }
    if !owner_lookup_supported {
        notes.push("Owner filters are ignored on this platform.".to_string());
    }

    DoctorInfo {
        os: env::consts::OS.to_string(),
        arch: env::consts::ARCH.to_string(),
        current_dir,
        pdf_backend: capabilities.pdf,
        ocr_backend: capabilities.ocr,
        owner_lookup_supported,
        chunk_size_bytes: CHUNK_SIZE as u64,
        notes,
    }
}
